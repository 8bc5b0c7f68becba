//! Endpoint-addressed send and receive.
//!
//! A `Messenger` owns one endpoint's receive queue and lazily opens (and
//! caches) a descriptor per recipient on first send. Frames always go out at
//! the configured queue priority so that delivery between any (sender,
//! recipient) pair stays FIFO; the priority recorded inside the frame is
//! informational.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use rev_proto::{FrameError, Message};
use thiserror::Error;
use tracing::trace;

use crate::queue::{MessageQueue, QueueError, QueueOptions};

/// Messenger tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessengerConfig {
    pub queue_options: QueueOptions,
    /// Default deadline for [`Messenger::timed_receive`].
    pub receive_deadline: Duration,
    /// Queue priority applied to every outgoing frame.
    pub send_priority: u32,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            queue_options: QueueOptions::default(),
            receive_deadline: Duration::from_millis(100),
            send_priority: 0,
        }
    }
}

/// Failures on the messenger surface: transport, or a frame that would not
/// (or did not) parse.
#[derive(Debug, Error)]
pub enum MessengerError {
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// One endpoint's connection to the queue namespace.
#[derive(Debug)]
pub struct Messenger {
    name: String,
    config: MessengerConfig,
    inbox: MessageQueue,
    outboxes: Mutex<HashMap<String, MessageQueue>>,
}

impl Messenger {
    /// Bind to `name`'s own queue, creating it if absent.
    pub fn new(name: &str, config: MessengerConfig) -> Result<Self, QueueError> {
        let inbox = MessageQueue::open(&format!("/{name}"), config.queue_options)?;
        Ok(Self {
            name: name.to_owned(),
            config,
            inbox,
            outboxes: Mutex::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &MessengerConfig {
        &self.config
    }

    /// Frame and enqueue `message` onto the recipient's queue. The
    /// recipient's queue is created if it does not exist yet, so the
    /// recipient need not be up.
    pub fn send(&self, message: &Message) -> Result<(), MessengerError> {
        message.validate()?;
        let mut outboxes = lock(&self.outboxes);
        let outbox = match outboxes.entry(message.recipient_name.clone()) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let queue = MessageQueue::open(
                    &format!("/{}", message.recipient_name),
                    self.config.queue_options,
                )?;
                entry.insert(queue)
            }
        };
        trace!(recipient = %message.recipient_name, %message, "sending");
        outbox.send(&message.serialize(), self.config.send_priority)?;
        Ok(())
    }

    /// Block until a message arrives on this endpoint's own queue.
    pub fn receive(&self) -> Result<Message, MessengerError> {
        let frame = self.inbox.receive()?;
        Ok(Message::deserialize(&frame)?)
    }

    /// Wait up to the configured receive deadline for a message; `None`
    /// means the deadline passed.
    pub fn timed_receive(&self) -> Result<Option<Message>, MessengerError> {
        self.timed_receive_for(self.config.receive_deadline)
    }

    /// Wait up to `timeout` for a message.
    pub fn timed_receive_for(&self, timeout: Duration) -> Result<Option<Message>, MessengerError> {
        match self.inbox.timed_receive(SystemTime::now() + timeout)? {
            Some(frame) => Ok(Some(Message::deserialize(&frame)?)),
            None => Ok(None),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_name(tag: &str) -> String {
        format!("{tag}_{}", uuid::Uuid::new_v4().simple())
    }

    struct Unlinker(Vec<String>);

    impl Drop for Unlinker {
        fn drop(&mut self) {
            for name in &self.0 {
                let _ = MessageQueue::unlink(&format!("/{name}"));
            }
        }
    }

    #[test]
    fn messages_flow_between_two_messengers() {
        let alpha = scratch_name("rev_msgr_a");
        let beta = scratch_name("rev_msgr_b");
        let _cleanup = Unlinker(vec![alpha.clone(), beta.clone()]);

        let sender = Messenger::new(&alpha, MessengerConfig::default()).unwrap();
        let receiver = Messenger::new(&beta, MessengerConfig::default()).unwrap();

        let message = Message::new(&alpha, &beta, "set", vec!["k".into(), "v".into()], 0);
        sender.send(&message).unwrap();

        let received = receiver.receive().unwrap();
        assert_eq!(received, message);
    }

    #[test]
    fn send_creates_the_recipient_queue_lazily() {
        let alpha = scratch_name("rev_msgr_lazy_a");
        let beta = scratch_name("rev_msgr_lazy_b");
        let _cleanup = Unlinker(vec![alpha.clone(), beta.clone()]);

        // No receiver exists yet; the send must still succeed.
        let sender = Messenger::new(&alpha, MessengerConfig::default()).unwrap();
        let message = Message::new(&alpha, &beta, "status", vec![], 0);
        sender.send(&message).unwrap();

        // The receiver comes up afterwards and drains the queued message.
        let receiver = Messenger::new(&beta, MessengerConfig::default()).unwrap();
        assert_eq!(receiver.receive().unwrap(), message);
    }

    #[test]
    fn timed_receive_reports_timeout_as_none() {
        let name = scratch_name("rev_msgr_idle");
        let _cleanup = Unlinker(vec![name.clone()]);
        let messenger = Messenger::new(
            &name,
            MessengerConfig {
                receive_deadline: Duration::from_millis(30),
                ..MessengerConfig::default()
            },
        )
        .unwrap();
        assert!(messenger.timed_receive().unwrap().is_none());
    }

    #[test]
    fn malformed_frame_is_a_frame_error() {
        let name = scratch_name("rev_msgr_bad");
        let _cleanup = Unlinker(vec![name.clone()]);
        let messenger = Messenger::new(&name, MessengerConfig::default()).unwrap();

        let raw = MessageQueue::open(&format!("/{name}"), QueueOptions::default()).unwrap();
        raw.send(b"not\0a\0frame", 0).unwrap();

        assert!(matches!(
            messenger.timed_receive_for(Duration::from_millis(200)),
            Err(MessengerError::Frame(_))
        ));
    }

    #[test]
    fn embedded_nul_is_rejected_before_framing() {
        let name = scratch_name("rev_msgr_nul");
        let _cleanup = Unlinker(vec![name.clone()]);
        let messenger = Messenger::new(&name, MessengerConfig::default()).unwrap();
        let message = Message::new(&name, &name, "set", vec!["k\0v".into()], 0);
        assert!(matches!(
            messenger.send(&message),
            Err(MessengerError::Frame(FrameError::EmbeddedNul { .. }))
        ));
    }
}
