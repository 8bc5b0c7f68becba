//! POSIX message queue descriptors.
//!
//! Queues are named, bounded, priority-ordered, and persistent in the host
//! namespace until unlinked. Any opener creates the queue if it is absent,
//! so senders never depend on the receiver being up.
//!
//! The descriptor is opened blocking; the non-blocking and deadline variants
//! go through `mq_timedsend`/`mq_timedreceive` (which nix does not wrap) so
//! one descriptor serves every call pattern.

use std::os::fd::{AsRawFd, FromRawFd};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use nix::errno::Errno;
use nix::mqueue::{MQ_OFlag, MqAttr, MqdT, mq_open, mq_unlink};
use nix::sys::stat::Mode;
use thiserror::Error;
use tracing::debug;

/// Queue creation attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    /// Maximum number of queued messages before `send` fails.
    pub max_msg_count: i64,
    /// Maximum frame size in bytes; larger sends are rejected.
    pub max_msg_size: i64,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            max_msg_count: 8,
            max_msg_size: 1024,
        }
    }
}

/// Transport failures, carrying the OS error code where one exists.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue name {0:?} is not \"/\" followed by [A-Za-z0-9_]+")]
    InvalidName(String),
    #[error("opening queue {name}: {errno}")]
    Open { name: String, errno: Errno },
    #[error("queue {name} is full")]
    Full { name: String },
    #[error("frame of {size} bytes exceeds the {limit}-byte limit of queue {name}")]
    Oversize {
        name: String,
        size: usize,
        limit: usize,
    },
    #[error("sending to queue {name}: {errno}")]
    Send { name: String, errno: Errno },
    #[error("receiving from queue {name}: {errno}")]
    Receive { name: String, errno: Errno },
    #[error("unlinking queue {name}: {errno}")]
    Unlink { name: String, errno: Errno },
}

/// Check a full queue name: `/` followed by the endpoint character set.
pub fn is_valid_queue_name(name: &str) -> bool {
    name.strip_prefix('/')
        .is_some_and(rev_proto::is_valid_name)
}

/// An open descriptor onto a named host-local queue.
///
/// The per-process handle is released on drop; the queue itself persists
/// until [`MessageQueue::unlink`].
#[derive(Debug)]
pub struct MessageQueue {
    name: String,
    mqd: MqdT,
    max_msg_size: usize,
}

impl MessageQueue {
    /// Open `name`, creating the queue with `options` if it does not exist.
    pub fn open(name: &str, options: QueueOptions) -> Result<Self, QueueError> {
        if !is_valid_queue_name(name) {
            return Err(QueueError::InvalidName(name.to_owned()));
        }
        let attr = MqAttr::new(0, options.max_msg_count, options.max_msg_size, 0);
        let mqd = mq_open(
            name,
            MQ_OFlag::O_RDWR | MQ_OFlag::O_CREAT,
            Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IROTH,
            Some(&attr),
        )
        .map_err(|errno| QueueError::Open {
            name: name.to_owned(),
            errno,
        })?;
        debug!(queue = %name, "opened message queue");
        Ok(Self {
            name: name.to_owned(),
            mqd,
            max_msg_size: usize::try_from(options.max_msg_size).unwrap_or(usize::MAX),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block until one message is available; the oldest at the highest
    /// priority is returned.
    pub fn receive(&self) -> Result<Vec<u8>, QueueError> {
        let mut buffer = vec![0u8; self.max_msg_size];
        let mut priority = 0u32;
        loop {
            match nix::mqueue::mq_receive(&self.mqd, &mut buffer, &mut priority) {
                Ok(received) => {
                    buffer.truncate(received);
                    return Ok(buffer);
                }
                Err(Errno::EINTR) => {}
                Err(errno) => {
                    return Err(QueueError::Receive {
                        name: self.name.clone(),
                        errno,
                    });
                }
            }
        }
    }

    /// Wait until `deadline` for a message. `None` means the deadline
    /// passed with the queue still empty; I/O failures are errors.
    pub fn timed_receive(&self, deadline: SystemTime) -> Result<Option<Vec<u8>>, QueueError> {
        let abs_timeout = timespec_from(deadline);
        let mut buffer = vec![0u8; self.max_msg_size];
        let mut priority: libc::c_uint = 0;
        loop {
            let received = unsafe {
                libc::mq_timedreceive(
                    self.raw_descriptor(),
                    buffer.as_mut_ptr().cast::<libc::c_char>(),
                    buffer.len(),
                    &raw mut priority,
                    &raw const abs_timeout,
                )
            };
            if received >= 0 {
                buffer.truncate(usize::try_from(received).unwrap_or(0));
                return Ok(Some(buffer));
            }
            match Errno::last() {
                Errno::ETIMEDOUT => return Ok(None),
                Errno::EINTR => {}
                errno => {
                    return Err(QueueError::Receive {
                        name: self.name.clone(),
                        errno,
                    });
                }
            }
        }
    }

    /// Non-blocking receive: `None` if the queue is currently empty.
    pub fn try_receive(&self) -> Result<Option<Vec<u8>>, QueueError> {
        self.timed_receive(SystemTime::now())
    }

    /// Enqueue `frame` at `priority`. Fails with [`QueueError::Full`] when
    /// the queue is at capacity; there is no blocking send.
    pub fn send(&self, frame: &[u8], priority: u32) -> Result<(), QueueError> {
        if frame.len() > self.max_msg_size {
            return Err(QueueError::Oversize {
                name: self.name.clone(),
                size: frame.len(),
                limit: self.max_msg_size,
            });
        }
        let abs_timeout = timespec_from(SystemTime::now());
        loop {
            let result = unsafe {
                libc::mq_timedsend(
                    self.raw_descriptor(),
                    frame.as_ptr().cast::<libc::c_char>(),
                    frame.len(),
                    priority,
                    &raw const abs_timeout,
                )
            };
            if result == 0 {
                return Ok(());
            }
            match Errno::last() {
                Errno::ETIMEDOUT | Errno::EAGAIN => {
                    return Err(QueueError::Full {
                        name: self.name.clone(),
                    });
                }
                Errno::EINTR => {}
                Errno::EMSGSIZE => {
                    return Err(QueueError::Oversize {
                        name: self.name.clone(),
                        size: frame.len(),
                        limit: self.max_msg_size,
                    });
                }
                errno => {
                    return Err(QueueError::Send {
                        name: self.name.clone(),
                        errno,
                    });
                }
            }
        }
    }

    /// Remove `name` from the host namespace. Open handles keep draining;
    /// a queue that does not exist is not an error.
    pub fn unlink(name: &str) -> Result<(), QueueError> {
        match mq_unlink(name) {
            Ok(()) | Err(Errno::ENOENT) => Ok(()),
            Err(errno) => Err(QueueError::Unlink {
                name: name.to_owned(),
                errno,
            }),
        }
    }

    fn raw_descriptor(&self) -> libc::mqd_t {
        self.mqd.as_raw_fd() as libc::mqd_t
    }
}

impl Drop for MessageQueue {
    fn drop(&mut self) {
        // MqdT carries no Drop of its own; rebuild one to hand to mq_close.
        let mqd = unsafe { MqdT::from_raw_fd(self.mqd.as_raw_fd()) };
        let _ = nix::mqueue::mq_close(mqd);
    }
}

fn timespec_from(deadline: SystemTime) -> libc::timespec {
    let since_epoch = deadline
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    libc::timespec {
        tv_sec: since_epoch.as_secs() as libc::time_t,
        tv_nsec: libc::c_long::from(since_epoch.subsec_nanos()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant, SystemTime};

    /// A queue with a unique name, unlinked when the test finishes.
    struct ScratchQueue {
        queue: MessageQueue,
    }

    impl ScratchQueue {
        fn open(options: QueueOptions) -> Self {
            let name = format!("/rev_mq_test_{}", uuid::Uuid::new_v4().simple());
            Self {
                queue: MessageQueue::open(&name, options).unwrap(),
            }
        }
    }

    impl Drop for ScratchQueue {
        fn drop(&mut self) {
            let _ = MessageQueue::unlink(&self.queue.name().to_owned());
        }
    }

    #[test]
    fn send_then_receive_round_trips_bytes() {
        let scratch = ScratchQueue::open(QueueOptions::default());
        scratch.queue.send(b"hello\0frame", 0).unwrap();
        assert_eq!(scratch.queue.receive().unwrap(), b"hello\0frame");
    }

    #[test]
    fn higher_priority_is_delivered_first() {
        let scratch = ScratchQueue::open(QueueOptions::default());
        scratch.queue.send(b"low", 0).unwrap();
        scratch.queue.send(b"high", 5).unwrap();
        assert_eq!(scratch.queue.receive().unwrap(), b"high");
        assert_eq!(scratch.queue.receive().unwrap(), b"low");
    }

    #[test]
    fn timed_receive_times_out_on_empty_queue() {
        let scratch = ScratchQueue::open(QueueOptions::default());
        let started = Instant::now();
        let deadline = SystemTime::now() + Duration::from_millis(50);
        assert!(scratch.queue.timed_receive(deadline).unwrap().is_none());
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn try_receive_returns_none_without_blocking() {
        let scratch = ScratchQueue::open(QueueOptions::default());
        assert!(scratch.queue.try_receive().unwrap().is_none());
        scratch.queue.send(b"x", 0).unwrap();
        assert_eq!(scratch.queue.try_receive().unwrap().unwrap(), b"x");
    }

    #[test]
    fn send_fails_when_queue_is_full() {
        let scratch = ScratchQueue::open(QueueOptions {
            max_msg_count: 2,
            max_msg_size: 64,
        });
        scratch.queue.send(b"one", 0).unwrap();
        scratch.queue.send(b"two", 0).unwrap();
        assert!(matches!(
            scratch.queue.send(b"three", 0),
            Err(QueueError::Full { .. })
        ));
    }

    #[test]
    fn oversize_frame_is_rejected() {
        let scratch = ScratchQueue::open(QueueOptions {
            max_msg_count: 8,
            max_msg_size: 16,
        });
        let frame = vec![b'x'; 17];
        assert!(matches!(
            scratch.queue.send(&frame, 0),
            Err(QueueError::Oversize { size: 17, .. })
        ));
    }

    #[test]
    fn unlink_is_idempotent() {
        let name = format!("/rev_mq_test_{}", uuid::Uuid::new_v4().simple());
        let queue = MessageQueue::open(&name, QueueOptions::default()).unwrap();
        drop(queue);
        MessageQueue::unlink(&name).unwrap();
        MessageQueue::unlink(&name).unwrap();
    }

    #[test]
    fn rejects_invalid_queue_names() {
        assert!(matches!(
            MessageQueue::open("no_slash", QueueOptions::default()),
            Err(QueueError::InvalidName(_))
        ));
        assert!(matches!(
            MessageQueue::open("/bad-name", QueueOptions::default()),
            Err(QueueError::InvalidName(_))
        ));
    }
}
