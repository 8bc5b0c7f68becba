//! The coordinator role.
//!
//! The marshal is the single serialization point for writes: every `set` it
//! receives is applied locally and re-sent to every other endpoint in the
//! fan-out set, excluding the sender. The reply to the writer carries the
//! applied pairs — that echo is how a forwarding soldier converges without
//! being part of its own fan-out.

use rev_mq::MessengerError;
use rev_proto::{Endpoint, Message, Topology};
use tracing::{debug, error};

use crate::application::Application;
use crate::roles::Role;

pub struct MarshalRole {
    endpoint: Endpoint,
    syncer: Endpoint,
}

impl MarshalRole {
    /// The marshal endpoint of `topology`, syncing from its replica at boot.
    pub fn new(topology: &Topology) -> Self {
        Self {
            endpoint: topology.marshal.clone(),
            syncer: topology.replica.clone(),
        }
    }
}

impl Role for MarshalRole {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn syncer(&self) -> Option<&Endpoint> {
        Some(&self.syncer)
    }

    fn on_write(&self, app: &Application, message: &Message) -> Option<Vec<String>> {
        app.apply_write(&message.data);
        let set_header = app.headers().set.clone();
        for peer in app.topology().fanout() {
            if peer.name == message.sender_name {
                continue;
            }
            debug!(peer = %peer.name, "fanning out write");
            if let Err(error) =
                app.send_to(&peer.name, &set_header, message.data.clone(), message.priority)
            {
                error!(peer = %peer.name, %error, "fan-out send failed");
            }
        }
        Some(message.data.clone())
    }

    fn write_state(
        &self,
        app: &Application,
        key: &str,
        value: &str,
    ) -> Result<(), MessengerError> {
        let message = Message::new(
            &self.endpoint.name,
            &self.endpoint.name,
            app.headers().set.clone(),
            vec![key.to_owned(), value.to_owned()],
            0,
        );
        self.on_write(app, &message);
        Ok(())
    }
}
