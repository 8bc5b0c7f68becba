//! A role with no replication peers.
//!
//! Writes apply locally and there is no syncer, so boot involves no pull.
//! Used by tooling endpoints and the test harness.

use rev_mq::MessengerError;
use rev_proto::{Endpoint, Message};

use crate::application::Application;
use crate::roles::Role;

pub struct StandaloneRole {
    endpoint: Endpoint,
}

impl StandaloneRole {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

impl Role for StandaloneRole {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn syncer(&self) -> Option<&Endpoint> {
        None
    }

    fn on_write(&self, app: &Application, message: &Message) -> Option<Vec<String>> {
        app.apply_write(&message.data);
        Some(vec![])
    }

    fn write_state(
        &self,
        app: &Application,
        key: &str,
        value: &str,
    ) -> Result<(), MessengerError> {
        app.store(key, value);
        Ok(())
    }
}
