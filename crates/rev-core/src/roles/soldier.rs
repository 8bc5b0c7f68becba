//! The peripheral role.
//!
//! A soldier never originates local state: writes round-trip through the
//! marshal, and only `set`s whose sender IS the marshal are applied
//! directly. The marshal's reply to a forwarded write carries the applied
//! pairs, which the soldier then applies — its convergence path, since the
//! marshal's broadcast fan-out excludes the sender.

use rev_mq::MessengerError;
use rev_proto::{Endpoint, Message, Topology};
use tracing::{debug, error};

use crate::application::Application;
use crate::roles::Role;

pub struct SoldierRole {
    endpoint: Endpoint,
    marshal: Endpoint,
}

impl SoldierRole {
    pub fn new(endpoint: Endpoint, topology: &Topology) -> Self {
        Self {
            endpoint,
            marshal: topology.marshal.clone(),
        }
    }

    /// Forward a write to the marshal, apply the echoed pairs, and return
    /// them.
    fn forward(
        &self,
        app: &Application,
        data: Vec<String>,
        priority: u32,
    ) -> Result<Vec<String>, MessengerError> {
        debug!(marshal = %self.marshal.name, "passing write to marshal");
        let echo = app.communicate(
            &self.marshal.name,
            &app.headers().set.clone(),
            data,
            priority,
        )?;
        app.apply_write(&echo.data);
        Ok(echo.data)
    }
}

impl Role for SoldierRole {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn syncer(&self) -> Option<&Endpoint> {
        Some(&self.marshal)
    }

    fn on_write(&self, app: &Application, message: &Message) -> Option<Vec<String>> {
        if message.sender_name == self.marshal.name {
            app.apply_write(&message.data);
            return Some(vec![]);
        }
        match self.forward(app, message.data.clone(), message.priority) {
            Ok(echo) => Some(echo),
            Err(error) => {
                error!(%error, "forwarding write to marshal failed");
                None
            }
        }
    }

    fn write_state(
        &self,
        app: &Application,
        key: &str,
        value: &str,
    ) -> Result<(), MessengerError> {
        self.forward(app, vec![key.to_owned(), value.to_owned()], 0)?;
        Ok(())
    }
}
