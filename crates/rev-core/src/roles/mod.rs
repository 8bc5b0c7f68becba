//! Replication roles.
//!
//! A role is the capability the application calls from its shared write
//! handler: it names the endpoint, names the endpoint it syncs from at boot,
//! and decides what a `set` means — apply-and-fan-out for the marshal,
//! round-trip-through-the-marshal for soldiers, apply-and-persist for the
//! replica.

use std::sync::Arc;

use rev_mq::MessengerError;
use rev_proto::{Endpoint, Message};

use crate::application::Application;

mod marshal;
mod replica;
mod soldier;
mod standalone;

pub use marshal::MarshalRole;
pub use replica::ReplicaRole;
pub use soldier::SoldierRole;
pub use standalone::StandaloneRole;

/// Role capability held by an [`Application`].
pub trait Role: Send + Sync + 'static {
    /// The endpoint this process is bound to.
    fn endpoint(&self) -> &Endpoint;

    /// The endpoint whose state is pulled at boot (and on `sync`).
    /// `None` for roles with no replication peer.
    fn syncer(&self) -> Option<&Endpoint>;

    /// The write path behind the shared `set` handler. The returned data is
    /// the reply sent to the writer; `None` suppresses the reply.
    fn on_write(&self, app: &Application, message: &Message) -> Option<Vec<String>>;

    /// The user-level write entry point ([`Application::set_state`]).
    fn write_state(
        &self,
        app: &Application,
        key: &str,
        value: &str,
    ) -> Result<(), MessengerError>;

    /// Hook run during setup, after the built-in handlers are installed and
    /// before the boot sync is queued.
    fn on_setup(&self, _app: &Arc<Application>) {}

    /// Hook run after a write path other than `set` mutated the state map
    /// (currently: `reset`).
    fn on_applied(&self, _app: &Application) {}
}
