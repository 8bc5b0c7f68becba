//! The persistence role.
//!
//! The replica mirrors live state to a JSON snapshot on disk and refreshes
//! the marshal from it: the snapshot is loaded at boot, every applied write
//! rewrites it, and a background thread dumps the full state to the marshal
//! every sync period so a restarted marshal converges back to the persisted
//! view. Pushed `set`s from the marshal are absorbed like any soldier.

use std::sync::Arc;
use std::thread;

use rev_mq::MessengerError;
use rev_proto::{Endpoint, Message, Topology};
use tracing::{debug, error, info, warn};

use crate::application::Application;
use crate::roles::Role;

pub struct ReplicaRole {
    endpoint: Endpoint,
    marshal: Endpoint,
}

impl ReplicaRole {
    pub fn new(topology: &Topology) -> Self {
        Self {
            endpoint: topology.replica.clone(),
            marshal: topology.marshal.clone(),
        }
    }

    /// Rewrite the snapshot file from the current state map. Write-then-
    /// rename, so a crash mid-write never truncates the previous snapshot.
    fn persist(&self, app: &Application) {
        let Some(path) = app.config().state_file.clone() else {
            return;
        };
        let map = app.state_map();
        let bytes = match serde_json::to_vec_pretty(&map) {
            Ok(bytes) => bytes,
            Err(error) => {
                error!(%error, "serializing state snapshot failed");
                return;
            }
        };
        let staging = path.with_extension("tmp");
        if let Err(error) =
            std::fs::write(&staging, bytes).and_then(|()| std::fs::rename(&staging, &path))
        {
            error!(path = %path.display(), %error, "writing state snapshot failed");
        } else {
            debug!(path = %path.display(), entries = map.len(), "state snapshot written");
        }
    }

    /// Load the snapshot (if any) into the state map through the write
    /// path, so watchers observe the restored values.
    fn load(&self, app: &Application) {
        let Some(path) = app.config().state_file.clone() else {
            return;
        };
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no state snapshot yet");
                return;
            }
            Err(error) => {
                error!(path = %path.display(), %error, "reading state snapshot failed");
                return;
            }
        };
        match serde_json::from_str::<std::collections::HashMap<String, String>>(&contents) {
            Ok(map) => {
                info!(path = %path.display(), entries = map.len(), "state snapshot loaded");
                for (key, value) in &map {
                    app.store(key, value);
                }
            }
            Err(error) => {
                error!(path = %path.display(), %error, "state snapshot is corrupt; ignoring");
            }
        }
    }

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

impl Role for ReplicaRole {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn syncer(&self) -> Option<&Endpoint> {
        Some(&self.marshal)
    }

    fn on_write(&self, app: &Application, message: &Message) -> Option<Vec<String>> {
        if message.sender_name == self.marshal.name {
            app.apply_write(&message.data);
            self.persist(app);
            return Some(vec![]);
        }
        match self.forward(app, message.data.clone(), message.priority) {
            Ok(echo) => {
                self.persist(app);
                Some(echo)
            }
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
        self.persist(app);
        Ok(())
    }

    fn on_setup(&self, app: &Arc<Application>) {
        self.load(app);

        let app = Arc::clone(app);
        thread::Builder::new()
            .name("replica-dump".to_owned())
            .spawn(move || {
                let period = app.config().sync_period;
                let marshal = app.topology().marshal.name.clone();
                let set_header = app.headers().set.clone();
                while app.status() {
                    thread::sleep(period);
                    if !app.status() {
                        break;
                    }
                    let snapshot = app.state_snapshot();
                    if snapshot.is_empty() {
                        continue;
                    }
                    debug!(entries = snapshot.len() / 2, "dumping state to marshal");
                    if let Err(error) = app.send_to(&marshal, &set_header, snapshot, 0) {
                        warn!(%error, "state dump to marshal failed");
                    }
                }
            })
            .expect("spawn replica dump thread");
    }

    fn on_applied(&self, app: &Application) {
        self.persist(app);
    }
}
