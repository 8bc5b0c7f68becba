//! Static endpoint topology.
//!
//! One marshal, one replica, N soldiers. Endpoint names double as queue
//! identifiers (the queue name is `/` + endpoint name), so they are
//! restricted to `[A-Za-z0-9_]+`.

use serde::Deserialize;
use thiserror::Error;

/// A named endpoint. Endpoints are static for the lifetime of the system.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Endpoint {
    pub name: String,
}

impl Endpoint {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The host-local queue name owned by this endpoint.
    pub fn queue_name(&self) -> String {
        format!("/{}", self.name)
    }
}

/// Errors detected while validating a topology.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("endpoint name {0:?} is not [A-Za-z0-9_]+")]
    InvalidName(String),
    #[error("endpoint name {0:?} appears more than once")]
    DuplicateName(String),
}

/// Check an endpoint name against the queue identifier character set.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The full set of named endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Topology {
    pub marshal: Endpoint,
    pub replica: Endpoint,
    pub soldiers: Vec<Endpoint>,
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            marshal: Endpoint::new("marshal"),
            replica: Endpoint::new("replica"),
            soldiers: vec![
                Endpoint::new("display_driver"),
                Endpoint::new("miscellaneous_controller"),
                Endpoint::new("motor_controller"),
                Endpoint::new("power_sensor"),
                Endpoint::new("telemeter"),
                Endpoint::new("voltage_controller"),
            ],
        }
    }
}

impl Topology {
    /// Every endpoint: marshal first, then replica, then the soldiers.
    pub fn endpoints(&self) -> Vec<&Endpoint> {
        let mut all = vec![&self.marshal, &self.replica];
        all.extend(self.soldiers.iter());
        all
    }

    /// The endpoints a marshal-applied write fans out to: every endpoint
    /// other than the marshal itself.
    pub fn fanout(&self) -> Vec<&Endpoint> {
        let mut set = vec![&self.replica];
        set.extend(self.soldiers.iter());
        set
    }

    pub fn contains(&self, name: &str) -> bool {
        self.endpoints().iter().any(|e| e.name == name)
    }

    pub fn soldier(&self, name: &str) -> Option<&Endpoint> {
        self.soldiers.iter().find(|e| e.name == name)
    }

    /// Validate name character set and uniqueness across the topology.
    pub fn validate(&self) -> Result<(), TopologyError> {
        let mut seen = Vec::new();
        for endpoint in self.endpoints() {
            if !is_valid_name(&endpoint.name) {
                return Err(TopologyError::InvalidName(endpoint.name.clone()));
            }
            if seen.contains(&endpoint.name.as_str()) {
                return Err(TopologyError::DuplicateName(endpoint.name.clone()));
            }
            seen.push(&endpoint.name);
        }
        Ok(())
    }
}
