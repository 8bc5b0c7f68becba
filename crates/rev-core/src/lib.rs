// rev-core: Per-endpoint application runtime.
//
// Hosts the receive loop, worker pool, handler/watcher registries,
// request/response correlation, heartbeat liveness, and the
// marshal/soldier/replica replication roles layered on top.

pub mod application;
pub mod config;
pub mod heart;
pub mod peripheral;
pub mod roles;
pub mod worker_pool;

pub use application::{Application, Handler, Watcher};
pub use config::{ConfigError, RuntimeConfig, load_config_from_path, load_config_from_str};
pub use heart::Heart;
pub use peripheral::{DeviceBus, DeviceError, LoggingBus, Peripheral};
pub use roles::{MarshalRole, ReplicaRole, Role, SoldierRole, StandaloneRole};
pub use worker_pool::WorkerPool;
