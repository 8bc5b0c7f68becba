//! Runtime configuration loading.
//!
//! TOML is the sole config source. Every field has a default, so a missing
//! config file yields a fully usable configuration; services pass
//! `--config <path>` to override the default location.
//!
//! ```toml
//! heart_period_ms = 1000
//! receive_deadline_ms = 100
//! worker_count = 0          # 0 = hardware concurrency
//! sync_period_ms = 500
//! max_msg_count = 8
//! max_msg_size = 1024
//! state_file = "/var/lib/revolution/replica.json"
//!
//! [headers]
//! get = "read"              # verb strings are configuration
//!
//! [topology]
//! marshal = "marshal"
//! replica = "replica"
//! soldiers = ["motor_controller", "telemeter"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use rev_mq::QueueOptions;
use rev_proto::{HeaderSpace, KeySpace, Topology, TopologyError};
use serde::Deserialize;
use thiserror::Error;

/// Validated runtime configuration shared by every endpoint binary.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Watchdog period; a full period without a beat is fatal.
    pub heart_period: Duration,
    /// Main-loop receive deadline; bounds shutdown latency.
    pub receive_deadline: Duration,
    /// Worker pool size; zero means hardware concurrency.
    pub worker_count: usize,
    /// Pending-job FIFO depth; submissions block when it is full.
    pub job_queue_depth: usize,
    /// Replica full-state dump cadence.
    pub sync_period: Duration,
    pub queue_options: QueueOptions,
    /// Replica snapshot path; `None` disables persistence.
    pub state_file: Option<PathBuf>,
    pub headers: HeaderSpace,
    pub keys: KeySpace,
    pub topology: Topology,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            heart_period: Duration::from_millis(1000),
            receive_deadline: Duration::from_millis(100),
            worker_count: 0,
            job_queue_depth: crate::worker_pool::DEFAULT_QUEUE_DEPTH,
            sync_period: Duration::from_millis(500),
            queue_options: QueueOptions::default(),
            state_file: None,
            headers: HeaderSpace::default(),
            keys: KeySpace::default(),
            topology: Topology::default(),
        }
    }
}

impl RuntimeConfig {
    /// Worker count with the hardware-concurrency default resolved.
    pub fn effective_worker_count(&self) -> usize {
        if self.worker_count == 0 {
            num_cpus::get()
        } else {
            self.worker_count
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file '{path}': {message}")]
    Io { path: String, message: String },
    #[error("parsing config: {0}")]
    Parse(String),
    #[error("invalid config value: {0}")]
    InvalidValue(String),
    #[error(transparent)]
    Topology(#[from] TopologyError),
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types (Option for every optional field)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    heart_period_ms: Option<u64>,
    receive_deadline_ms: Option<u64>,
    worker_count: Option<usize>,
    job_queue_depth: Option<usize>,
    sync_period_ms: Option<u64>,
    max_msg_count: Option<i64>,
    max_msg_size: Option<i64>,
    state_file: Option<PathBuf>,
    headers: Option<HeaderSpace>,
    keys: Option<KeySpace>,
    topology: Option<Topology>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Load config from `path`. A missing file yields the defaults; any other
/// read failure is an error.
pub fn load_config_from_path(path: &Path) -> Result<RuntimeConfig, ConfigError> {
    let toml_str = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(error) => {
            return Err(ConfigError::Io {
                path: path.display().to_string(),
                message: error.to_string(),
            });
        }
    };
    load_config_from_str(&toml_str)
}

/// Load config from a TOML string.
pub fn load_config_from_str(toml_str: &str) -> Result<RuntimeConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let defaults = RuntimeConfig::default();

    let heart_period_ms = raw.heart_period_ms.unwrap_or(1000);
    if heart_period_ms == 0 {
        return Err(ConfigError::InvalidValue(
            "heart_period_ms must be nonzero".to_owned(),
        ));
    }
    let receive_deadline_ms = raw.receive_deadline_ms.unwrap_or(100);
    if receive_deadline_ms == 0 {
        return Err(ConfigError::InvalidValue(
            "receive_deadline_ms must be nonzero".to_owned(),
        ));
    }

    let queue_defaults = QueueOptions::default();
    let max_msg_count = raw.max_msg_count.unwrap_or(queue_defaults.max_msg_count);
    let max_msg_size = raw.max_msg_size.unwrap_or(queue_defaults.max_msg_size);
    if max_msg_count <= 0 || max_msg_size <= 0 {
        return Err(ConfigError::InvalidValue(
            "max_msg_count and max_msg_size must be positive".to_owned(),
        ));
    }

    let topology = raw.topology.unwrap_or(defaults.topology);
    topology.validate()?;

    Ok(RuntimeConfig {
        heart_period: Duration::from_millis(heart_period_ms),
        receive_deadline: Duration::from_millis(receive_deadline_ms),
        worker_count: raw.worker_count.unwrap_or(0),
        job_queue_depth: raw
            .job_queue_depth
            .unwrap_or(crate::worker_pool::DEFAULT_QUEUE_DEPTH)
            .max(1),
        sync_period: Duration::from_millis(raw.sync_period_ms.unwrap_or(500)),
        queue_options: QueueOptions {
            max_msg_count,
            max_msg_size,
        },
        state_file: raw.state_file,
        headers: raw.headers.unwrap_or_default(),
        keys: raw.keys.unwrap_or_default(),
        topology,
    })
}
