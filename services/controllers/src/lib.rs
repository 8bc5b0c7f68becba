//! Shared bring-up for the peripheral controller binaries.
//!
//! Every controller is the same soldier application with a different set of
//! watchers on top; [`run`] owns the common path (args, tracing, config,
//! role, peripheral install) and hands the peripheral to the binary's
//! customization hook before entering the main loop.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use rev_core::{Application, LoggingBus, Peripheral, SoldierRole};
use tracing::{info, warn};

#[derive(Parser)]
#[command(about = "revolution peripheral controller endpoint")]
struct Args {
    /// Path to the runtime TOML config.
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

/// Bring up the soldier named `endpoint` and run it until `exit`.
/// `customize` installs the controller's watchers and helpers.
pub fn run(endpoint: &str, customize: impl FnOnce(&Peripheral)) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config_path = args
        .config
        .unwrap_or_else(|| format!("/etc/revolution/{endpoint}.toml").into());
    let config = match rev_core::load_config_from_path(&config_path) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("FATAL: failed to load config: {error}");
            std::process::exit(1);
        }
    };
    let Some(own) = config.topology.soldier(endpoint).cloned() else {
        eprintln!("FATAL: endpoint {endpoint:?} is not a soldier in the configured topology");
        std::process::exit(1);
    };
    info!(
        version = env!("CARGO_PKG_VERSION"),
        endpoint = %own.name,
        "controller starting"
    );

    let role = SoldierRole::new(own, &config.topology);
    let app = match Application::new(Box::new(role), config) {
        Ok(app) => app,
        Err(error) => {
            eprintln!("FATAL: failed to open message queue: {error}");
            std::process::exit(1);
        }
    };
    let peripheral = Peripheral::install(&app, Arc::new(LoggingBus));
    customize(&peripheral);
    app.main();
}

/// Parse a state value as a PWM duty percentage.
pub fn duty_from(value: &str) -> Option<f64> {
    match value.parse::<f64>() {
        Ok(duty) if (0.0..=100.0).contains(&duty) => Some(duty),
        _ => {
            warn!(value = %value, "not a duty percentage; ignoring");
            None
        }
    }
}

/// Parse a state value as a switch level.
pub fn level_from(value: &str) -> bool {
    matches!(value, "1" | "on" | "high" | "true")
}

/// Periodically push the full state snapshot to the endpoint's own queue
/// under the `data` verb, where the peripheral layer logs it. The period
/// follows the `telemetry_period` state key (milliseconds) when set.
pub fn start_telemetry(app: &Arc<Application>, default_period: Duration) {
    let app = Arc::clone(app);
    thread::Builder::new()
        .name("telemetry".to_owned())
        .spawn(move || {
            while !app.status() {
                thread::sleep(Duration::from_millis(20));
            }
            let data_header = app.headers().data.clone();
            let period_key = app.keys().telemetry_period.clone();
            while app.status() {
                let period = app
                    .state_map()
                    .get(&period_key)
                    .and_then(|ms| ms.parse::<u64>().ok())
                    .map_or(default_period, Duration::from_millis);
                thread::sleep(period);
                if !app.status() {
                    break;
                }
                let snapshot = app.state_snapshot();
                if snapshot.is_empty() {
                    continue;
                }
                let own = app.name().to_owned();
                if let Err(error) = app.send_to(&own, &data_header, snapshot, 0) {
                    warn!(%error, "telemetry push failed");
                }
            }
        })
        .expect("spawn telemetry thread");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duty_parsing_bounds() {
        assert_eq!(duty_from("55.5"), Some(55.5));
        assert_eq!(duty_from("0"), Some(0.0));
        assert_eq!(duty_from("100"), Some(100.0));
        assert_eq!(duty_from("101"), None);
        assert_eq!(duty_from("-1"), None);
        assert_eq!(duty_from("fast"), None);
    }

    #[test]
    fn level_parsing() {
        assert!(level_from("1"));
        assert!(level_from("on"));
        assert!(!level_from("0"));
        assert!(!level_from("off"));
        assert!(!level_from("sideways"));
    }
}
