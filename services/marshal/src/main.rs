// marshal: The write-serializing coordinator endpoint.

use clap::Parser;
use rev_core::{Application, MarshalRole};
use tracing::info;

#[derive(Parser)]
#[command(about = "revolution coordinator endpoint")]
struct Args {
    /// Path to the runtime TOML config.
    #[arg(long, default_value = "/etc/revolution/marshal.toml")]
    config: std::path::PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = match rev_core::load_config_from_path(&args.config) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("FATAL: failed to load config: {error}");
            std::process::exit(1);
        }
    };
    info!(
        version = env!("CARGO_PKG_VERSION"),
        endpoint = %config.topology.marshal.name,
        "marshal starting"
    );

    let role = MarshalRole::new(&config.topology);
    let app = match Application::new(Box::new(role), config) {
        Ok(app) => app,
        Err(error) => {
            eprintln!("FATAL: failed to open message queue: {error}");
            std::process::exit(1);
        }
    };
    app.main();
}
