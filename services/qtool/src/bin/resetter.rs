// resetter: Purge every queue in the topology.
//
// Stale queues survive process exits and a crashed run leaves messages
// behind; run this before first boot so nothing absorbs them.

use clap::Parser;
use rev_mq::MessageQueue;

#[derive(Parser)]
#[command(about = "unlink every queue in the revolution topology")]
struct Args {
    /// Path to the runtime TOML config naming the topology.
    #[arg(long, default_value = "/etc/revolution/revolution.toml")]
    config: std::path::PathBuf,
}

fn main() {
    let args = Args::parse();
    let config = match rev_core::load_config_from_path(&args.config) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("FATAL: failed to load config: {error}");
            std::process::exit(1);
        }
    };
    let mut failures = 0;
    for endpoint in config.topology.endpoints() {
        let queue = endpoint.queue_name();
        match MessageQueue::unlink(&queue) {
            Ok(()) => println!("unlinked {queue}"),
            Err(error) => {
                eprintln!("failed to unlink {queue}: {error}");
                failures += 1;
            }
        }
    }
    if failures > 0 {
        std::process::exit(1);
    }
}
