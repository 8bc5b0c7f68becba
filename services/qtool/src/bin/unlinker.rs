// unlinker: Remove specific queues by endpoint name.
//
// With no names given, behaves like the resetter and purges the whole
// configured topology.

use clap::Parser;
use rev_mq::MessageQueue;

#[derive(Parser)]
#[command(about = "unlink the queues of the named endpoints")]
struct Args {
    /// Endpoint names whose queues to remove.
    names: Vec<String>,
    /// Path to the runtime TOML config (used when no names are given).
    #[arg(long, default_value = "/etc/revolution/revolution.toml")]
    config: std::path::PathBuf,
}

fn main() {
    let args = Args::parse();
    let names = if args.names.is_empty() {
        let config = match rev_core::load_config_from_path(&args.config) {
            Ok(config) => config,
            Err(error) => {
                eprintln!("FATAL: failed to load config: {error}");
                std::process::exit(1);
            }
        };
        config
            .topology
            .endpoints()
            .into_iter()
            .map(|endpoint| endpoint.name.clone())
            .collect()
    } else {
        args.names
    };

    let mut failures = 0;
    for name in names {
        if !rev_proto::is_valid_name(&name) {
            eprintln!("skipping invalid endpoint name {name:?}");
            failures += 1;
            continue;
        }
        let queue = format!("/{name}");
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
