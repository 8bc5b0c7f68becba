// client: Interactive endpoint for poking the control plane.
//
// Reads `header arg0 arg1 …` lines from stdin and sends each as a message
// to the recipient; everything arriving on the client's own queue is
// printed. Useful for driving a live topology by hand:
//
//     client --name operator --recipient marshal
//     > set motor_speed 40
//     > get motor_speed

use std::io::BufRead;
use std::sync::Arc;

use clap::Parser;
use rev_mq::{Messenger, MessengerConfig};
use rev_proto::Message;

#[derive(Parser)]
#[command(about = "revolution interactive client")]
struct Args {
    /// This client's own endpoint name (its receive queue).
    #[arg(long)]
    name: String,
    /// Default recipient for every line sent.
    #[arg(long)]
    recipient: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    if !rev_proto::is_valid_name(&args.name) || !rev_proto::is_valid_name(&args.recipient) {
        eprintln!("FATAL: endpoint names must be [A-Za-z0-9_]+");
        std::process::exit(1);
    }
    let messenger = match Messenger::new(&args.name, MessengerConfig::default()) {
        Ok(messenger) => Arc::new(messenger),
        Err(error) => {
            eprintln!("FATAL: failed to open message queue: {error}");
            std::process::exit(1);
        }
    };

    // Printer thread: everything addressed to us goes to stdout.
    {
        let messenger = Arc::clone(&messenger);
        std::thread::spawn(move || {
            loop {
                match messenger.receive() {
                    Ok(message) => println!("{message}"),
                    Err(error) => eprintln!("receive error: {error}"),
                }
            }
        });
    }

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(error) => {
                eprintln!("stdin error: {error}");
                break;
            }
        };
        let mut tokens = line.split_whitespace();
        let Some(header) = tokens.next() else {
            continue;
        };
        let data: Vec<String> = tokens.map(str::to_owned).collect();
        let message = Message::new(&args.name, &args.recipient, header, data, 0);
        if let Err(error) = messenger.send(&message) {
            eprintln!("send error: {error}");
        }
    }
}
