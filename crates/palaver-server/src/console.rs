//! Operator console on stdin.
//!
//! Reads commands line by line: `status`, `help`, `stop`. Consumes only
//! the router's read-only queries; `stop` asks main for the ordered
//! shutdown sequence rather than tearing anything down itself.

use std::time::Instant;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;

use crate::router::Router;

pub async fn run(router: Router, stop: mpsc::Sender<()>, started: Instant) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Type 'help' for available commands or 'stop' to shut down.");

    while let Ok(Some(line)) = lines.next_line().await {
        match line.trim().to_ascii_lowercase().as_str() {
            "" => {}
            "status" => {
                let names = router.online_names().await;
                println!("=== Server status ===");
                println!("Connected clients: {}", names.len());
                println!("Online users: {}", names.join(", "));
                println!("Uptime: {}s", started.elapsed().as_secs());
                println!("=====================");
            }
            "stop" => {
                info!("Stop requested from console");
                let _ = stop.send(()).await;
                return;
            }
            "help" => show_help(),
            other => {
                println!("Unknown command: {}", other);
                show_help();
            }
        }
    }
}

fn show_help() {
    println!("=== Available commands ===");
    println!("status  - show online users and uptime");
    println!("stop    - stop the server");
    println!("help    - show this help");
    println!("==========================");
}
