//! Stand-in for DynamoDB Local used by the launcher tests
//!
//! Accepts the same trailing flags (`-port`, `-dbPath`, `-inMemory`,
//! `-sharedDb`), listens on the port and writes the flags it received to
//! `<dbPath>/args.txt`.

use std::net::TcpListener;
use std::path::PathBuf;

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn main() -> std::io::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let port: u16 = flag_value(&args, "-port")
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| std::io::Error::other("missing -port"))?;

    if let Some(db_path) = flag_value(&args, "-dbPath") {
        std::fs::write(PathBuf::from(db_path).join("args.txt"), args.join("\n"))?;
    }

    let listener = TcpListener::bind(("127.0.0.1", port))?;
    for stream in listener.incoming() {
        drop(stream);
    }
    Ok(())
}
