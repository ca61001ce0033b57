//! pgkv CLI entry point
//!
//! Installs the tracing subscriber and delegates everything else to
//! `cli::run`. Logs go to stderr; stdout carries the JSON envelope.

use pgkv::cli;
use tracing_subscriber::EnvFilter;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pgkv=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
