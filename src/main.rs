//! Lak Ledger CLI
//!
//! Replays a CSV log of ledger operations through the engine and prints the
//! final account balances to stdout.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- operations.csv > balances.csv
//! cargo run -- --daily-cap 15 --holding-cap 25 operations.csv > balances.csv
//! cargo run -- --no-limits operations.csv > balances.csv
//! ```
//!
//! Progress and rejected operations are logged to stderr (`RUST_LOG`
//! controls verbosity); only the balances CSV goes to stdout.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (file not found, unreadable input, output failure)

use lak_ledger::cli;
use lak_ledger::core::LedgerEngine;
use lak_ledger::io::{replay, write_balances_csv};
use std::fs::File;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    // All diagnostics go to stderr so stdout stays a clean CSV stream.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = cli::parse_args();
    let engine = LedgerEngine::with_settings(args.to_settings());

    let input = match File::open(&args.input_file) {
        Ok(file) => file,
        Err(error) => {
            eprintln!("Error opening {}: {}", args.input_file.display(), error);
            process::exit(1);
        }
    };

    let summary = match replay(&engine, input) {
        Ok(summary) => summary,
        Err(error) => {
            eprintln!("Error: {error}");
            process::exit(1);
        }
    };
    eprintln!(
        "Replay finished: {} applied, {} skipped",
        summary.applied, summary.skipped
    );

    let mut output = std::io::stdout();
    if let Err(error) = write_balances_csv(engine.store(), &mut output) {
        eprintln!("Error: {error}");
        process::exit(1);
    }
}
