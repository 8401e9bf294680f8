//! Stand-in pairing engine.
//!
//! Reads the tournament record at the given path, pairs the next round in
//! start-number order and writes the record back. Exits non-zero if the
//! record cannot be read, paired or written.

use captain::stub_engine;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "captain-stub-engine")]
#[command(about = "Pairs the next round of a tournament record in start-number order")]
struct Args {
    /// Path to the tournament record
    slot: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    match stub_engine::pair_slot(&args.slot) {
        Ok(round_no) => {
            tracing::info!("paired round {} of {}", round_no, args.slot.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("captain-stub-engine: {}", e);
            ExitCode::FAILURE
        }
    }
}
