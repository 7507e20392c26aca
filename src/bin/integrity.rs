//! shelfdb Integrity Check
//!
//! Recomputes the CRC32-C of every entry in one data file.

use std::path::PathBuf;

use clap::Parser;
use shelfdb::tools::verify;
use tracing_subscriber::{fmt, EnvFilter};

/// shelfdb integrity check
#[derive(Parser, Debug)]
#[command(name = "shelfdb-integrity-check")]
#[command(about = "Verify payload checksums of a zdb-data-NNNNN file")]
#[command(version)]
struct Args {
    /// Data file to check
    file: PathBuf,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,shelfdb=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    match verify(&args.file) {
        Ok(report) => {
            tracing::info!(
                "File {}: {} entries, {} errors",
                report.file_id,
                report.entries,
                report.errors
            );
            if !report.is_clean() {
                std::process::exit(1);
            }
        }
        Err(e) => {
            tracing::error!("Cannot check {}: {}", args.file.display(), e);
            std::process::exit(1);
        }
    }
}
