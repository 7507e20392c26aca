//! shelfdb Index Rebuild
//!
//! Recreates a namespace's index directory from its data files.

use std::path::PathBuf;

use clap::Parser;
use shelfdb::tools::{rebuild, RebuildOptions};
use shelfdb::KeyMode;
use tracing_subscriber::{fmt, EnvFilter};

/// shelfdb index rebuild
#[derive(Parser, Debug)]
#[command(name = "shelfdb-index-rebuild")]
#[command(about = "Rebuild a namespace index from its data files")]
#[command(version)]
struct Args {
    /// Data root directory
    #[arg(long)]
    data: PathBuf,

    /// Index root directory (the namespace directory must not exist)
    #[arg(long)]
    index: PathBuf,

    /// Namespace to rebuild
    #[arg(long, default_value = "default")]
    namespace: String,

    /// Addressing mode the data was written in (user, seq); there is no
    /// default since the data files do not record it
    #[arg(long)]
    mode: String,

    /// Descriptor file to copy namespace settings from
    #[arg(long)]
    template: Option<PathBuf>,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,shelfdb=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    let mode = match KeyMode::parse(&args.mode) {
        Ok(mode) => mode,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    let options = RebuildOptions {
        mode,
        template: args.template,
    };

    // Any failure here means the data files cannot be trusted to describe
    // an index: stop without leaving the process running
    match rebuild(&args.data, &args.index, &args.namespace, &options) {
        Ok(report) => {
            tracing::info!(
                "Index written to {} ({} records, {} live keys)",
                report.index_dir.display(),
                report.summary.records,
                report.summary.live_keys
            );
        }
        Err(e) => {
            tracing::error!("Rebuild of '{}' failed: {}", args.namespace, e);
            std::process::exit(1);
        }
    }
}
