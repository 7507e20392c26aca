//! shelfdb Server Binary
//!
//! Starts the TCP server for shelfdb.

use std::sync::Arc;

use clap::Parser;
use shelfdb::network::Server;
use shelfdb::{Config, Engine, KeyMode, SyncStrategy};
use tracing_subscriber::{fmt, EnvFilter};

/// shelfdb Server
#[derive(Parser, Debug)]
#[command(name = "shelfdb-server")]
#[command(about = "Namespaced append-only key-value store (Redis protocol)")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./shelfdb-data")]
    data_dir: String,

    /// Index directory
    #[arg(short, long, default_value = "./shelfdb-index")]
    index_dir: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:9900")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Data file size in MB before rotation
    #[arg(long, default_value = "256")]
    datasize_mb: u64,

    /// Addressing mode of the default namespace (user, seq)
    #[arg(long, default_value = "user")]
    mode: String,

    /// Admin password required by AUTH (unset: every client is admin)
    #[arg(long)]
    admin: Option<String>,

    /// fsync after every write
    #[arg(long, conflicts_with = "synctime")]
    sync: bool,

    /// fsync at most every N seconds
    #[arg(long)]
    synctime: Option<u64>,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,shelfdb=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("shelfdb server v{}", shelfdb::VERSION);
    tracing::info!("Data directory: {}", args.data_dir);
    tracing::info!("Index directory: {}", args.index_dir);

    let mode = match KeyMode::parse(&args.mode) {
        Ok(mode) => mode,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    let sync_strategy = match (args.sync, args.synctime) {
        (true, _) => SyncStrategy::EveryWrite,
        (false, Some(seconds)) => SyncStrategy::Interval { seconds },
        (false, None) => SyncStrategy::OsManaged,
    };

    // Build config from args
    let mut builder = Config::builder()
        .data_dir(&args.data_dir)
        .index_dir(&args.index_dir)
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .datafile_max_size(args.datasize_mb * 1024 * 1024)
        .default_mode(mode)
        .sync_strategy(sync_strategy);
    if let Some(password) = args.admin {
        builder = builder.admin_password(password);
    }
    let config = builder.build();

    // Open engine
    let engine = match Engine::open(config.clone()) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    // Start server; STOP from an admin client ends the accept loop
    let server = match Server::bind(config, engine) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to bind: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
