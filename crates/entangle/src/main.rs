//! Headless entangle node
//!
//! Opens the stores, binds the peer listener, dials the share peers, and
//! serves until interrupted. An editor shell embeds [`entangle::Engine`]
//! directly instead of running this binary.

use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use entangle::{Engine, PeerConfig, RedbStore, TcpTransport};

// exit codes: 1 missing configuration, 2 listen failure, 3 store failure
const EXIT_CONFIG: i32 = 1;
const EXIT_LISTEN: i32 = 2;
const EXIT_STORE: i32 = 3;

#[derive(Debug, Parser)]
#[command(name = "entangle", about = "Peer-to-peer replicated text editor node")]
struct Args {
    /// Peer configuration file (one `ip:port S|N` per line, local first)
    config: PathBuf,

    /// Document to open
    file: Option<PathBuf>,

    /// Directory for the per-peer databases
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = match PeerConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %args.config.display(), error = %e, "Cannot load peer configuration");
            exit(EXIT_CONFIG);
        }
    };

    let store = match RedbStore::open(&args.data_dir, config.local_site()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(dir = %args.data_dir.display(), error = %e, "Cannot open stores");
            exit(EXIT_STORE);
        }
    };

    let listener = match TcpTransport::bind(config.local_peer()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %config.local_peer(), error = %e, "Cannot listen for peers");
            exit(EXIT_LISTEN);
        }
    };

    let transport = Arc::new(TcpTransport::new(config.local_peer().clone()));
    let engine = Engine::new(config.clone(), store, transport);
    TcpTransport::serve(listener, engine.service());

    if let Err(e) = engine.open_document(args.file.as_deref()).await {
        error!(error = %e, "Cannot open document");
        exit(EXIT_STORE);
    }

    for entry in config.share_peers() {
        if let Err(e) = engine.connect(&entry.peer).await {
            // the peer may simply not be up yet; its own dial will pair us
            warn!(peer = %entry.peer, error = %e, "Initial connect failed");
        }
    }

    info!(
        local = %config.local_peer(),
        site = %config.local_site(),
        offline = engine.is_offline(),
        "Entangle node running"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Signal handler failed");
    }

    engine.shutdown().await;
}
