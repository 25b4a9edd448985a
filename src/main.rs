//! Custody engine server.
//!
//! # Architecture Overview
//!
//! ```text
//!   REST / WebSocket clients, signer, MPC collaborator
//!            │
//!            ▼
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │ http (axum)  ── admin (bearer key)                           │
//!   │    │                                                         │
//!   │    ▼                                                         │
//!   │ engine ── transactions ── approvals ── policy ── pools       │
//!   │    │          │                                              │
//!   │    │          └── batches        cold_storage ── mpc         │
//!   │    ▼                                                         │
//!   │ execution (dispatcher, broadcaster)  blockchain (watcher)    │
//!   │                                                              │
//!   │ config (hot reload) · observability · lifecycle (shutdown)   │
//!   └──────────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use custody_engine::config::loader::load_config;
use custody_engine::config::watcher::{apply_updates, ConfigWatcher};
use custody_engine::config::schema::DEFAULT_ADMIN_KEY;
use custody_engine::config::EngineConfig;
use custody_engine::http::tls::load_tls_config;
use custody_engine::lifecycle::wait_for_signal;
use custody_engine::observability::{logging, metrics};
use custody_engine::{CustodyEngine, HttpServer, Shutdown};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "custody-engine")]
#[command(about = "Custody transaction approval and policy engine", long_about = None)]
struct Args {
    /// Path to the TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "custody-engine starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        tls = config.listener.tls.is_some(),
        blockchain = config.blockchain.enabled,
        admin = config.admin.enabled,
        "Configuration loaded"
    );

    if config.admin.enabled && config.admin.api_key == DEFAULT_ADMIN_KEY {
        tracing::warn!("Admin API is using the placeholder key; set admin.api_key");
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let engine = Arc::new(CustodyEngine::new(config.clone()));
    let shutdown = Arc::new(Shutdown::new());
    let mut background = engine.spawn_background(&shutdown).await;

    // the notify watcher stops when dropped
    let _config_watcher = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            background.push(tokio::spawn(apply_updates(
                updates,
                engine.settings().clone(),
                shutdown.subscribe(),
            )));
            match watcher.run() {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::error!(error = %e, "Config watcher unavailable; hot reload disabled");
                    None
                }
            }
        }
        None => None,
    };

    let signals = shutdown.clone();
    tokio::spawn(async move { wait_for_signal(&signals).await });

    let server = HttpServer::new(engine.clone(), &config);
    let served = match &config.listener.tls {
        Some(tls) => {
            let addr = config.listener.bind_address.parse()?;
            let rustls = load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
            server.run_tls(addr, rustls, shutdown.subscribe(), DRAIN_TIMEOUT).await
        }
        None => {
            let listener = TcpListener::bind(&config.listener.bind_address).await?;
            server.run(listener, shutdown.subscribe()).await
        }
    };

    shutdown.trigger();
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        for task in background {
            let _ = task.await;
        }
    })
    .await;
    if drained.is_err() {
        tracing::warn!("Background tasks did not stop before the drain timeout");
    }

    served?;
    tracing::info!("Shutdown complete");
    Ok(())
}
