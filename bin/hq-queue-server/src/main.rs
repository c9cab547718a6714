//! HHR Queue Server
//!
//! Store-and-forward relay between HHR-Pro instances and SServer:
//! outbound messages are queued and delivered to gateway databases,
//! inbound messages are relayed back to the HHR-Pro server of their subject.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `HQ_CONFIG` | - | TOML or JSON configuration file |
//! | `HQ_PORT` | `9000` | API port |
//! | `HQ_STORE_URI` | - | MongoDB connection string |
//! | `HQ_SERVER` | - | SServer base URL |
//! | `HQ_KEY` | - | Admin key |
//! | `HQ_APP_SCOPE_ID` | - | Application scope id sent to the gateway directory |
//! | `HQ_STORE` | `mongo` | Store backend: `mongo`, `memory` |
//! | `HQ_METRICS_PORT` | `9090` | Metrics/health port |
//! | `RUST_LOG` | `info` | Log level |

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hq_config::QueueConfig;
use hq_engine::{QueueService, Remotes, RetryScheduler, Stores};
use hq_store::{MemoryStore, MongoStores};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    Mongo,
    /// Non-persistent, for local runs
    Memory,
}

/// HHR Queue Server
#[derive(Parser, Debug)]
#[command(name = "hq-queue-server")]
#[command(about = "Store-and-forward relay between HHR-Pro and SServer")]
struct Args {
    /// Configuration file (.toml or .json)
    #[arg(long, env = "HQ_CONFIG")]
    config: Option<String>,

    /// API port
    #[arg(long, env = "HQ_PORT", default_value = "9000")]
    port: u16,

    #[arg(long, env = "HQ_STORE_URI")]
    store_uri: Option<String>,

    /// SServer base URL
    #[arg(long, env = "HQ_SERVER")]
    server: Option<String>,

    /// Admin key
    #[arg(long, env = "HQ_KEY")]
    key: Option<String>,

    #[arg(long, env = "HQ_APP_SCOPE_ID")]
    app_scope_id: Option<String>,

    #[arg(long, env = "HQ_STORE", value_enum, default_value = "mongo")]
    store: StoreKind,

    /// Metrics server port
    #[arg(long, env = "HQ_METRICS_PORT", default_value = "9090")]
    metrics_port: u16,
}

impl Args {
    /// File configuration with command line values on top
    fn queue_config(&self) -> Result<QueueConfig> {
        let mut config = match &self.config {
            Some(path) => QueueConfig::load(path).with_context(|| format!("loading {}", path))?,
            None => QueueConfig::new(
                self.store_uri.clone().unwrap_or_default(),
                self.server.clone().unwrap_or_default(),
                self.key.clone().unwrap_or_default(),
                self.app_scope_id.clone().unwrap_or_default(),
            ),
        };

        if let Some(uri) = &self.store_uri {
            config.store_uri = uri.clone();
        }
        if let Some(server) = &self.server {
            config.server = server.clone();
        }
        if let Some(key) = &self.key {
            config.key = key.clone();
        }
        if let Some(id) = &self.app_scope_id {
            config.app_scope_id = id.clone();
        }
        if self.store == StoreKind::Memory && config.store_uri.is_empty() {
            config.store_uri = "memory://".to_string();
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();
    let config = args.queue_config()?;

    info!(server = %config.server, store = ?args.store, "Starting HHR Queue Server");

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("installing metrics recorder")?;

    let stores = create_stores(args.store, &config).await?;
    let remotes = Remotes::http(&config)?;
    let service = Arc::new(QueueService::new(&config, stores, remotes));

    if let Err(e) = service.recover().await {
        warn!(error = %e, "Backlog recovery failed, the scheduler will retry");
    }
    let scheduler = RetryScheduler::start(service.clone(), config.retry_window());

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Metrics server
    let metrics_addr = SocketAddr::from(([0, 0, 0, 0], args.metrics_port));
    let metrics_app = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics_handler))
        .route("/health", axum::routing::get(health_handler))
        .with_state(metrics);

    let metrics_listener = TcpListener::bind(metrics_addr).await?;
    info!("Metrics server listening on http://{}/metrics", metrics_addr);
    let metrics_handle = {
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            axum::serve(metrics_listener, metrics_app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .ok();
        })
    };

    // API server
    let api_addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(api_addr).await?;
    info!("API server listening on http://{}", api_addr);

    axum::serve(listener, hq_api::create_router(service.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown signal received...");
    let _ = shutdown_tx.send(());

    let _ = tokio::time::timeout(Duration::from_secs(30), async {
        scheduler.shutdown().await;
        let _ = metrics_handle.await;
    })
    .await;

    info!("HHR Queue Server shutdown complete");
    Ok(())
}

async fn create_stores(kind: StoreKind, config: &QueueConfig) -> Result<Stores> {
    match kind {
        StoreKind::Mongo => {
            let mongo = MongoStores::connect(&config.store_uri, &config.database)
                .await
                .context("connecting to MongoDB")?;
            mongo.ensure_indexes().await?;
            info!(database = %config.database, "Using MongoDB store");
            Ok(Stores {
                messages: Arc::new(mongo.messages),
                statuses: Arc::new(mongo.statuses),
                publishers: Arc::new(mongo.publishers),
                received: Arc::new(mongo.received),
            })
        }
        StoreKind::Memory => {
            warn!("Using in-memory store, nothing survives a restart");
            let store = Arc::new(MemoryStore::new());
            Ok(Stores {
                messages: store.clone(),
                statuses: store.clone(),
                publishers: store.clone(),
                received: store,
            })
        }
    }
}

async fn metrics_handler(axum::extract::State(handle): axum::extract::State<PrometheusHandle>) -> String {
    handle.render()
}

async fn health_handler() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "UP",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
