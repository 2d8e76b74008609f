//! # Dirwatch Server
//!
//! Runs the census engine under supervision and exposes it over HTTP:
//!
//! - scan results are persisted to PostgreSQL, one row per cycle
//! - the worker can be started, stopped, and hot-reconfigured via the
//!   `/dirwatcher` API
//! - crash recovery and readiness gating live in `dirwatch-core`

mod db;
mod handlers;
mod routes;
mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use dirwatch_core::{MonitorConfig, Supervisor};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::state::AppState;

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "dirwatch-server")]
#[command(about = "Directory census daemon with an HTTP control surface")]
struct Cli {
    /// PostgreSQL connection URL
    #[arg(
        long,
        env = "DIRWATCH_DATABASE_URL",
        default_value = "postgres://postgres@localhost:5432/dir_watcher"
    )]
    database_url: String,

    /// Table scan results are stored in
    #[arg(long, env = "DIRWATCH_DB_TABLE", default_value = "watcher")]
    database_table: String,

    /// Delay between database reconnection attempts (ms)
    #[arg(long, env = "DIRWATCH_DB_RECONNECT_MS", default_value_t = 30_000)]
    database_reconnect_ms: u64,

    /// Port the control API listens on
    #[arg(short, long, env = "DIRWATCH_PORT", default_value_t = 8080)]
    port: u16,

    /// Interface the control API binds to
    #[arg(long, env = "DIRWATCH_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Polling interval between monitoring cycles (ms)
    #[arg(long, env = "DIRWATCH_POLL_MS", default_value_t = 300_000)]
    poll_ms: u64,

    /// Magic word counted in file contents
    #[arg(long, env = "DIRWATCH_MAGIC_WORD", default_value = "hello")]
    magic_word: String,

    /// Directory tree to monitor
    #[arg(long, env = "DIRWATCH_DIRECTORY", default_value = "./")]
    directory: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dirwatch_core=debug,dirwatch_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let pool = db::connect_with_retry(
        &cli.database_url,
        Duration::from_millis(cli.database_reconnect_ms),
    )
    .await;
    let store = Arc::new(db::PostgresResultStore::new(pool, &cli.database_table)?);
    store.ensure_table().await?;

    let config = MonitorConfig {
        root_directory: cli.directory,
        search_token: cli.magic_word,
        poll_interval_ms: cli.poll_ms,
        ..MonitorConfig::default()
    };
    info!(
        "monitoring {} for {:?} every {}ms",
        config.root_directory.display(),
        config.search_token,
        config.poll_interval_ms
    );

    let supervisor = Supervisor::new(config, store.clone());
    supervisor.start().await;

    let app = routes::router(AppState {
        supervisor: supervisor.clone(),
        store,
    });

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("dirwatch control surface listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(supervisor))
        .await
        .context("server error")?;

    Ok(())
}

/// Resolve on ctrl-c or SIGTERM, stopping the worker before the server
/// drains.
async fn shutdown_signal(supervisor: Arc<Supervisor>) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!("failed to listen for SIGTERM: {err}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, stopping census worker");
    supervisor.shutdown().await;
}
