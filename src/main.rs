use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shieldd::api::metrics::init_metrics;
use shieldd::api::rate_limit::spawn_cleanup_task;
use shieldd::config::Config;
use shieldd::db::ensure_system_user;
use shieldd::engine::spawn_sweeper_task;
use shieldd::AppState;

#[derive(Parser, Debug)]
#[command(name = "shieldd")]
#[command(author, version, about = "Disposable secure browsing backend", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "shieldd.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting shieldd v{}", env!("CARGO_PKG_VERSION"));

    // Initialize storage; a disabled database runs in degraded mode
    let store = shieldd::db::init(&config.database).await?;
    if let Ok(pool) = store.pool() {
        ensure_system_user(pool)
            .await
            .context("Failed to create the admin token account")?;
    }

    let completion = shieldd::llm::from_config(&config.llm)?;

    let mut state = AppState::new(config.clone(), store.clone(), completion);
    match init_metrics() {
        Ok(handle) => state = state.with_metrics(handle),
        Err(e) => tracing::warn!(error = %e, "Metrics disabled"),
    }
    let state = Arc::new(state);

    // Background tasks
    spawn_cleanup_task(state.rate_limiter.clone(), config.rate_limit.cleanup_interval);
    spawn_sweeper_task(store, config.sessions.clone());

    let app = shieldd::api::create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("API server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
