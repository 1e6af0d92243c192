// Tabula server: dynamic table definition and ad-hoc queries over PostgreSQL

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tabula_core::config::LoggingConfig;
use tabula_core::TabulaConfig;
use tabula_server::{create_router, ApiState};
use tabula_storage::PgConnection;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Tabula HTTP server
#[derive(Parser, Debug)]
#[command(name = "tabula-server", version, about = "Dynamic table definition and ad-hoc query server")]
struct Args {
    /// Configuration file (JSON, TOML or YAML)
    #[arg(short = 'c', long, value_name = "FILE", env = "TABULA_CONFIG")]
    config: Option<PathBuf>,

    /// Host address to bind to
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// PostgreSQL connection URL
    #[arg(long, value_name = "URL")]
    database_url: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    init_logging(&config.logging);
    info!(
        host = %config.server.host,
        port = config.server.port,
        match_mode = ?config.query.match_mode,
        "Starting Tabula"
    );

    run_server(config).await
}

/// File, then `TABULA_*` environment, then command-line flags.
fn load_config(args: &Args) -> Result<TabulaConfig> {
    let mut config = match &args.config {
        Some(path) => TabulaConfig::from_file(&path.to_string_lossy())
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => TabulaConfig::default(),
    };
    config.apply_env();

    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(url) = &args.database_url {
        config.database.url = url.clone();
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.log_json {
        config.logging.json = true;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn init_logging(logging: &LoggingConfig) {
    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            EnvFilter::try_new(format!(
                "tabula_server={level},tabula_query={level},tabula_storage={level},tower_http={level}",
                level = logging.level
            ))
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .init();
    }
}

async fn run_server(config: TabulaConfig) -> Result<()> {
    let connection = Arc::new(
        PgConnection::connect(&config.database)
            .await
            .context("failed to connect to database")?,
    );

    let state = ApiState::new(connection.clone(), &config.query);
    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await
        .context("HTTP server failed")?;

    connection.close().await;
    info!("Shutdown complete");
    Ok(())
}

/// Wait for shutdown signal
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received");
}
