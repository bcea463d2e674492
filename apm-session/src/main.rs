//! apm-session - assessment session service
//!
//! Resolves the classifier service once, runs one assessment session and
//! exposes it over HTTP + SSE.

use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use apm_common::config::{default_config_path, load_or_default, write_toml_config, TomlConfig};
use apm_common::events::EventBus;
use apm_session::config::{ConfigOverrides, SessionConfig};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const MODULE_NAME: &str = "apm-session";

/// Command-line arguments for apm-session
#[derive(Parser, Debug)]
#[command(name = "apm-session")]
#[command(about = "Two-modality assessment session service")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "APM_PORT")]
    port: Option<u16>,

    /// Classifier base URLs, tried in order before the default
    #[arg(long = "classifier-url", env = "APM_CLASSIFIER_URLS", value_delimiter = ',')]
    classifier_urls: Vec<String>,

    /// Report store base URL (defaults to the resolved classifier URL)
    #[arg(long, env = "APM_STORE_URL")]
    store_url: Option<String>,

    /// Doctor identity attached to saved reports
    #[arg(long, env = "APM_DOCTOR_ID")]
    doctor_id: Option<String>,

    /// Log level filter (overrides the config file; RUST_LOG wins over both)
    #[arg(long)]
    log_level: Option<String>,

    /// Config file (default: <config dir>/apm/apm-session.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write a config file with default values and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.init_config {
        return init_config(args.config);
    }

    let toml_config = load_or_default(args.config.as_deref(), MODULE_NAME)
        .context("Failed to load configuration")?;
    let config = SessionConfig::resolve(
        ConfigOverrides {
            port: args.port,
            classifier_urls: args.classifier_urls,
            store_url: args.store_url,
            doctor_id: args.doctor_id,
            log_level: args.log_level,
        },
        &toml_config,
    )
    .context("Invalid configuration")?;

    init_tracing(&config)?;

    info!("Starting {} v{}", MODULE_NAME, env!("CARGO_PKG_VERSION"));
    info!(candidates = ?config.classifier_candidates, "Resolving classifier service");

    let event_bus = EventBus::new(100);
    let (state, driver) = apm_session::bootstrap(&config, event_bus)
        .await
        .context("Failed to start session")?;
    let session = state.session.clone();

    let app = apm_session::build_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    session.shutdown();
    if let Err(e) = driver.await {
        error!(error = %e, "Session driver task failed");
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Tracing to stderr, or to the configured log file
fn init_tracing(config: &SessionConfig) -> Result<()> {
    let default_filter = format!(
        "apm_session={level},apm_common={level},tower_http=info",
        level = config.log_level
    );
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
    Ok(())
}

/// Write the default config and exit
fn init_config(explicit: Option<PathBuf>) -> Result<()> {
    let path = explicit
        .or_else(|| default_config_path(MODULE_NAME))
        .context("No config directory available; pass --config")?;
    if path.exists() {
        anyhow::bail!("Config file already exists: {}", path.display());
    }
    write_toml_config(&TomlConfig::default(), &path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
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
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
