//! partid-ident - component identification service
//!
//! Serves capture, identification and history over HTTP + SSE.
//!
//! Startup order:
//! 1. Load TOML bootstrap config, install logging
//! 2. Resolve root folder, open the database
//! 3. Resolve the recognition API key
//! 4. Build ledger, recognizer, camera and orchestrator
//! 5. Serve until Ctrl+C / SIGTERM

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use partid_common::config::{self, TomlConfig};
use partid_common::events::EventBus;
use tokio::signal;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use partid_ident::capture::{CameraDevice, HttpSnapshotCamera, NoCamera};
use partid_ident::ledger::{HistoryLedger, SqliteLedgerStore};
use partid_ident::recognition::GeminiRecognizer;
use partid_ident::{AppState, Orchestrator};

/// Command-line arguments for partid-ident
#[derive(Parser, Debug)]
#[command(name = "partid-ident")]
#[command(about = "Electronic component identification service")]
#[command(version)]
struct Args {
    /// Bootstrap TOML config file
    #[arg(short, long, env = "PARTID_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory (overrides env and config)
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long, env = "PARTID_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let toml_config = config::load_toml_config(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    let _log_guard = init_tracing(&toml_config);

    info!(
        "Starting partid-ident v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Config: {}", config_path.display());

    let root_folder = config::resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    let db_path = config::database_path(&root_folder);
    info!("Root folder: {}", root_folder.display());
    info!("Database: {}", db_path.display());

    let pool = partid_common::db::init_database(&db_path)
        .await
        .context("Failed to open database")?;

    let api_key = config::resolve_recognition_api_key(&toml_config)
        .context("Recognition API key is required")?;

    let event_bus = EventBus::new(100);
    let store = SqliteLedgerStore::new(pool, event_bus)
        .await
        .context("Failed to prepare history store")?;
    let ledger = Arc::new(HistoryLedger::new(Arc::new(store)));

    let recognizer = GeminiRecognizer::new(&toml_config.recognition, api_key)
        .context("Failed to create recognition client")?;
    info!("Recognition model: {}", recognizer.model());

    let camera = build_camera(&toml_config);
    info!("Camera device: {}", camera.name());

    let orchestrator = Arc::new(Orchestrator::new(Arc::new(recognizer), ledger, camera));
    let app = partid_ident::build_router(AppState::new(orchestrator.clone()));

    let port = args
        .port
        .or(toml_config.port)
        .unwrap_or(config::DEFAULT_PORT);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    orchestrator.sign_out().await;
    info!("Server shutdown complete");
    Ok(())
}

/// RUST_LOG wins; otherwise the configured level applies to our crates
///
/// With `[logging] file` set, logs are also written there; the returned
/// guard flushes the file writer and must live until exit.
fn init_tracing(toml_config: &TomlConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &toml_config.logging.level;
        EnvFilter::new(format!(
            "partid_ident={level},partid_common={level},tower_http=info,warn"
        ))
    });

    let (file_layer, guard) = match &toml_config.logging.file {
        Some(path) => {
            let directory = path.parent().unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "partid-ident.log".into());
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false),
                ),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}

fn build_camera(toml_config: &TomlConfig) -> Arc<dyn CameraDevice> {
    match toml_config.camera.snapshot_url.as_deref() {
        Some(url) => match HttpSnapshotCamera::new(url) {
            Ok(camera) => Arc::new(camera),
            Err(e) => {
                error!("Camera unavailable, falling back to uploads only: {}", e);
                Arc::new(NoCamera)
            }
        },
        None => Arc::new(NoCamera),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
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
