//! gmp-ms (Measurement Session) - gait measurement orchestration service
//!
//! Drives the remote sensor controller, aligns the captured channels into a
//! chartable timeline, pages the patient roster and notes, and correlates
//! timeline points with recorded video.

use anyhow::{Context, Result};
use clap::Parser;
use gmp_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig};
use gmp_common::events::EventBus;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

use gmp_ms::db::{self, sessions};
use gmp_ms::gateway::HttpDeviceGateway;
use gmp_ms::session::{recorder::spawn_session_recorder, SessionRegistry};
use gmp_ms::{build_router, AppState};

const MODULE_NAME: &str = "gmp-ms";
const EVENT_BUS_CAPACITY: usize = 256;

#[derive(Debug, Parser)]
#[command(name = "gmp-ms", version, about = "Gait measurement session service")]
struct Args {
    /// Root folder holding gmp.db
    #[arg(long, env = "GMP_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Listen address, overrides `[server] bind`
    #[arg(long)]
    bind: Option<String>,
}

fn init_tracing(config: &TomlConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = TomlConfig::load_or_default(MODULE_NAME);

    init_tracing(&config)?;

    // Identity first, before any disk or network work
    info!(
        "Starting GMP Measurement Session ({}) v{}",
        MODULE_NAME,
        env!("CARGO_PKG_VERSION")
    );

    let root_folder = RootFolderResolver::new(MODULE_NAME)
        .with_cli_override(args.root_folder)
        .resolve();
    info!("Root folder: {}", root_folder.display());

    let initializer = RootFolderInitializer::new(root_folder);
    initializer.ensure_directory_exists()?;

    let db_path = initializer.database_path();
    info!("Database path: {}", db_path.display());

    let pool = db::init_database_pool(&db_path)
        .await
        .context("Database initialization failed")?;

    let interrupted = sessions::recover_interrupted(&pool).await?;
    if interrupted > 0 {
        warn!(interrupted, "Marked in-flight sessions from previous run as ERROR");
    }
    let registry = SessionRegistry::with_sequences(sessions::latest_sequences(&pool).await?);

    let device = HttpDeviceGateway::new(
        &config.device.base_url,
        Duration::from_millis(config.device.command_timeout_ms),
    )?;
    info!("Sensor controller: {}", config.device.base_url);

    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
    let _recorder = spawn_session_recorder(pool.clone(), &event_bus);

    let state = AppState::new(pool, event_bus, Arc::new(device), registry, &config);
    let app = build_router(state);

    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Bind {} failed", bind))?;
    info!("gmp-ms listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app).await?;

    Ok(())
}
