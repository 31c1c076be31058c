//! gmp-ms library interface
//!
//! Measurement session orchestration and multi-channel correlation for the
//! gait monitoring platform. Exposes public APIs for integration testing.

pub mod api;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod query;
pub mod session;
pub mod timeline;
pub mod video;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use gmp_common::config::TomlConfig;
use gmp_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::db::SqliteMeasurementStore;
use crate::gateway::{DeviceGateway, MeasurementStore};
use crate::query::QueryEngine;
use crate::session::{SessionController, SessionRegistry, SessionSettings};
use crate::video::VideoCorrelator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting and the session recorder
    pub event_bus: EventBus,
    pub sessions: SessionController,
    pub correlator: Arc<VideoCorrelator>,
    pub query_engine: QueryEngine,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    /// Wire the core against the SQLite store and the given device gateway
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        device: Arc<dyn DeviceGateway>,
        registry: SessionRegistry,
        config: &TomlConfig,
    ) -> Self {
        let store: Arc<dyn MeasurementStore> = Arc::new(SqliteMeasurementStore::new(db.clone()));
        Self::with_store(db, event_bus, device, store, registry, config)
    }

    /// As [`AppState::new`] with an explicit measurement store
    pub fn with_store(
        db: SqlitePool,
        event_bus: EventBus,
        device: Arc<dyn DeviceGateway>,
        store: Arc<dyn MeasurementStore>,
        registry: SessionRegistry,
        config: &TomlConfig,
    ) -> Self {
        let sessions = SessionController::new(
            registry,
            device,
            store.clone(),
            event_bus.clone(),
            SessionSettings::from_config(config),
        );

        Self {
            db,
            event_bus,
            sessions,
            correlator: Arc::new(VideoCorrelator::new(store, &config.video)),
            query_engine: QueryEngine::new(config.paging.max_page_size),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Remember an error for `/health`
    pub async fn note_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::session_routes())
        .merge(api::timeline_routes())
        .merge(api::video_routes())
        .merge(api::patient_routes())
        .merge(api::note_routes())
        .merge(api::measurement_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        // Enable CORS for local UI access
        .layer(CorsLayer::permissive())
}
