//! apm-session library interface
//!
//! Orchestrates a two-modality assessment session: EEG first, then GSR/SpO2,
//! then a fused report that is persisted in the background.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult};

use anyhow::Context;
use apm_common::events::EventBus;
use axum::Router;
use chrono::{DateTime, Utc};
use config::SessionConfig;
use models::StepPlan;
use services::{
    resolve_endpoint, HttpClassifierClient, HttpProbe, HttpReportStore, ResolvedEndpoint,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use workflow::{spawn_session, SessionDeps, SessionHandle, StateMachine};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Handle to the running session driver
    pub session: SessionHandle,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Service base chosen at startup
    pub endpoint: ResolvedEndpoint,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(session: SessionHandle, event_bus: EventBus, endpoint: ResolvedEndpoint) -> Self {
        Self {
            session,
            event_bus,
            endpoint,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::session_routes())
        .route("/events", get(api::event_stream))
        .merge(api::health_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        // Presentation may be served from another origin
        .layer(CorsLayer::permissive())
}

/// Resolve the service endpoint and start the session driver
///
/// Endpoint resolution happens exactly once, here.
pub async fn bootstrap(
    config: &SessionConfig,
    event_bus: EventBus,
) -> anyhow::Result<(AppState, JoinHandle<()>)> {
    let probe = HttpProbe::new(config.probe_timeout).context("Failed to build probe client")?;
    let endpoint = resolve_endpoint(&config.classifier_candidates, &probe)
        .await
        .context("Failed to resolve service endpoint")?;

    let store_url = config
        .store_url
        .clone()
        .unwrap_or_else(|| endpoint.base_url.clone());
    info!(
        classifier = %endpoint.base_url,
        store = %store_url,
        live = endpoint.live,
        "Service endpoints selected"
    );

    let classifier = HttpClassifierClient::new(endpoint.base_url.clone(), config.classify_timeout)
        .context("Failed to build classifier client")?;
    let store = HttpReportStore::new(store_url).context("Failed to build report store client")?;

    let deps = SessionDeps {
        classifier: Arc::new(classifier),
        store: Arc::new(store),
        save_timeout: config.save_timeout,
    };
    let machine = StateMachine::new(StepPlan::new(config.timing), config.fusion);
    let (session, join) = spawn_session(machine, deps, event_bus.clone(), config.doctor_id.clone());

    Ok((AppState::new(session, event_bus, endpoint), join))
}
