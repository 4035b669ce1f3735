use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    address::{normalize, Address},
    engine::{DiscoveryEngine, NextStep},
    error::DiscoveryError,
    netdetect::SubnetPrefix,
    probe::Probe,
    types::{BackendInfo, DiscoveredBackend, ScanProgress},
};

pub struct AppState<P: Probe> {
    engine: Arc<DiscoveryEngine<P>>,
}

impl<P: Probe> Clone for AppState<P> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Status {
    pub completed: usize,
    pub total: usize,
    pub state: String, // "idle" | "running"
}

impl From<ScanProgress> for Status {
    fn from(p: ScanProgress) -> Self {
        let state = if p.is_running() { "running" } else { "idle" };
        Self {
            completed: p.completed,
            total: p.total,
            state: state.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub prefix: String,
}

#[derive(Debug, Deserialize)]
pub struct AddRequest {
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    pub address: String,
    pub name: String,
    #[serde(default)]
    pub initialized: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SelectResponse {
    pub next: NextStep,
}

/// Routes under `/api` driving `engine`.
pub fn router<P: Probe>(engine: Arc<DiscoveryEngine<P>>) -> Router {
    let state = AppState { engine };
    let api = Router::new()
        .route("/status", get(get_status::<P>))
        .route("/results", get(get_results::<P>))
        .route("/discover", post(post_discover::<P>))
        .route("/scan", post(post_scan::<P>))
        .route("/candidates", get(get_candidates::<P>).post(post_candidate::<P>))
        .route("/select", post(post_select::<P>))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

/// Serve the API on `bind` until `shutdown` is cancelled.
pub async fn spawn_server<P: Probe>(
    bind: &str,
    engine: Arc<DiscoveryEngine<P>>,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = router(engine);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "serving discovery API");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

async fn get_status<P: Probe>(State(app): State<AppState<P>>) -> impl IntoResponse {
    (StatusCode::OK, Json(Status::from(app.engine.progress())))
}

async fn get_results<P: Probe>(State(app): State<AppState<P>>) -> Json<Vec<DiscoveredBackend>> {
    Json(app.engine.results().await)
}

async fn post_discover<P: Probe>(State(app): State<AppState<P>>) -> Json<Vec<DiscoveredBackend>> {
    Json(app.engine.quick_discover().await)
}

async fn post_scan<P: Probe>(
    State(app): State<AppState<P>>,
    Json(req): Json<ScanRequest>,
) -> impl IntoResponse {
    let prefix: SubnetPrefix = match req.prefix.trim().parse() {
        Ok(p) => p,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    // Overlapping sweeps are not rejected; they share the progress counters.
    let engine = app.engine.clone();
    tokio::spawn(async move {
        engine.scan_prefix(prefix).await;
    });

    let started = ScanProgress {
        completed: 0,
        total: prefix.sweep_targets().len(),
    };
    (StatusCode::ACCEPTED, Json(Status::from(started))).into_response()
}

async fn get_candidates<P: Probe>(State(app): State<AppState<P>>) -> Json<Vec<Address>> {
    Json(app.engine.candidates().list())
}

async fn post_candidate<P: Probe>(
    State(app): State<AppState<P>>,
    Json(req): Json<AddRequest>,
) -> impl IntoResponse {
    match app.engine.add_manual(&req.address).await {
        Ok(Some(info)) => (StatusCode::OK, Json(info)).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "no backend answered").into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

async fn post_select<P: Probe>(
    State(app): State<AppState<P>>,
    Json(req): Json<SelectRequest>,
) -> impl IntoResponse {
    let Some(address) = normalize(&req.address) else {
        let err = DiscoveryError::InvalidAddress(req.address.trim().to_string());
        return (StatusCode::BAD_REQUEST, err.to_string()).into_response();
    };
    let info = BackendInfo {
        address,
        display_name: req.name,
        initialized: req.initialized,
    };
    match app.engine.select_backend(&info) {
        Ok(next) => (StatusCode::OK, Json(SelectResponse { next })).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
