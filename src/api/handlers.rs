//! HTTP API handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tracing::{error, warn};
use utoipa::ToSchema;

use crate::error::SheetsError;
use crate::metrics;
use crate::sheets::{CellMatrix, RangeReader};

/// Body returned for any failed data request.
pub const GENERIC_ERROR_MESSAGE: &str = "failed to load sheet data";

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Reader shared by every request.
    pub reader: Arc<dyn RangeReader>,
    /// Range served by `/api/data`.
    pub data_range: Arc<str>,
    /// Whether startup has completed.
    pub ready: Arc<AtomicBool>,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new app state.
    pub fn new(reader: Arc<dyn RangeReader>, data_range: impl Into<Arc<str>>) -> Self {
        Self {
            reader,
            data_range: data_range.into(),
            ready: Arc::new(AtomicBool::new(false)),
            metrics: None,
        }
    }

    /// Attach a Prometheus handle for `/metrics`.
    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics = handle;
        self
    }

    /// Set ready state.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("data_range", &self.data_range)
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Whether service is ready.
    pub ready: bool,
}

/// Data endpoint response.
#[derive(Debug, Serialize, ToSchema)]
pub struct DataResponse {
    /// Cells from the configured range.
    pub students: CellMatrix,
}

/// Error body for failed requests.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Generic error description.
    pub error: &'static str,
}

/// Per-request failure. Renders as a 500 with a body that never carries
/// upstream text.
#[derive(Debug)]
pub struct ApiError(SheetsError);

impl From<SheetsError> for ApiError {
    fn from(err: SheetsError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.0.is_auth_failure() {
            error!(kind = self.0.kind(), "Data request failed: {}", self.0);
        } else {
            warn!(kind = self.0.kind(), "Data request failed: {}", self.0);
        }
        metrics::inc_api_request(StatusCode::INTERNAL_SERVER_ERROR.as_u16());

        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: GENERIC_ERROR_MESSAGE,
            }),
        )
            .into_response()
    }
}

/// Health check handler - always returns 200.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Operations",
    responses((status = 200, description = "Process is up", body = HealthResponse))
)]
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 if ready, 503 otherwise.
#[utoipa::path(
    get,
    path = "/ready",
    tag = "Operations",
    responses(
        (status = 200, description = "Credentials loaded", body = ReadyResponse),
        (status = 503, description = "Still starting", body = ReadyResponse)
    )
)]
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let is_ready = state.is_ready();
    let response = ReadyResponse { ready: is_ready };

    if is_ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Data handler - reads the configured range.
#[utoipa::path(
    get,
    path = "/api/data",
    tag = "Data",
    responses(
        (status = 200, description = "Cells from the configured range", body = DataResponse),
        (status = 500, description = "The range could not be read", body = ErrorBody)
    )
)]
pub async fn data(State(state): State<AppState>) -> Result<Json<DataResponse>, ApiError> {
    let students = state.reader.fetch_range(&state.data_range).await?;
    metrics::inc_api_request(StatusCode::OK.as_u16());
    Ok(Json(DataResponse { students }))
}

/// Metrics handler - Prometheus text exposition.
pub async fn prometheus(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
