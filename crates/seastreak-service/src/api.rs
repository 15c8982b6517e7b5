//! REST API endpoints for the seastreak-service.
//!
//! # Endpoints
//!
//! - `GET /api/health` - Liveness check (no auth required)
//! - `GET /api/status` - Scheduler and run status
//! - `POST /api/runs` - Run the daily check now
//! - `GET /api/runs/last` - Summary of the last completed run
//! - `GET /api/devices` - Known devices
//! - `GET /api/devices/{id}/statistics` - Streak statistics for one device
//! - `GET /api/devices/{id}/telemetry` - Stored uploads for one device, paginated
//! - `GET /api/statistics` - Streak statistics for every device
//! - `POST /api/telemetry` - Ingest a batch of telemetry uploads
//!
//! ## Error Handling
//!
//! Endpoints return structured JSON errors via [`AppError`]. Store errors
//! return HTTP 500. A run that cannot list devices returns 500 with the
//! failure in `details`; a run requested while another is executing
//! returns 409.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use seastreak_core::RunSummary;
use seastreak_store::{StoredDevice, StoredStatistics, StoredTelemetry, TelemetryQuery};
use seastreak_types::TelemetryRecord;

use crate::middleware::api_key_auth;
use crate::runner::{RunError, execute_run_now};
use crate::state::AppState;

/// Largest telemetry batch accepted in one request.
pub const MAX_TELEMETRY_BATCH: usize = 10_000;

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(get_status))
        .route("/api/runs", post(trigger_run))
        .route("/api/runs/last", get(get_last_run))
        .route("/api/devices", get(list_devices))
        .route("/api/devices/{id}/statistics", get(get_device_statistics))
        .route("/api/devices/{id}/telemetry", get(get_device_telemetry))
        .route("/api/statistics", get(list_statistics))
        .route("/api/telemetry", post(ingest_telemetry))
}

/// Build the full application: routes, authentication, tracing and CORS.
pub fn app(state: Arc<AppState>) -> Router {
    let security = Arc::new(state.config.security.clone());

    router()
        .layer(from_fn_with_state(security, api_key_auth))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"`.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
    /// Server time.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// Service status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// The daily scheduler task is alive.
    pub scheduler_running: bool,
    /// Next scheduled run, if the scheduler is running.
    #[serde(with = "time::serde::rfc3339::option")]
    pub next_run_at: Option<OffsetDateTime>,
    /// A run is executing right now.
    pub run_in_progress: bool,
    /// When the last completed run finished.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_run_finished_at: Option<OffsetDateTime>,
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let last_run_finished_at = state
        .runs
        .last
        .read()
        .await
        .as_ref()
        .and_then(|s| s.finished_at);

    Json(StatusResponse {
        scheduler_running: state.scheduler.is_running(),
        next_run_at: state.scheduler.next_run_at(),
        run_in_progress: state.runs.in_progress(),
        last_run_finished_at,
    })
}

/// Successful run response.
#[derive(Debug, Serialize)]
pub struct RunResponse {
    /// Always `true`; failures use the error body.
    pub success: bool,
    /// Human-readable outcome.
    pub message: &'static str,
    /// When the response was produced.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// The run summary.
    pub results: RunSummary,
}

/// Run the daily check now and return its summary.
async fn trigger_run(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    match execute_run_now(&state).await {
        Ok(results) => Ok(Json(RunResponse {
            success: true,
            message: "Daily at-sea check completed",
            timestamp: OffsetDateTime::now_utc(),
            results,
        })
        .into_response()),
        Err(RunError::AlreadyRunning) => Err(AppError::Conflict(
            "A run is already in progress".to_string(),
        )),
        Err(RunError::Failed(e)) => {
            error!("Triggered run failed: {}", e);
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "success": false,
                    "error": "Internal server error",
                    "details": e.to_string(),
                })),
            )
                .into_response())
        }
    }
}

async fn get_last_run(State(state): State<Arc<AppState>>) -> Result<Json<RunSummary>, AppError> {
    state
        .runs
        .last
        .read()
        .await
        .clone()
        .map(Json)
        .ok_or_else(|| AppError::NotFound("No run has completed yet".to_string()))
}

async fn list_devices(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<StoredDevice>>, AppError> {
    let store = state.store.lock().await;
    Ok(Json(store.list_devices()?))
}

async fn get_device_statistics(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StoredStatistics>, AppError> {
    let store = state.store.lock().await;
    store
        .get_statistics(&id)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No statistics for device {}", id)))
}

/// Query parameters for telemetry listing.
#[derive(Debug, Default, Deserialize)]
pub struct TelemetryParams {
    /// Unix timestamp; only uploads at or after it.
    pub since: Option<i64>,
    /// Unix timestamp; only uploads at or before it.
    pub until: Option<i64>,
    /// Page size.
    pub limit: Option<u32>,
    /// Uploads skipped before the page.
    pub offset: Option<u32>,
}

impl TelemetryParams {
    fn to_query(&self, device_uid: &str) -> Result<TelemetryQuery, AppError> {
        let since = self.since.map(timestamp_param).transpose()?;
        let until = self.until.map(timestamp_param).transpose()?;
        if let (Some(since), Some(until)) = (since, until)
            && since > until
        {
            return Err(AppError::BadRequest(format!(
                "Invalid time range: 'since' ({}) is after 'until' ({})",
                since, until
            )));
        }

        let mut query = TelemetryQuery::new().device(device_uid);
        if let Some(since) = since {
            query = query.since(since);
        }
        if let Some(until) = until {
            query = query.until(until);
        }
        // One extra row tells whether another page exists.
        if let Some(limit) = self.limit {
            query = query.limit(limit.saturating_add(1));
        }
        if let Some(offset) = self.offset {
            query = query.offset(offset);
        }
        Ok(query)
    }
}

fn timestamp_param(ts: i64) -> Result<OffsetDateTime, AppError> {
    OffsetDateTime::from_unix_timestamp(ts)
        .map_err(|_| AppError::BadRequest(format!("Invalid unix timestamp: {}", ts)))
}

/// One page of a device's uploads, newest first.
#[derive(Debug, Serialize)]
pub struct TelemetryPage {
    /// Device the uploads belong to.
    pub device_uid: String,
    /// Uploads stored for the device, ignoring filters.
    pub total: u64,
    /// Offset of the first upload in this page.
    pub offset: u32,
    /// Page size requested, if any.
    pub limit: Option<u32>,
    /// Another page follows this one.
    pub has_more: bool,
    /// The uploads.
    pub data: Vec<StoredTelemetry>,
}

async fn get_device_telemetry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<TelemetryParams>,
) -> Result<Json<TelemetryPage>, AppError> {
    let query = params.to_query(&id)?;

    let store = state.store.lock().await;
    if store.get_device(&id)?.is_none() {
        return Err(AppError::NotFound(format!("Device not found: {}", id)));
    }

    let mut data = store.query_telemetry(&query)?;
    let has_more = params.limit.is_some_and(|l| data.len() > l as usize);
    if has_more {
        data.pop();
    }

    Ok(Json(TelemetryPage {
        total: store.count_telemetry(Some(&id))?,
        device_uid: id,
        offset: params.offset.unwrap_or(0),
        limit: params.limit,
        has_more,
        data,
    }))
}

async fn list_statistics(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<StoredStatistics>>, AppError> {
    let store = state.store.lock().await;
    Ok(Json(store.list_statistics()?))
}

/// Telemetry ingest response.
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    /// Uploads in the request.
    pub received: usize,
    /// Uploads that were new.
    pub inserted: usize,
}

/// Store a batch of uploads; duplicates by device and timestamp are ignored.
async fn ingest_telemetry(
    State(state): State<Arc<AppState>>,
    Json(records): Json<Vec<TelemetryRecord>>,
) -> Result<(StatusCode, Json<IngestResponse>), AppError> {
    if records.len() > MAX_TELEMETRY_BATCH {
        return Err(AppError::BadRequest(format!(
            "batch of {} uploads exceeds the limit of {}",
            records.len(),
            MAX_TELEMETRY_BATCH
        )));
    }
    if let Some(i) = records.iter().position(|r| r.device_uid.trim().is_empty()) {
        return Err(AppError::BadRequest(format!(
            "upload {} has an empty device_uid",
            i
        )));
    }

    let store = state.store.lock().await;
    let inserted = store.insert_telemetry(&records)?;

    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            received: records.len(),
            inserted,
        }),
    ))
}

/// API errors.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Store(seastreak_store::Error),
}

impl From<seastreak_store::Error> for AppError {
    fn from(e: seastreak_store::Error) -> Self {
        AppError::Store(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
