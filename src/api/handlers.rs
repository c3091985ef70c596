//! Route handlers.

use crate::api::response::{ApiError, ApiSuccess};
use crate::api::AppState;
use crate::error::ScanError;
use crate::models::{ScanReport, ScanRequest};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Json;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

type ApiResult<T> = Result<Json<ApiSuccess<T>>, ApiError>;

/// An id that is not a UUID can never have been stored.
fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError(ScanError::NotFound(Uuid::nil())))
}

/// POST /api/scan - run a scan and return the stored report
pub async fn create_scan(
    State(state): State<AppState>,
    body: Result<Json<ScanRequest>, JsonRejection>,
) -> ApiResult<ScanReport> {
    let Json(request) = body.map_err(|e| ApiError(ScanError::Validation(e.body_text())))?;
    info!(url = %request.url, "Scan requested");

    let report = state.orchestrator.run_scan(&request).await?;
    Ok(ApiSuccess::data(report))
}

/// GET /api/results - scan history, most recent first
pub async fn list_results(State(state): State<AppState>) -> ApiResult<Vec<ScanReport>> {
    Ok(ApiSuccess::data(state.store.list().await))
}

/// GET /api/results/{id}
pub async fn get_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ScanReport> {
    let id = parse_id(&id)?;
    Ok(ApiSuccess::data(state.store.get(id).await?))
}

/// DELETE /api/results/{id}
pub async fn delete_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let id = parse_id(&id)?;
    state.store.delete(id).await?;
    info!(scan_id = %id, "Scan deleted");
    Ok(ApiSuccess::empty())
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: String,
}

/// GET /api/health - liveness only
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: format!("visiscan {} is running", env!("CARGO_PKG_VERSION")),
    })
}
