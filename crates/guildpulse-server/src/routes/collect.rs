use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use guildpulse_core::window::ReportWindow;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectRequest {
    pub week_range: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CollectParams {
    #[serde(default)]
    pub wait: bool,
}

/// `POST /collect-analytics`: collect one report window.
///
/// Body: `{ "weekRange": "Jan 1 2024 - Jan 7 2024" }`, interpreted in the
/// configured timezone.
///
/// ## Response
/// - `202 Accepted` with `{ "status": "started", "jobId", "weekRange" }`; the
///   job keeps running and can be polled at `/collect-analytics/{jobId}`.
/// - With `?wait=true`, `200 OK` with the finished report, or `500` with
///   `{ "error" }` when the job fails.
/// - `400` for a missing or malformed week range.
#[tracing::instrument(skip(state, payload))]
pub async fn collect_analytics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CollectParams>,
    payload: Result<Json<CollectRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let label = request
        .week_range
        .filter(|w| !w.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("weekRange is required".to_string()))?;
    let window = ReportWindow::parse(&label, state.collector.timezone())
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let handle = state.collector.submit(window).await;
    let job_id = handle.id;

    if params.wait {
        let report = handle.wait().await?;
        let mut body = serde_json::to_value(&report).map_err(anyhow::Error::from)?;
        body["status"] = json!("succeeded");
        body["jobId"] = json!(job_id);
        return Ok((StatusCode::OK, Json(body)));
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "started",
            "jobId": job_id,
            "weekRange": label.trim(),
        })),
    ))
}

/// `GET /collect-analytics/{job_id}`: status of a submitted job.
#[tracing::instrument(skip(state))]
pub async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = Uuid::parse_str(&job_id)
        .map_err(|_| AppError::NotFound(format!("Unknown job: {job_id}")))?;
    let record = state
        .collector
        .status(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Unknown job: {job_id}")))?;
    Ok(Json(record))
}
