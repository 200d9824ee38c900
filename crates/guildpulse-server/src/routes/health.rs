use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// `GET /health`: liveness check.
///
/// Always `200 OK` once the server is listening; upstream reachability is
/// only exercised by collection jobs.
///
/// Response shape:
/// ```json
/// { "status": "ok", "version": "0.1.0" }
/// ```
#[tracing::instrument]
pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}
