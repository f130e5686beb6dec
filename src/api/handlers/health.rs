use crate::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub storage: String,
    pub transcoder: String,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse),
        (status = 503, description = "Storage directory is not writable", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let storage_ok = state.storage.health_check().await;
    let transcoder_ok = state.transcoder.health_check().await;

    // A missing ffmpeg only breaks non-MP3 uploads, so it degrades instead of failing
    let (status_code, status) = match (storage_ok, transcoder_ok) {
        (false, _) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
        (true, false) => (StatusCode::OK, "degraded"),
        (true, true) => (StatusCode::OK, "ok"),
    };

    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            storage: if storage_ok { "writable" } else { "unwritable" }.to_string(),
            transcoder: if transcoder_ok { "available" } else { "unavailable" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}
