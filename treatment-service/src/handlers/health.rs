use crate::models::StatusResponse;
use crate::startup::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// `GET /`: static liveness payload, independent of provider state.
pub async fn root() -> Json<StatusResponse> {
    Json(StatusResponse::default())
}

/// Health check endpoint for Docker/K8s liveness probes.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": state.config.service_name,
        "version": env!("CARGO_PKG_VERSION"),
        "provider_configured": state.treatment.is_configured(),
    }))
}

/// Readiness check endpoint: ready only with a configured provider.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.treatment.is_configured() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
