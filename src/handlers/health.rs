use crate::models::HealthResponse;
use axum::Json;
use tracing::debug;

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Relay is running".to_string(),
    })
}

/// Readiness check endpoint
pub async fn ready_check() -> Json<HealthResponse> {
    debug!("Readiness check requested");
    // The relay holds no external dependencies; once the listener is up
    // it is ready.
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Relay is ready".to_string(),
    })
}
