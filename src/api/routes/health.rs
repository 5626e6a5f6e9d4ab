//! Health check route handler

use crate::api::types::HealthCheckResponse;
use crate::server::AppState;
use axum::{extract::State, Json};

/// Liveness endpoint: always 200 while the process serves.
pub async fn health_check(State(_state): State<AppState>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "healthy".to_string(),
        service: crate::SERVICE_NAME.to_string(),
        version: crate::VERSION.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
