//! Health check handlers, matching `edr-api::handlers::health`'s shape.

use serde::Serialize;

use axum::Json;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".to_string() })
}
