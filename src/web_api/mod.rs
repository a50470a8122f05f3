//! WebAPI - REST API Endpoints
//!
//! ## Responsibilities
//!
//! - HTTP API routes over the allocation engine
//! - Request decoding
//! - Response formatting

mod routes;

pub use routes::create_router;

use axum::response::IntoResponse;
use axum::Json;

use crate::models::HealthResponse;

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
