//! WebApi - push channel and trigger endpoints
//!
//! ## Responsibilities
//!
//! - `GET /stream` - long-lived SSE delivery of every published event
//! - `POST /light/on` - side-effect trigger acknowledgement (204)
//! - `GET /healthz` - liveness
//!
//! No authentication and no delivery guarantees; a client that misses
//! events while disconnected never sees them.

mod routes;

pub use routes::create_router;

use axum::{response::IntoResponse, Json};

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
