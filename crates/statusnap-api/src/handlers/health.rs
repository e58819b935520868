//! Liveness probe.

use axum::{http::StatusCode, response::IntoResponse, Json};

/// Process is up and serving requests. Does not touch the encoder.
pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}
