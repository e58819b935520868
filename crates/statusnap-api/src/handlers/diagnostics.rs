//! Encoder reachability check.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
pub struct EncoderStatus {
    pub backend: &'static str,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reports whether the configured encoder backend answers, with its version line.
#[tracing::instrument(skip(state), fields(operation = "test_ffmpeg"))]
pub async fn test_ffmpeg(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let invoker = state.invoker();
    let backend = invoker.backend_name();

    let outcome = match tokio::time::timeout(PROBE_TIMEOUT, invoker.probe()).await {
        Ok(Ok(version)) => Ok(version),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("probe timed out after {}s", PROBE_TIMEOUT.as_secs())),
    };

    match outcome {
        Ok(version) => {
            tracing::debug!(backend, version = %version, "Encoder probe succeeded");
            (
                StatusCode::OK,
                Json(EncoderStatus {
                    backend,
                    available: true,
                    version: Some(version),
                    error: None,
                }),
            )
        }
        Err(error) => {
            tracing::warn!(backend, error = %error, "Encoder probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(EncoderStatus {
                    backend,
                    available: false,
                    version: None,
                    error: Some(error),
                }),
            )
        }
    }
}
