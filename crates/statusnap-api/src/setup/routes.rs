//! Route configuration and setup

use crate::handlers;
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use statusnap_core::Config;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Headroom over the upload limit for multipart boundaries and the small form fields.
/// The handler enforces the exact video limit while streaming.
const MULTIPART_OVERHEAD_BYTES: u64 = 64 * 1024;

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Router<()> {
    let body_limit = usize::try_from(config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES)
        .unwrap_or(usize::MAX);

    Router::new()
        .route("/", get(handlers::index::index))
        .route("/process-video", post(handlers::process_video::process_video))
        .route("/download/{filename}", get(handlers::download::download))
        .route("/test-ffmpeg", get(handlers::diagnostics::test_ffmpeg))
        .route("/health", get(handlers::health::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
