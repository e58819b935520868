//! HTTP error response conversion
//!
//! Handlers return `Result<_, HttpAppError>`. Any `AppError` (or anything converting into
//! one, such as `PipelineError`) renders as the upload page with the error's client message
//! and the status code it declares. Internal detail is logged, never rendered.

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use statusnap_core::{AppError, ErrorMetadata, LogLevel};
use statusnap_processing::PipelineError;

use crate::views::Page;

/// Wrapper type for AppError to implement IntoResponse
/// This is necessary because of Rust's orphan rules - we can't implement
/// IntoResponse (external trait) for AppError (external type from statusnap-core)
#[derive(Debug)]
pub struct HttpAppError(pub AppError);

impl From<AppError> for HttpAppError {
    fn from(err: AppError) -> Self {
        HttpAppError(err)
    }
}

impl From<PipelineError> for HttpAppError {
    fn from(err: PipelineError) -> Self {
        HttpAppError(err.into())
    }
}

impl From<anyhow::Error> for HttpAppError {
    fn from(err: anyhow::Error) -> Self {
        HttpAppError(AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        })
    }
}

fn log_error(error: &AppError) {
    let error_type = error.error_type();
    let error_code = error.error_code();
    match error.log_level() {
        LogLevel::Debug => {
            tracing::debug!(error = %error, error_type, error_code, "Error occurred");
        }
        LogLevel::Warn => {
            tracing::warn!(error = %error, error_type, error_code, "Error occurred");
        }
        LogLevel::Error => {
            tracing::error!(
                error = %error.detailed_message(),
                error_type,
                error_code,
                "Error occurred"
            );
        }
    }
}

impl IntoResponse for HttpAppError {
    fn into_response(self) -> Response {
        let app_error = &self.0;

        let status = StatusCode::from_u16(app_error.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        log_error(app_error);

        let page = Page::error(app_error.client_message());
        (status, Html(page.render())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_input_renders_bad_request() {
        let response = HttpAppError(AppError::EmptyInput).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_pipeline_timeout_maps_to_gateway_timeout() {
        let response =
            HttpAppError::from(PipelineError::Timeout(Duration::from_secs(600))).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_anyhow_is_internal() {
        let err = HttpAppError::from(anyhow::anyhow!("disk on fire"));
        assert!(matches!(err.0, AppError::InternalWithSource { .. }));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
