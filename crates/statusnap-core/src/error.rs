//! Error types module
//!
//! All failures that can reach a client are unified under `AppError`. Each variant
//! self-describes how it is presented through the `ErrorMetadata` trait: the HTTP status,
//! a machine-readable code, the plain-language message shown on the form, and the level
//! it is logged at. Internal detail (encoder stderr, I/O errors) never leaves the server.

use std::io;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues like oversized uploads
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "EMPTY_INPUT")
    fn error_code(&self) -> &'static str;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden from the client
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

const GENERIC_FAILURE: &str = "Error processing video. Try again!";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("No video uploaded or the upload is empty")]
    EmptyInput,

    #[error("Upload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Encoder could not be started: {0}")]
    EncoderStart(String),

    #[error("Encoder failed: {0}")]
    EncoderRuntime(String),

    #[error("Encoder timed out after {secs}s")]
    EncodeTimeout { secs: u64 },

    #[error("Encoder produced an unusable output: {0}")]
    CorruptOutput(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, sensitive, log_level).
fn app_error_static_metadata(err: &AppError) -> (u16, &'static str, bool, LogLevel) {
    match err {
        AppError::EmptyInput => (400, "EMPTY_INPUT", false, LogLevel::Debug),
        AppError::PayloadTooLarge(_) => (413, "PAYLOAD_TOO_LARGE", false, LogLevel::Warn),
        AppError::InvalidInput(_) => (400, "INVALID_INPUT", false, LogLevel::Debug),
        AppError::NotFound(_) => (404, "NOT_FOUND", false, LogLevel::Debug),
        AppError::EncoderStart(_) => (500, "ENCODER_START_FAILED", true, LogLevel::Error),
        AppError::EncoderRuntime(_) => (500, "ENCODER_FAILED", true, LogLevel::Error),
        AppError::EncodeTimeout { .. } => (504, "ENCODE_TIMEOUT", true, LogLevel::Error),
        AppError::CorruptOutput(_) => (500, "CORRUPT_OUTPUT", true, LogLevel::Error),
        AppError::Internal(_) => (500, "INTERNAL_ERROR", true, LogLevel::Error),
        AppError::InternalWithSource { .. } => (500, "INTERNAL_ERROR", true, LogLevel::Error),
    }
}

impl AppError {
    /// Get the error type name for structured logging
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::EmptyInput => "EmptyInput",
            AppError::PayloadTooLarge(_) => "PayloadTooLarge",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::NotFound(_) => "NotFound",
            AppError::EncoderStart(_) => "EncoderStart",
            AppError::EncoderRuntime(_) => "EncoderRuntime",
            AppError::EncodeTimeout { .. } => "EncodeTimeout",
            AppError::CorruptOutput(_) => "CorruptOutput",
            AppError::Internal(_) | AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).3
    }

    fn client_message(&self) -> String {
        match self {
            AppError::EmptyInput => "Please upload a video!".to_string(),
            AppError::PayloadTooLarge(ref msg) => msg.clone(),
            AppError::InvalidInput(ref msg) => msg.clone(),
            AppError::NotFound(_) => "That video is no longer available.".to_string(),
            AppError::EncoderStart(_)
            | AppError::EncoderRuntime(_)
            | AppError::EncodeTimeout { .. }
            | AppError::CorruptOutput(_)
            | AppError::Internal(_)
            | AppError::InternalWithSource { .. } => GENERIC_FAILURE.to_string(),
        }
    }
}
