//! StatusSnap Core Library
//!
//! This crate provides the configuration, error types and request/artifact models
//! shared by the processing pipeline and the HTTP surface.

pub mod config;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::{Config, TranscodeBackend};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{OutputArtifact, ProfileName, TrimWindow, UploadRequest};
