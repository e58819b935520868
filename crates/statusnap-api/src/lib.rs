//! StatusSnap API Library
//!
//! This crate provides the HTTP handlers, page rendering and application setup for the
//! upload form and the video processing pipeline behind it.

mod handlers;
mod telemetry;

pub mod error;
pub mod setup;
pub mod state;
pub mod views;

// Re-exports
pub use error::HttpAppError;
pub use state::AppState;
