//! Request and artifact models shared across crates

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::AppError;

/// Output profile requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileName {
    /// Source aspect ratio, optimized bitrate.
    #[default]
    Original,
    /// Portrait 9:16 frame padded for WhatsApp status.
    Status,
}

impl ProfileName {
    /// Resolve a client-supplied name. Missing or unknown names fall back to `Original`.
    pub fn from_request(name: Option<&str>) -> Self {
        match name.map(|n| n.trim().to_lowercase()).as_deref() {
            Some("status") => ProfileName::Status,
            _ => ProfileName::Original,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileName::Original => "original",
            ProfileName::Status => "status",
        }
    }
}

impl fmt::Display for ProfileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-selected trim bounds, in seconds from the start of the source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimWindow {
    pub start_secs: f64,
    pub end_secs: Option<f64>,
}

impl TrimWindow {
    /// Build a trim window from optional form fields.
    ///
    /// Returns `Ok(None)` when neither bound is present or the window covers the
    /// whole clip from zero with no end.
    pub fn from_bounds(start: Option<f64>, end: Option<f64>) -> Result<Option<Self>, AppError> {
        if start.is_none() && end.is_none() {
            return Ok(None);
        }

        let start_secs = start.unwrap_or(0.0);
        if !start_secs.is_finite() || start_secs < 0.0 {
            return Err(AppError::InvalidInput(format!(
                "Invalid trim start: {}",
                start_secs
            )));
        }

        if let Some(end_secs) = end {
            if !end_secs.is_finite() || end_secs <= start_secs {
                return Err(AppError::InvalidInput(format!(
                    "Trim end ({}) must be after trim start ({})",
                    end_secs, start_secs
                )));
            }
        }

        if start_secs == 0.0 && end.is_none() {
            return Ok(None);
        }

        Ok(Some(Self {
            start_secs,
            end_secs: end,
        }))
    }

    /// Duration the encoder should produce, capped at `max_secs`.
    pub fn capped_duration(&self, max_secs: f64) -> f64 {
        match self.end_secs {
            Some(end) => (end - self.start_secs).min(max_secs),
            None => max_secs,
        }
    }
}

/// One inbound processing request. Immutable once built.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub source_path: PathBuf,
    pub profile: ProfileName,
    pub trim: Option<TrimWindow>,
}

impl UploadRequest {
    pub fn new(source_path: impl Into<PathBuf>, profile: ProfileName) -> Self {
        Self {
            source_path: source_path.into(),
            profile,
            trim: None,
        }
    }

    pub fn with_trim(mut self, trim: Option<TrimWindow>) -> Self {
        self.trim = trim;
        self
    }
}

/// Result of validating an encoder output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub valid: bool,
}

impl OutputArtifact {
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }

    pub fn exceeds(&self, limit_bytes: u64) -> bool {
        self.size_bytes > limit_bytes
    }
}
