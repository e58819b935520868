//! Transcode invocation: the boundary to the external encoder or hosted service.
//!
//! Backends report failures as [`TranscodeFailure`]. Runtime failures carry a
//! [`FailureReason`] classified here, so the orchestrator decides on a fallback from an
//! enum instead of matching raw encoder output.

mod ffmpeg;
#[cfg(feature = "hosted")]
mod hosted;
mod progress;

pub use ffmpeg::FfmpegInvoker;
#[cfg(feature = "hosted")]
pub use hosted::{HostedInvoker, HostedInvokerConfig};
pub use progress::ProgressTracker;

use async_trait::async_trait;
use statusnap_core::TrimWindow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::profile::EncodingProfile;

/// Which attempt of a request a job represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Primary,
    Fallback,
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attempt::Primary => f.write_str("primary"),
            Attempt::Fallback => f.write_str("fallback"),
        }
    }
}

/// One invocation of the encoder.
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub profile: EncodingProfile,
    pub attempt: Attempt,
    pub trim: Option<TrimWindow>,
}

impl TranscodeJob {
    pub fn primary(
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        profile: EncodingProfile,
        trim: Option<TrimWindow>,
    ) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            profile,
            attempt: Attempt::Primary,
            trim,
        }
    }

    /// The single fallback job that may follow this primary job.
    pub fn to_fallback(&self) -> Self {
        Self {
            input_path: self.input_path.clone(),
            output_path: self.output_path.clone(),
            profile: self.profile.fallback(),
            attempt: Attempt::Fallback,
            trim: self.trim,
        }
    }

    /// Seconds to seek into the source before encoding.
    pub fn start_offset_secs(&self) -> Option<f64> {
        self.trim
            .map(|t| t.start_secs)
            .filter(|start| *start > 0.0)
    }

    /// Output duration the encoder is instructed to produce; never above the profile cap.
    pub fn output_duration_secs(&self) -> f64 {
        let cap = f64::from(self.profile.max_duration_secs);
        match self.trim {
            Some(trim) => trim.capped_duration(cap),
            None => cap,
        }
    }
}

/// Classified cause of a runtime failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The audio encoder or the container rejected the audio stream.
    IncompatibleAudioCodec,
    Other,
}

/// Lowercased fragments of the messages ffmpeg and the hosted service emit when the audio
/// stream cannot be encoded. Bare codec names are not enough: file paths may contain them.
const AUDIO_FAILURE_SIGNATURES: &[&str] = &[
    "[aac @",
    "[libmp3lame @",
    "encoder 'aac'",
    "encoder 'libmp3lame'",
    "audio encoder",
    "for audio stream",
    "audio codec",
];

impl FailureReason {
    /// Classify encoder diagnostics.
    pub fn classify(diagnostics: &str) -> Self {
        let audio_failure = diagnostics.lines().any(|line| {
            let line = line.to_lowercase();
            AUDIO_FAILURE_SIGNATURES
                .iter()
                .any(|signature| line.contains(signature))
        });

        if audio_failure {
            FailureReason::IncompatibleAudioCodec
        } else {
            FailureReason::Other
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TranscodeFailure {
    #[error("encoder could not be started: {message}")]
    Start { message: String },

    #[error("encoder failed ({reason:?}): {message}")]
    Runtime {
        reason: FailureReason,
        message: String,
    },

    #[error("encoder timed out after {}s", .after.as_secs())]
    Timeout { after: Duration },
}

impl TranscodeFailure {
    pub fn runtime(message: impl Into<String>) -> Self {
        let message = message.into();
        TranscodeFailure::Runtime {
            reason: FailureReason::classify(&message),
            message,
        }
    }

    /// Whether a fallback attempt with safer parameters may recover from this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TranscodeFailure::Runtime {
                reason: FailureReason::IncompatibleAudioCodec,
                ..
            }
        )
    }
}

/// External encoder or transcoding service.
#[async_trait]
pub trait TranscodeInvoker: Send + Sync {
    /// Short backend name for logs and diagnostics.
    fn backend_name(&self) -> &'static str;

    /// Run one job, writing exactly one file at `job.output_path`.
    async fn invoke(&self, job: &TranscodeJob) -> Result<(), TranscodeFailure>;

    /// Repackage `input` into `output` without re-encoding, with metadata moved to the front.
    async fn remux(&self, _input: &Path, _output: &Path) -> Result<(), TranscodeFailure> {
        Err(TranscodeFailure::Start {
            message: format!("remux is not supported by the {} backend", self.backend_name()),
        })
    }

    /// Check that the collaborator is reachable, returning a version or status line.
    async fn probe(&self) -> Result<String, TranscodeFailure>;
}
