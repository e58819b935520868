//! StatusSnap processing library
//!
//! The upload-to-output pipeline: temp-file bookkeeping, encoding profile selection,
//! transcode invocation (local ffmpeg or a hosted service), output validation and the
//! orchestrator that sequences them with a single audio-codec fallback.

pub mod invoker;
pub mod pipeline;
pub mod profile;
pub mod temp_store;
pub mod validator;

pub use invoker::{
    Attempt, FailureReason, FfmpegInvoker, TranscodeFailure, TranscodeInvoker, TranscodeJob,
};
#[cfg(feature = "hosted")]
pub use invoker::{HostedInvoker, HostedInvokerConfig};
pub use pipeline::{PipelineConfig, PipelineError, PipelineOrchestrator};
pub use profile::{EncodingProfile, FramePolicy, ProfileSelector, ProfileSettings};
pub use temp_store::{FileKind, TempFileStore};
pub use validator::OutputValidator;
