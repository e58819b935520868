//! Upload-to-output pipeline.
//!
//! One call to [`PipelineOrchestrator::process`] takes an uploaded source file through a
//! primary encode, at most one fallback encode, output validation and an optional faststart
//! remux. Every path allocated on the way is tracked and released before returning, so only
//! the delivered artifact survives.

use statusnap_core::{AppError, Config, OutputArtifact, UploadRequest};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::{Semaphore, SemaphorePermit};

use crate::invoker::{Attempt, TranscodeFailure, TranscodeInvoker, TranscodeJob};
use crate::profile::ProfileSelector;
use crate::temp_store::{FileKind, TempFileStore};
use crate::validator::OutputValidator;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("uploaded file is missing or empty")]
    EmptyInput,

    #[error("encoder could not be started: {0}")]
    EncoderStart(String),

    #[error("encoder failed: {0}")]
    EncoderRuntime(String),

    #[error("encoder timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("encoder output is unusable ({size_bytes} bytes)")]
    CorruptOutput { size_bytes: u64 },

    #[error("failed to move output into place: {0}")]
    Storage(String),
}

impl From<TranscodeFailure> for PipelineError {
    fn from(failure: TranscodeFailure) -> Self {
        match failure {
            TranscodeFailure::Start { message } => PipelineError::EncoderStart(message),
            TranscodeFailure::Runtime { message, .. } => PipelineError::EncoderRuntime(message),
            TranscodeFailure::Timeout { after } => PipelineError::Timeout(after),
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::EmptyInput => AppError::EmptyInput,
            PipelineError::EncoderStart(message) => AppError::EncoderStart(message),
            PipelineError::EncoderRuntime(message) => AppError::EncoderRuntime(message),
            PipelineError::Timeout(after) => AppError::EncodeTimeout {
                secs: after.as_secs(),
            },
            PipelineError::CorruptOutput { size_bytes } => {
                AppError::CorruptOutput(format!("{} bytes", size_bytes))
            }
            PipelineError::Storage(message) => AppError::Internal(message),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineConfig {
    /// Run a stream-copy faststart pass after the encode.
    pub remux: bool,
    /// Simultaneous encodes allowed; 0 means unlimited.
    pub max_concurrent: usize,
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        Self {
            remux: config.remux_enabled(),
            max_concurrent: config.max_concurrent_transcodes,
        }
    }
}

/// Paths a single request owns; released together when the request finishes.
///
/// Every owned path is held against the janitor. If the request future is dropped before
/// [`release_except`](Self::release_except) runs, the remaining paths are released on a
/// spawned task.
struct OwnedPaths {
    store: TempFileStore,
    paths: Vec<PathBuf>,
}

impl OwnedPaths {
    fn new(store: &TempFileStore) -> Self {
        Self {
            store: store.clone(),
            paths: Vec::new(),
        }
    }

    fn allocate(&mut self, kind: FileKind) -> PathBuf {
        let path = self.store.allocate(kind);
        self.adopt(&path);
        path
    }

    fn adopt(&mut self, path: &Path) {
        self.store.hold(path);
        self.paths.push(path.to_path_buf());
    }

    async fn release_except(mut self, keep: Option<&Path>) {
        for path in std::mem::take(&mut self.paths) {
            if keep == Some(path.as_path()) {
                self.store.unhold(&path);
                continue;
            }
            self.store.release(&path).await;
        }
    }
}

impl Drop for OwnedPaths {
    fn drop(&mut self) {
        if self.paths.is_empty() {
            return;
        }

        let paths = std::mem::take(&mut self.paths);
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            for path in &paths {
                self.store.unhold(path);
            }
            tracing::warn!(count = paths.len(), "No runtime to release abandoned job files");
            return;
        };

        tracing::debug!(count = paths.len(), "Job abandoned, releasing its files");
        let store = self.store.clone();
        handle.spawn(async move {
            for path in &paths {
                store.release(path).await;
            }
        });
    }
}

pub struct PipelineOrchestrator {
    store: TempFileStore,
    selector: ProfileSelector,
    invoker: Arc<dyn TranscodeInvoker>,
    validator: OutputValidator,
    config: PipelineConfig,
    limiter: Option<Semaphore>,
}

impl PipelineOrchestrator {
    pub fn new(
        store: TempFileStore,
        selector: ProfileSelector,
        invoker: Arc<dyn TranscodeInvoker>,
        validator: OutputValidator,
        config: PipelineConfig,
    ) -> Self {
        let limiter = (config.max_concurrent > 0).then(|| Semaphore::new(config.max_concurrent));
        Self {
            store,
            selector,
            invoker,
            validator,
            config,
            limiter,
        }
    }

    pub fn store(&self) -> &TempFileStore {
        &self.store
    }

    pub fn invoker(&self) -> &Arc<dyn TranscodeInvoker> {
        &self.invoker
    }

    /// Turn an uploaded file into a validated artifact.
    ///
    /// The source file is consumed: it is deleted whatever the outcome, also when this
    /// future is dropped before completing.
    #[tracing::instrument(skip(self, request), fields(profile = %request.profile, backend = self.invoker.backend_name()))]
    pub async fn process(&self, request: UploadRequest) -> Result<OutputArtifact, PipelineError> {
        let mut owned = OwnedPaths::new(&self.store);
        owned.adopt(&request.source_path);

        let result = self.run(&request, &mut owned).await;

        let keep = result.as_ref().ok().map(|artifact| artifact.path.clone());
        owned.release_except(keep.as_deref()).await;

        match &result {
            Ok(artifact) => tracing::info!(
                path = %artifact.path.display(),
                size_bytes = artifact.size_bytes,
                "Video processed"
            ),
            Err(e) => tracing::warn!(error = %e, "Video processing failed"),
        }

        result
    }

    async fn run(
        &self,
        request: &UploadRequest,
        owned: &mut OwnedPaths,
    ) -> Result<OutputArtifact, PipelineError> {
        let source_size = fs::metadata(&request.source_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if source_size == 0 {
            return Err(PipelineError::EmptyInput);
        }
        tracing::debug!(source_size, "Accepted upload");

        let profile = self.selector.select(request.profile);
        let _permit = self.acquire_permit().await;

        let encode_kind = if self.config.remux {
            FileKind::Intermediate
        } else {
            FileKind::Output
        };
        let encode_path = owned.allocate(encode_kind);

        let job = TranscodeJob::primary(&request.source_path, &encode_path, profile, request.trim);
        self.encode(job).await?;

        let encoded = self.validator.validate(&encode_path).await;
        if !encoded.valid {
            return Err(PipelineError::CorruptOutput {
                size_bytes: encoded.size_bytes,
            });
        }

        if !self.config.remux {
            return Ok(encoded);
        }

        let remux_path = owned.allocate(FileKind::Output);
        self.remux_or_keep(encoded, &remux_path).await
    }

    /// Primary attempt, then at most one fallback after a retryable failure.
    async fn encode(&self, primary: TranscodeJob) -> Result<(), PipelineError> {
        let mut job = primary;
        loop {
            match self.invoker.invoke(&job).await {
                Ok(()) => return Ok(()),
                Err(failure) if job.attempt == Attempt::Primary && failure.is_retryable() => {
                    tracing::warn!(
                        error = %failure,
                        "Audio codec rejected, retrying with fallback parameters"
                    );
                    self.store.release(&job.output_path).await;
                    self.store.hold(&job.output_path);
                    job = job.to_fallback();
                }
                Err(failure) => {
                    tracing::error!(attempt = %job.attempt, error = %failure, "Encode failed");
                    return Err(failure.into());
                }
            }
        }
    }

    /// Remux into `remux_path`. If the remux fails or its output is unusable, the encode
    /// output is moved to `remux_path` and delivered instead.
    async fn remux_or_keep(
        &self,
        encoded: OutputArtifact,
        remux_path: &Path,
    ) -> Result<OutputArtifact, PipelineError> {
        match self.invoker.remux(&encoded.path, remux_path).await {
            Ok(()) => {
                let remuxed = self.validator.validate(remux_path).await;
                if remuxed.valid {
                    return Ok(remuxed);
                }
                tracing::warn!(size_bytes = remuxed.size_bytes, "Remux output invalid, keeping encode");
            }
            Err(e) => tracing::warn!(error = %e, "Remux failed, keeping encode"),
        }

        self.store.release(remux_path).await;
        self.store.hold(remux_path);
        move_file(&encoded.path, remux_path).await?;

        Ok(OutputArtifact {
            path: remux_path.to_path_buf(),
            ..encoded
        })
    }

    async fn acquire_permit(&self) -> Option<SemaphorePermit<'_>> {
        let limiter = self.limiter.as_ref()?;
        if limiter.available_permits() == 0 {
            tracing::debug!("Waiting for a free transcode slot");
        }
        limiter.acquire().await.ok()
    }
}

/// Rename, falling back to copy when the directories live on different filesystems.
async fn move_file(from: &Path, to: &Path) -> Result<(), PipelineError> {
    if fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    fs::copy(from, to)
        .await
        .map(|_| ())
        .map_err(|e| PipelineError::Storage(format!("{} -> {}: {}", from.display(), to.display(), e)))
}
