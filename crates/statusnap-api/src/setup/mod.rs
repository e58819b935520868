//! Application setup and initialization
//!
//! Everything main.rs needs to go from a `Config` to a served router, split so that
//! integration tests can build the same state around a scripted encoder.

pub mod janitor;
pub mod routes;
pub mod server;

use crate::state::AppState;
use anyhow::{Context, Result};
use statusnap_core::{Config, TranscodeBackend};
use statusnap_processing::{
    FfmpegInvoker, OutputValidator, PipelineConfig, PipelineOrchestrator, ProfileSelector,
    ProfileSettings, TempFileStore, TranscodeInvoker,
};
use std::sync::Arc;

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    // Validate configuration first - fail fast on misconfiguration
    config.validate().context("Configuration validation failed")?;

    crate::telemetry::init_telemetry(&config.environment)
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    tracing::info!(
        backend = ?config.transcode_backend,
        "Configuration loaded and validated successfully"
    );

    let invoker = build_invoker(&config)?;
    let state = build_state(config.clone(), invoker).await?;

    if let Some(janitor) = janitor::Janitor::from_config(&config, state.store.clone()) {
        Arc::new(janitor).start();
    }

    let router = routes::setup_routes(&config, state.clone());

    Ok((state, router))
}

/// Select the encoder backend named by the configuration.
pub fn build_invoker(config: &Config) -> Result<Arc<dyn TranscodeInvoker>> {
    match config.transcode_backend {
        TranscodeBackend::Local => Ok(Arc::new(
            FfmpegInvoker::new(&config.ffmpeg_path).with_timeout(config.encode_timeout()),
        )),
        #[cfg(feature = "hosted")]
        TranscodeBackend::Hosted => {
            use statusnap_processing::{HostedInvoker, HostedInvokerConfig};
            use std::time::Duration;

            let endpoint = config
                .hosted_transcode_url
                .clone()
                .context("HOSTED_TRANSCODE_URL is not set")?;
            let api_key = config
                .hosted_transcode_api_key
                .clone()
                .context("HOSTED_TRANSCODE_API_KEY is not set")?;
            let invoker = HostedInvoker::new(HostedInvokerConfig::new(
                endpoint,
                api_key,
                Duration::from_secs(config.hosted_transcode_max_wait_secs),
            ))?;
            Ok(Arc::new(invoker))
        }
        #[cfg(not(feature = "hosted"))]
        TranscodeBackend::Hosted => Err(anyhow::anyhow!(
            "TRANSCODE_BACKEND=hosted requires the `hosted` feature"
        )),
    }
}

/// Create the working directories and wire the pipeline around `invoker`.
pub async fn build_state(
    config: Config,
    invoker: Arc<dyn TranscodeInvoker>,
) -> Result<Arc<AppState>> {
    let store = TempFileStore::new(&config.upload_dir, &config.work_dir, &config.output_dir);
    store
        .ensure_dirs()
        .await
        .context("Failed to create working directories")?;

    let orchestrator = PipelineOrchestrator::new(
        store.clone(),
        ProfileSelector::new(ProfileSettings::from(&config)),
        invoker,
        OutputValidator::new(config.min_output_bytes),
        PipelineConfig::from(&config),
    );

    tracing::debug!(
        upload_dir = %config.upload_dir.display(),
        work_dir = %config.work_dir.display(),
        output_dir = %config.output_dir.display(),
        "Working directories ready"
    );

    Ok(Arc::new(AppState {
        config,
        store,
        orchestrator: Arc::new(orchestrator),
    }))
}
