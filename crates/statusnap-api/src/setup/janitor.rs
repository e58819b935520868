//! Background sweep of stale temp files.
//!
//! Catches what per-request cleanup cannot: artifacts that were never downloaded and
//! leftovers from a process that was killed mid-request.

use statusnap_core::Config;
use statusnap_processing::TempFileStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

pub struct Janitor {
    store: TempFileStore,
    every: Duration,
    max_age: Duration,
}

impl Janitor {
    pub fn new(store: TempFileStore, every: Duration, max_age: Duration) -> Self {
        Self {
            store,
            every,
            max_age,
        }
    }

    /// `None` when `CLEANUP_INTERVAL_SECS` is 0.
    pub fn from_config(config: &Config, store: TempFileStore) -> Option<Self> {
        (config.cleanup_interval_secs > 0).then(|| {
            Self::new(
                store,
                Duration::from_secs(config.cleanup_interval_secs),
                config.output_retention(),
            )
        })
    }

    /// Start the background sweep. Returns a JoinHandle for graceful shutdown
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut sweep_interval = interval(self.every);

            loop {
                sweep_interval.tick().await;
                self.sweep().await;
            }
        })
    }

    #[tracing::instrument(skip(self), fields(cleanup.operation = "sweep_stale"))]
    pub async fn sweep(&self) -> usize {
        let removed = self.store.sweep_stale(self.max_age).await;
        if removed > 0 {
            tracing::info!(removed, max_age_secs = self.max_age.as_secs(), "Removed stale temp files");
        } else {
            tracing::debug!("No stale temp files");
        }
        removed
    }
}
