//! Application state shared by all handlers.
//!
//! Built once at startup and never mutated; per-request state lives in the handlers and
//! in the files each request allocates.

use statusnap_core::Config;
use statusnap_processing::{PipelineOrchestrator, TempFileStore, TranscodeInvoker};
use std::sync::Arc;

use crate::views::FormLimits;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: TempFileStore,
    pub orchestrator: Arc<PipelineOrchestrator>,
}

impl AppState {
    pub fn invoker(&self) -> &Arc<dyn TranscodeInvoker> {
        self.orchestrator.invoker()
    }

    pub fn form_limits(&self) -> FormLimits {
        FormLimits::from(&self.config)
    }
}
