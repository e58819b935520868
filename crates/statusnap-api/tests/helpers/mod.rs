//! Test helpers: build AppState and router around a scripted encoder.
//!
//! Run from workspace root: `cargo test -p statusnap-api`. No ffmpeg binary is needed;
//! the fake invoker writes output files directly.

#![allow(dead_code)]

use async_trait::async_trait;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use statusnap_api::setup::{build_state, routes};
use statusnap_api::state::AppState;
use statusnap_core::{Config, ProfileName};
use statusnap_processing::{TranscodeFailure, TranscodeInvoker, TranscodeJob};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Encoder stand-in: fails with queued failures first, then writes `output_bytes` bytes.
pub struct FakeInvoker {
    failures: Mutex<VecDeque<TranscodeFailure>>,
    output_bytes: usize,
    jobs: Mutex<Vec<(ProfileName, f64)>>,
}

impl FakeInvoker {
    pub fn writing(output_bytes: usize) -> Self {
        Self {
            failures: Mutex::new(VecDeque::new()),
            output_bytes,
            jobs: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_first(self, failures: impl IntoIterator<Item = TranscodeFailure>) -> Self {
        self.failures.lock().unwrap().extend(failures);
        self
    }

    pub fn calls(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    /// Profile and output duration of every job received, in order.
    pub fn jobs(&self) -> Vec<(ProfileName, f64)> {
        self.jobs.lock().unwrap().clone()
    }
}

impl Default for FakeInvoker {
    fn default() -> Self {
        Self::writing(64 * 1024)
    }
}

#[async_trait]
impl TranscodeInvoker for FakeInvoker {
    fn backend_name(&self) -> &'static str {
        "fake"
    }

    async fn invoke(&self, job: &TranscodeJob) -> Result<(), TranscodeFailure> {
        self.jobs
            .lock()
            .unwrap()
            .push((job.profile.name, job.output_duration_secs()));

        let failure = self.failures.lock().unwrap().pop_front();
        if let Some(failure) = failure {
            return Err(failure);
        }

        tokio::fs::write(&job.output_path, vec![0u8; self.output_bytes])
            .await
            .unwrap();
        Ok(())
    }

    async fn probe(&self) -> Result<String, TranscodeFailure> {
        Ok("fake encoder 1.0".to_string())
    }
}

/// Test application: server, state and the temp directory everything lives in.
pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub invoker: Arc<FakeInvoker>,
    pub _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    pub fn upload_dir(&self) -> &Path {
        &self.state.config.upload_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.state.config.output_dir
    }

    pub fn work_dir(&self) -> &Path {
        &self.state.config.work_dir
    }
}

/// Config pointing every directory into `root`, with no background janitor.
pub fn create_test_config(root: &Path) -> Config {
    Config {
        upload_dir: root.join("uploads"),
        work_dir: root.join("work"),
        output_dir: root.join("output"),
        download_grace_secs: 0,
        cleanup_interval_secs: 0,
        ..Config::default()
    }
}

pub async fn setup_test_app() -> TestApp {
    setup_test_app_with(FakeInvoker::default(), |_| {}).await
}

pub async fn setup_test_app_with(
    invoker: FakeInvoker,
    customize: impl FnOnce(&mut Config),
) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let mut config = create_test_config(temp_dir.path());
    customize(&mut config);

    let invoker = Arc::new(invoker);
    let state = build_state(config.clone(), invoker.clone())
        .await
        .expect("Failed to build app state");
    let app = routes::setup_routes(&config, state.clone());

    let server = TestServer::new(app.into_make_service()).expect("Failed to create test server");

    TestApp {
        server,
        state,
        invoker,
        _temp_dir: temp_dir,
    }
}

/// Build state around any invoker, e.g. a real `FfmpegInvoker`.
pub async fn setup_test_server_with_invoker(
    invoker: Arc<dyn TranscodeInvoker>,
) -> (TestServer, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let config = create_test_config(temp_dir.path());
    let state = build_state(config.clone(), invoker)
        .await
        .expect("Failed to build app state");
    let app = routes::setup_routes(&config, state);
    let server = TestServer::new(app.into_make_service()).expect("Failed to create test server");
    (server, temp_dir)
}

/// Multipart form with a `video` part and optional extra text fields.
pub fn video_form(video: Vec<u8>, fields: &[(&str, &str)]) -> MultipartForm {
    let part = Part::bytes(bytes::Bytes::from(video))
        .file_name("clip.mp4")
        .mime_type("video/mp4");
    fields
        .iter()
        .fold(MultipartForm::new().add_part("video", part), |form, (name, value)| {
            form.add_text(name.to_string(), value.to_string())
        })
}

/// Files currently in `dir`.
pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| entries.map(|e| e.unwrap().path()).collect())
        .unwrap_or_default()
}

/// Extract the download path (`/download/...`) from a rendered page.
pub fn download_link(html: &str) -> Option<String> {
    let start = html.find("href=\"/download/")? + "href=\"".len();
    let end = html[start..].find('"')? + start;
    Some(html[start..end].to_string())
}

/// Wait for a condition with timeout.
pub async fn wait_for(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
