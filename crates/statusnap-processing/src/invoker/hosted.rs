//! Hosted transcoding service backend.
//!
//! The input is uploaded together with a declarative transformation; the service answers
//! with a job id and status. Pending jobs are polled until they complete or the bounded
//! wait runs out, then the resulting asset is downloaded to the job's output path.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;

use super::{FailureReason, TranscodeFailure, TranscodeInvoker, TranscodeJob};
use crate::profile::FramePolicy;

const POLL_INTERVAL_SECS: u64 = 2;
const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct HostedInvokerConfig {
    /// Base URL, e.g. `https://media.example.com/v1`.
    pub endpoint: String,
    pub api_key: String,
    pub max_wait: Duration,
    pub poll_interval: Duration,
}

impl HostedInvokerConfig {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, max_wait: Duration) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            max_wait,
            poll_interval: Duration::from_secs(POLL_INTERVAL_SECS),
        }
    }
}

/// Transformation request understood by the service.
#[derive(Debug, Serialize)]
struct Transformation {
    width: Option<u32>,
    height: Option<u32>,
    /// `pad` letterboxes into the exact frame, `limit` keeps the source aspect ratio.
    crop: &'static str,
    video_codec: String,
    audio_codec: String,
    quality: &'static str,
    video_bitrate_kbps: u32,
    audio_bitrate_kbps: u32,
    duration_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_offset_secs: Option<f64>,
    format: &'static str,
}

impl Transformation {
    fn for_job(job: &TranscodeJob) -> Self {
        let profile = &job.profile;
        let (width, height, crop) = match profile.frame {
            FramePolicy::PadTo { width, height } => (Some(width), Some(height), "pad"),
            FramePolicy::PreserveAspectEven => (None, None, "limit"),
        };
        Self {
            width,
            height,
            crop,
            video_codec: profile.video.codec.clone(),
            audio_codec: profile.audio.codec.clone(),
            quality: "auto",
            video_bitrate_kbps: profile.video.bitrate_kbps,
            audio_bitrate_kbps: profile.audio.bitrate_kbps,
            duration_secs: job.output_duration_secs(),
            start_offset_secs: job.start_offset_secs(),
            format: "mp4",
        }
    }
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum JobStatus {
    Pending,
    Processing,
    Complete,
    Failed,
}

#[derive(Debug, Deserialize)]
struct JobResponse {
    id: String,
    status: JobStatus,
    url: Option<String>,
    error: Option<String>,
}

pub struct HostedInvoker {
    http_client: reqwest::Client,
    config: HostedInvokerConfig,
}

impl HostedInvoker {
    pub fn new(config: HostedInvokerConfig) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client for hosted transcoder: {}", e))?;

        Ok(Self {
            http_client,
            config,
        })
    }

    async fn submit(&self, job: &TranscodeJob) -> Result<JobResponse, TranscodeFailure> {
        let data = tokio::fs::read(&job.input_path)
            .await
            .map_err(|e| TranscodeFailure::Start {
                message: format!("failed to read input {}: {}", job.input_path.display(), e),
            })?;

        let transformation = serde_json::to_string(&Transformation::for_job(job)).map_err(|e| {
            TranscodeFailure::Start {
                message: format!("failed to encode transformation: {}", e),
            }
        })?;

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(data).file_name("upload"),
            )
            .text("transformation", transformation);

        let response = self
            .http_client
            .post(format!("{}/transcode", self.config.endpoint))
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TranscodeFailure::Start {
                message: format!("failed to reach hosted transcoder: {}", e),
            })?;

        Self::parse_job(response).await
    }

    async fn poll(&self, id: &str) -> Result<JobResponse, TranscodeFailure> {
        let response = self
            .http_client
            .get(format!("{}/transcode/{}", self.config.endpoint, id))
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| TranscodeFailure::Runtime {
                reason: FailureReason::Other,
                message: format!("failed to poll hosted transcoder: {}", e),
            })?;

        Self::parse_job(response).await
    }

    async fn parse_job(response: reqwest::Response) -> Result<JobResponse, TranscodeFailure> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TranscodeFailure::runtime(format!(
                "hosted transcoder returned {}: {}",
                status, error_text
            )));
        }

        response
            .json::<JobResponse>()
            .await
            .map_err(|e| TranscodeFailure::Runtime {
                reason: FailureReason::Other,
                message: format!("invalid hosted transcoder response: {}", e),
            })
    }

    async fn download(&self, url: &str, job: &TranscodeJob) -> Result<(), TranscodeFailure> {
        let runtime = |message: String| TranscodeFailure::Runtime {
            reason: FailureReason::Other,
            message,
        };

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| runtime(format!("failed to download transformed asset: {}", e)))?;

        let mut file = tokio::fs::File::create(&job.output_path)
            .await
            .map_err(|e| runtime(format!("failed to create output file: {}", e)))?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| runtime(format!("transformed asset stream failed: {}", e)))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| runtime(format!("failed to write output file: {}", e)))?;
        }

        file.flush()
            .await
            .map_err(|e| runtime(format!("failed to flush output file: {}", e)))
    }
}

#[async_trait]
impl TranscodeInvoker for HostedInvoker {
    fn backend_name(&self) -> &'static str {
        "hosted"
    }

    #[tracing::instrument(skip(self, job), fields(attempt = %job.attempt, profile = %job.profile.name))]
    async fn invoke(&self, job: &TranscodeJob) -> Result<(), TranscodeFailure> {
        let started = Instant::now();
        let mut state = self.submit(job).await?;
        tracing::debug!(job_id = %state.id, "Submitted job to hosted transcoder");

        let url = loop {
            match state.status {
                JobStatus::Complete => match state.url.take() {
                    Some(url) => break url,
                    None => {
                        return Err(TranscodeFailure::Runtime {
                            reason: FailureReason::Other,
                            message: "hosted transcoder completed without an asset URL"
                                .to_string(),
                        })
                    }
                },
                JobStatus::Failed => {
                    return Err(TranscodeFailure::runtime(
                        state
                            .error
                            .take()
                            .unwrap_or_else(|| "hosted transcoder reported failure".to_string()),
                    ))
                }
                JobStatus::Pending | JobStatus::Processing => {
                    if started.elapsed() >= self.config.max_wait {
                        return Err(TranscodeFailure::Timeout {
                            after: self.config.max_wait,
                        });
                    }
                    sleep(self.config.poll_interval).await;
                    state = self.poll(&state.id).await?;
                }
            }
        };

        self.download(&url, job).await?;

        tracing::debug!(
            duration_ms = started.elapsed().as_millis() as u64,
            "Hosted transcode finished"
        );
        Ok(())
    }

    async fn probe(&self) -> Result<String, TranscodeFailure> {
        let response = self
            .http_client
            .get(format!("{}/health", self.config.endpoint))
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| TranscodeFailure::Start {
                message: format!("failed to reach hosted transcoder: {}", e),
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(format!("hosted transcoder reachable ({})", status))
        } else {
            Err(TranscodeFailure::runtime(format!(
                "hosted transcoder health check returned {}",
                status
            )))
        }
    }
}
