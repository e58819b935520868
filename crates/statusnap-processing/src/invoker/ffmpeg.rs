//! Local ffmpeg backend.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use super::{FailureReason, ProgressTracker, TranscodeFailure, TranscodeInvoker, TranscodeJob};

/// Lines of stderr kept for the failure message.
const STDERR_TAIL_LINES: usize = 20;

/// Runs jobs through an ffmpeg binary, one child process per job.
///
/// Children are spawned with `kill_on_drop`, so dropping the request future (for example
/// when the client disconnects) also stops the encoder.
#[derive(Debug, Clone)]
pub struct FfmpegInvoker {
    ffmpeg_path: String,
    timeout: Option<Duration>,
}

impl FfmpegInvoker {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            timeout: None,
        }
    }

    /// Bound the wall-clock time of every invocation.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn base_args() -> Vec<String> {
        [
            "-y",
            "-hide_banner",
            "-loglevel",
            "error",
            "-nostats",
            "-progress",
            "pipe:1",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    /// Full argument list for an encode job.
    pub fn encode_args(job: &TranscodeJob) -> Vec<String> {
        let profile = &job.profile;
        let video = &profile.video;
        let audio = &profile.audio;

        let mut args = Self::base_args();

        // Input seek, so the duration cap below counts from the trim start
        if let Some(start) = job.start_offset_secs() {
            args.extend_from_slice(&["-ss".to_string(), format!("{:.3}", start)]);
        }

        args.extend_from_slice(&[
            "-i".to_string(),
            job.input_path.to_string_lossy().to_string(),
            "-t".to_string(),
            format!("{:.3}", job.output_duration_secs()),
            "-map".to_string(),
            "0:v:0".to_string(),
            "-map".to_string(),
            "0:a:0?".to_string(),
            "-vf".to_string(),
            profile.frame.video_filter(),
            "-c:v".to_string(),
            video.codec.clone(),
            "-preset".to_string(),
            video.preset.clone(),
            "-profile:v".to_string(),
            video.h264_profile.clone(),
        ]);

        if let Some(level) = &video.level {
            args.extend_from_slice(&["-level".to_string(), level.clone()]);
        }

        args.extend_from_slice(&[
            "-crf".to_string(),
            video.crf.to_string(),
            "-b:v".to_string(),
            format!("{}k", video.bitrate_kbps),
            "-maxrate".to_string(),
            format!("{}k", video.maxrate_kbps),
            "-bufsize".to_string(),
            format!("{}k", video.bufsize_kbps),
            "-pix_fmt".to_string(),
            video.pixel_format.clone(),
            "-c:a".to_string(),
            audio.codec.clone(),
            "-b:a".to_string(),
            format!("{}k", audio.bitrate_kbps),
            "-ac".to_string(),
            audio.channels.to_string(),
            "-ar".to_string(),
            audio.sample_rate.to_string(),
        ]);

        if profile.faststart {
            args.extend_from_slice(&["-movflags".to_string(), "+faststart".to_string()]);
        }

        args.extend_from_slice(&[
            "-f".to_string(),
            "mp4".to_string(),
            job.output_path.to_string_lossy().to_string(),
        ]);

        args
    }

    /// Stream-copy remux that only relocates the moov atom.
    pub fn remux_args(input: &Path, output: &Path) -> Vec<String> {
        let mut args = Self::base_args();
        args.extend_from_slice(&[
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-map".to_string(),
            "0".to_string(),
            "-c".to_string(),
            "copy".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            "-f".to_string(),
            "mp4".to_string(),
            output.to_string_lossy().to_string(),
        ]);
        args
    }

    async fn run(
        &self,
        args: &[String],
        expected_secs: f64,
        operation: &str,
    ) -> Result<(), TranscodeFailure> {
        let start = Instant::now();

        let mut child = Command::new(&self.ffmpeg_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TranscodeFailure::Start {
                message: format!("failed to spawn {}: {}", self.ffmpeg_path, e),
            })?;

        tracing::debug!(pid = child.id(), operation, args = ?args, "ffmpeg process started");

        let stdout = child.stdout.take().ok_or_else(|| TranscodeFailure::Start {
            message: "ffmpeg stdout was not captured".to_string(),
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| TranscodeFailure::Start {
            message: "ffmpeg stderr was not captured".to_string(),
        })?;

        // Drain stderr concurrently so ffmpeg never blocks on a full pipe
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).into_owned()
        });

        let wait = async {
            let mut lines = BufReader::new(stdout).lines();
            let mut tracker = ProgressTracker::new(expected_secs);
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(percent) = tracker.update(&line) {
                    tracing::debug!(operation, percent, "Encoding progress");
                }
            }
            child.wait().await
        };

        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.ok(),
            None => Some(wait.await),
        };

        let Some(status) = outcome else {
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, operation, "Failed to kill timed out ffmpeg");
            }
            stderr_task.abort();
            return Err(TranscodeFailure::Timeout {
                after: self.timeout.unwrap_or_default(),
            });
        };

        let stderr_output = stderr_task.await.unwrap_or_default();

        let status = status.map_err(|e| TranscodeFailure::Runtime {
            reason: FailureReason::Other,
            message: format!("failed waiting for ffmpeg: {}", e),
        })?;

        if !status.success() {
            let tail = stderr_tail(&stderr_output);
            return Err(TranscodeFailure::Runtime {
                reason: FailureReason::classify(&tail),
                message: format!("ffmpeg exited with {}: {}", status, tail),
            });
        }

        tracing::debug!(
            operation,
            duration_ms = start.elapsed().as_millis() as u64,
            "ffmpeg process finished"
        );

        Ok(())
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let skip = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[skip..].join("\n")
}

#[async_trait]
impl TranscodeInvoker for FfmpegInvoker {
    fn backend_name(&self) -> &'static str {
        "ffmpeg"
    }

    #[tracing::instrument(skip(self, job), fields(
        process.executable.path = %self.ffmpeg_path,
        attempt = %job.attempt,
        profile = %job.profile.name,
    ))]
    async fn invoke(&self, job: &TranscodeJob) -> Result<(), TranscodeFailure> {
        let args = Self::encode_args(job);
        self.run(&args, job.output_duration_secs(), "encode").await
    }

    #[tracing::instrument(skip(self, input, output), fields(
        process.executable.path = %self.ffmpeg_path,
    ))]
    async fn remux(&self, input: &Path, output: &Path) -> Result<(), TranscodeFailure> {
        let args = Self::remux_args(input, output);
        // Unknown duration: progress percentages are not reported for the copy pass
        self.run(&args, 0.0, "remux").await
    }

    async fn probe(&self) -> Result<String, TranscodeFailure> {
        let output = Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| TranscodeFailure::Start {
                message: format!("failed to spawn {}: {}", self.ffmpeg_path, e),
            })?;

        if !output.status.success() {
            return Err(TranscodeFailure::runtime(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileSelector;
    use statusnap_core::{ProfileName, TrimWindow};

    fn position(args: &[String], flag: &str) -> usize {
        args.iter()
            .position(|a| a == flag)
            .unwrap_or_else(|| panic!("missing {flag}"))
    }

    #[test]
    fn test_encode_args_cap_duration_before_output() {
        let profile = ProfileSelector::default().select(ProfileName::Status);
        let job = TranscodeJob::primary("/up/in.bin", "/out/o.mp4", profile, None);
        let args = FfmpegInvoker::encode_args(&job);

        let t = position(&args, "-t");
        assert_eq!(args[t + 1], "90.000");
        assert!(t > position(&args, "-i"));
        assert_eq!(args.last().map(String::as_str), Some("/out/o.mp4"));
        assert!(!args.contains(&"-ss".to_string()));
    }

    #[test]
    fn test_encode_args_apply_trim_as_input_seek() {
        let profile = ProfileSelector::default().select(ProfileName::Original);
        let trim = TrimWindow::from_bounds(Some(12.5), Some(42.5)).unwrap();
        let job = TranscodeJob::primary("/up/in.bin", "/out/o.mp4", profile, trim);
        let args = FfmpegInvoker::encode_args(&job);

        let ss = position(&args, "-ss");
        assert_eq!(args[ss + 1], "12.500");
        assert!(ss < position(&args, "-i"));
        assert_eq!(args[position(&args, "-t") + 1], "30.000");
    }

    #[test]
    fn test_encode_args_carry_profile_parameters() {
        let profile = ProfileSelector::default().select(ProfileName::Status);
        let job = TranscodeJob::primary("/in", "/out.mp4", profile, None);
        let args = FfmpegInvoker::encode_args(&job);

        assert_eq!(args[position(&args, "-c:v") + 1], "libx264");
        assert_eq!(args[position(&args, "-profile:v") + 1], "baseline");
        assert_eq!(args[position(&args, "-level") + 1], "3.1");
        assert_eq!(args[position(&args, "-maxrate") + 1], "2000k");
        assert_eq!(args[position(&args, "-c:a") + 1], "aac");
        assert_eq!(args[position(&args, "-ar") + 1], "44100");
        assert_eq!(args[position(&args, "-movflags") + 1], "+faststart");
        assert!(args[position(&args, "-vf") + 1].contains("pad=1080:1920"));
    }

    #[test]
    fn test_fallback_args_switch_audio_codec() {
        let profile = ProfileSelector::default().select(ProfileName::Status);
        let job = TranscodeJob::primary("/in", "/out.mp4", profile, None).to_fallback();
        let args = FfmpegInvoker::encode_args(&job);

        assert_eq!(args[position(&args, "-c:a") + 1], "libmp3lame");
        assert_eq!(args[position(&args, "-preset") + 1], "slow");
        assert!(!args.contains(&"-level".to_string()));
    }

    #[test]
    fn test_remux_args_never_reencode() {
        let args = FfmpegInvoker::remux_args(Path::new("/w/a.mp4"), Path::new("/o/b.mp4"));
        assert_eq!(args[position(&args, "-c") + 1], "copy");
        assert!(!args.contains(&"-c:v".to_string()));
        assert!(!args.contains(&"-c:a".to_string()));
        assert_eq!(args[position(&args, "-movflags") + 1], "+faststart");
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr: String = (0..50).map(|i| format!("line {i}\n")).collect();
        let tail = stderr_tail(&stderr);
        assert!(tail.starts_with("line 30"));
        assert!(tail.ends_with("line 49"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_start_failure() {
        let invoker = FfmpegInvoker::new("/nonexistent/statusnap/ffmpeg");
        let profile = ProfileSelector::default().select(ProfileName::Original);
        let job = TranscodeJob::primary("/in", "/out.mp4", profile, None);

        let err = invoker.invoke(&job).await.unwrap_err();
        assert!(matches!(err, TranscodeFailure::Start { .. }));
        assert!(!err.is_retryable());

        let err = invoker.probe().await.unwrap_err();
        assert!(matches!(err, TranscodeFailure::Start { .. }));
    }
}
