//! Configuration module
//!
//! Settings are read from the environment (and a `.env` file when present). Every value
//! has a default so a bare `statusnap-api` starts a local-ffmpeg service on port 3000.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// Common constants
const SERVER_PORT: u16 = 3000;
const MAX_UPLOAD_SIZE_MB: u64 = 100;
const MAX_OUTPUT_DURATION_SECS: u32 = 90;
const STATUS_VIDEO_BITRATE_KBPS: u32 = 1500;
const ORIGINAL_VIDEO_BITRATE_KBPS: u32 = 1000;
const MIN_OUTPUT_BYTES: u64 = 1000;
const SIZE_WARNING_MB: u64 = 16;
const ENCODE_TIMEOUT_SECS: u64 = 600;
const MAX_CONCURRENT_TRANSCODES: usize = 2;
const DOWNLOAD_GRACE_SECS: u64 = 30;
const OUTPUT_RETENTION_SECS: u64 = 3600;
const CLEANUP_INTERVAL_SECS: u64 = 600;
const HOSTED_TRANSCODE_MAX_WAIT_SECS: u64 = 300;

/// Which collaborator performs the actual transcoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeBackend {
    /// Spawn a local ffmpeg binary.
    Local,
    /// Delegate to a hosted transcoding service over HTTP.
    Hosted,
}

impl FromStr for TranscodeBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" | "ffmpeg" => Ok(TranscodeBackend::Local),
            "hosted" | "cloud" => Ok(TranscodeBackend::Hosted),
            other => Err(anyhow::anyhow!(
                "TRANSCODE_BACKEND must be 'local' or 'hosted', got '{}'",
                other
            )),
        }
    }
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub environment: String,
    pub max_upload_bytes: u64,
    // Directories
    pub upload_dir: PathBuf,
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
    // Transcoding backend
    pub transcode_backend: TranscodeBackend,
    pub ffmpeg_path: String,
    pub hosted_transcode_url: Option<String>,
    pub hosted_transcode_api_key: Option<String>,
    pub hosted_transcode_max_wait_secs: u64,
    // Encoding policy
    pub max_output_duration_secs: u32,
    pub status_video_bitrate_kbps: u32,
    pub original_video_bitrate_kbps: u32,
    pub min_output_bytes: u64,
    pub size_warning_bytes: u64,
    /// 0 disables the per-encode timeout.
    pub encode_timeout_secs: u64,
    pub faststart_remux: bool,
    /// 0 disables the concurrency limit.
    pub max_concurrent_transcodes: usize,
    // Delivery and cleanup
    pub download_grace_secs: u64,
    pub output_retention_secs: u64,
    /// 0 disables the background sweeper.
    pub cleanup_interval_secs: u64,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let transcode_backend = match env_opt("TRANSCODE_BACKEND") {
            Some(value) => value.parse()?,
            None => TranscodeBackend::Local,
        };

        let config = Config {
            server_port: env_or("PORT", SERVER_PORT),
            environment,
            max_upload_bytes: env_or("MAX_UPLOAD_SIZE_MB", MAX_UPLOAD_SIZE_MB) * 1024 * 1024,
            upload_dir: PathBuf::from(env_opt("UPLOAD_DIR").unwrap_or_else(|| "uploads".into())),
            work_dir: PathBuf::from(env_opt("WORK_DIR").unwrap_or_else(|| "work".into())),
            output_dir: PathBuf::from(env_opt("OUTPUT_DIR").unwrap_or_else(|| "output".into())),
            transcode_backend,
            ffmpeg_path: env_opt("FFMPEG_PATH").unwrap_or_else(|| "ffmpeg".to_string()),
            hosted_transcode_url: env_opt("HOSTED_TRANSCODE_URL"),
            hosted_transcode_api_key: env_opt("HOSTED_TRANSCODE_API_KEY"),
            hosted_transcode_max_wait_secs: env_or(
                "HOSTED_TRANSCODE_MAX_WAIT_SECS",
                HOSTED_TRANSCODE_MAX_WAIT_SECS,
            ),
            max_output_duration_secs: env_or("MAX_OUTPUT_DURATION_SECS", MAX_OUTPUT_DURATION_SECS),
            status_video_bitrate_kbps: env_or(
                "STATUS_VIDEO_BITRATE_KBPS",
                STATUS_VIDEO_BITRATE_KBPS,
            ),
            original_video_bitrate_kbps: env_or(
                "ORIGINAL_VIDEO_BITRATE_KBPS",
                ORIGINAL_VIDEO_BITRATE_KBPS,
            ),
            min_output_bytes: env_or("MIN_OUTPUT_BYTES", MIN_OUTPUT_BYTES),
            size_warning_bytes: env_or("SIZE_WARNING_MB", SIZE_WARNING_MB) * 1024 * 1024,
            encode_timeout_secs: env_or("ENCODE_TIMEOUT_SECS", ENCODE_TIMEOUT_SECS),
            faststart_remux: env_bool("FASTSTART_REMUX", false),
            max_concurrent_transcodes: env_or(
                "MAX_CONCURRENT_TRANSCODES",
                MAX_CONCURRENT_TRANSCODES,
            ),
            download_grace_secs: env_or("DOWNLOAD_GRACE_SECS", DOWNLOAD_GRACE_SECS),
            output_retention_secs: env_or("OUTPUT_RETENTION_SECS", OUTPUT_RETENTION_SECS),
            cleanup_interval_secs: env_or("CLEANUP_INTERVAL_SECS", CLEANUP_INTERVAL_SECS),
        };

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.max_upload_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_UPLOAD_SIZE_MB must be greater than 0"));
        }

        if self.max_output_duration_secs == 0 {
            return Err(anyhow::anyhow!(
                "MAX_OUTPUT_DURATION_SECS must be greater than 0"
            ));
        }

        if self.status_video_bitrate_kbps == 0 || self.original_video_bitrate_kbps == 0 {
            return Err(anyhow::anyhow!("Video bitrates must be greater than 0"));
        }

        if self.transcode_backend == TranscodeBackend::Local && self.ffmpeg_path.is_empty() {
            return Err(anyhow::anyhow!("FFMPEG_PATH must not be empty"));
        }

        if self.transcode_backend == TranscodeBackend::Hosted {
            match self.hosted_transcode_url.as_deref() {
                Some(url) if url.starts_with("http://") || url.starts_with("https://") => {}
                Some(_) => {
                    return Err(anyhow::anyhow!(
                        "HOSTED_TRANSCODE_URL must be an http(s) URL"
                    ))
                }
                None => {
                    return Err(anyhow::anyhow!(
                        "TRANSCODE_BACKEND=hosted requires HOSTED_TRANSCODE_URL"
                    ))
                }
            }
            if self.hosted_transcode_api_key.is_none() {
                return Err(anyhow::anyhow!(
                    "TRANSCODE_BACKEND=hosted requires HOSTED_TRANSCODE_API_KEY"
                ));
            }
        }

        // In-flight files are held against the sweeper; delivered artifacts are not
        if self.cleanup_interval_secs > 0 && self.output_retention_secs <= self.download_grace_secs {
            return Err(anyhow::anyhow!(
                "OUTPUT_RETENTION_SECS must be greater than DOWNLOAD_GRACE_SECS"
            ));
        }

        if self.faststart_remux && self.transcode_backend == TranscodeBackend::Hosted {
            tracing::warn!("FASTSTART_REMUX is ignored with the hosted transcoding backend");
        }

        Ok(())
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn max_upload_mb(&self) -> u64 {
        self.max_upload_bytes / 1024 / 1024
    }

    pub fn encode_timeout(&self) -> Option<Duration> {
        (self.encode_timeout_secs > 0).then(|| Duration::from_secs(self.encode_timeout_secs))
    }

    pub fn download_grace(&self) -> Duration {
        Duration::from_secs(self.download_grace_secs)
    }

    pub fn output_retention(&self) -> Duration {
        Duration::from_secs(self.output_retention_secs)
    }

    /// Whether the remux pass can run with the selected backend.
    pub fn remux_enabled(&self) -> bool {
        self.faststart_remux && self.transcode_backend == TranscodeBackend::Local
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: SERVER_PORT,
            environment: "development".to_string(),
            max_upload_bytes: MAX_UPLOAD_SIZE_MB * 1024 * 1024,
            upload_dir: PathBuf::from("uploads"),
            work_dir: PathBuf::from("work"),
            output_dir: PathBuf::from("output"),
            transcode_backend: TranscodeBackend::Local,
            ffmpeg_path: "ffmpeg".to_string(),
            hosted_transcode_url: None,
            hosted_transcode_api_key: None,
            hosted_transcode_max_wait_secs: HOSTED_TRANSCODE_MAX_WAIT_SECS,
            max_output_duration_secs: MAX_OUTPUT_DURATION_SECS,
            status_video_bitrate_kbps: STATUS_VIDEO_BITRATE_KBPS,
            original_video_bitrate_kbps: ORIGINAL_VIDEO_BITRATE_KBPS,
            min_output_bytes: MIN_OUTPUT_BYTES,
            size_warning_bytes: SIZE_WARNING_MB * 1024 * 1024,
            encode_timeout_secs: ENCODE_TIMEOUT_SECS,
            faststart_remux: false,
            max_concurrent_transcodes: MAX_CONCURRENT_TRANSCODES,
            download_grace_secs: DOWNLOAD_GRACE_SECS,
            output_retention_secs: OUTPUT_RETENTION_SECS,
            cleanup_interval_secs: CLEANUP_INTERVAL_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_upload_mb(), 100);
        assert_eq!(config.max_output_duration_secs, 90);
        assert_eq!(config.size_warning_bytes, 16 * 1024 * 1024);
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("local".parse::<TranscodeBackend>().unwrap(), TranscodeBackend::Local);
        assert_eq!(" Hosted ".parse::<TranscodeBackend>().unwrap(), TranscodeBackend::Hosted);
        assert!("s3".parse::<TranscodeBackend>().is_err());
    }

    #[test]
    fn test_hosted_backend_requires_endpoint_and_key() {
        let mut config = Config {
            transcode_backend: TranscodeBackend::Hosted,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        config.hosted_transcode_url = Some("ftp://media.example.com".to_string());
        config.hosted_transcode_api_key = Some("key".to_string());
        assert!(config.validate().is_err());

        config.hosted_transcode_url = Some("https://media.example.com/v1".to_string());
        assert!(config.validate().is_ok());
        assert!(!config.remux_enabled());
    }

    #[test]
    fn test_retention_must_outlast_download_grace() {
        let mut config = Config {
            output_retention_secs: 30,
            download_grace_secs: 30,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        config.cleanup_interval_secs = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_disables_it() {
        let config = Config {
            encode_timeout_secs: 0,
            ..Config::default()
        };
        assert!(config.encode_timeout().is_none());
    }
}
