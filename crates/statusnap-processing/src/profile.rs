//! Encoding profiles: the named parameter bundles handed to the encoder.
//!
//! Two canonical profiles exist. `status` targets a padded 9:16 portrait frame for
//! WhatsApp statuses, `original` keeps the source aspect ratio. Both share the duration
//! cap, baseline H.264 and fixed-rate stereo audio. Numeric values come from
//! [`ProfileSettings`] so they can be tuned without touching the policy.

use serde::Serialize;
use statusnap_core::{Config, ProfileName};

/// Status frames are portrait 9:16.
const STATUS_WIDTH: u32 = 1080;
const STATUS_HEIGHT: u32 = 1920;
const AUDIO_SAMPLE_RATE: u32 = 44_100;
const AUDIO_CHANNELS: u32 = 2;

/// How the encoder shapes the video frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FramePolicy {
    /// Fit inside `width`x`height`, then pad with black to exactly that size.
    PadTo { width: u32, height: u32 },
    /// Keep the source aspect ratio, rounding dimensions down to even numbers.
    PreserveAspectEven,
}

impl FramePolicy {
    /// ffmpeg `-vf` filter chain for this policy.
    pub fn video_filter(&self) -> String {
        match self {
            FramePolicy::PadTo { width, height } => format!(
                "scale={w}:{h}:force_original_aspect_ratio=decrease:force_divisible_by=2,\
                 pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:black,setsar=1",
                w = width,
                h = height
            ),
            FramePolicy::PreserveAspectEven => "scale=trunc(iw/2)*2:trunc(ih/2)*2".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoParams {
    pub codec: String,
    pub preset: String,
    pub h264_profile: String,
    pub level: Option<String>,
    pub crf: u8,
    pub bitrate_kbps: u32,
    pub maxrate_kbps: u32,
    pub bufsize_kbps: u32,
    pub pixel_format: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioParams {
    pub codec: String,
    pub bitrate_kbps: u32,
    pub channels: u32,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodingProfile {
    pub name: ProfileName,
    pub frame: FramePolicy,
    pub video: VideoParams,
    pub audio: AudioParams,
    /// Move the moov atom to the front for progressive playback.
    pub faststart: bool,
    pub max_duration_secs: u32,
}

impl EncodingProfile {
    /// Slower, broader-compatibility parameters used after an audio codec failure.
    ///
    /// Keeps the frame policy and duration cap, swaps AAC for MP3 and raises the
    /// bitrate ceiling.
    pub fn fallback(&self) -> EncodingProfile {
        EncodingProfile {
            name: self.name,
            frame: self.frame,
            video: VideoParams {
                codec: "libx264".to_string(),
                preset: "slow".to_string(),
                h264_profile: "high".to_string(),
                level: None,
                crf: 18,
                bitrate_kbps: 8000,
                maxrate_kbps: 9000,
                bufsize_kbps: 18000,
                pixel_format: self.video.pixel_format.clone(),
            },
            audio: AudioParams {
                codec: "libmp3lame".to_string(),
                bitrate_kbps: 128,
                channels: self.audio.channels,
                sample_rate: self.audio.sample_rate,
            },
            faststart: self.faststart,
            max_duration_secs: self.max_duration_secs,
        }
    }
}

/// Tunable numbers behind the two canonical profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileSettings {
    pub max_duration_secs: u32,
    pub status_video_bitrate_kbps: u32,
    pub original_video_bitrate_kbps: u32,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            max_duration_secs: 90,
            status_video_bitrate_kbps: 1500,
            original_video_bitrate_kbps: 1000,
        }
    }
}

impl From<&Config> for ProfileSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_duration_secs: config.max_output_duration_secs,
            status_video_bitrate_kbps: config.status_video_bitrate_kbps,
            original_video_bitrate_kbps: config.original_video_bitrate_kbps,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProfileSelector {
    settings: ProfileSettings,
}

impl ProfileSelector {
    pub fn new(settings: ProfileSettings) -> Self {
        Self { settings }
    }

    /// Resolve a raw profile name; unknown or missing names select `original`.
    pub fn select_by_name(&self, name: Option<&str>) -> EncodingProfile {
        self.select(ProfileName::from_request(name))
    }

    pub fn select(&self, name: ProfileName) -> EncodingProfile {
        match name {
            ProfileName::Status => self.status(),
            ProfileName::Original => self.original(),
        }
    }

    fn status(&self) -> EncodingProfile {
        let bitrate = self.settings.status_video_bitrate_kbps;
        // maxrate and bufsize scale with the bitrate (1500k -> 2000k / 4000k)
        let maxrate = bitrate * 4 / 3;
        EncodingProfile {
            name: ProfileName::Status,
            frame: FramePolicy::PadTo {
                width: STATUS_WIDTH,
                height: STATUS_HEIGHT,
            },
            video: baseline_video(23, bitrate, maxrate, maxrate * 2),
            audio: stereo_aac(128),
            faststart: true,
            max_duration_secs: self.settings.max_duration_secs,
        }
    }

    fn original(&self) -> EncodingProfile {
        let bitrate = self.settings.original_video_bitrate_kbps;
        let maxrate = bitrate * 3 / 2;
        EncodingProfile {
            name: ProfileName::Original,
            frame: FramePolicy::PreserveAspectEven,
            video: baseline_video(25, bitrate, maxrate, maxrate * 2),
            audio: stereo_aac(96),
            faststart: true,
            max_duration_secs: self.settings.max_duration_secs,
        }
    }
}

fn baseline_video(crf: u8, bitrate_kbps: u32, maxrate_kbps: u32, bufsize_kbps: u32) -> VideoParams {
    VideoParams {
        codec: "libx264".to_string(),
        preset: "fast".to_string(),
        h264_profile: "baseline".to_string(),
        level: Some("3.1".to_string()),
        crf,
        bitrate_kbps,
        maxrate_kbps,
        bufsize_kbps,
        pixel_format: "yuv420p".to_string(),
    }
}

fn stereo_aac(bitrate_kbps: u32) -> AudioParams {
    AudioParams {
        codec: "aac".to_string(),
        bitrate_kbps,
        channels: AUDIO_CHANNELS,
        sample_rate: AUDIO_SAMPLE_RATE,
    }
}
