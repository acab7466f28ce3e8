use rollcall_core::LivenessConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Runtime configuration: TOML file, then `ROLLCALL_*` environment overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// V4L2 device path.
    pub camera_device: String,
    pub camera_width: u32,
    pub camera_height: u32,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Directory holding every persisted document, photos and backups.
    pub data_dir: PathBuf,

    /// Minimum seconds between two accepted scans of the same person.
    pub cooldown_secs: u64,
    pub ear_threshold: f32,
    pub head_tilt_degrees: f32,
    pub enroll_blink_frames: u32,
    pub live_blink_frames: u32,
    /// Run recognition on every Nth new frame.
    pub recognition_interval: u32,
    /// Integer downscale factor applied before recognition.
    pub downscale: u32,
    /// Maximum encoding distance accepted as a match (inclusive).
    pub match_tolerance: f32,

    pub camera_poll_ms: u64,
    pub worker_idle_ms: u64,
    pub display_interval_ms: u64,
    pub join_timeout_ms: u64,
    /// Frames discarded after the camera opens (AGC/AE settling).
    pub warmup_frames: usize,
    /// Ring the terminal bell on notable events.
    pub sound: bool,
    /// If set, the scan display writes an annotated JPEG here.
    pub preview_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let liveness = LivenessConfig::default();
        Self {
            camera_device: "/dev/video0".to_string(),
            camera_width: 640,
            camera_height: 480,
            model_dir: rollcall_core::default_model_dir(),
            data_dir: default_data_dir(),
            cooldown_secs: 5,
            ear_threshold: liveness.ear_threshold,
            head_tilt_degrees: liveness.head_tilt_degrees,
            enroll_blink_frames: liveness.enroll_blink_frames,
            live_blink_frames: liveness.live_blink_frames,
            recognition_interval: 5,
            downscale: 4,
            match_tolerance: 1.1,
            camera_poll_ms: 10,
            worker_idle_ms: 5,
            display_interval_ms: 30,
            join_timeout_ms: 2000,
            warmup_frames: 4,
            sound: true,
            preview_path: None,
        }
    }
}

impl Config {
    /// Load `path` if given (a missing file is an error), else defaults, then
    /// apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                toml::from_str(&text).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            None => Config::default(),
        };
        Ok(base.with_env_overrides())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("ROLLCALL_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        if let Ok(v) = std::env::var("ROLLCALL_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("ROLLCALL_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("ROLLCALL_PREVIEW_PATH") {
            self.preview_path = Some(PathBuf::from(v));
        }
        self.camera_width = env_u32("ROLLCALL_CAMERA_WIDTH", self.camera_width);
        self.camera_height = env_u32("ROLLCALL_CAMERA_HEIGHT", self.camera_height);
        self.cooldown_secs = env_u64("ROLLCALL_COOLDOWN_SECS", self.cooldown_secs);
        self.ear_threshold = env_f32("ROLLCALL_EAR_THRESHOLD", self.ear_threshold);
        self.head_tilt_degrees = env_f32("ROLLCALL_HEAD_TILT_DEGREES", self.head_tilt_degrees);
        self.enroll_blink_frames = env_u32("ROLLCALL_ENROLL_BLINK_FRAMES", self.enroll_blink_frames);
        self.live_blink_frames = env_u32("ROLLCALL_LIVE_BLINK_FRAMES", self.live_blink_frames);
        self.recognition_interval = env_u32("ROLLCALL_RECOGNITION_INTERVAL", self.recognition_interval);
        self.downscale = env_u32("ROLLCALL_DOWNSCALE", self.downscale);
        self.match_tolerance = env_f32("ROLLCALL_MATCH_TOLERANCE", self.match_tolerance);
        self.camera_poll_ms = env_u64("ROLLCALL_CAMERA_POLL_MS", self.camera_poll_ms);
        self.worker_idle_ms = env_u64("ROLLCALL_WORKER_IDLE_MS", self.worker_idle_ms);
        self.display_interval_ms = env_u64("ROLLCALL_DISPLAY_INTERVAL_MS", self.display_interval_ms);
        self.join_timeout_ms = env_u64("ROLLCALL_JOIN_TIMEOUT_MS", self.join_timeout_ms);
        self.warmup_frames = env_usize("ROLLCALL_WARMUP_FRAMES", self.warmup_frames);
        self.sound = std::env::var("ROLLCALL_SOUND")
            .map(|v| v != "0")
            .unwrap_or(self.sound);
        self
    }

    pub fn liveness(&self) -> LivenessConfig {
        LivenessConfig {
            ear_threshold: self.ear_threshold,
            head_tilt_degrees: self.head_tilt_degrees,
            enroll_blink_frames: self.enroll_blink_frames,
            live_blink_frames: self.live_blink_frames,
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn display_interval(&self) -> Duration {
        Duration::from_millis(self.display_interval_ms.max(1))
    }
}

/// `$XDG_DATA_HOME/rollcall`, falling back to `~/.local/share/rollcall`.
fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
