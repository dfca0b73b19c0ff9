use chrono::Offset;
use std::path::PathBuf;
use std::time::Duration;

pub const STATE_PATH_ENV: &str = "POSE_CHALLENGE_STATE";

#[derive(Debug, Clone)]
pub struct WebcamConfig {
    pub width: u32,
    pub height: u32,
    pub flip: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub tick_rate: Duration,
    pub frame_interval: Duration,
    pub session_duration_secs: u32,
    pub capture_threshold: f32,
    pub capture_dwell: Duration,
    pub library_timeout: Duration,
    pub model_host: String,
    pub webcam: WebcamConfig,
    pub logger_timezone: chrono::FixedOffset,
    pub state_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_rate: Duration::from_secs(1),
            frame_interval: Duration::from_millis(16),
            session_duration_secs: 180,
            capture_threshold: 0.7,
            capture_dwell: Duration::from_millis(3000),
            library_timeout: Duration::from_millis(8000),
            model_host: "teachablemachine.withgoogle.com".to_string(),
            webcam: WebcamConfig {
                width: 400,
                height: 400,
                flip: true,
            },
            logger_timezone: utc(),
            state_path: PathBuf::from("pose_challenge_state.json"),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = std::env::var(STATE_PATH_ENV) {
            if !path.trim().is_empty() {
                config.state_path = PathBuf::from(path);
            }
        }
        config
    }
}

fn utc() -> chrono::FixedOffset {
    chrono::Utc.fix()
}
