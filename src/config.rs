use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::poller::PollPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "video_api_key", default)]
    pub video_key: String,
    #[serde(rename = "video_api_host", default = "default_video_host")]
    pub video_host: String,
    #[serde(default = "default_submit_path")]
    pub submit_path: String,
    #[serde(default = "default_status_path")]
    pub status_path: String,
    #[serde(default = "default_video_model")]
    pub video_model: String,

    #[serde(rename = "open_api_key", default)]
    pub openai_key: String,
    #[serde(default = "default_openai_base")]
    pub openai_base: String,
    #[serde(default = "default_script_model")]
    pub script_model: String,

    #[serde(rename = "elevenlabs_api_key", default)]
    pub elevenlabs_key: String,
    #[serde(default = "default_voice_id")]
    pub eleven_voice_id: String,
    #[serde(default = "default_model_id")]
    pub eleven_model_id: String,
    /// Language name (lower-case) to voice id.
    #[serde(default)]
    pub voices: HashMap<String, String>,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_poll_attempts")]
    pub poll_max_attempts: u32,
    #[serde(default = "default_poll_errors")]
    pub poll_max_consecutive_errors: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_history_file")]
    pub history_file: PathBuf,
    #[serde(default = "default_users_file")]
    pub users_file: PathBuf,

    #[serde(default)]
    pub session_secret: Option<String>,
    #[serde(default)]
    pub require_login: bool,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_hours: u64,
}

fn default_video_host() -> String {
    "https://grsaiapi.com".to_string()
}

fn default_submit_path() -> String {
    "/v1/video/sora-video".to_string()
}

fn default_status_path() -> String {
    "/v1/draw/result".to_string()
}

fn default_video_model() -> String {
    "sora-2".to_string()
}

fn default_openai_base() -> String {
    "https://api.openai.com".to_string()
}

fn default_script_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_voice_id() -> String {
    "JBFqnCBsd6RMkjVDRZzb".to_string()
}

fn default_model_id() -> String {
    "eleven_multilingual_v2".to_string()
}

fn default_poll_interval() -> u64 {
    4
}

fn default_poll_attempts() -> u32 {
    120
}

fn default_poll_errors() -> u32 {
    3
}

fn default_request_timeout() -> u64 {
    30
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("temp_files")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output_videos")
}

fn default_history_file() -> PathBuf {
    PathBuf::from("history.json")
}

fn default_users_file() -> PathBuf {
    PathBuf::from("users.json")
}

fn default_session_ttl() -> u64 {
    720
}

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        dotenvy::dotenv().ok();

        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
        let mut config = Self::from_json(&content)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse config JSON")
    }

    /// Environment variables win over the file.
    pub fn apply_env(&mut self) {
        let overrides: [(&str, &mut String); 4] = [
            ("VIDEO_API_KEY", &mut self.video_key),
            ("VIDEO_API_HOST", &mut self.video_host),
            ("OPENAI_API_KEY", &mut self.openai_key),
            ("ELEVENLABS_API_KEY", &mut self.elevenlabs_key),
        ];
        for (var, field) in overrides {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    *field = value;
                }
            }
        }
        if let Ok(secret) = std::env::var("SESSION_SECRET") {
            if !secret.is_empty() {
                self.session_secret = Some(secret);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.video_key.is_empty() {
            anyhow::bail!("config.json: video_api_key missing");
        }
        if self.poll_max_attempts == 0 {
            anyhow::bail!("config.json: poll_max_attempts must be at least 1");
        }
        if self.require_login && self.session_secret.as_deref().unwrap_or("").is_empty() {
            anyhow::bail!("config.json: require_login needs session_secret");
        }
        Ok(())
    }

    pub fn scripting_enabled(&self) -> bool {
        !self.openai_key.is_empty()
    }

    pub fn narration_enabled(&self) -> bool {
        !self.elevenlabs_key.is_empty()
    }

    pub fn voice_for(&self, language: &str) -> &str {
        self.voices
            .get(&language.to_lowercase())
            .map(String::as_str)
            .unwrap_or(&self.eleven_voice_id)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_hours * 3600)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.poll_interval_secs),
            max_attempts: self.poll_max_attempts,
            max_consecutive_errors: self.poll_max_consecutive_errors,
        }
    }
}
