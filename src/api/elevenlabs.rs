use crate::config::Config;
use crate::error::{JobError, JobResult};
use crate::logw;
use crate::postprocess::SpeechSynthesizer;
use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use tokio::fs;

/// ElevenLabs text-to-speech engine.
#[derive(Debug, Clone)]
pub struct ElevenLabs {
    client: Client,
    api_key: String,
    model_id: String,
    base_url: String,
}

impl ElevenLabs {
    pub fn new(client: Client, cfg: &Config) -> Self {
        Self {
            client,
            api_key: cfg.elevenlabs_key.clone(),
            model_id: cfg.eleven_model_id.clone(),
            base_url: "https://api.elevenlabs.io".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabs {
    async fn synthesize(&self, text: &str, voice: &str, out_mp3_path: &Path) -> JobResult<()> {
        let url = format!(
            "{}/v1/text-to-speech/{}?output_format=mp3_44100_128",
            self.base_url.trim_end_matches('/'),
            voice
        );

        let body = serde_json::json!({
            "text": text,
            "model_id": self.model_id,
        });

        let resp = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .timeout(std::time::Duration::from_secs(300))
            .send()
            .await?;

        if !resp.status().is_success() {
            let code = resp.status().as_u16();
            let raw = resp.text().await.unwrap_or_default();
            logw(format!("ElevenLabs TTS failed HTTP {}", code));
            return Err(JobError::protocol(format!("ElevenLabs HTTP {}", code), raw));
        }

        let bytes = resp.bytes().await?;
        if bytes.is_empty() {
            return Err(JobError::protocol("ElevenLabs returned empty audio", ""));
        }
        if let Some(parent) = out_mp3_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(out_mp3_path, &bytes).await?;
        Ok(())
    }
}
