//! Job submission: request payload and the submit call.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::str::FromStr;

use crate::api::video::VideoClient;
use crate::error::{JobError, JobResult};
use crate::imaging::EncodedImage;
use crate::job::Job;
use crate::logok;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AspectRatio {
    #[default]
    Portrait,
    Landscape,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Portrait => "9:16",
            AspectRatio::Landscape => "16:9",
        }
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "portrait" | "vertical" | "9:16" => Ok(AspectRatio::Portrait),
            "landscape" | "horizontal" | "16:9" => Ok(AspectRatio::Landscape),
            other => Err(format!("unknown aspect ratio: {other}")),
        }
    }
}

/// Quality tier, sent to the vendor as `size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    #[default]
    Standard,
    High,
}

impl Quality {
    pub fn as_size(&self) -> &'static str {
        match self {
            Quality::Standard => "small",
            Quality::High => "large",
        }
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" | "small" | "sd" => Ok(Quality::Standard),
            "high" | "large" | "hd" => Ok(Quality::High),
            other => Err(format!("unknown quality: {other}")),
        }
    }
}

/// Everything the generation endpoint needs for one job.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub prompt: String,
    pub model: String,
    pub aspect_ratio: AspectRatio,
    pub duration_secs: u32,
    pub quality: Quality,
    pub image: Option<EncodedImage>,
}

impl SubmitRequest {
    pub fn validate(&self) -> JobResult<()> {
        if self.prompt.trim().is_empty() {
            return Err(JobError::invalid("prompt is empty"));
        }
        if self.model.trim().is_empty() {
            return Err(JobError::invalid("model is empty"));
        }
        if self.duration_secs == 0 {
            return Err(JobError::invalid("duration must be positive"));
        }
        Ok(())
    }

    /// Wire payload. The encoded image is forwarded as-is.
    pub fn payload(&self) -> Value {
        let mut payload = json!({
            "model": self.model,
            "prompt": self.prompt,
            "aspect_ratio": self.aspect_ratio.as_str(),
            "duration": self.duration_secs,
            "size": self.quality.as_size(),
            "expand_prompt": true,
        });
        if let Some(image) = &self.image {
            payload["image"] = Value::String(image.as_str().to_string());
        }
        payload
    }
}

/// Submits jobs to the video vendor.
#[derive(Debug, Clone)]
pub struct JobSubmitter {
    client: VideoClient,
}

impl JobSubmitter {
    pub fn new(client: VideoClient) -> Self {
        Self { client }
    }

    /// Send the request and return a freshly submitted [`Job`].
    pub async fn submit(&self, request: &SubmitRequest) -> JobResult<Job> {
        request.validate()?;
        let job_id = self.client.submit(&request.payload()).await?;
        logok(format!("Job submitted: {}", job_id));
        Ok(Job::new(job_id, request.prompt.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(image: Option<EncodedImage>) -> SubmitRequest {
        SubmitRequest {
            prompt: "Commercial product video for Mug.".to_string(),
            model: "sora-2".to_string(),
            aspect_ratio: AspectRatio::Landscape,
            duration_secs: 10,
            quality: Quality::High,
            image,
        }
    }

    #[test]
    fn test_payload_fields() {
        let payload = request(None).payload();
        assert_eq!(payload["model"], "sora-2");
        assert_eq!(payload["aspect_ratio"], "16:9");
        assert_eq!(payload["duration"], 10);
        assert_eq!(payload["size"], "large");
        assert_eq!(payload["expand_prompt"], true);
        assert!(payload.get("image").is_none());
    }

    #[test]
    fn test_payload_carries_image_verbatim() {
        let bytes: Vec<u8> = (0..=255).collect();
        let image = EncodedImage::from_jpeg(&bytes);
        let payload = request(Some(image.clone())).payload();
        assert_eq!(payload["image"].as_str(), Some(image.as_str()));

        let round = EncodedImage::from_jpeg(&bytes);
        assert_eq!(round.decode(), Some(bytes));
    }

    #[test]
    fn test_validation() {
        let mut bad = request(None);
        bad.duration_secs = 0;
        assert!(matches!(bad.validate(), Err(JobError::InvalidRequest(_))));
        assert!(request(None).validate().is_ok());
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("9:16".parse::<AspectRatio>().unwrap(), AspectRatio::Portrait);
        assert_eq!("HD".parse::<Quality>().unwrap(), Quality::High);
        assert!("square".parse::<AspectRatio>().is_err());
    }
}
