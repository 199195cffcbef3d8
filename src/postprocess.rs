//! Artifact download, narration synthesis and the final merge.
//!
//! Each stage is checkpointed in [`PostProcessOutcome`]. A failing stage
//! becomes a warning and never discards what earlier stages produced, so the
//! unmerged artifact is always presentable.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{JobError, JobResult};
use crate::ffmpeg::MergePlan;
use crate::{logi, logok, logw};

/// External text-to-speech engine.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Write spoken `text` in `voice` to `out_path`.
    async fn synthesize(&self, text: &str, voice: &str, out_path: &Path) -> JobResult<()>;
}

/// Media probing and audio/video muxing.
#[async_trait]
pub trait Muxer: Send + Sync {
    async fn duration_secs(&self, path: &Path) -> JobResult<f64>;

    async fn merge(
        &self,
        video_in: &Path,
        narration_in: &Path,
        plan: &MergePlan,
        out_mp4: &Path,
    ) -> JobResult<()>;
}

/// Best result available after post-processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "location", rename_all = "snake_case")]
pub enum FinalOutput {
    Merged(PathBuf),
    Artifact(PathBuf),
    Remote(String),
}

impl std::fmt::Display for FinalOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FinalOutput::Merged(p) | FinalOutput::Artifact(p) => write!(f, "{}", p.display()),
            FinalOutput::Remote(url) => write!(f, "{}", url),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PostProcessOutcome {
    pub artifact_url: String,
    pub local_artifact: Option<PathBuf>,
    pub narration_audio: Option<PathBuf>,
    pub merged: Option<PathBuf>,
    pub merge_plan: Option<MergePlanSummary>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MergePlanSummary {
    pub output_secs: f64,
    pub narration_secs: f64,
    pub truncated: bool,
}

impl From<MergePlan> for MergePlanSummary {
    fn from(plan: MergePlan) -> Self {
        Self {
            output_secs: plan.output_secs,
            narration_secs: plan.narration_secs,
            truncated: plan.truncated,
        }
    }
}

impl PostProcessOutcome {
    fn artifact_only(artifact_url: &str) -> Self {
        Self {
            artifact_url: artifact_url.to_string(),
            ..Self::default()
        }
    }

    fn warn(&mut self, message: String) {
        logw(&message);
        self.warnings.push(message);
    }

    /// Merged file, else the downloaded artifact, else the remote URL.
    pub fn best_output(&self) -> FinalOutput {
        if let Some(merged) = &self.merged {
            FinalOutput::Merged(merged.clone())
        } else if let Some(local) = &self.local_artifact {
            FinalOutput::Artifact(local.clone())
        } else {
            FinalOutput::Remote(self.artifact_url.clone())
        }
    }
}

pub struct PostProcessor {
    client: Client,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    muxer: Arc<dyn Muxer>,
    work_dir: PathBuf,
    output_dir: PathBuf,
    fetch_timeout: Duration,
}

impl PostProcessor {
    pub fn new(
        client: Client,
        synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
        muxer: Arc<dyn Muxer>,
        work_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            synthesizer,
            muxer,
            work_dir: work_dir.into(),
            output_dir: output_dir.into(),
            fetch_timeout: Duration::from_secs(300),
        }
    }

    pub fn can_narrate(&self) -> bool {
        self.synthesizer.is_some()
    }

    /// Download the artifact to `out_path`, streaming the body to disk.
    pub async fn fetch_artifact(&self, url: &str, out_path: &Path) -> JobResult<()> {
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let resp = self
            .client
            .get(url)
            .timeout(self.fetch_timeout)
            .send()
            .await?
            .error_for_status()?;

        let mut file = fs::File::create(out_path).await?;
        let mut stream = resp.bytes_stream();
        let mut written = 0usize;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            written += chunk.len();
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        if written == 0 {
            return Err(JobError::protocol(format!("artifact at {} is empty", url), ""));
        }
        Ok(())
    }

    /// Fetch, narrate and merge. Never fails: stage errors become warnings
    /// on the returned outcome.
    pub async fn run(
        &self,
        job_id: &str,
        artifact_url: &str,
        narration: Option<&str>,
        voice: &str,
    ) -> PostProcessOutcome {
        let mut outcome = PostProcessOutcome::artifact_only(artifact_url);

        let video_path = self.work_dir.join(format!("{}_video.mp4", job_id));
        logi(format!("Downloading artifact -> {}", video_path.display()));
        if let Err(err) = self.fetch_artifact(artifact_url, &video_path).await {
            outcome.warn(format!("Artifact download failed: {}", err));
            return outcome;
        }
        outcome.local_artifact = Some(video_path.clone());
        logok(format!("Artifact saved: {}", video_path.display()));

        let (Some(text), Some(synth)) = (narration.filter(|t| !t.trim().is_empty()), &self.synthesizer)
        else {
            logi("No narration to add; keeping the artifact as-is.");
            return outcome;
        };

        let audio_path = self.work_dir.join(format!("{}_audio.mp3", job_id));
        logi(format!("Synthesizing narration ({}) -> {}", voice, audio_path.display()));
        if let Err(err) = synth.synthesize(text, voice, &audio_path).await {
            outcome.warn(format!("Narration synthesis failed: {}", err));
            return outcome;
        }
        outcome.narration_audio = Some(audio_path.clone());

        let durations = async {
            let video = self.muxer.duration_secs(&video_path).await?;
            let audio = self.muxer.duration_secs(&audio_path).await?;
            Ok::<_, JobError>((video, audio))
        }
        .await;
        let (video_secs, audio_secs) = match durations {
            Ok(d) => d,
            Err(err) => {
                outcome.warn(format!("Could not read media durations: {}", err));
                return outcome;
            }
        };

        let plan = MergePlan::new(video_secs, audio_secs);
        if plan.truncated {
            logi(format!(
                "Narration {:.2}s is longer than video {:.2}s; truncating.",
                audio_secs, video_secs
            ));
        }
        outcome.merge_plan = Some(plan.into());

        if let Err(err) = fs::create_dir_all(&self.output_dir).await {
            outcome.warn(format!("Could not create {}: {}", self.output_dir.display(), err));
            return outcome;
        }
        let final_path = self.output_dir.join(format!("FINAL_{}.mp4", job_id));
        logi(format!("Merging narration -> {}", final_path.display()));
        match self.muxer.merge(&video_path, &audio_path, &plan, &final_path).await {
            Ok(()) => {
                logok(format!("Merged ad written: {}", final_path.display()));
                outcome.merged = Some(final_path);
            }
            Err(err) => {
                outcome.warn(format!("Merge failed, keeping the unmerged artifact: {}", err));
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_output_preference() {
        let mut outcome = PostProcessOutcome::artifact_only("https://cdn/v.mp4");
        assert_eq!(outcome.best_output(), FinalOutput::Remote("https://cdn/v.mp4".into()));

        outcome.local_artifact = Some(PathBuf::from("temp/v.mp4"));
        assert_eq!(outcome.best_output(), FinalOutput::Artifact("temp/v.mp4".into()));

        outcome.merged = Some(PathBuf::from("out/FINAL_v.mp4"));
        assert_eq!(outcome.best_output(), FinalOutput::Merged("out/FINAL_v.mp4".into()));
        assert_eq!(outcome.best_output().to_string(), "out/FINAL_v.mp4");
    }
}
