//! End-to-end ad generation: script, submit, poll, record, post-process.

use anyhow::Context;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;

use crate::api::elevenlabs::ElevenLabs;
use crate::api::openai::{self, ScriptRequest};
use crate::api::video::VideoClient;
use crate::config::Config;
use crate::error::{JobError, JobResult};
use crate::ffmpeg::FfmpegMuxer;
use crate::history::{HistoryLog, HistoryRecord};
use crate::imaging::{self, MAX_REFERENCE_IMAGES};
use crate::job::Job;
use crate::poller::{PollProgress, StatusPoller};
use crate::postprocess::{FinalOutput, Muxer, PostProcessOutcome, PostProcessor, SpeechSynthesizer};
use crate::script::{self, AdScript, Language, ScriptStyle};
use crate::submitter::{AspectRatio, JobSubmitter, Quality, SubmitRequest};
use crate::{logi, logok, logw};

/// What the user asked for.
#[derive(Debug, Clone, Default)]
pub struct AdRequest {
    pub product: String,
    pub style: ScriptStyle,
    pub detail: String,
    pub language: Language,
    pub aspect_ratio: AspectRatio,
    pub duration_secs: u32,
    pub quality: Quality,
    /// Overrides the configured video model.
    pub model: Option<String>,
    /// Raw uploaded image bytes.
    pub images: Vec<Vec<u8>>,
    pub use_llm_script: bool,
    pub voiceover: bool,
}

impl AdRequest {
    pub fn validate(&self) -> JobResult<()> {
        if self.product.trim().is_empty() {
            return Err(JobError::invalid("product name is empty"));
        }
        if self.duration_secs == 0 {
            return Err(JobError::invalid("duration must be positive"));
        }
        if self.images.len() > MAX_REFERENCE_IMAGES {
            return Err(JobError::invalid(format!(
                "at most {} reference images are supported",
                MAX_REFERENCE_IMAGES
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AdOutcome {
    pub job: Job,
    pub script: AdScript,
    pub post: PostProcessOutcome,
    pub warnings: Vec<String>,
}

impl AdOutcome {
    pub fn best_output(&self) -> FinalOutput {
        self.post.best_output()
    }

    /// Warnings from every stage, workflow first.
    pub fn all_warnings(&self) -> Vec<String> {
        self.warnings
            .iter()
            .chain(self.post.warnings.iter())
            .cloned()
            .collect()
    }
}

pub struct AdWorkflow {
    cfg: Config,
    http: Client,
    submitter: JobSubmitter,
    poller: StatusPoller<VideoClient>,
    post: PostProcessor,
    history: Arc<HistoryLog>,
}

impl AdWorkflow {
    /// Wire the workflow with explicit speech and mux collaborators.
    pub fn new(
        cfg: Config,
        http: Client,
        synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
        muxer: Arc<dyn Muxer>,
    ) -> Self {
        let video = VideoClient::from_config(http.clone(), &cfg);
        let post = PostProcessor::new(
            http.clone(),
            synthesizer,
            muxer,
            cfg.work_dir.clone(),
            cfg.output_dir.clone(),
        );
        Self {
            submitter: JobSubmitter::new(video.clone()),
            poller: StatusPoller::new(video, cfg.poll_policy()),
            post,
            history: Arc::new(HistoryLog::new(cfg.history_file.clone())),
            http,
            cfg,
        }
    }

    /// Production wiring: ElevenLabs when configured, ffmpeg for muxing.
    pub fn from_config(cfg: Config) -> anyhow::Result<Self> {
        let http = Client::builder()
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;
        let synthesizer: Option<Arc<dyn SpeechSynthesizer>> = if cfg.narration_enabled() {
            Some(Arc::new(ElevenLabs::new(http.clone(), &cfg)))
        } else {
            None
        };
        Ok(Self::new(cfg, http, synthesizer, Arc::new(FfmpegMuxer)))
    }

    pub fn history(&self) -> Arc<HistoryLog> {
        Arc::clone(&self.history)
    }

    async fn make_script(
        &self,
        request: &AdRequest,
        image: Option<&imaging::EncodedImage>,
        warnings: &mut Vec<String>,
    ) -> AdScript {
        if !request.use_llm_script || !self.cfg.scripting_enabled() {
            return AdScript::from_template(request.style);
        }

        logi(format!("Requesting ad script ({} style)...", request.style));
        let script_req = ScriptRequest {
            product: &request.product,
            style: request.style,
            language: request.language,
            detail: &request.detail,
            duration_secs: request.duration_secs,
            image,
        };
        match openai::openai_make_script(&self.http, &self.cfg, &script_req).await {
            Ok(script) => {
                if script.narration.is_none() {
                    warnings.push("Script reply had no narration part".to_string());
                }
                script
            }
            Err(err) => {
                let msg = format!("Script generation failed, using the {} template: {}", request.style, err);
                logw(&msg);
                warnings.push(msg);
                AdScript::from_template(request.style)
            }
        }
    }

    /// Run one request end to end.
    ///
    /// Submission errors, vendor failures and poll timeouts are returned as
    /// errors. Anything that goes wrong after the artifact exists is a
    /// warning on the outcome instead.
    pub async fn run<F>(&self, request: &AdRequest, on_progress: F) -> JobResult<AdOutcome>
    where
        F: FnMut(&PollProgress),
    {
        request.validate()?;
        let mut warnings = Vec::new();

        let image = imaging::prepare_reference(&request.images)?;
        if image.is_some() {
            logi(format!("Prepared {} reference image(s)", request.images.len()));
        }

        let script = self.make_script(request, image.as_ref(), &mut warnings).await;
        let prompt = script::compose_prompt(
            &request.product,
            request.language,
            &script.directive,
            &request.detail,
            request.images.len(),
        );

        let submit = SubmitRequest {
            prompt,
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.cfg.video_model.clone()),
            aspect_ratio: request.aspect_ratio,
            duration_secs: request.duration_secs,
            quality: request.quality,
            image,
        };
        logi(format!("Submitting job with model {}...", submit.model));
        let mut job = self.submitter.submit(&submit).await?;

        let policy = self.poller.policy();
        logi(format!(
            "Polling {} every {}s (max {} attempts)",
            job.job_id,
            policy.interval.as_secs(),
            policy.max_attempts
        ));
        let artifact_url = self
            .poller
            .poll(&mut job, on_progress)
            .await?
            .into_artifact_url()?;
        logok(format!("Job {} finished: {}", job.job_id, artifact_url));

        let record = HistoryRecord::new(
            &job.job_id,
            &request.product,
            &artifact_url,
            script.display_text(),
        );
        if let Err(err) = self.history.append(record).await {
            let msg = format!("Could not write history: {}", err);
            logw(&msg);
            warnings.push(msg);
        }

        let narration = if request.voiceover && self.post.can_narrate() {
            if script.narration.is_none() {
                warnings.push("No narration script; skipping voice-over".to_string());
            }
            script.narration.as_deref()
        } else {
            None
        };
        let voice = self.cfg.voice_for(request.language.as_str()).to_string();
        let post = self
            .post
            .run(&job.job_id, &artifact_url, narration, &voice)
            .await;

        Ok(AdOutcome {
            job,
            script,
            post,
            warnings,
        })
    }
}
