use crate::error::{JobError, JobResult};
use crate::postprocess::Muxer;
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

async fn run_cmd(args: &[String]) -> JobResult<()> {
    if args.is_empty() {
        return Ok(());
    }

    let mut cmd = Command::new(&args[0]);
    if args.len() > 1 {
        cmd.args(&args[1..]);
    }

    let output = cmd.output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(JobError::protocol(
            format!("command failed: {}", args.join(" ")),
            stderr,
        ));
    }

    Ok(())
}

pub async fn ffprobe_duration_seconds(path: &Path) -> JobResult<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await?;

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !output.status.success() {
        return Err(JobError::protocol(
            format!("ffprobe failed on {}", path.display()),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ));
    }

    let duration = text.parse::<f64>().unwrap_or(-1.0);
    if duration <= 0.1 {
        return Err(JobError::protocol(
            format!("invalid duration for {}", path.display()),
            text,
        ));
    }
    Ok(duration)
}

/// Duration alignment for a narration merge.
///
/// The output always lasts exactly as long as the video. Narration longer
/// than the video is cut; shorter narration simply ends early. Audio is
/// never stretched or looped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergePlan {
    pub output_secs: f64,
    pub narration_secs: f64,
    pub truncated: bool,
}

impl MergePlan {
    pub fn new(video_secs: f64, narration_secs: f64) -> Self {
        Self {
            output_secs: video_secs,
            narration_secs: narration_secs.min(video_secs),
            truncated: narration_secs > video_secs,
        }
    }
}

pub fn merge_args(video_in: &Path, narration_in: &Path, plan: &MergePlan, out_mp4: &Path) -> Vec<String> {
    vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        video_in.display().to_string(),
        "-i".to_string(),
        narration_in.display().to_string(),
        "-filter_complex".to_string(),
        format!("[1:a]atrim=0:{:.3},asetpts=PTS-STARTPTS[a]", plan.narration_secs),
        "-map".to_string(),
        "0:v".to_string(),
        "-map".to_string(),
        "[a]".to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        "-t".to_string(),
        format!("{:.3}", plan.output_secs),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out_mp4.display().to_string(),
    ]
}

/// Combine the video track with a narration track per `plan`.
pub async fn ffmpeg_merge_narration(
    video_in: &Path,
    narration_in: &Path,
    plan: &MergePlan,
    out_mp4: &Path,
) -> JobResult<()> {
    run_cmd(&merge_args(video_in, narration_in, plan, out_mp4)).await?;
    if !out_mp4.exists() {
        return Err(JobError::protocol(
            format!("ffmpeg produced no file at {}", out_mp4.display()),
            "",
        ));
    }
    Ok(())
}

/// [`Muxer`] backed by the ffmpeg/ffprobe binaries on PATH.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegMuxer;

#[async_trait]
impl Muxer for FfmpegMuxer {
    async fn duration_secs(&self, path: &Path) -> JobResult<f64> {
        ffprobe_duration_seconds(path).await
    }

    async fn merge(
        &self,
        video_in: &Path,
        narration_in: &Path,
        plan: &MergePlan,
        out_mp4: &Path,
    ) -> JobResult<()> {
        ffmpeg_merge_narration(video_in, narration_in, plan, out_mp4).await
    }
}
