use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

use crate::config::Config;
use crate::{logi, logw};

/// Create the working and output directories named in the config.
pub async fn ensure_directories(cfg: &Config) -> Result<()> {
    for dir in [cfg.work_dir.as_path(), cfg.output_dir.as_path()] {
        if !Path::new(dir).exists() {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
            logi(format!("Created directory: {}", dir.display()));
        }
    }
    Ok(())
}

pub async fn check_ffmpeg() -> bool {
    match tokio::process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await
    {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// Startup checks before a generation run. Missing ffmpeg only disables
/// the merge step, so it is a warning.
pub async fn prepare(cfg: &Config) -> Result<()> {
    ensure_directories(cfg).await?;
    if cfg.narration_enabled() && !check_ffmpeg().await {
        logw("FFmpeg not found in PATH; narration will not be merged into the video.");
    }
    Ok(())
}
