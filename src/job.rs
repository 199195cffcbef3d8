//! In-memory job model and its status lifecycle.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Vendor status strings that mean the job finished successfully.
const SUCCESS_STATUSES: &[&str] = &["success", "succeeded", "completed"];

/// Vendor status strings that mean the job failed.
const FAILURE_STATUSES: &[&str] = &["failed", "error", "failure"];

/// Local normalization of the vendor's job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Submitted,
    Pending,
    Succeeded,
    Failed,
    TimedOut,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Submitted => "submitted",
            JobStatus::Pending => "pending",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::TimedOut => "timed_out",
        }
    }

    /// Check if this is a terminal state (no more polling).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::TimedOut
        )
    }

    /// Map a vendor status string onto the local vocabulary.
    ///
    /// Matching is case-insensitive; anything unknown is still pending.
    pub fn from_vendor(status: &str) -> Self {
        let lower = status.trim().to_lowercase();
        if SUCCESS_STATUSES.contains(&lower.as_str()) {
            JobStatus::Succeeded
        } else if FAILURE_STATUSES.contains(&lower.as_str()) {
            JobStatus::Failed
        } else {
            JobStatus::Pending
        }
    }

    fn rank(&self) -> u8 {
        match self {
            JobStatus::Submitted => 0,
            JobStatus::Pending => 1,
            _ => 2,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One submitted video-generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub prompt: String,
    pub status: JobStatus,
    pub artifact_url: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Local>,
}

impl Job {
    pub fn new(job_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            prompt: prompt.into(),
            status: JobStatus::Submitted,
            artifact_url: None,
            failure_reason: None,
            created_at: Local::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move the job forward. Regressions and changes after a terminal
    /// state are refused; returns whether the status was applied.
    pub fn advance(&mut self, next: JobStatus) -> bool {
        if self.status.is_terminal() || next.rank() < self.status.rank() {
            return false;
        }
        self.status = next;
        true
    }

    pub fn succeed(&mut self, artifact_url: impl Into<String>) -> bool {
        if !self.advance(JobStatus::Succeeded) {
            return false;
        }
        self.artifact_url = Some(artifact_url.into());
        true
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        if !self.advance(JobStatus::Failed) {
            return false;
        }
        self.failure_reason = Some(reason.into());
        true
    }
}
