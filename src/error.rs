//! Error taxonomy for the job orchestrator.

use thiserror::Error;

/// Result type for orchestrator operations.
pub type JobResult<T> = Result<T, JobError>;

/// Errors raised while submitting, polling or post-processing a job.
#[derive(Debug, Error)]
pub enum JobError {
    /// Network or timeout failure on any external call.
    #[error("transport error: {0}")]
    Transport(String),

    /// A response arrived but could not be parsed or lacked a required field.
    /// `raw` keeps the response body for diagnostics.
    #[error("protocol error: {message}")]
    Protocol { message: String, raw: String },

    /// The vendor reported the job as failed.
    #[error("job failed: {reason}")]
    TerminalFailure { reason: String },

    /// Attempt budget exhausted without a terminal state.
    #[error("job did not finish after {attempts} attempts")]
    TimeoutExceeded { attempts: u32 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl JobError {
    pub fn protocol(message: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            raw: raw.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether a poll attempt that failed this way may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, JobError::Transport(_) | JobError::Protocol { .. })
    }

    /// Raw response body attached to a protocol error, if any.
    pub fn raw_body(&self) -> Option<&str> {
        match self {
            JobError::Protocol { raw, .. } if !raw.is_empty() => Some(raw),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for JobError {
    fn from(err: reqwest::Error) -> Self {
        JobError::Transport(err.to_string())
    }
}
