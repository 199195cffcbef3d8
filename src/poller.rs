//! Fixed-cadence status polling until a job reaches a terminal state.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::decode::StatusSnapshot;
use crate::error::{JobError, JobResult};
use crate::job::{Job, JobStatus};
use crate::logw;

/// Where status replies come from.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, job_id: &str) -> JobResult<Value>;
}

/// Polling cadence and budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Wait before every status request.
    pub interval: Duration,
    /// Total status requests allowed, failed ones included.
    pub max_attempts: u32,
    /// Consecutive transient errors tolerated before giving up.
    pub max_consecutive_errors: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(4),
            max_attempts: 120,
            max_consecutive_errors: 3,
        }
    }
}

/// Reported to the observer after every attempt. `attempt` is an index,
/// not a completion percentage.
#[derive(Debug, Clone, PartialEq)]
pub struct PollProgress {
    pub attempt: u32,
    pub max_attempts: u32,
    pub status: JobStatus,
    pub vendor_status: Option<String>,
    pub vendor_progress: Option<u8>,
    pub error: Option<String>,
}

/// How a polling loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Succeeded { artifact_url: String },
    Failed { reason: String },
    TimedOut { attempts: u32 },
}

impl PollOutcome {
    /// Collapse non-success outcomes into the matching error.
    pub fn into_artifact_url(self) -> JobResult<String> {
        match self {
            PollOutcome::Succeeded { artifact_url } => Ok(artifact_url),
            PollOutcome::Failed { reason } => Err(JobError::TerminalFailure { reason }),
            PollOutcome::TimedOut { attempts } => Err(JobError::TimeoutExceeded { attempts }),
        }
    }
}

pub struct StatusPoller<S> {
    source: S,
    policy: PollPolicy,
}

impl<S: StatusSource> StatusPoller<S> {
    pub fn new(source: S, policy: PollPolicy) -> Self {
        Self { source, policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Poll `job` until it succeeds, fails or the attempt budget runs out.
    ///
    /// The job's status is advanced in place. A success reply with no
    /// artifact URL is a protocol error, not an empty success.
    pub async fn poll<F>(&self, job: &mut Job, mut on_progress: F) -> JobResult<PollOutcome>
    where
        F: FnMut(&PollProgress),
    {
        let max_attempts = self.policy.max_attempts;
        let mut consecutive_errors = 0u32;

        for attempt in 1..=max_attempts {
            tokio::time::sleep(self.policy.interval).await;

            let value = match self.source.fetch_status(&job.job_id).await {
                Ok(value) => value,
                Err(err) if err.is_transient() => {
                    consecutive_errors += 1;
                    logw(format!(
                        "Status check {}/{} for {} failed ({} in a row): {}",
                        attempt, max_attempts, job.job_id, consecutive_errors, err
                    ));
                    on_progress(&PollProgress {
                        attempt,
                        max_attempts,
                        status: job.status,
                        vendor_status: None,
                        vendor_progress: None,
                        error: Some(err.to_string()),
                    });
                    if consecutive_errors > self.policy.max_consecutive_errors {
                        job.advance(JobStatus::TimedOut);
                        return Ok(PollOutcome::TimedOut { attempts: attempt });
                    }
                    continue;
                }
                Err(err) => return Err(err),
            };
            consecutive_errors = 0;

            let snapshot = StatusSnapshot::from_value(&value);
            debug!(
                job_id = %job.job_id,
                attempt,
                vendor_status = snapshot.vendor_status.as_deref().unwrap_or(""),
                "status polled"
            );
            if snapshot.status == JobStatus::Pending {
                job.advance(JobStatus::Pending);
            }
            on_progress(&PollProgress {
                attempt,
                max_attempts,
                status: snapshot.status,
                vendor_status: snapshot.vendor_status.clone(),
                vendor_progress: snapshot.progress,
                error: None,
            });

            match snapshot.status {
                JobStatus::Succeeded => {
                    let Some(url) = snapshot.artifact_url else {
                        return Err(JobError::protocol(
                            format!("job {} reported success without an artifact url", job.job_id),
                            value.to_string(),
                        ));
                    };
                    job.succeed(url.clone());
                    return Ok(PollOutcome::Succeeded { artifact_url: url });
                }
                JobStatus::Failed => {
                    let reason = snapshot
                        .failure_reason
                        .or(snapshot.vendor_status)
                        .unwrap_or_else(|| "unknown failure".to_string());
                    job.fail(reason.clone());
                    return Ok(PollOutcome::Failed { reason });
                }
                _ => {}
            }
        }

        job.advance(JobStatus::TimedOut);
        Ok(PollOutcome::TimedOut {
            attempts: max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    /// Replays scripted replies, then reports "running" forever.
    struct Scripted {
        replies: Mutex<VecDeque<JobResult<Value>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(replies: Vec<JobResult<Value>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StatusSource for &Scripted {
        async fn fetch_status(&self, _job_id: &str) -> JobResult<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.replies.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(json!({"data": {"status": "running"}})))
        }
    }

    fn policy(max_attempts: u32) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(4),
            max_attempts,
            max_consecutive_errors: 2,
        }
    }

    fn pending() -> JobResult<Value> {
        Ok(json!({"status": "queued"}))
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_then_success() {
        let n = 5;
        let mut replies: Vec<_> = (0..n).map(|_| pending()).collect();
        replies.push(Ok(json!({"data": {"status": "SUCCESS", "results": [{"url": "https://cdn/v.mp4"}]}})));
        let source = Scripted::new(replies);
        let poller = StatusPoller::new(&source, policy(120));
        let mut job = Job::new("task-1", "prompt");

        let started = Instant::now();
        let outcome = poller.poll(&mut job, |_| {}).await.unwrap();

        assert_eq!(
            outcome,
            PollOutcome::Succeeded {
                artifact_url: "https://cdn/v.mp4".into()
            }
        );
        assert_eq!(source.calls(), n + 1);
        assert_eq!(started.elapsed(), Duration::from_secs(4 * (n as u64 + 1)));
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.artifact_url.as_deref(), Some("https://cdn/v.mp4"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_exact_budget() {
        let source = Scripted::new(vec![]);
        let poller = StatusPoller::new(&source, policy(7));
        let mut job = Job::new("task-2", "prompt");

        let outcome = poller.poll(&mut job, |_| {}).await.unwrap();

        assert_eq!(outcome, PollOutcome::TimedOut { attempts: 7 });
        assert_eq!(source.calls(), 7);
        assert_eq!(job.status, JobStatus::TimedOut);
        assert!(matches!(
            outcome.into_artifact_url(),
            Err(JobError::TimeoutExceeded { attempts: 7 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_carries_reason() {
        let source = Scripted::new(vec![
            pending(),
            Ok(json!({"status": "FAILED", "failure_reason": "content policy", "error": "other"})),
        ]);
        let poller = StatusPoller::new(&source, policy(10));
        let mut job = Job::new("task-3", "prompt");

        let outcome = poller.poll(&mut job, |_| {}).await.unwrap();

        assert_eq!(
            outcome,
            PollOutcome::Failed {
                reason: "content policy".into()
            }
        );
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.failure_reason.as_deref(), Some("content policy"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_without_url_is_protocol_error() {
        let source = Scripted::new(vec![Ok(json!({"data": {"status": "completed", "results": []}}))]);
        let poller = StatusPoller::new(&source, policy(10));
        let mut job = Job::new("task-4", "prompt");

        let err = poller.poll(&mut job, |_| {}).await.unwrap_err();

        assert!(matches!(err, JobError::Protocol { .. }));
        assert!(!job.is_terminal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_tolerated() {
        let source = Scripted::new(vec![
            Err(JobError::Transport("reset".into())),
            Err(JobError::protocol("HTTP 502", "<html>")),
            Ok(json!({"status": "succeeded", "url": "https://cdn/x.mp4"})),
        ]);
        let poller = StatusPoller::new(&source, policy(10));
        let mut job = Job::new("task-5", "prompt");

        let outcome = poller.poll(&mut job, |_| {}).await.unwrap();

        assert_eq!(outcome.into_artifact_url().unwrap(), "https://cdn/x.mp4");
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_transport_errors_escalate() {
        let replies = (0..10).map(|_| Err(JobError::Transport("down".into()))).collect();
        let source = Scripted::new(replies);
        let poller = StatusPoller::new(&source, policy(10));
        let mut job = Job::new("task-6", "prompt");

        let outcome = poller.poll(&mut job, |_| {}).await.unwrap();

        assert_eq!(outcome, PollOutcome::TimedOut { attempts: 3 });
        assert_eq!(source.calls(), 3);
        assert_eq!(job.status, JobStatus::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_reports_attempt_index() {
        let source = Scripted::new(vec![
            pending(),
            pending(),
            Ok(json!({"status": "COMPLETED", "video_url": "https://cdn/y.mp4"})),
        ]);
        let poller = StatusPoller::new(&source, policy(10));
        let mut job = Job::new("task-7", "prompt");
        let mut seen = Vec::new();

        poller
            .poll(&mut job, |p| seen.push((p.attempt, p.status)))
            .await
            .unwrap();

        assert_eq!(
            seen,
            vec![
                (1, JobStatus::Pending),
                (2, JobStatus::Pending),
                (3, JobStatus::Succeeded)
            ]
        );
    }
}
