//! Tolerant decoding of the video vendor's responses.
//!
//! The vendor does not keep a stable wire shape: ids and results may sit at
//! the top level or under `data`, and the submit reply may be a plain JSON
//! object or a stream of `data: {...}` event lines. Every lookup here is a
//! prioritized list of pure strategies over a [`serde_json::Value`], tried
//! first-match-wins.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde_json::Value;

use crate::error::{JobError, JobResult};
use crate::job::JobStatus;

/// One extraction attempt; `None` means "not applicable, try the next".
pub type Strategy = fn(&Value) -> Option<String>;

const ID_KEYS: &[&str] = &["id", "task_id"];

fn raw_id_regex() -> JobResult<&'static Regex> {
    static RAW_ID_RE: OnceCell<Regex> = OnceCell::new();
    RAW_ID_RE.get_or_try_init(|| {
        Regex::new(r#""(?:task_id|id)"\s*:\s*"([^"\s]+)""#)
            .map_err(|e| JobError::config(format!("invalid raw id pattern: {}", e)))
    })
}

fn error_object_regex() -> JobResult<&'static Regex> {
    static ERROR_OBJ_RE: OnceCell<Regex> = OnceCell::new();
    ERROR_OBJ_RE.get_or_try_init(|| {
        Regex::new(r#""error"\s*:\s*\{"#)
            .map_err(|e| JobError::config(format!("invalid error object pattern: {}", e)))
    })
}

/// Run strategies in order and return the first hit.
pub fn first_match(value: &Value, strategies: &[Strategy]) -> Option<String> {
    strategies.iter().find_map(|strategy| strategy(value))
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn top_level_id(value: &Value) -> Option<String> {
    ID_KEYS.iter().find_map(|key| non_empty(value.get(key)))
}

fn nested_id(value: &Value) -> Option<String> {
    value.get("data").and_then(top_level_id)
}

const JOB_ID_STRATEGIES: &[Strategy] = &[top_level_id, nested_id];

pub fn job_id_from_value(value: &Value) -> Option<String> {
    first_match(value, JOB_ID_STRATEGIES)
}

/// Look for a job id in one line of a streamed reply.
pub fn job_id_from_line(line: &str) -> Option<String> {
    let trimmed = line.trim();
    let payload = trimmed
        .strip_prefix("data:")
        .map(str::trim)
        .unwrap_or(trimmed);
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }
    let value: Value = serde_json::from_str(payload).ok()?;
    job_id_from_value(&value)
}

/// True when `pos` sits inside an `"error": {...}` object of `text`.
fn inside_error_object(text: &str, pos: usize, error_re: &Regex) -> bool {
    error_re
        .find_iter(&text[..pos])
        .any(|open| {
            let mut depth = 1i32;
            for b in text[open.end()..pos].bytes() {
                match b {
                    b'{' => depth += 1,
                    b'}' => depth -= 1,
                    _ => {}
                }
                if depth == 0 {
                    return false;
                }
            }
            true
        })
}

/// Last resort: pattern-match an id field directly in raw text.
/// Ids inside an `error` object are request ids, not job ids, and are skipped.
pub fn job_id_from_raw(text: &str) -> JobResult<Option<String>> {
    let id_re = raw_id_regex()?;
    let error_re = error_object_regex()?;
    Ok(id_re
        .captures_iter(text)
        .find(|cap| {
            cap.get(0)
                .is_some_and(|m| !inside_error_object(text, m.start(), error_re))
        })
        .map(|cap| cap[1].to_string()))
}

/// Extract a job id from a complete submit reply, cheapest shape first:
/// whole-body JSON (flat, then nested under `data`), then event lines,
/// then a raw pattern match.
pub fn extract_job_id(body: &str) -> JobResult<Option<String>> {
    if let Ok(value) = serde_json::from_str::<Value>(body.trim()) {
        if let Some(id) = job_id_from_value(&value) {
            return Ok(Some(id));
        }
    }
    match body.lines().find_map(job_id_from_line) {
        Some(id) => Ok(Some(id)),
        None => job_id_from_raw(body),
    }
}

/// Incremental id scanner for a submit reply that arrives in chunks.
///
/// Complete lines are inspected as soon as they arrive so the caller can stop
/// reading the moment an id shows up. Whatever remains is handed to
/// [`extract_job_id`] once the stream ends.
#[derive(Debug, Default)]
pub struct IdScanner {
    body: Vec<u8>,
    line_start: usize,
}

impl IdScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns an id if a completed line carried one.
    pub fn push(&mut self, chunk: &[u8]) -> Option<String> {
        self.body.extend_from_slice(chunk);
        while let Some(pos) = self.body[self.line_start..]
            .iter()
            .position(|b| *b == b'\n')
        {
            let end = self.line_start + pos;
            let line = String::from_utf8_lossy(&self.body[self.line_start..end]).into_owned();
            self.line_start = end + 1;
            if let Some(id) = job_id_from_line(&line) {
                return Some(id);
            }
        }
        None
    }

    /// Body received so far.
    pub fn body(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Run the full extraction chain over everything received.
    /// Without an id the error carries the raw body for diagnostics.
    pub fn finish(self) -> JobResult<String> {
        let text = self.body();
        match extract_job_id(&text)? {
            Some(id) => Ok(id),
            None => Err(JobError::protocol("no job id in submit reply", text)),
        }
    }
}

/// Poll payloads may be nested one level under `data`.
pub fn resolve_payload(value: &Value) -> &Value {
    match value.get("data") {
        Some(inner) if inner.is_object() => inner,
        _ => value,
    }
}

fn first_result_url(payload: &Value) -> Option<String> {
    payload
        .get("results")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(|item| non_empty(item.get("url")))
}

fn direct_url(payload: &Value) -> Option<String> {
    non_empty(payload.get("url"))
}

fn video_url(payload: &Value) -> Option<String> {
    non_empty(payload.get("video_url"))
}

const ARTIFACT_URL_STRATEGIES: &[Strategy] = &[first_result_url, direct_url, video_url];

fn failure_reason_field(payload: &Value) -> Option<String> {
    non_empty(payload.get("failure_reason"))
}

fn error_field(payload: &Value) -> Option<String> {
    let err = payload.get("error")?;
    non_empty(Some(err)).or_else(|| non_empty(err.get("message")))
}

fn message_field(payload: &Value) -> Option<String> {
    non_empty(payload.get("message"))
}

const FAILURE_REASON_STRATEGIES: &[Strategy] =
    &[failure_reason_field, error_field, message_field];

pub fn artifact_url(payload: &Value) -> Option<String> {
    first_match(payload, ARTIFACT_URL_STRATEGIES)
}

pub fn failure_reason(payload: &Value) -> Option<String> {
    first_match(payload, FAILURE_REASON_STRATEGIES)
}

/// Normalized view of one poll reply.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub status: JobStatus,
    pub vendor_status: Option<String>,
    pub artifact_url: Option<String>,
    pub failure_reason: Option<String>,
    pub progress: Option<u8>,
}

impl StatusSnapshot {
    pub fn from_value(value: &Value) -> Self {
        let payload = resolve_payload(value);
        let vendor_status = payload
            .get("status")
            .and_then(Value::as_str)
            .map(str::to_string);
        let status = vendor_status
            .as_deref()
            .map(JobStatus::from_vendor)
            .unwrap_or(JobStatus::Pending);
        let progress = payload
            .get("progress")
            .and_then(Value::as_u64)
            .map(|p| p.min(100) as u8);

        Self {
            status,
            vendor_status,
            artifact_url: artifact_url(payload),
            failure_reason: failure_reason(payload),
            progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_same_id_across_reply_shapes() {
        let flat = r#"{"id":"task-42","status":"queued"}"#;
        let nested = r#"{"code":0,"data":{"id":"task-42"}}"#;
        let streamed = "data: {\"status\":\"accepted\"}\n\ndata: {\"id\":\"task-42\"}\n\ndata: [DONE]\n";

        assert_eq!(extract_job_id(flat).unwrap().as_deref(), Some("task-42"));
        assert_eq!(extract_job_id(nested).unwrap().as_deref(), Some("task-42"));
        assert_eq!(extract_job_id(streamed).unwrap().as_deref(), Some("task-42"));
    }

    #[test]
    fn test_task_id_key_and_pretty_body() {
        let pretty = "{\n  \"data\": {\n    \"task_id\": \"abc\"\n  }\n}";
        assert_eq!(extract_job_id(pretty).unwrap().as_deref(), Some("abc"));
    }

    #[test]
    fn test_raw_pattern_is_last_resort() {
        let broken = "event: created\nsomething {\"id\": \"raw-7\", trailing garbage";
        assert_eq!(extract_job_id(broken).unwrap().as_deref(), Some("raw-7"));
        assert_eq!(extract_job_id("<html>502 Bad Gateway</html>").unwrap(), None);
        assert_eq!(extract_job_id("").unwrap(), None);
    }

    #[test]
    fn test_raw_patterns_compile() {
        assert!(raw_id_regex().is_ok());
        assert!(error_object_regex().is_ok());
    }

    #[test]
    fn test_raw_pattern_skips_ids_inside_error_object() {
        let rejected = r#"partial {"error":{"message":"insufficient credits","id":"req_9f"}"#;
        assert_eq!(job_id_from_raw(rejected).unwrap(), None);

        let after_error = r#"{"error":{"id":"req_1"},"note":"x" {"id":"job-3""#;
        assert_eq!(job_id_from_raw(after_error).unwrap().as_deref(), Some("job-3"));
    }

    #[test]
    fn test_scanner_stops_at_first_line_with_id() {
        let mut scanner = IdScanner::new();
        assert_eq!(scanner.push(b"data: {\"status\":\"queued\"}\n"), None);
        assert_eq!(scanner.push(b"data: {\"data\":{\"id\":"), None);
        assert_eq!(scanner.push(b"\"split-1\"}}\n"), Some("split-1".to_string()));
    }

    #[test]
    fn test_scanner_finish_returns_raw_on_failure() {
        let mut scanner = IdScanner::new();
        assert_eq!(scanner.push(b"{\"error\":\"quota\"}"), None);
        match scanner.finish() {
            Err(JobError::Protocol { raw, .. }) => assert_eq!(raw, "{\"error\":\"quota\"}"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_snapshot_prefers_nested_payload() {
        let value = json!({
            "status": "running",
            "data": {"status": "SUCCESS", "results": [{"url": "https://cdn/a.mp4"}], "url": "https://cdn/b.mp4"}
        });
        let snap = StatusSnapshot::from_value(&value);
        assert_eq!(snap.status, JobStatus::Succeeded);
        assert_eq!(snap.artifact_url.as_deref(), Some("https://cdn/a.mp4"));
    }

    #[test]
    fn test_url_falls_back_when_results_empty() {
        let value = json!({"status": "completed", "results": [], "url": "https://cdn/b.mp4"});
        assert_eq!(
            StatusSnapshot::from_value(&value).artifact_url.as_deref(),
            Some("https://cdn/b.mp4")
        );
        let legacy = json!({"data": {"status": "COMPLETED", "video_url": "https://cdn/c.mp4"}});
        assert_eq!(
            StatusSnapshot::from_value(&legacy).artifact_url.as_deref(),
            Some("https://cdn/c.mp4")
        );
    }

    #[test]
    fn test_failure_reason_preference() {
        let both = json!({"status": "failed", "failure_reason": "content policy", "error": "generic"});
        assert_eq!(failure_reason(&both).as_deref(), Some("content policy"));

        let error_obj = json!({"status": "error", "error": {"message": "gpu lost"}});
        assert_eq!(failure_reason(&error_obj).as_deref(), Some("gpu lost"));

        let nothing = json!({"status": "failed"});
        assert_eq!(failure_reason(&nothing), None);
    }

    #[test]
    fn test_unknown_status_is_pending() {
        let snap = StatusSnapshot::from_value(&json!({"data": {"status": "rendering", "progress": 140}}));
        assert_eq!(snap.status, JobStatus::Pending);
        assert_eq!(snap.progress, Some(100));
        assert_eq!(StatusSnapshot::from_value(&json!({})).status, JobStatus::Pending);
    }
}
