use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::config::Config;
use crate::decode::IdScanner;
use crate::error::{JobError, JobResult};
use crate::logw;
use crate::poller::StatusSource;

const RAW_SNIPPET: usize = 800;

/// HTTP client for the text-to-video vendor.
#[derive(Debug, Clone)]
pub struct VideoClient {
    client: Client,
    api_key: String,
    submit_url: String,
    status_url: String,
    timeout: Duration,
}

impl VideoClient {
    pub fn new(
        client: Client,
        api_key: impl Into<String>,
        host: &str,
        submit_path: &str,
        status_path: &str,
        timeout: Duration,
    ) -> Self {
        let host = host.trim_end_matches('/');
        Self {
            client,
            api_key: api_key.into(),
            submit_url: format!("{}{}", host, submit_path),
            status_url: format!("{}{}", host, status_path),
            timeout,
        }
    }

    pub fn from_config(client: Client, cfg: &Config) -> Self {
        Self::new(
            client,
            &cfg.video_key,
            &cfg.video_host,
            &cfg.submit_path,
            &cfg.status_path,
            cfg.request_timeout(),
        )
    }

    /// Post a generation request and return the vendor's job id.
    ///
    /// A non-2xx reply is rejected outright with its body. Otherwise the reply
    /// is read as a stream and scanned line by line; reading stops as soon as
    /// an id is found.
    pub async fn submit(&self, payload: &Value) -> JobResult<String> {
        let resp = self
            .client
            .post(&self.submit_url)
            .bearer_auth(&self.api_key)
            .json(payload)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let raw = resp.text().await?;
            let snippet: String = raw.chars().take(RAW_SNIPPET).collect();
            logw(format!("Video submit rejected with HTTP {}: {}", status.as_u16(), snippet));
            return Err(JobError::protocol(
                format!("submit rejected (HTTP {})", status.as_u16()),
                raw,
            ));
        }

        let mut scanner = IdScanner::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if let Some(id) = scanner.push(&chunk) {
                return Ok(id);
            }
        }

        scanner.finish().inspect_err(|err| {
            if let Some(raw) = err.raw_body() {
                let snippet: String = raw.chars().take(RAW_SNIPPET).collect();
                logw(format!("Video submit reply without job id: {}", snippet));
            }
        })
    }
}

#[async_trait]
impl StatusSource for VideoClient {
    async fn fetch_status(&self, job_id: &str) -> JobResult<Value> {
        let resp = self
            .client
            .post(&self.status_url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "id": job_id }))
            .timeout(self.timeout)
            .send()
            .await?;

        let status = resp.status();
        let raw = resp.text().await?;
        if !status.is_success() {
            return Err(JobError::protocol(
                format!("status endpoint HTTP {}", status.as_u16()),
                raw,
            ));
        }
        serde_json::from_str(&raw)
            .map_err(|e| JobError::protocol(format!("status reply is not JSON: {}", e), raw))
    }
}
