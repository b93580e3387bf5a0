use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::types::{AuditRequest, JobRecord, JobTicket, ScrapeResult};

/// Generic failure reported for any non-OK backend reply.
pub const BACKEND_FAILED: &str = "Backend failed to respond";

/// Source of job status records, polled by [`crate::poller::poll_job`].
pub trait JobSource {
    fn job_status(&self, job_id: &str) -> impl Future<Output = Result<JobRecord>> + Send;
}

/// The audit backend's HTTP contract as seen by the dashboard.
pub trait Backend: JobSource {
    /// `POST /api/audit`; the raw scan document.
    fn audit(&self, url: &str) -> impl Future<Output = Result<Value>> + Send;
    /// `POST /api/fullscan`.
    fn submit_full_scan(&self, url: &str) -> impl Future<Output = Result<JobTicket>> + Send;
    /// `POST /api/scrape`.
    fn scrape(&self, url: &str) -> impl Future<Output = Result<ScrapeResult>> + Send;
}

/// reqwest-backed client for a backend rooted at `base`.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base: Url,
}

impl BackendClient {
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(base).with_context(|| format!("invalid backend URL: {base}"))?;
        // `join` drops the last segment unless the base ends in a slash.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("invalid endpoint path: {path}"))
    }

    // The id goes in as a single, percent-encoded path segment.
    fn job_endpoint(&self, job_id: &str) -> Result<Url> {
        if matches!(job_id, "" | "." | "..") {
            bail!("invalid job id: {job_id:?}");
        }
        let mut endpoint = self.endpoint("api/job/")?;
        endpoint
            .path_segments_mut()
            .map_err(|_| anyhow!("backend URL cannot carry a path: {}", self.base))?
            .pop_if_empty()
            .push(job_id);
        Ok(endpoint)
    }

    async fn post_url<T: DeserializeOwned>(&self, path: &str, url: &str) -> Result<T> {
        let endpoint = self.endpoint(path)?;
        let body = serde_json::to_vec(&AuditRequest {
            url: url.to_string(),
        })?;
        log::debug!("POST {endpoint}");
        let resp = self
            .http
            .post(endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            log::debug!("{path} answered {}", resp.status());
            bail!(BACKEND_FAILED);
        }
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).with_context(|| format!("malformed JSON from {path}"))
    }
}

impl JobSource for BackendClient {
    async fn job_status(&self, job_id: &str) -> Result<JobRecord> {
        let endpoint = self.job_endpoint(job_id)?;
        log::debug!("GET {endpoint}");
        let resp = self.http.get(endpoint).send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        // A missing job still carries `{error}`, so read the body either way.
        match serde_json::from_slice::<Value>(&bytes).ok().map(unwrap_tuple) {
            Some(doc @ Value::Object(_)) => {
                let record: JobRecord = serde_json::from_value(doc)?;
                if !status.is_success() && record.error.is_none() {
                    bail!(BACKEND_FAILED);
                }
                Ok(record)
            }
            _ if !status.is_success() => bail!(BACKEND_FAILED),
            _ => Err(anyhow!("malformed job record for {job_id}")),
        }
    }
}

impl Backend for BackendClient {
    async fn audit(&self, url: &str) -> Result<Value> {
        self.post_url("api/audit", url).await
    }

    async fn submit_full_scan(&self, url: &str) -> Result<JobTicket> {
        self.post_url("api/fullscan", url).await
    }

    async fn scrape(&self, url: &str) -> Result<ScrapeResult> {
        self.post_url("api/scrape", url).await
    }
}

// Some backends answer `[body, status]` pairs; keep the body.
fn unwrap_tuple(v: Value) -> Value {
    match v {
        Value::Array(mut items) if !items.is_empty() && items[0].is_object() => items.swap_remove(0),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn base_without_trailing_slash_keeps_prefix() {
        let c = BackendClient::new("http://127.0.0.1:8000/dash", Duration::from_secs(1)).unwrap();
        assert_eq!(
            c.endpoint("api/audit").unwrap().as_str(),
            "http://127.0.0.1:8000/dash/api/audit"
        );
    }

    #[test]
    fn root_base_joins_api_paths() {
        let c = BackendClient::new("http://localhost:8000", Duration::from_secs(1)).unwrap();
        assert_eq!(
            c.endpoint("api/job/abc").unwrap().as_str(),
            "http://localhost:8000/api/job/abc"
        );
    }

    #[test]
    fn job_id_is_one_encoded_segment() {
        let c = BackendClient::new("http://localhost:8000/dash", Duration::from_secs(1)).unwrap();
        assert_eq!(
            c.job_endpoint("abc").unwrap().as_str(),
            "http://localhost:8000/dash/api/job/abc"
        );
        assert_eq!(
            c.job_endpoint("a/b?c#d").unwrap().as_str(),
            "http://localhost:8000/dash/api/job/a%2Fb%3Fc%23d"
        );
        assert_eq!(
            c.job_endpoint("../audit").unwrap().as_str(),
            "http://localhost:8000/dash/api/job/..%2Faudit"
        );
    }

    #[test]
    fn dot_job_ids_are_rejected() {
        let c = BackendClient::new("http://localhost:8000", Duration::from_secs(1)).unwrap();
        for id in ["", ".", ".."] {
            assert!(c.job_endpoint(id).is_err(), "{id:?}");
        }
    }

    #[test]
    fn invalid_base_is_rejected() {
        assert!(BackendClient::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn tuple_replies_unwrap_to_body() {
        let v = unwrap_tuple(json!([{"error": "job not found"}, 404]));
        assert_eq!(v, json!({"error": "job not found"}));
        assert_eq!(unwrap_tuple(json!({"status": "done"})), json!({"status": "done"}));
    }
}
