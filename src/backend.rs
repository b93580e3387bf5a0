//! Fixture backend speaking the dashboard's HTTP contract with canned data.
//! Used for demos and integration tests; there is no audit engine behind it.

use std::{collections::HashMap, path::Path, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::{
    extract::{Path as UrlPath, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::services::ServeDir;
use ::time::{macros::format_description, OffsetDateTime};

use crate::types::{AuditRequest, JobRecord, JobStatus, JobTicket, ScrapeResult};

/// Canned replies served by the fixture backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    pub scan: Value,
    #[serde(default)]
    pub scrape: ScrapeResult,
}

impl Fixture {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read fixture file: {}", path.as_ref().display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("invalid fixture file: {}", path.as_ref().display()))
    }

    /// Built-in sample: one host with two web ports and HSTS only.
    pub fn sample() -> Self {
        Self {
            scan: json!({
                "scan_start_time": "12:00:00",
                "target_ip": "1.2.3.4",
                "target_port": 443,
                "geo_intel": {"org": "ACME", "as": "AS123", "isp": "ACME ISP"},
                "open_ports": [
                    {"port": 80, "service": "http", "banner": "HTTP/1.1 200 OK"},
                    {"port": 443, "service": "https", "banner": "No Banner Responded"}
                ],
                "vpn_status": "No VPN Server Found",
                "findings": {
                    "proxy_detected": "No Proxy Found",
                    "server_software": "nginx",
                    "operating_system": "Hidden",
                    "security_header_audit": {
                        "Strict-Transport-Security": "max-age=0",
                        "Content-Security-Policy": "MISSING"
                    }
                }
            }),
            scrape: ScrapeResult {
                url: Some("https://example.com/".into()),
                status_code: Some(200),
                title: Some("Example Domain".into()),
                description: None,
                h1: vec!["Example Domain".into()],
                links: vec!["https://www.iana.org/domains/example".into()],
                error: None,
            },
        }
    }
}

/// Fixture backend behaviour knobs.
#[derive(Debug, Clone)]
pub struct FixtureOptions {
    /// Time a full-scan job stays `running`.
    pub job_latency: Duration,
    /// Fail every full-scan job instead of completing it.
    pub fail_jobs: bool,
}

impl Default for FixtureOptions {
    fn default() -> Self {
        Self {
            job_latency: Duration::from_millis(3000),
            fail_jobs: false,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    inner: Arc<RwLock<BackendState>>, // job table
    fixture: Arc<Fixture>,
    options: FixtureOptions,
}

/// Job table size at which finished jobs nobody fetched are swept.
const MAX_JOBS: usize = 1024;

#[derive(Debug, Default)]
struct BackendState {
    jobs: HashMap<String, JobRecord>,
}

impl BackendState {
    fn insert_job(&mut self, job_id: String) {
        if self.jobs.len() >= MAX_JOBS {
            self.jobs.retain(|_, job| job.is_running());
        }
        self.jobs.insert(job_id, JobRecord::running());
    }

    // Finished jobs are handed out once, then dropped.
    fn take_job(&mut self, job_id: &str) -> Option<JobRecord> {
        let job = self.jobs.get(job_id)?;
        if job.is_running() {
            Some(job.clone())
        } else {
            self.jobs.remove(job_id)
        }
    }
}

impl AppState {
    pub fn new(fixture: Fixture, options: FixtureOptions) -> Self {
        Self {
            inner: Arc::new(RwLock::new(BackendState::default())),
            fixture: Arc::new(fixture),
            options,
        }
    }
}

/// Contract routes under `/api`, plus an optional static UI directory.
pub fn router(state: AppState, ui_dir: Option<&Path>) -> Router {
    let api = Router::new()
        .route("/audit", post(post_audit))
        .route("/fullscan", post(post_fullscan))
        .route("/job/{job_id}", get(get_job))
        .route("/scrape", post(post_scrape))
        .with_state(state);

    let app = Router::new().nest("/api", api);
    match ui_dir {
        Some(dir) => app.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true)),
        None => app,
    }
}

pub async fn serve(listener: TcpListener, app: Router) -> Result<()> {
    axum::serve(listener, app).await?;
    Ok(())
}

pub async fn spawn_server(bind: &str, state: AppState, ui_dir: Option<&Path>) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    log::info!("fixture backend listening on http://{}", listener.local_addr()?);
    serve(listener, router(state, ui_dir)).await
}

fn bad_request() -> axum::response::Response {
    (StatusCode::BAD_REQUEST, Json(json!({"error": "url is required"}))).into_response()
}

async fn post_audit(State(app): State<AppState>, Json(req): Json<AuditRequest>) -> impl IntoResponse {
    if req.url.trim().is_empty() {
        return bad_request();
    }
    log::info!("audit requested for {}", req.url);
    let mut scan = app.fixture.scan.clone();
    if let Some(obj) = scan.as_object_mut() {
        obj.insert("scan_start_time".into(), Value::String(start_time()));
    }
    (StatusCode::OK, Json(scan)).into_response()
}

async fn post_fullscan(
    State(app): State<AppState>,
    Json(req): Json<AuditRequest>,
) -> impl IntoResponse {
    if req.url.trim().is_empty() {
        return bad_request();
    }
    let job_id = uuid::Uuid::now_v7().simple().to_string();
    {
        let mut s = app.inner.write().await;
        s.insert_job(job_id.clone());
    }
    log::info!("full scan {job_id} queued for {}", req.url);

    // Finish the job after the configured latency.
    let app2 = app.clone();
    let id = job_id.clone();
    tokio::spawn(async move {
        tokio::time::sleep(app2.options.job_latency).await;
        let mut s = app2.inner.write().await;
        let Some(job) = s.jobs.get_mut(&id) else {
            return;
        };
        if app2.options.fail_jobs {
            job.status = Some(JobStatus::Failed);
            job.error = Some("Scan worker timed out".into());
        } else {
            let mut data = app2.fixture.scan.clone();
            if let Some(obj) = data.as_object_mut() {
                obj.insert("scan_start_time".into(), Value::String(start_time()));
            }
            job.status = Some(JobStatus::Done);
            job.result_data = Some(data);
        }
    });

    (StatusCode::OK, Json(JobTicket { job_id })).into_response()
}

async fn get_job(State(app): State<AppState>, UrlPath(job_id): UrlPath<String>) -> impl IntoResponse {
    let mut s = app.inner.write().await;
    match s.take_job(&job_id) {
        Some(job) => (StatusCode::OK, Json(job)).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"error": "job not found"}))).into_response(),
    }
}

async fn post_scrape(State(app): State<AppState>, Json(req): Json<AuditRequest>) -> impl IntoResponse {
    if req.url.trim().is_empty() {
        return bad_request();
    }
    (StatusCode::OK, Json(app.fixture.scrape.clone())).into_response()
}

fn start_time() -> String {
    OffsetDateTime::now_utc()
        .format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .unwrap_or_else(|_| String::from("1970-01-01 00:00:00"))
}
