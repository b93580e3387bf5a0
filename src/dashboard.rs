//! The dashboard controller: owns the session, drives the backend, and keeps
//! the view model and log panel current.

use std::path::PathBuf;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::Backend;
use crate::poller::{poll_job, PollConfig, PollOutcome};
use crate::report;
use crate::terminal::{LogPanel, Severity};
use crate::types::{ScanResult, ScrapeResult};
use crate::view::{self, ViewModel};

pub const EMPTY_URL_ALERT: &str = "Please enter a URL";
/// Links shown in the log panel per scrape.
pub const SCRAPE_LINK_LIMIT: usize = 10;

/// Lifecycle of the current scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanState {
    #[default]
    Idle,
    Submitted,
    Polling,
    Complete,
    Failed,
    Cancelled,
    Exhausted,
}

/// What a user action ended in. Failures are already in the log panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Blocked before any request; the message is shown to the user.
    Alert(String),
    Completed,
    Failed,
    Cancelled,
    /// A newer scan started while this one was in flight; its result was dropped.
    Superseded,
}

/// Last successful scan: the backend document as received plus its typed view.
#[derive(Debug, Clone)]
pub struct CachedScan {
    pub raw: Value,
    pub scan: ScanResult,
}

#[derive(Debug, Default)]
pub struct Session {
    pub url_input: String,
    pub state: ScanState,
    last_result: Option<CachedScan>,
    generation: u64,
    active_poll: Option<CancellationToken>,
}

impl Session {
    pub fn last_result(&self) -> Option<&CachedScan> {
        self.last_result.as_ref()
    }

    pub fn has_active_poll(&self) -> bool {
        self.active_poll.is_some()
    }
}

/// A full-scan job whose poll task is running in the background.
#[derive(Debug)]
pub struct PendingPoll {
    pub job_id: String,
    generation: u64,
    cancel: CancellationToken,
    task: JoinHandle<PollOutcome>,
}

impl PendingPoll {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

pub enum FullAuditStart {
    Polling(PendingPoll),
    Finished(ActionOutcome),
}

pub struct Dashboard<B> {
    backend: B,
    poll: PollConfig,
    report_dir: PathBuf,
    session: Session,
    panel: LogPanel,
    view: ViewModel,
}

impl<B> Dashboard<B>
where
    B: Backend + Clone + Send + Sync + 'static,
{
    pub fn new(backend: B, poll: PollConfig, report_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            poll,
            report_dir: report_dir.into(),
            session: Session::default(),
            panel: LogPanel::default(),
            view: ViewModel::default(),
        }
    }

    pub fn set_url_input(&mut self, url: impl Into<String>) {
        self.session.url_input = url.into();
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn view(&self) -> &ViewModel {
        &self.view
    }

    pub fn panel(&self) -> &LogPanel {
        &self.panel
    }

    pub fn panel_mut(&mut self) -> &mut LogPanel {
        &mut self.panel
    }

    pub fn log_to_terminal(&mut self, message: impl Into<String>, severity: Severity) {
        self.panel.log(message, severity);
    }

    /// Synchronous audit: one request, render on success.
    pub async fn start_audit(&mut self) -> ActionOutcome {
        let Some(url) = self.read_url() else {
            return ActionOutcome::Alert(EMPTY_URL_ALERT.to_string());
        };
        self.begin_scan();
        self.log_to_terminal(format!("Initializing audit for: {url}"), Severity::Warning);
        self.session.state = ScanState::Submitted;

        match self.backend.audit(&url).await {
            Ok(raw) => self.accept_scan(raw, "Network reconnaissance complete."),
            Err(e) => {
                self.session.state = ScanState::Failed;
                self.log_to_terminal(format!("Link Error: {e}"), Severity::Error);
                ActionOutcome::Failed
            }
        }
    }

    /// Submit a full scan and spawn its poll task. Any poll still running
    /// for an earlier scan is cancelled first.
    pub async fn start_full_audit(&mut self) -> FullAuditStart {
        let Some(url) = self.read_url() else {
            return FullAuditStart::Finished(ActionOutcome::Alert(EMPTY_URL_ALERT.to_string()));
        };
        let generation = self.begin_scan();
        self.log_to_terminal(format!("Submitting full scan for: {url}"), Severity::Warning);
        self.session.state = ScanState::Submitted;

        let ticket = match self.backend.submit_full_scan(&url).await {
            Ok(t) => t,
            Err(e) => {
                self.session.state = ScanState::Failed;
                self.log_to_terminal(format!("Link Error: {e}"), Severity::Error);
                return FullAuditStart::Finished(ActionOutcome::Failed);
            }
        };

        self.log_to_terminal(
            format!("Full scan queued (job {}). Polling for results...", ticket.job_id),
            Severity::Info,
        );
        self.session.state = ScanState::Polling;

        let cancel = CancellationToken::new();
        self.session.active_poll = Some(cancel.clone());
        let backend = self.backend.clone();
        let cfg = self.poll;
        let job_id = ticket.job_id.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move { poll_job(&backend, &job_id, &cfg, &token).await });

        FullAuditStart::Polling(PendingPoll {
            job_id: ticket.job_id,
            generation,
            cancel,
            task,
        })
    }

    /// Wait for a poll task and apply its outcome, unless a newer scan has
    /// taken over the session in the meantime.
    pub async fn finish_full_audit(&mut self, pending: PendingPoll) -> ActionOutcome {
        let outcome = match pending.task.await {
            Ok(o) => o,
            Err(e) => PollOutcome::Link(anyhow::anyhow!("poll task aborted: {e}")),
        };

        if pending.generation != self.session.generation {
            log::debug!("dropping outcome of superseded job {}", pending.job_id);
            self.log_to_terminal(
                format!("Discarded stale result for job {}", pending.job_id),
                Severity::Warning,
            );
            return ActionOutcome::Superseded;
        }
        self.session.active_poll = None;

        match outcome {
            PollOutcome::Complete(raw) => self.accept_scan(raw, "Full scan complete."),
            PollOutcome::Failed(err) => {
                self.session.state = ScanState::Failed;
                self.log_to_terminal(format!("Scan failed: {err}"), Severity::Error);
                ActionOutcome::Failed
            }
            PollOutcome::Cancelled => {
                self.session.state = ScanState::Cancelled;
                self.log_to_terminal(
                    format!("Polling cancelled for job {}", pending.job_id),
                    Severity::Warning,
                );
                ActionOutcome::Cancelled
            }
            PollOutcome::Exhausted { attempts } => {
                self.session.state = ScanState::Exhausted;
                self.log_to_terminal(
                    format!(
                        "Gave up on job {} after {attempts} status checks",
                        pending.job_id
                    ),
                    Severity::Warning,
                );
                ActionOutcome::Failed
            }
            PollOutcome::Link(e) => {
                self.session.state = ScanState::Failed;
                self.log_to_terminal(format!("Link Error: {e}"), Severity::Error);
                ActionOutcome::Failed
            }
        }
    }

    /// Submit, poll and render a full scan.
    pub async fn run_full_audit(&mut self) -> ActionOutcome {
        match self.start_full_audit().await {
            FullAuditStart::Polling(p) => self.finish_full_audit(p).await,
            FullAuditStart::Finished(o) => o,
        }
    }

    /// Cancel the poll of the current full scan, if any.
    pub fn cancel_active_poll(&mut self) -> bool {
        match self.session.active_poll.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Lightweight scrape, reported in the log panel only.
    pub async fn start_scrape(&mut self) -> ActionOutcome {
        let Some(url) = self.read_url() else {
            return ActionOutcome::Alert(EMPTY_URL_ALERT.to_string());
        };
        self.log_to_terminal(format!("Scraping: {url}"), Severity::Warning);

        match self.backend.scrape(&url).await {
            Ok(result) => match result.error.clone() {
                Some(err) => {
                    self.log_to_terminal(format!("Scrape Error: {err}"), Severity::Error);
                    ActionOutcome::Failed
                }
                None => {
                    for (line, severity) in scrape_lines(&result) {
                        self.log_to_terminal(line, severity);
                    }
                    ActionOutcome::Completed
                }
            },
            Err(e) => {
                self.log_to_terminal(format!("Link Error: {e}"), Severity::Error);
                ActionOutcome::Failed
            }
        }
    }

    /// Write the cached result as a report file. `None` when nothing has
    /// been scanned yet or the write failed.
    pub fn download_report(&mut self) -> Option<PathBuf> {
        let cached = self.session.last_result.as_ref()?;
        let written = report::write_report(
            &self.report_dir,
            &self.session.url_input,
            &cached.raw,
            report::epoch_millis(),
        );
        match written {
            Ok(path) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.log_to_terminal(format!("Snapshot saved: {name}"), Severity::Success);
                Some(path)
            }
            Err(e) => {
                self.log_to_terminal(format!("Report Error: {e:#}"), Severity::Error);
                None
            }
        }
    }

    fn read_url(&self) -> Option<String> {
        let url = self.session.url_input.trim();
        (!url.is_empty()).then(|| url.to_string())
    }

    // Cancels any running poll and starts a new generation.
    fn begin_scan(&mut self) -> u64 {
        if self.cancel_active_poll() {
            self.log_to_terminal("Cancelled previous full scan poll.", Severity::Warning);
        }
        self.session.generation += 1;
        self.session.generation
    }

    // Renders and caches a scan document. Anything but a JSON object is a
    // broken reply and leaves the previous result in place.
    fn accept_scan(&mut self, raw: Value, done: &str) -> ActionOutcome {
        if !raw.is_object() {
            self.session.state = ScanState::Failed;
            self.log_to_terminal(
                "Link Error: malformed scan result (expected a JSON object)",
                Severity::Error,
            );
            return ActionOutcome::Failed;
        }
        let scan = ScanResult::from_value(&raw);
        let rendered = view::update_ui(&scan);
        for w in &rendered.warnings {
            self.panel.log(format!("Render warning: {w}"), Severity::Warning);
        }
        self.view = rendered.view;
        self.session.last_result = Some(CachedScan { raw, scan });
        self.session.state = ScanState::Complete;
        self.log_to_terminal(done, Severity::Success);
        ActionOutcome::Completed
    }
}

/// Log panel lines for a successful scrape.
pub fn scrape_lines(result: &ScrapeResult) -> Vec<(String, Severity)> {
    let mut out = Vec::new();
    let or_na = |s: &Option<String>| {
        s.as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(view::NOT_AVAILABLE)
            .to_string()
    };
    out.push((format!("Title: {}", or_na(&result.title)), Severity::Info));
    out.push((
        format!("Description: {}", or_na(&result.description)),
        Severity::Info,
    ));
    let h1 = if result.h1.is_empty() {
        view::NOT_AVAILABLE.to_string()
    } else {
        result.h1.join(" | ")
    };
    out.push((format!("H1: {h1}"), Severity::Info));

    let shown = result.links.len().min(SCRAPE_LINK_LIMIT);
    out.push((
        format!("Links (showing {shown} of {}):", result.links.len()),
        Severity::Info,
    ));
    for link in result.links.iter().take(SCRAPE_LINK_LIMIT) {
        out.push((format!("  {link}"), Severity::Info));
    }
    out.push(("Scrape complete.".to_string(), Severity::Success));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrape_lines_truncate_links() {
        let result = ScrapeResult {
            title: Some("Example".into()),
            h1: vec!["One".into(), "Two".into()],
            links: (0..25).map(|i| format!("https://e.com/{i}")).collect(),
            ..ScrapeResult::default()
        };
        let lines = scrape_lines(&result);
        let text: Vec<&str> = lines.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(text[0], "Title: Example");
        assert_eq!(text[1], "Description: N/A");
        assert_eq!(text[2], "H1: One | Two");
        assert_eq!(text[3], "Links (showing 10 of 25):");
        assert_eq!(text.iter().filter(|l| l.starts_with("  https://")).count(), 10);
        assert_eq!(text.last(), Some(&"Scrape complete."));
    }
}
