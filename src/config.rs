use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::backend::FixtureOptions;
use crate::poller::PollConfig;

/// audit-dash — dashboard client for a network-audit backend.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "audit-dash",
    version,
    about = "Dashboard client for a network-audit backend: audits, polled full scans, scrapes and JSON reports.",
    long_about = None
)]
pub struct Cli {
    /// Base URL of the audit backend.
    #[arg(long, global = true, default_value = "http://127.0.0.1:8000")]
    pub backend: String,

    /// Per-request HTTP timeout in milliseconds.
    #[arg(long = "timeout-ms", global = true, default_value_t = 30_000)]
    pub timeout_ms: u64,

    /// Wait before the first job status check, in milliseconds.
    #[arg(long = "poll-delay-ms", global = true, default_value_t = 1500)]
    pub poll_delay_ms: u64,

    /// Interval between job status checks, in milliseconds.
    #[arg(long = "poll-interval-ms", global = true, default_value_t = 2000)]
    pub poll_interval_ms: u64,

    /// Give up on a job after this many status checks.
    #[arg(long = "max-poll-attempts", global = true, default_value_t = 180)]
    pub max_poll_attempts: u32,

    /// Give up on a job after this many seconds.
    #[arg(long = "max-poll-secs", global = true, default_value_t = 360)]
    pub max_poll_secs: u64,

    /// Directory reports are written to.
    #[arg(long = "report-dir", global = true, default_value = ".")]
    pub report_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run a synchronous audit.
    Audit {
        url: String,
        /// Save the result as a JSON report.
        #[arg(long = "save-report", default_value_t = false)]
        save_report: bool,
    },
    /// Submit a full scan and poll until it finishes.
    Fullscan {
        url: String,
        /// Save the result as a JSON report.
        #[arg(long = "save-report", default_value_t = false)]
        save_report: bool,
    },
    /// Lightweight scrape of title, description, headings and links.
    Scrape { url: String },
    /// Serve the HTTP contract with canned data.
    ServeFixture {
        #[arg(long, default_value = "127.0.0.1:8000")]
        bind: String,
        /// JSON file with `{scan, scrape}` replies; built-in sample if omitted.
        #[arg(long)]
        fixture: Option<PathBuf>,
        /// How long full-scan jobs stay running, in milliseconds.
        #[arg(long = "job-latency-ms", default_value_t = 3000)]
        job_latency_ms: u64,
        /// Fail every full-scan job.
        #[arg(long = "fail-jobs", default_value_t = false)]
        fail_jobs: bool,
        /// Static dashboard directory served at `/`.
        #[arg(long)]
        ui: Option<PathBuf>,
    },
}

impl Cli {
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            initial_delay: Duration::from_millis(self.poll_delay_ms),
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.max_poll_attempts,
            max_duration: Duration::from_secs(self.max_poll_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Command {
    pub fn fixture_options(&self) -> Option<FixtureOptions> {
        match self {
            Command::ServeFixture {
                job_latency_ms,
                fail_jobs,
                ..
            } => Some(FixtureOptions {
                job_latency: Duration::from_millis(*job_latency_ms),
                fail_jobs: *fail_jobs,
            }),
            _ => None,
        }
    }
}
