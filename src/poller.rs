use std::time::Duration;

use serde_json::Value;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::client::JobSource;
use crate::types::JobStatus;

/// Timing and budget of a job poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Wait before the first status request.
    pub initial_delay: Duration,
    /// Wait between status requests while the job is running.
    pub interval: Duration,
    pub max_attempts: u32,
    /// Wall-clock budget measured from the start of the poll.
    pub max_duration: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1500),
            interval: Duration::from_millis(2000),
            max_attempts: 180,
            max_duration: Duration::from_secs(360),
        }
    }
}

/// Terminal state of a poll.
#[derive(Debug)]
pub enum PollOutcome {
    /// Job finished; carries the raw `result_data` document.
    Complete(Value),
    /// Backend reported the job failed.
    Failed(String),
    Cancelled,
    /// Budget ran out while the job was still running.
    Exhausted { attempts: u32 },
    /// Transport or decoding failure on a status request.
    Link(anyhow::Error),
}

/// Poll `job_id` until it leaves `running`, the budget runs out, or `cancel` fires.
pub async fn poll_job<S: JobSource>(
    source: &S,
    job_id: &str,
    cfg: &PollConfig,
    cancel: &CancellationToken,
) -> PollOutcome {
    // `None` when the budget is too large to represent: no deadline.
    let deadline = Instant::now().checked_add(cfg.max_duration);

    if !pause(cfg.initial_delay, cancel).await {
        return PollOutcome::Cancelled;
    }

    let mut attempts = 0u32;
    loop {
        if attempts >= cfg.max_attempts || deadline.is_some_and(|d| Instant::now() > d) {
            return PollOutcome::Exhausted { attempts };
        }
        attempts += 1;

        let record = tokio::select! {
            _ = cancel.cancelled() => return PollOutcome::Cancelled,
            r = source.job_status(job_id) => r,
        };
        let record = match record {
            Ok(r) => r,
            Err(e) => return PollOutcome::Link(e),
        };
        log::debug!("job {job_id} attempt {attempts}: {:?}", record.status);

        match record.status {
            Some(JobStatus::Running) => {}
            Some(JobStatus::Failed) => {
                return PollOutcome::Failed(
                    record.error.unwrap_or_else(|| "job failed".to_string()),
                )
            }
            Some(JobStatus::Done) | Some(JobStatus::Unknown) => {
                return match record.result_data {
                    Some(data) => PollOutcome::Complete(data),
                    None => PollOutcome::Failed(
                        record
                            .error
                            .unwrap_or_else(|| "job finished without result data".to_string()),
                    ),
                }
            }
            None => {
                return PollOutcome::Failed(
                    record
                        .error
                        .unwrap_or_else(|| "job record without status".to_string()),
                )
            }
        }

        if let Some(d) = deadline {
            let past_deadline = Instant::now()
                .checked_add(cfg.interval)
                .map_or(true, |next| next > d);
            if past_deadline {
                return PollOutcome::Exhausted { attempts };
            }
        }
        if !pause(cfg.interval, cancel).await {
            return PollOutcome::Cancelled;
        }
    }
}

// false when cancelled during the wait.
async fn pause(d: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = time::sleep(d) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobRecord;
    use anyhow::{anyhow, Result};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct Scripted {
        replies: Mutex<VecDeque<Result<JobRecord>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(replies: Vec<Result<JobRecord>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicU32::new(0),
            }
        }
    }

    impl JobSource for Scripted {
        async fn job_status(&self, _job_id: &str) -> Result<JobRecord> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(JobRecord::running()))
        }
    }

    fn done(data: Value) -> Result<JobRecord> {
        Ok(JobRecord {
            status: Some(JobStatus::Done),
            result_data: Some(data),
            ..JobRecord::default()
        })
    }

    fn cfg() -> PollConfig {
        PollConfig {
            initial_delay: Duration::from_millis(500),
            interval: Duration::from_millis(1000),
            max_attempts: 10,
            max_duration: Duration::from_secs(60),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn polls_at_interval_until_done() {
        let src = Scripted::new(vec![
            Ok(JobRecord::running()),
            Ok(JobRecord::running()),
            done(json!({"target_ip": "1.2.3.4"})),
        ]);
        let start = Instant::now();
        let out = poll_job(&src, "j1", &cfg(), &CancellationToken::new()).await;
        match out {
            PollOutcome::Complete(v) => assert_eq!(v["target_ip"], "1.2.3.4"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(src.calls.load(Ordering::SeqCst), 3);
        // 500ms delay + two 1s intervals.
        assert_eq!(start.elapsed(), Duration::from_millis(2500));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_job_stops_with_backend_error() {
        let src = Scripted::new(vec![Ok(JobRecord {
            status: Some(JobStatus::Failed),
            error: Some("Scan worker timed out".into()),
            ..JobRecord::default()
        })]);
        let out = poll_job(&src, "j1", &cfg(), &CancellationToken::new()).await;
        assert!(matches!(out, PollOutcome::Failed(ref e) if e == "Scan worker timed out"));
        assert_eq!(src.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_budget_is_enforced() {
        let src = Scripted::new(Vec::new());
        let mut c = cfg();
        c.max_attempts = 4;
        let out = poll_job(&src, "j1", &c, &CancellationToken::new()).await;
        assert!(matches!(out, PollOutcome::Exhausted { attempts: 4 }));
        assert_eq!(src.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn duration_budget_is_enforced() {
        let src = Scripted::new(Vec::new());
        let mut c = cfg();
        c.max_attempts = 1000;
        c.max_duration = Duration::from_millis(3000);
        let out = poll_job(&src, "j1", &c, &CancellationToken::new()).await;
        // Requests at 0.5s, 1.5s, 2.5s; the next would land past 3s.
        assert!(matches!(out, PollOutcome::Exhausted { attempts: 3 }));
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_budget_has_no_deadline() {
        let src = Scripted::new(vec![
            Ok(JobRecord::running()),
            done(json!({"target_ip": "1.2.3.4"})),
        ]);
        let mut c = cfg();
        c.max_attempts = u32::MAX;
        c.max_duration = Duration::MAX;
        let out = poll_job(&src, "j1", &c, &CancellationToken::new()).await;
        assert!(matches!(out, PollOutcome::Complete(_)));
        assert_eq!(src.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_beyond_budget_exhausts_without_waiting() {
        let src = Scripted::new(Vec::new());
        let mut c = cfg();
        c.interval = Duration::MAX;
        let start = Instant::now();
        let out = poll_job(&src, "j1", &c, &CancellationToken::new()).await;
        assert!(matches!(out, PollOutcome::Exhausted { attempts: 1 }));
        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_the_wait() {
        let src = Scripted::new(Vec::new());
        let cancel = CancellationToken::new();
        let c2 = cancel.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(1700)).await;
            c2.cancel();
        });
        let out = poll_job(&src, "j1", &cfg(), &cancel).await;
        assert!(matches!(out, PollOutcome::Cancelled));
        assert_eq!(src.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn link_error_is_terminal() {
        let src = Scripted::new(vec![Err(anyhow!("connection refused"))]);
        let out = poll_job(&src, "j1", &cfg(), &CancellationToken::new()).await;
        assert!(matches!(out, PollOutcome::Link(_)));
        assert_eq!(src.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_job_is_a_failure() {
        let src = Scripted::new(vec![Ok(JobRecord {
            error: Some("job not found".into()),
            ..JobRecord::default()
        })]);
        let out = poll_job(&src, "nope", &cfg(), &CancellationToken::new()).await;
        assert!(matches!(out, PollOutcome::Failed(ref e) if e == "job not found"));
    }
}
