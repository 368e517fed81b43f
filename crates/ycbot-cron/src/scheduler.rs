//! Auto-shutdown scheduler: a single cancellable sweep loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDateTime};
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ycbot_cloud::{CloudApi, CredentialHandle, ShutdownReport, local_today, sweep_expired};

use crate::schedule::Schedule;

/// What one loop iteration produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The sweep ran; the report may be empty.
    Swept(ShutdownReport),
    /// The inventory fetch failed, nothing was stopped.
    Failed(String),
}

/// Result of one auto-shutdown iteration, addressed to the chat that enabled it.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub recipient: i64,
    pub finished_at: DateTime<Local>,
    pub outcome: CycleOutcome,
}

impl CycleReport {
    /// Empty sweeps are recorded but not delivered.
    pub fn is_reportable(&self) -> bool {
        match &self.outcome {
            CycleOutcome::Swept(report) => !report.is_empty(),
            CycleOutcome::Failed(_) => true,
        }
    }
}

struct LoopState {
    cancel: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
    recipient: Option<i64>,
}

/// Owns the auto-shutdown toggle and at most one running sweep loop.
///
/// `enable`/`disable` serialize on one mutex that also guards the loop
/// handle, and `disable` joins the loop while holding it, so a following
/// `enable` can never overlap the old loop.
pub struct AutoShutdown {
    api: Arc<dyn CloudApi>,
    credential: CredentialHandle,
    schedule: Arc<RwLock<Schedule>>,
    last_report: Arc<RwLock<Option<CycleReport>>>,
    next_run: Arc<RwLock<Option<NaiveDateTime>>>,
    reports: mpsc::UnboundedSender<CycleReport>,
    state: Mutex<LoopState>,
}

impl AutoShutdown {
    /// Create an idle scheduler. Reportable cycle results are sent on `reports`.
    pub fn new(
        api: Arc<dyn CloudApi>,
        credential: CredentialHandle,
        schedule: Schedule,
        reports: mpsc::UnboundedSender<CycleReport>,
    ) -> Self {
        Self {
            api,
            credential,
            schedule: Arc::new(RwLock::new(schedule)),
            last_report: Arc::new(RwLock::new(None)),
            next_run: Arc::new(RwLock::new(None)),
            reports,
            state: Mutex::new(LoopState {
                cancel: None,
                handle: None,
                recipient: None,
            }),
        }
    }

    /// Start the loop, reporting to `recipient`. Returns `false` if it was
    /// already running.
    pub async fn enable(&self, recipient: i64) -> bool {
        let mut state = self.state.lock().await;

        if let Some(handle) = state.handle.take() {
            if !handle.is_finished() {
                state.handle = Some(handle);
                return false;
            }
            // The loop only ends on cancellation; anything else was a panic.
            if let Err(e) = handle.await {
                warn!("Previous auto-shutdown loop ended abnormally: {e}");
            }
        }

        let cancel = CancellationToken::new();
        let worker = Worker {
            api: self.api.clone(),
            credential: self.credential.clone(),
            schedule: self.schedule.clone(),
            last_report: self.last_report.clone(),
            next_run: self.next_run.clone(),
            reports: self.reports.clone(),
            recipient,
            cancel: cancel.child_token(),
        };

        state.handle = Some(tokio::spawn(worker.run()));
        state.cancel = Some(cancel);
        state.recipient = Some(recipient);
        info!(recipient, "Auto-shutdown enabled");
        true
    }

    /// Stop the loop and wait for it to exit. Returns `false` if it was not running.
    pub async fn disable(&self) -> bool {
        let mut state = self.state.lock().await;

        let Some(handle) = state.handle.take() else {
            return false;
        };
        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
        }
        state.recipient = None;

        if let Err(e) = handle.await {
            warn!("Auto-shutdown loop ended abnormally: {e}");
        }
        *self.next_run.write().await = None;
        info!("Auto-shutdown disabled");
        true
    }

    pub async fn is_enabled(&self) -> bool {
        let state = self.state.lock().await;
        state.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Chat receiving the running loop's reports.
    pub async fn recipient(&self) -> Option<i64> {
        self.state.lock().await.recipient
    }

    pub async fn schedule(&self) -> Schedule {
        *self.schedule.read().await
    }

    /// Replace the schedule. A running loop picks it up when it computes its
    /// next wait; a wait already in progress is not shortened or extended.
    pub async fn set_schedule(&self, schedule: Schedule) {
        *self.schedule.write().await = schedule;
        info!(%schedule, "Auto-shutdown schedule changed");
    }

    /// Local time the running loop is waiting for. `None` while disabled.
    pub async fn next_run(&self) -> Option<NaiveDateTime> {
        *self.next_run.read().await
    }

    /// Result of the most recent cycle, reportable or not.
    pub async fn last_report(&self) -> Option<CycleReport> {
        self.last_report.read().await.clone()
    }
}

struct Worker {
    api: Arc<dyn CloudApi>,
    credential: CredentialHandle,
    schedule: Arc<RwLock<Schedule>>,
    last_report: Arc<RwLock<Option<CycleReport>>>,
    next_run: Arc<RwLock<Option<NaiveDateTime>>>,
    reports: mpsc::UnboundedSender<CycleReport>,
    recipient: i64,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) {
        info!(recipient = self.recipient, "Auto-shutdown loop started");

        loop {
            let report = CycleReport {
                recipient: self.recipient,
                outcome: self.run_cycle().await,
                finished_at: Local::now(),
            };

            if report.is_reportable() && self.reports.send(report.clone()).is_err() {
                warn!("Report receiver dropped, auto-shutdown results are only kept locally");
            }
            *self.last_report.write().await = Some(report);

            let schedule = *self.schedule.read().await;
            let now = Local::now().naive_local();
            let next = schedule.next_fire_after(now);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            *self.next_run.write().await = Some(next);
            info!(next_run = %next, wait_secs = wait.as_secs(), "Next auto-shutdown cycle scheduled");

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        info!(recipient = self.recipient, "Auto-shutdown loop stopped");
    }

    async fn run_cycle(&self) -> CycleOutcome {
        let token = self.credential.bearer();
        match sweep_expired(self.api.as_ref(), &token, local_today()).await {
            Ok(report) => {
                info!(
                    stopped = report.succeeded(),
                    failed = report.failed(),
                    "Auto-shutdown cycle finished"
                );
                CycleOutcome::Swept(report)
            }
            Err(e) => {
                warn!("Auto-shutdown cycle failed: {e}");
                CycleOutcome::Failed(e.to_string())
            }
        }
    }
}
