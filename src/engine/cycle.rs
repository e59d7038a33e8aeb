//! Cycle worker: the single background loop.
//!
//! Each cycle syncs and dispatches every registered workflow in order, then
//! drains the queue once. Cycles run back to back with a fixed sleep in
//! between and only inside the working-hours window.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{Local, Timelike};
use tokio::sync::Notify;
use tracing::{Instrument, debug, error, info, warn};
use uuid::Uuid;

use super::dispatch::{DispatchReport, Dispatcher};
use super::drain::{DrainReport, QueueDrain};
use super::sync::SyncEngine;
use crate::error::{Error, Result};
use crate::telemetry::cycle::start_cycle_span;
use crate::telemetry::metrics;
use crate::workflow::WorkflowRegistry;

/// Inclusive range of local hours during which cycles run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkHours {
    pub start: u32,
    pub end: u32,
}

impl WorkHours {
    pub fn new(start: u32, end: u32) -> Result<Self> {
        if start > 23 || end > 23 || start > end {
            return Err(Error::Config(format!("invalid work hours {start}-{end}")));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, hour: u32) -> bool {
        (self.start..=self.end).contains(&hour)
    }
}

impl Default for WorkHours {
    fn default() -> Self {
        Self { start: 8, end: 20 }
    }
}

impl FromStr for WorkHours {
    type Err = Error;

    /// Parse `"8-20"`.
    fn from_str(s: &str) -> Result<Self> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| Error::Config(format!("work hours must look like 8-20, got {s:?}")))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|e| Error::Config(format!("work hours {s:?}: {e}")))
        };
        Self::new(parse(start)?, parse(end)?)
    }
}

#[derive(Debug, Clone)]
pub struct CycleConfig {
    /// Sleep between cycles.
    pub interval: Duration,
    pub work_hours: WorkHours,
    /// Renderer scratch root, wiped every `scratch_sweep_every` cycles.
    pub scratch_dir: Option<PathBuf>,
    pub scratch_sweep_every: u64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15 * 60),
            work_hours: WorkHours::default(),
            scratch_dir: None,
            scratch_sweep_every: 1000,
        }
    }
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub workflows: usize,
    /// Workflows whose sync pass hit a store error and were not dispatched.
    pub sync_failures: usize,
    pub candidates: usize,
    pub dispatch: DispatchReport,
    /// `None` if the queue could not be listed.
    pub drain: Option<DrainReport>,
}

#[derive(Clone)]
pub struct Worker {
    workflows: Arc<WorkflowRegistry>,
    sync: Arc<SyncEngine>,
    dispatcher: Arc<Dispatcher>,
    drain: QueueDrain,
    config: CycleConfig,
    shutdown: Arc<Notify>,
    cycles: Arc<AtomicU64>,
}

impl Worker {
    pub fn new(
        workflows: Arc<WorkflowRegistry>,
        sync: Arc<SyncEngine>,
        dispatcher: Arc<Dispatcher>,
        drain: QueueDrain,
        config: CycleConfig,
    ) -> Self {
        Self {
            workflows,
            sync,
            dispatcher,
            drain,
            config,
            shutdown: Arc::new(Notify::new()),
            cycles: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Signal the loop to stop. Takes effect between cycles.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Number of loop iterations so far, gated or not.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Run until shutdown.
    pub async fn run(&self) -> Result<()> {
        if let Some(dir) = &self.config.scratch_dir {
            tokio::fs::create_dir_all(dir).await?;
        }
        info!(
            workflows = self.workflows.policies().len(),
            interval_secs = self.config.interval.as_secs(),
            "cycle worker started"
        );

        loop {
            self.tick_at(Local::now().hour()).await;

            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("cycle worker shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }
    }

    /// One loop iteration at local hour `hour`: the gated cycle plus the
    /// periodic scratch sweep. Returns `None` outside working hours.
    pub async fn tick_at(&self, hour: u32) -> Option<CycleReport> {
        let n = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        if self.config.scratch_sweep_every > 0 && n % self.config.scratch_sweep_every == 0 {
            self.sweep_scratch().await;
        }

        if !self.config.work_hours.contains(hour) {
            debug!(hour, "outside working hours, skipping cycle");
            return None;
        }
        Some(self.run_once().await)
    }

    /// Run one full cycle regardless of the working-hours gate.
    pub async fn run_once(&self) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        let start = Instant::now();

        let report = self.cycle().instrument(start_cycle_span(&cycle_id)).await;

        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        metrics::cycle_duration_ms().record(duration_ms, &[]);
        info!(
            cycle_id = %cycle_id,
            duration_ms = duration_ms as u64,
            enqueued = report.dispatch.enqueued,
            delivered = report.drain.as_ref().map_or(0, |d| d.delivered),
            "cycle finished"
        );
        report
    }

    async fn cycle(&self) -> CycleReport {
        let mut report = CycleReport {
            workflows: self.workflows.policies().len(),
            ..Default::default()
        };

        for policy in self.workflows.policies() {
            let synced = match self.sync.sync(&policy.code, &policy.status_filter()).await {
                Ok(synced) => synced,
                Err(e) => {
                    report.sync_failures += 1;
                    error!(workflow = %policy.name, error = %e, "sync failed, skipping dispatch");
                    continue;
                }
            };
            report.candidates += synced.candidates.len();
            let dispatched = self.dispatcher.dispatch(policy, &synced.candidates).await;
            report.dispatch.merge(&dispatched);
        }

        report.drain = match self.drain.drain().await {
            Ok(drained) => Some(drained),
            Err(e) => {
                error!(error = %e, "drain failed");
                None
            }
        };
        report
    }

    async fn sweep_scratch(&self) {
        let Some(dir) = &self.config.scratch_dir else {
            return;
        };
        if let Err(e) = tokio::fs::remove_dir_all(dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(dir = %dir.display(), "scratch sweep error: {e}");
            }
        }
        match tokio::fs::create_dir_all(dir).await {
            Ok(()) => info!(dir = %dir.display(), "scratch directory swept"),
            Err(e) => warn!(dir = %dir.display(), "cannot recreate scratch dir: {e}"),
        }
    }
}
