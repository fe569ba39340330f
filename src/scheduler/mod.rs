//! Scheduler module for running probes on a fixed interval.
//!
//! One timer task fires a probe every interval; the status API can request an
//! extra probe through [`Scheduler::trigger_now`]. At most one probe, scheduled
//! or manual, is in flight at any time.

mod retention;

pub use retention::*;

use crate::config::{ConfigError, MonitorConfig};
use crate::db::{ProbeResult, Store, StoreError};
use crate::probe::Prober;

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Reasons a probe request was not carried out.
#[derive(Error, Debug)]
pub enum TriggerError {
    #[error("manual checks are rate limited, retry in {}s", .retry_after.as_secs().max(1))]
    CoolingDown { retry_after: Duration },
    #[error("a probe is already in flight")]
    InFlight,
    #[error("monitoring is paused")]
    Paused,
    #[error("scheduler is stopped")]
    Stopped,
    #[error("failed to store probe result: {0}")]
    Store(#[from] StoreError),
    #[error("probe task failed: {0}")]
    Task(String),
}

/// What happened on one scheduled tick.
#[derive(Debug)]
pub enum TickOutcome {
    Recorded(ProbeResult),
    /// Monitoring was paused through the control endpoint.
    Paused,
    /// Another probe was still in flight, or the scheduler is stopping.
    Dropped,
    /// The probe ran but its result could not be persisted.
    StoreFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Probing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Scheduled,
    Manual,
}

struct SchedulerState {
    phase: Phase,
    active: bool,
    stopped: bool,
    last_manual: Option<Instant>,
    first_tick: Option<Instant>,
}

/// Snapshot of the scheduler for the status API.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub target_url: String,
    pub interval_seconds: u64,
    pub manual_cooldown_seconds: u64,
    pub monitoring_active: bool,
    pub probe_in_flight: bool,
    /// Whole seconds until the next scheduled tick, if the timer is running.
    pub next_check_in: Option<u64>,
}

/// Marks the scheduler as probing; returns it to idle when dropped.
struct ProbeSlot {
    scheduler: Arc<Scheduler>,
}

impl Drop for ProbeSlot {
    fn drop(&mut self) {
        self.scheduler.lock_state().phase = Phase::Idle;
        self.scheduler.idle.notify_waiters();
    }
}

/// The scheduler that owns probe timing and the in-flight flag.
pub struct Scheduler {
    prober: Prober,
    store: Arc<Store>,
    interval: Duration,
    manual_cooldown: Duration,
    state: Mutex<SchedulerState>,
    idle: Notify,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Create a scheduler, refusing configurations below the interval floor.
    pub fn new(config: &MonitorConfig, store: Arc<Store>) -> Result<Self, ConfigError> {
        let probe_config = config.validate()?;
        let prober =
            Prober::new(probe_config).map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            prober,
            store,
            interval: config.interval,
            manual_cooldown: config.manual_cooldown,
            state: Mutex::new(SchedulerState {
                phase: Phase::Idle,
                active: true,
                stopped: false,
                last_manual: None,
                first_tick: None,
            }),
            idle: Notify::new(),
            shutdown_tx,
            task: Mutex::new(None),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start the timer task. The first probe fires one full interval from now.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_some() {
            return;
        }

        let first_tick = Instant::now() + self.interval;
        self.lock_state().first_tick = Some(first_tick);

        tracing::info!(
            "Scheduler: monitoring {} every {}s",
            self.prober.config().url,
            self.interval.as_secs()
        );

        let shutdown_rx = self.shutdown_tx.subscribe();
        *task = Some(tokio::spawn(Arc::clone(self).run(first_tick, shutdown_rx)));
    }

    async fn run(self: Arc<Self>, first_tick: Instant, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval_at(first_tick, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => {
                    if let TickOutcome::Recorded(result) = self.run_tick().await {
                        tracing::debug!("Scheduler: recorded probe issued at {}", result.timestamp);
                    }
                }
            }
        }

        tracing::info!("Scheduler: timer stopped");
    }

    /// Handle one scheduled tick.
    pub async fn run_tick(self: &Arc<Self>) -> TickOutcome {
        let slot = match self.claim(Trigger::Scheduled) {
            Ok(slot) => slot,
            Err(TriggerError::Paused) => {
                tracing::info!("Scheduler: monitoring paused, skipping tick");
                return TickOutcome::Paused;
            }
            Err(e) => {
                tracing::warn!("Scheduler: dropping tick: {}", e);
                return TickOutcome::Dropped;
            }
        };

        match self.execute(slot).await {
            Ok(result) => TickOutcome::Recorded(result),
            Err(e) => {
                tracing::error!("Scheduler: {}", e);
                TickOutcome::StoreFailed
            }
        }
    }

    /// Run an out-of-band probe now, subject to the manual cooldown.
    ///
    /// Rejections write nothing. An accepted trigger goes through the same
    /// path as a scheduled tick.
    pub async fn trigger_now(self: &Arc<Self>) -> Result<ProbeResult, TriggerError> {
        let slot = self.claim(Trigger::Manual)?;
        tracing::info!("Scheduler: manual check accepted");

        // Detached from the caller: a dropped request must not cancel the probe or its append.
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.execute(slot).await });

        match handle.await {
            Ok(result) => Ok(result?),
            Err(e) => Err(TriggerError::Task(e.to_string())),
        }
    }

    fn claim(self: &Arc<Self>, trigger: Trigger) -> Result<ProbeSlot, TriggerError> {
        let mut state = self.lock_state();

        if state.stopped {
            return Err(TriggerError::Stopped);
        }
        if trigger == Trigger::Scheduled && !state.active {
            return Err(TriggerError::Paused);
        }
        if state.phase == Phase::Probing {
            return Err(TriggerError::InFlight);
        }
        if trigger == Trigger::Manual {
            if let Some(last) = state.last_manual {
                let elapsed = last.elapsed();
                if elapsed < self.manual_cooldown {
                    return Err(TriggerError::CoolingDown {
                        retry_after: self.manual_cooldown - elapsed,
                    });
                }
            }
            state.last_manual = Some(Instant::now());
        }

        state.phase = Phase::Probing;
        Ok(ProbeSlot {
            scheduler: Arc::clone(self),
        })
    }

    async fn execute(&self, slot: ProbeSlot) -> Result<ProbeResult, StoreError> {
        let url = &self.prober.config().url;
        let result = self.prober.probe().await;

        match (&result.status_code, &result.error) {
            (Some(code), _) if result.success => tracing::info!(
                "Check successful for {}: status {} in {:.3}s",
                url,
                code,
                result.response_time
            ),
            (Some(code), _) => tracing::warn!(
                "Check failed for {}: unhealthy status {} in {:.3}s",
                url,
                code,
                result.response_time
            ),
            (None, error) => tracing::warn!(
                "Check failed for {}: {} after {:.3}s",
                url,
                error.as_deref().unwrap_or("unknown error"),
                result.response_time
            ),
        }

        self.store.append(&result)?;
        drop(slot);
        Ok(result)
    }

    /// Pause or resume scheduled probing. The timer keeps its cadence.
    pub fn set_active(&self, active: bool) {
        self.lock_state().active = active;
        tracing::info!(
            "Scheduler: monitoring {}",
            if active { "resumed" } else { "paused" }
        );
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = self.lock_state();
        let next_check_in = state.first_tick.filter(|_| !state.stopped).map(|first| {
            let now = Instant::now();
            if now <= first {
                return (first - now).as_secs();
            }
            let interval = self.interval.as_secs_f64();
            let since_first = (now - first).as_secs_f64();
            let into_period = since_first % interval;
            (interval - into_period).ceil() as u64
        });

        SchedulerStatus {
            target_url: self.prober.config().url.to_string(),
            interval_seconds: self.interval.as_secs(),
            manual_cooldown_seconds: self.manual_cooldown.as_secs(),
            monitoring_active: state.active,
            probe_in_flight: state.phase == Phase::Probing,
            next_check_in,
        }
    }

    /// Stop the timer and wait for any in-flight probe to be recorded.
    ///
    /// The in-flight request is never interrupted; further triggers are
    /// rejected with [`TriggerError::Stopped`].
    pub async fn shutdown(&self) {
        self.lock_state().stopped = true;
        let _ = self.shutdown_tx.send(true);

        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!("Scheduler: timer task failed: {}", e);
            }
        }

        self.wait_idle().await;
        tracing::info!("Scheduler: stopped");
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.lock_state().phase == Phase::Idle {
                return;
            }
            notified.await;
        }
    }
}
