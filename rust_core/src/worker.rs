//! Polling worker with exponential backoff and a consecutive-error breaker.
//!
//! One Tokio task drives the orchestrator. The next cycle is scheduled only
//! after the current one has fully completed, so at most one fetch is ever
//! in flight:
//!
//! ```text
//! start() --> [sleep delay] --> fetch_and_store() --> ok:   delay = interval
//!                  ^                                  err:  delay = backoff(n)
//!                  |__________________________________|     n >= max_retries: Halted
//! ```
//!
//! States: `Stopped` -> `Running` -> `Halted`; `stop()` returns either of the
//! latter to `Stopped`, `restart()` recovers from `Halted`.

use crate::error::{ErrorKind, PriceError, PriceResult};
use crate::models::PriceRecord;
use crate::orchestrator::PriceOrchestrator;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lower bound for the polling interval
pub const MIN_UPDATE_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_MAX_RETRIES: u32 = 5;
/// Growth factor applied per consecutive failure after the first
pub const BACKOFF_MULTIPLIER: f64 = 1.5;
/// Upper bound for any backoff delay (5 minutes)
pub const MAX_BACKOFF_MS: u64 = 300_000;
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(1);

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Delay between successful cycles
    pub update_interval_ms: u64,
    /// Consecutive failures that halt the worker
    pub max_retries: u32,
    /// Pause between stop and start in `restart()`
    pub restart_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            restart_delay: DEFAULT_RESTART_DELAY,
        }
    }
}

/// Lifecycle state of the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Stopped,
    Running,
    /// Tripped after `max_retries` consecutive failures; terminal until restart
    Halted,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Halted => "halted",
        }
    }
}

/// Most recent cycle failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastError {
    pub kind: ErrorKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Point-in-time view of the worker for status reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerStatus {
    pub state: WorkerState,
    pub is_running: bool,
    /// Failures since the last successful cycle
    pub consecutive_errors: u32,
    pub max_retries: u32,
    pub update_interval_ms: u64,
    /// Cycles completed (either outcome) since the worker was created
    pub total_cycles: u64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<LastError>,
}

/// Delay before the next cycle given the current failure streak.
///
/// Zero failures means the plain interval; otherwise
/// `interval * 1.5^(n-1)`, capped at [`MAX_BACKOFF_MS`].
pub fn backoff_delay(update_interval_ms: u64, consecutive_errors: u32) -> Duration {
    if consecutive_errors == 0 {
        return Duration::from_millis(update_interval_ms);
    }

    let exponent = consecutive_errors.saturating_sub(1).min(i32::MAX as u32) as i32;
    let delay_ms = update_interval_ms as f64 * BACKOFF_MULTIPLIER.powi(exponent);
    Duration::from_millis(delay_ms.min(MAX_BACKOFF_MS as f64).round() as u64)
}

#[derive(Debug)]
struct Counters {
    state: WorkerState,
    consecutive_errors: u32,
    total_cycles: u64,
    last_success_at: Option<DateTime<Utc>>,
    last_error: Option<LastError>,
}

/// A spawned scheduling loop and the signal that ends it
struct RunHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Control {
    run: Option<RunHandle>,
    /// Loop told to stop whose in-flight cycle may not have finished yet
    draining: Option<JoinHandle<()>>,
}

struct Inner {
    orchestrator: Arc<PriceOrchestrator>,
    max_retries: u32,
    restart_delay: Duration,
    update_interval_ms: AtomicU64,
    counters: RwLock<Counters>,
    /// Serialises lifecycle calls against the loop recording an outcome.
    /// Lock order: `control` before `counters`.
    control: Mutex<Control>,
}

/// Drives [`PriceOrchestrator::fetch_and_store`] on a timer
pub struct PollingWorker {
    inner: Arc<Inner>,
}

impl PollingWorker {
    pub fn new(orchestrator: Arc<PriceOrchestrator>, config: WorkerConfig) -> PriceResult<Self> {
        if config.update_interval_ms < MIN_UPDATE_INTERVAL_MS {
            return Err(PriceError::InvalidInterval(config.update_interval_ms));
        }

        Ok(Self {
            inner: Arc::new(Inner {
                orchestrator,
                max_retries: config.max_retries.max(1),
                restart_delay: config.restart_delay,
                update_interval_ms: AtomicU64::new(config.update_interval_ms),
                counters: RwLock::new(Counters {
                    state: WorkerState::Stopped,
                    consecutive_errors: 0,
                    total_cycles: 0,
                    last_success_at: None,
                    last_error: None,
                }),
                control: Mutex::new(Control::default()),
            }),
        })
    }

    /// Stopped -> Running. The first cycle runs immediately.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let mut control = self.inner.control.lock();

        {
            let mut counters = self.inner.counters.write();
            match counters.state {
                WorkerState::Running => {
                    warn!("Price worker is already running");
                    return;
                }
                WorkerState::Halted => {
                    warn!("Price worker is halted; use restart() to resume");
                    return;
                }
                WorkerState::Stopped => {}
            }
            counters.state = WorkerState::Running;
            counters.consecutive_errors = 0;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let previous = control.draining.take();
        let task = tokio::spawn(run_loop(self.inner.clone(), shutdown_rx, previous));
        control.run = Some(RunHandle {
            shutdown: shutdown_tx,
            task,
        });

        info!(
            "Price worker started for {} (interval {}ms, max retries {})",
            self.inner.orchestrator.symbol(),
            self.inner.update_interval_ms.load(Ordering::SeqCst),
            self.inner.max_retries
        );
    }

    /// Running/Halted -> Stopped. Cancels the pending cycle; a fetch already
    /// in flight completes but nothing is scheduled after it. Idempotent.
    pub fn stop(&self) {
        if self.inner.stop_loop() {
            info!("Price worker stopped");
        }
    }

    /// Stop, then wait for any in-flight cycle to finish
    pub async fn shutdown(&self) {
        self.stop();
        let draining = self.inner.control.lock().draining.take();
        if let Some(task) = draining {
            if let Err(e) = task.await {
                warn!("Price worker task ended abnormally: {}", e);
            }
        }
        info!("Price worker shut down");
    }

    /// Stop, wait the restart delay, start again. Recovers from `Halted`.
    pub async fn restart(&self) {
        info!("Restarting price worker");
        self.stop();
        tokio::time::sleep(self.inner.restart_delay).await;
        self.start();
    }

    /// Change the polling interval; a running worker restarts on the new one
    pub fn set_update_interval(&self, update_interval_ms: u64) -> PriceResult<()> {
        if update_interval_ms < MIN_UPDATE_INTERVAL_MS {
            return Err(PriceError::InvalidInterval(update_interval_ms));
        }

        let previous = self
            .inner
            .update_interval_ms
            .swap(update_interval_ms, Ordering::SeqCst);
        info!(
            "Update interval changed from {}ms to {}ms",
            previous, update_interval_ms
        );

        if self.inner.counters.read().state == WorkerState::Running {
            self.stop();
            self.start();
        }
        Ok(())
    }

    /// Instantaneous status snapshot
    pub fn status(&self) -> WorkerStatus {
        let counters = self.inner.counters.read();
        WorkerStatus {
            state: counters.state,
            is_running: counters.state == WorkerState::Running,
            consecutive_errors: counters.consecutive_errors,
            max_retries: self.inner.max_retries,
            update_interval_ms: self.inner.update_interval_ms.load(Ordering::SeqCst),
            total_cycles: counters.total_cycles,
            last_success_at: counters.last_success_at,
            last_error: counters.last_error.clone(),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.inner.counters.read().state
    }

    pub fn orchestrator(&self) -> &Arc<PriceOrchestrator> {
        &self.inner.orchestrator
    }
}

impl Inner {
    /// Signal the current loop to end. Returns false if already stopped.
    fn stop_loop(&self) -> bool {
        let mut control = self.control.lock();
        let mut counters = self.counters.write();

        if counters.state == WorkerState::Stopped {
            info!("Price worker is not running");
            return false;
        }
        counters.state = WorkerState::Stopped;

        if let Some(run) = control.run.take() {
            // receiver may already be gone if the loop halted itself
            let _ = run.shutdown.send(true);
            control.draining = Some(run.task);
        }
        true
    }

    /// Apply a cycle outcome. Returns the delay before the next cycle, or
    /// `None` when the loop must end.
    fn record_outcome(
        &self,
        outcome: PriceResult<PriceRecord>,
        shutdown: &watch::Receiver<bool>,
    ) -> Option<Duration> {
        let _control = self.control.lock();
        if *shutdown.borrow() {
            debug!("Discarding cycle outcome after stop");
            return None;
        }

        let mut counters = self.counters.write();
        counters.total_cycles += 1;
        let interval_ms = self.update_interval_ms.load(Ordering::SeqCst);

        match outcome {
            Ok(record) => {
                if counters.consecutive_errors > 0 {
                    info!(
                        "Price worker recovered after {} consecutive errors",
                        counters.consecutive_errors
                    );
                }
                counters.consecutive_errors = 0;
                counters.last_success_at = Some(Utc::now());
                debug!("Price cycle stored record #{}", record.id);
                Some(backoff_delay(interval_ms, 0))
            }
            Err(e) => {
                counters.consecutive_errors += 1;
                let errors = counters.consecutive_errors;
                counters.last_error = Some(LastError {
                    kind: e.kind(),
                    message: e.to_string(),
                    at: Utc::now(),
                });

                warn!(
                    "Price worker error (attempt {}/{}): {}",
                    errors, self.max_retries, e
                );

                if errors >= self.max_retries {
                    counters.state = WorkerState::Halted;
                    error!(
                        "Price worker halted after {} consecutive errors (last: {})",
                        errors,
                        e.kind()
                    );
                    return None;
                }

                let delay = backoff_delay(interval_ms, errors);
                warn!(
                    "Using backoff delay of {}ms due to {} consecutive errors",
                    delay.as_millis(),
                    errors
                );
                Some(delay)
            }
        }
    }
}

/// The scheduling loop: one cycle at a time, re-armed only after completion
async fn run_loop(
    inner: Arc<Inner>,
    mut shutdown: watch::Receiver<bool>,
    previous: Option<JoinHandle<()>>,
) {
    // A loop stopped just before this one may still be finishing a fetch
    if let Some(previous) = previous {
        let _ = previous.await;
    }

    let mut delay = Duration::ZERO;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => {
                debug!("Price worker loop cancelled while waiting");
                return;
            }
        }
        if *shutdown.borrow() {
            return;
        }

        let outcome = inner.orchestrator.fetch_and_store().await;
        match inner.record_outcome(outcome, &shutdown) {
            Some(next) => delay = next,
            None => return,
        }
    }
}
