//! Application state shared across handlers and the scheduler.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock, watch};
use tokio_util::sync::CancellationToken;

use seastreak_core::{
    CatchUpDriver, DayEvaluator, FleetRunController, LandProximityOracle, RunSummary,
};
use seastreak_store::Store;

use crate::backend::SqliteBackend;
use crate::config::Config;

/// Shared application state.
pub struct AppState {
    /// The data store, shared with the run backend.
    pub store: Arc<Mutex<Store>>,
    /// Configuration the service was started with.
    pub config: Config,
    /// Fleet controller wired to the store and oracle.
    pub fleet: FleetRunController,
    /// Run bookkeeping.
    pub runs: RunState,
    /// Scheduler control state.
    pub scheduler: SchedulerState,
    /// Cancelled on shutdown; in-flight runs stop between dates.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create application state around a store and an oracle.
    ///
    /// Devices, statistics and telemetry all come from `store`.
    pub fn new(store: Store, config: Config, oracle: Arc<dyn LandProximityOracle>) -> Arc<Self> {
        let store = Arc::new(Mutex::new(store));
        let backend = Arc::new(SqliteBackend::new(Arc::clone(&store)));

        let evaluator = DayEvaluator::new(backend.clone(), oracle, config.run.call_timeout());
        let driver = CatchUpDriver::new(backend.clone(), evaluator, config.run.driver_options());
        let fleet = FleetRunController::new(backend, driver, config.run.run_options());

        Self::with_fleet(store, config, fleet)
    }

    /// Create application state with an already wired fleet controller.
    pub fn with_fleet(
        store: Arc<Mutex<Store>>,
        config: Config,
        fleet: FleetRunController,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            config,
            fleet,
            runs: RunState::default(),
            scheduler: SchedulerState::new(),
            shutdown: CancellationToken::new(),
        })
    }
}

/// Tracks the run in progress and the last completed one.
#[derive(Default)]
pub struct RunState {
    in_progress: AtomicBool,
    /// Summary of the last run that completed.
    pub last: RwLock<Option<RunSummary>>,
}

impl RunState {
    /// Claim the run slot; `None` if another run holds it.
    pub fn try_begin(&self) -> Option<RunGuard<'_>> {
        self.in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunGuard {
                flag: &self.in_progress,
            })
    }

    /// Whether a run is executing.
    pub fn in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }
}

/// Releases the run slot when dropped.
pub struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// State for tracking and controlling the daily scheduler.
pub struct SchedulerState {
    running: AtomicBool,
    /// Next scheduled run (Unix timestamp, 0 = none).
    next_run_at: AtomicI64,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl SchedulerState {
    /// Create a new scheduler state.
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            running: AtomicBool::new(false),
            next_run_at: AtomicI64::new(0),
            stop_tx,
            stop_rx,
        }
    }

    /// Check if the scheduler is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Mark the scheduler as started or stopped.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
        if !running {
            self.next_run_at.store(0, Ordering::SeqCst);
        }
    }

    /// Record when the next run is due.
    pub fn set_next_run(&self, at: OffsetDateTime) {
        self.next_run_at.store(at.unix_timestamp(), Ordering::SeqCst);
    }

    /// When the next run is due.
    pub fn next_run_at(&self) -> Option<OffsetDateTime> {
        match self.next_run_at.load(Ordering::SeqCst) {
            0 => None,
            ts => OffsetDateTime::from_unix_timestamp(ts).ok(),
        }
    }

    /// Get a receiver for the stop signal.
    pub fn subscribe_stop(&self) -> watch::Receiver<bool> {
        self.stop_rx.clone()
    }

    /// Signal the scheduler to stop.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self::new()
    }
}
