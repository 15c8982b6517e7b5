//! Daily run scheduler.

use std::sync::Arc;
use std::time::Duration;

use time::{OffsetDateTime, Time};
use tracing::{error, info, warn};

use crate::runner::{RunError, execute_run_now};
use crate::state::AppState;

/// Background task that runs the fleet check once a day at a fixed UTC time.
pub struct Scheduler {
    state: Arc<AppState>,
}

impl Scheduler {
    /// Create a new scheduler.
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Start the scheduler.
    ///
    /// Returns immediately; runs happen in a spawned task until
    /// [`SchedulerState::signal_stop`](crate::state::SchedulerState::signal_stop).
    pub fn start(&self) -> Option<tokio::task::JoinHandle<()>> {
        let schedule = &self.state.config.schedule;
        if !schedule.enabled {
            info!("Daily schedule disabled");
            return None;
        }

        let Some(run_at) = schedule.run_at_time() else {
            error!(
                "Invalid schedule.run_at '{}', scheduler not started",
                schedule.run_at
            );
            return None;
        };

        info!("Starting scheduler, daily run at {} UTC", schedule.run_at);
        let state = Arc::clone(&self.state);
        Some(tokio::spawn(async move {
            run_schedule(state, run_at).await;
        }))
    }
}

async fn run_schedule(state: Arc<AppState>, run_at: Time) {
    let mut stop_rx = state.scheduler.subscribe_stop();
    state.scheduler.set_running(true);

    loop {
        let now = OffsetDateTime::now_utc();
        let next = next_run_after(now, run_at);
        state.scheduler.set_next_run(next);

        let wait = Duration::try_from(next - now).unwrap_or_default();
        info!("Next daily check at {} (in {}s)", next, wait.as_secs());

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = stop_rx.changed() => {
                info!("Scheduler stopping");
                break;
            }
        }

        match execute_run_now(&state).await {
            Ok(summary) => info!(
                "Scheduled check completed: {}/{} devices processed",
                summary.processed, summary.total_devices
            ),
            Err(RunError::AlreadyRunning) => {
                warn!("Skipping scheduled check, a run is already in progress")
            }
            Err(e) => error!("Scheduled check failed: {}", e),
        }
    }

    state.scheduler.set_running(false);
}

/// The first instant strictly after `now` whose UTC time of day is `run_at`.
pub fn next_run_after(now: OffsetDateTime, run_at: Time) -> OffsetDateTime {
    let now = now.to_offset(time::UtcOffset::UTC);
    let today = now.replace_time(run_at);
    if today > now {
        today
    } else {
        today + time::Duration::days(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seastreak_core::InMemoryFleet;
    use seastreak_store::Store;
    use time::macros::{datetime, time};

    use crate::config::Config;

    #[test]
    fn test_next_run_later_today() {
        let next = next_run_after(datetime!(2025-06-10 01:15 UTC), time!(02:00));
        assert_eq!(next, datetime!(2025-06-10 02:00 UTC));
    }

    #[test]
    fn test_next_run_tomorrow_when_passed() {
        let next = next_run_after(datetime!(2025-06-10 02:00 UTC), time!(02:00));
        assert_eq!(next, datetime!(2025-06-11 02:00 UTC));

        let next = next_run_after(datetime!(2025-12-31 23:30 UTC), time!(02:00));
        assert_eq!(next, datetime!(2026-01-01 02:00 UTC));
    }

    #[test]
    fn test_next_run_normalizes_offset() {
        // 03:30 +02:00 is 01:30 UTC, before the 02:00 UTC slot.
        let next = next_run_after(datetime!(2025-06-10 03:30 +02:00), time!(02:00));
        assert_eq!(next, datetime!(2025-06-10 02:00 UTC));

        // 05:30 +02:00 is 03:30 UTC, after it.
        let next = next_run_after(datetime!(2025-06-10 05:30 +02:00), time!(02:00));
        assert_eq!(next, datetime!(2025-06-11 02:00 UTC));
    }

    fn test_state(config: Config) -> Arc<AppState> {
        AppState::new(
            Store::open_in_memory().unwrap(),
            config,
            Arc::new(InMemoryFleet::new()),
        )
    }

    #[tokio::test]
    async fn test_disabled_schedule_does_not_start() {
        let mut config = Config::default();
        config.schedule.enabled = false;
        let state = test_state(config);

        assert!(Scheduler::new(state.clone()).start().is_none());
        assert!(!state.scheduler.is_running());
    }

    #[tokio::test]
    async fn test_scheduler_stops_on_signal() {
        let state = test_state(Config::default());

        let handle = Scheduler::new(state.clone()).start().unwrap();
        tokio::task::yield_now().await;
        state.scheduler.signal_stop();
        handle.await.unwrap();

        assert!(!state.scheduler.is_running());
        assert!(state.runs.last.read().await.is_none());
    }
}
