//! End-to-end catch-up tests for seastreak-core.
//!
//! These drive the fleet controller against the in-memory fleet and check
//! the persisted statistics after each run.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use seastreak_core::{
    CatchUpDriver, DayEvaluator, DeviceStatistics, DriverOptions, FleetRunController,
    InMemoryFleet, RunOptions, RunSummary, TelemetryRecord, UnresolvedDatePolicy, synthetic_day,
};
use time::macros::{date, datetime};
use time::{Date, Duration as Days};
use tokio_util::sync::CancellationToken;

const TODAY: Date = date!(2025 - 06 - 10);
const YESTERDAY: Date = date!(2025 - 06 - 09);

fn controller_with(fleet: &Arc<InMemoryFleet>, policy: UnresolvedDatePolicy) -> FleetRunController {
    let evaluator = DayEvaluator::new(fleet.clone(), fleet.clone(), Duration::from_secs(5));
    let driver = CatchUpDriver::new(
        fleet.clone(),
        evaluator,
        DriverOptions {
            unresolved_date_policy: policy,
            ..Default::default()
        },
    );
    FleetRunController::new(fleet.clone(), driver, RunOptions::default())
}

fn controller(fleet: &Arc<InMemoryFleet>) -> FleetRunController {
    controller_with(fleet, UnresolvedDatePolicy::Halt)
}

async fn run(controller: &FleetRunController, today: Date) -> RunSummary {
    controller
        .run_all(today, &CancellationToken::new())
        .await
        .expect("run should succeed")
}

fn streak_of(days: u32, last_check: Date) -> DeviceStatistics {
    DeviceStatistics {
        days_at_sea_alltime: 20,
        current_streak_days: days,
        longest_streak_days: days,
        consecutive_days_moving: 1,
        longest_consecutive_days_moving: 6,
        last_position_check_date: Some(last_check),
    }
}

/// A complete day whose last upload still reports `backlog` buffered readings.
fn day_with_backlog(uid: &str, date: Date, backlog: u32) -> Vec<TelemetryRecord> {
    let mut uploads = synthetic_day(uid, date, 150, 0.0);
    if let Some(last) = uploads.last_mut() {
        last.buffered_uploads_remaining = Some(backlog);
    }
    uploads
}

#[tokio::test]
async fn test_streak_increment() {
    let fleet = Arc::new(InMemoryFleet::new());
    fleet
        .set_statistics("SV-1", streak_of(4, date!(2025 - 06 - 08)))
        .await;
    fleet
        .add_uploads(synthetic_day("SV-1", YESTERDAY, 150, 0.0))
        .await;

    let summary = run(&controller(&fleet), TODAY).await;

    let stats = fleet.statistics("SV-1").await.unwrap();
    assert_eq!(stats.current_streak_days, 5);
    assert_eq!(stats.longest_streak_days, 5);
    assert_eq!(stats.days_at_sea_alltime, 21);
    assert_eq!(stats.last_position_check_date, Some(YESTERDAY));
    assert_eq!(summary.counters.streaks_incremented, 1);
    assert_eq!(summary.counters.total_dates_checked, 1);
}

#[tokio::test]
async fn test_streak_break_keeps_longest() {
    let fleet = Arc::new(InMemoryFleet::new());
    let mut prior = streak_of(4, date!(2025 - 06 - 08));
    prior.longest_streak_days = 12;
    fleet.set_statistics("SV-1", prior).await;
    fleet
        .add_uploads(synthetic_day("SV-1", YESTERDAY, 150, 0.0))
        .await;
    fleet.set_near_land("SV-1", YESTERDAY, 2).await;

    let summary = run(&controller(&fleet), TODAY).await;

    let stats = fleet.statistics("SV-1").await.unwrap();
    assert_eq!(stats.current_streak_days, 0);
    assert_eq!(stats.longest_streak_days, 12);
    assert_eq!(stats.days_at_sea_alltime, 20);
    assert_eq!(summary.counters.streaks_broken, 1);
}

#[tokio::test]
async fn test_movement_is_independent_of_sea_state() {
    let fleet = Arc::new(InMemoryFleet::new());
    let start = date!(2025 - 06 - 07);
    fleet.set_statistics("SV-1", streak_of(4, start)).await;
    // Near land but travelling.
    fleet
        .add_uploads(synthetic_day("SV-1", date!(2025 - 06 - 08), 150, 3.0))
        .await;
    fleet.set_near_land("SV-1", date!(2025 - 06 - 08), 5).await;
    // At sea but drifting.
    fleet
        .add_uploads(synthetic_day("SV-1", YESTERDAY, 150, 0.5))
        .await;

    let summary = run(&controller(&fleet), TODAY).await;

    let stats = fleet.statistics("SV-1").await.unwrap();
    assert_eq!(stats.current_streak_days, 1);
    assert_eq!(stats.consecutive_days_moving, 0);
    assert_eq!(stats.longest_consecutive_days_moving, 6);
    assert_eq!(summary.counters.streaks_broken, 1);
    assert_eq!(summary.counters.streaks_incremented, 1);
    assert_eq!(summary.counters.movement_streaks_incremented, 1);
    assert_eq!(summary.counters.movement_streaks_broken, 1);
}

#[tokio::test]
async fn test_buffer_deferral_leaves_row_unchanged() {
    let fleet = Arc::new(InMemoryFleet::new());
    let prior = streak_of(4, date!(2025 - 06 - 08));
    fleet.set_statistics("SV-1", prior).await;
    fleet
        .add_uploads(day_with_backlog("SV-1", YESTERDAY, 3))
        .await;

    let summary = run(&controller(&fleet), TODAY).await;

    assert_eq!(fleet.statistics("SV-1").await, Some(prior));
    assert_eq!(summary.counters.skipped_buffer_not_empty, 1);
    assert_eq!(summary.halted, 1);
    assert_eq!(fleet.oracle_calls(), 0);
    assert_eq!(fleet.save_calls(), 0);
}

#[tokio::test]
async fn test_buffered_day_is_retried_once_flushed() {
    let fleet = Arc::new(InMemoryFleet::new());
    fleet
        .set_statistics("SV-1", streak_of(4, date!(2025 - 06 - 08)))
        .await;
    fleet
        .add_uploads(day_with_backlog("SV-1", YESTERDAY, 3))
        .await;
    let controller = controller(&fleet);

    run(&controller, TODAY).await;
    // The device drains its buffer with a late upload.
    let late = TelemetryRecord::new("SV-1", datetime!(2025-06-09 23:59:59 UTC))
        .with_position(41.7, -70.8)
        .with_backlog(0);
    fleet.add_uploads(vec![late]).await;
    run(&controller, TODAY).await;

    let stats = fleet.statistics("SV-1").await.unwrap();
    assert_eq!(stats.current_streak_days, 5);
    assert_eq!(stats.last_position_check_date, Some(YESTERDAY));
}

#[tokio::test]
async fn test_coverage_skip_only_advances_date() {
    let fleet = Arc::new(InMemoryFleet::new());
    let prior = streak_of(4, date!(2025 - 06 - 08));
    fleet.set_statistics("SV-1", prior).await;
    fleet
        .add_uploads(synthetic_day("SV-1", YESTERDAY, 119, 9.0))
        .await;

    let summary = run(&controller(&fleet), TODAY).await;

    let stats = fleet.statistics("SV-1").await.unwrap();
    assert_eq!(stats.last_position_check_date, Some(YESTERDAY));
    assert_eq!(stats.current_streak_days, prior.current_streak_days);
    assert_eq!(stats.consecutive_days_moving, prior.consecutive_days_moving);
    assert_eq!(summary.counters.skipped_insufficient_data, 1);
    assert_eq!(fleet.oracle_calls(), 0);
}

#[tokio::test]
async fn test_uploads_without_fix_do_not_count() {
    let fleet = Arc::new(InMemoryFleet::new());
    let prior = streak_of(4, date!(2025 - 06 - 08));
    fleet.set_statistics("SV-1", prior).await;
    let mut uploads = synthetic_day("SV-1", YESTERDAY, 150, 0.0);
    for upload in uploads.iter_mut().take(40) {
        upload.lat_avg = Some(0.0);
        upload.lon_avg = Some(0.0);
    }
    fleet.add_uploads(uploads).await;

    let summary = run(&controller(&fleet), TODAY).await;

    assert_eq!(summary.counters.skipped_insufficient_data, 1);
    assert_eq!(
        fleet.statistics("SV-1").await.unwrap().current_streak_days,
        4
    );
}

#[tokio::test]
async fn test_new_device_is_seeded_without_evaluation() {
    let fleet = Arc::new(InMemoryFleet::new());
    fleet
        .add_uploads(synthetic_day("SV-1", YESTERDAY, 150, 5.0))
        .await;

    let summary = run(&controller(&fleet), TODAY).await;

    assert_eq!(
        fleet.statistics("SV-1").await,
        Some(DeviceStatistics::default())
    );
    assert_eq!(summary.seeded, 1);
    assert_eq!(summary.counters.total_dates_checked, 0);
    assert_eq!(fleet.oracle_calls(), 0);
}

#[tokio::test]
async fn test_seeded_device_catches_up_thirty_days() {
    let fleet = Arc::new(InMemoryFleet::new());
    fleet.add_device("SV-1").await;
    let controller = controller(&fleet);

    run(&controller, TODAY).await;
    let summary = run(&controller, TODAY).await;

    let stats = fleet.statistics("SV-1").await.unwrap();
    assert_eq!(summary.counters.total_dates_checked, 30);
    assert_eq!(summary.counters.skipped_insufficient_data, 30);
    assert_eq!(stats.last_position_check_date, Some(YESTERDAY));
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let fleet = Arc::new(InMemoryFleet::new());
    fleet
        .set_statistics("SV-1", streak_of(4, date!(2025 - 06 - 06)))
        .await;
    for offset in 0..3 {
        let day = date!(2025 - 06 - 07) + Days::days(offset);
        fleet
            .add_uploads(synthetic_day("SV-1", day, 150, 2.5))
            .await;
    }
    let controller = controller(&fleet);

    run(&controller, TODAY).await;
    let after_first = fleet.statistics("SV-1").await;
    let calls = fleet.oracle_calls();
    let second = run(&controller, TODAY).await;

    assert_eq!(fleet.statistics("SV-1").await, after_first);
    assert_eq!(fleet.oracle_calls(), calls);
    assert_eq!(second.counters.total_dates_checked, 0);
    assert_eq!(after_first.unwrap().current_streak_days, 7);
}

#[tokio::test]
async fn test_check_date_never_moves_backwards() {
    let fleet = Arc::new(InMemoryFleet::new());
    fleet
        .set_statistics("SV-1", streak_of(1, date!(2025 - 06 - 01)))
        .await;
    let controller = controller(&fleet);

    let mut previous = fleet
        .statistics("SV-1")
        .await
        .unwrap()
        .last_position_check_date;
    for today in [TODAY, date!(2025 - 06 - 05), date!(2025 - 06 - 12)] {
        run(&controller, today).await;
        let current = fleet
            .statistics("SV-1")
            .await
            .unwrap()
            .last_position_check_date;
        assert!(current >= previous);
        previous = current;
    }
    assert_eq!(previous, Some(date!(2025 - 06 - 11)));
}

#[tokio::test]
async fn test_failed_date_does_not_stop_device() {
    let fleet = Arc::new(InMemoryFleet::new());
    let failing = date!(2025 - 06 - 07);
    fleet
        .set_statistics("SV-1", streak_of(4, date!(2025 - 06 - 06)))
        .await;
    for day in [failing, date!(2025 - 06 - 08), YESTERDAY] {
        fleet
            .add_uploads(synthetic_day("SV-1", day, 150, 0.0))
            .await;
    }
    fleet.fail_oracle_on("SV-1", failing).await;

    let summary = run(&controller(&fleet), TODAY).await;

    assert_eq!(summary.counters.date_errors, 1);
    assert_eq!(summary.counters.total_dates_checked, 2);
    assert_eq!(summary.counters.streaks_incremented, 2);
    assert_eq!(summary.halted, 0);
    assert_eq!(summary.processed, 1);

    let stats = fleet.statistics("SV-1").await.unwrap();
    assert_eq!(stats.current_streak_days, 6);
    assert_eq!(stats.longest_streak_days, 6);
    assert_eq!(stats.last_position_check_date, Some(YESTERDAY));
}

#[tokio::test]
async fn test_failed_date_continues_under_skip_policy() {
    let fleet = Arc::new(InMemoryFleet::new());
    let first = date!(2025 - 06 - 08);
    fleet
        .set_statistics("SV-1", streak_of(4, date!(2025 - 06 - 07)))
        .await;
    fleet
        .add_uploads(synthetic_day("SV-1", first, 150, 0.0))
        .await;
    fleet
        .add_uploads(synthetic_day("SV-1", YESTERDAY, 150, 0.0))
        .await;
    fleet.fail_oracle_on("SV-1", first).await;

    let summary = run(
        &controller_with(&fleet, UnresolvedDatePolicy::SkipAndContinue),
        TODAY,
    )
    .await;

    let stats = fleet.statistics("SV-1").await.unwrap();
    assert_eq!(summary.counters.date_errors, 1);
    assert_eq!(summary.halted, 0);
    assert_eq!(stats.current_streak_days, 5);
    assert_eq!(stats.last_position_check_date, Some(YESTERDAY));
}

#[tokio::test]
async fn test_halt_policy_stops_at_buffered_day() {
    let fleet = Arc::new(InMemoryFleet::new());
    let prior = streak_of(4, date!(2025 - 06 - 07));
    fleet.set_statistics("SV-1", prior).await;
    fleet
        .add_uploads(day_with_backlog("SV-1", date!(2025 - 06 - 08), 3))
        .await;
    fleet
        .add_uploads(synthetic_day("SV-1", YESTERDAY, 150, 0.0))
        .await;

    let summary = run(&controller(&fleet), TODAY).await;

    assert_eq!(summary.halted, 1);
    assert_eq!(summary.counters.skipped_buffer_not_empty, 1);
    assert_eq!(summary.counters.streaks_incremented, 0);
    assert_eq!(fleet.statistics("SV-1").await, Some(prior));
}

#[tokio::test]
async fn test_skip_policy_continues_after_buffered_day() {
    let fleet = Arc::new(InMemoryFleet::new());
    fleet
        .set_statistics("SV-1", streak_of(4, date!(2025 - 06 - 07)))
        .await;
    fleet
        .add_uploads(day_with_backlog("SV-1", date!(2025 - 06 - 08), 3))
        .await;
    fleet
        .add_uploads(synthetic_day("SV-1", YESTERDAY, 150, 0.0))
        .await;

    let summary = run(
        &controller_with(&fleet, UnresolvedDatePolicy::SkipAndContinue),
        TODAY,
    )
    .await;

    assert_eq!(summary.counters.skipped_buffer_not_empty, 1);
    assert_eq!(summary.counters.streaks_incremented, 1);
    assert_eq!(
        fleet.statistics("SV-1").await.unwrap().current_streak_days,
        5
    );
}

#[tokio::test]
async fn test_concurrent_write_is_a_date_error() {
    let fleet = Arc::new(InMemoryFleet::new());
    let prior = streak_of(4, date!(2025 - 06 - 08));
    fleet.set_statistics("SV-1", prior).await;
    fleet
        .add_uploads(synthetic_day("SV-1", YESTERDAY, 150, 0.0))
        .await;
    fleet.simulate_concurrent_writer("SV-1").await;

    let summary = run(&controller(&fleet), TODAY).await;

    assert_eq!(summary.counters.date_errors, 1);
    assert_eq!(summary.counters.streaks_incremented, 0);
    let stats = fleet.statistics("SV-1").await.unwrap();
    assert_eq!(stats.current_streak_days, prior.current_streak_days);
}

#[tokio::test]
async fn test_enumeration_failure_fails_run() {
    let fleet = Arc::new(InMemoryFleet::new());
    fleet.add_device("SV-1").await;
    fleet.fail_device_listing(true);

    let result = controller(&fleet)
        .run_all(TODAY, &CancellationToken::new())
        .await;

    assert!(result.is_err());
    assert!(fleet.statistics("SV-1").await.is_none());
}

#[tokio::test]
async fn test_failed_device_does_not_stop_others() {
    let fleet = Arc::new(InMemoryFleet::new());
    for uid in ["SV-1", "SV-2"] {
        fleet
            .set_statistics(uid, streak_of(0, date!(2025 - 06 - 08)))
            .await;
        fleet
            .add_uploads(synthetic_day(uid, YESTERDAY, 150, 0.0))
            .await;
    }
    fleet.fail_statistics_for("SV-1").await;

    let summary = run(&controller(&fleet), TODAY).await;

    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.processed, 1);
    assert_eq!(
        fleet.statistics("SV-2").await.unwrap().current_streak_days,
        1
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_streaks_stay_consistent(
        days in prop::collection::vec((0u32..3, 0.0f64..5.0, 100usize..160), 1..12)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let fleet = Arc::new(InMemoryFleet::new());
            let start = date!(2025 - 01 - 01);
            fleet
                .set_statistics("SV-1", DeviceStatistics::default().resolved_on(start))
                .await;
            for (i, (near_land, distance, uploads)) in days.iter().enumerate() {
                let day = start + Days::days(i as i64 + 1);
                fleet
                    .add_uploads(synthetic_day("SV-1", day, *uploads, *distance))
                    .await;
                fleet.set_near_land("SV-1", day, *near_land).await;
            }

            let today = start + Days::days(days.len() as i64 + 1);
            run(&controller(&fleet), today).await;

            let stats = fleet.statistics("SV-1").await.unwrap();
            assert!(stats.is_consistent());
            assert_eq!(stats.last_position_check_date, today.previous_day());
        });
    }
}
