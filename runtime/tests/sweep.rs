//! Daily transitions, single-flight runs and the scheduler loop.

#![allow(clippy::unwrap_used)]

use bookclub_core::{StudyId, StudyRepository, StudyState};
use bookclub_runtime::{StudyEnvironment, StudyRuntime, SweepOutcome, SweepScheduler};
use bookclub_testing::{
    FaultyStudyRepository, InMemoryAccountDirectory, InMemoryStudyRepository, ManualClock,
    ManualTicker, StudyInputBuilder, TestWorld,
};
use chrono::{Days, NaiveDate};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
}

fn world() -> TestWorld {
    bookclub_testing::init_tracing();
    TestWorld::new(ManualClock::on(today()))
}

async fn create(world: &TestWorld, admin: &str, start: NaiveDate, end: NaiveDate) -> StudyId {
    let admin = world.register(admin);
    let input = world.input().dates(start, end).build();
    world.runtime.studies().create(&admin.email, &input).await.unwrap()
}

fn completed(outcome: &SweepOutcome) -> &bookclub_runtime::SweepReport {
    outcome.report().unwrap()
}

#[tokio::test]
async fn start_date_closes_and_repeat_is_a_no_op() {
    let world = world();
    let start = today() + Days::new(1);
    let id = create(&world, "admin@example.com", start, start + Days::new(7)).await;

    let outcome = world.runtime.sweep().run().await;
    assert_eq!(completed(&outcome).transitions(), 0);
    assert_eq!(world.studies.get(id).unwrap().state(), StudyState::Open);

    world.clock.set_today(start);
    let outcome = world.runtime.sweep().run().await;
    let report = completed(&outcome);
    assert_eq!(report.date, Some(start));
    assert_eq!(report.closed, vec![id]);
    assert!(report.is_clean());
    let after_first = world.studies.get(id).unwrap();
    assert_eq!(after_first.state(), StudyState::Close);

    let outcome = world.runtime.sweep().run().await;
    assert_eq!(completed(&outcome).transitions(), 0);
    assert_eq!(world.studies.get(id).unwrap(), after_first);
}

#[tokio::test]
async fn close_ends_only_after_the_end_date() {
    let world = world();
    let start = today() + Days::new(1);
    let end = start + Days::new(2);
    let id = create(&world, "admin@example.com", start, end).await;

    world.clock.set_today(start);
    world.runtime.sweep().run().await;

    world.clock.set_today(end);
    let outcome = world.runtime.sweep().run().await;
    assert!(completed(&outcome).ended.is_empty());
    assert_eq!(world.studies.get(id).unwrap().state(), StudyState::Close);

    world.clock.set_today(end + Days::new(1));
    let outcome = world.runtime.sweep().run().await;
    assert_eq!(completed(&outcome).ended, vec![id]);
    assert_eq!(world.studies.get(id).unwrap().state(), StudyState::End);

    world.clock.advance_days(30);
    let outcome = world.runtime.sweep().run().await;
    assert_eq!(completed(&outcome).transitions(), 0);
}

#[tokio::test]
async fn missed_start_day_stays_open() {
    let world = world();
    let start = today() + Days::new(1);
    let id = create(&world, "admin@example.com", start, start + Days::new(7)).await;

    world.clock.set_today(start + Days::new(1));
    world.runtime.sweep().run().await;
    assert_eq!(world.studies.get(id).unwrap().state(), StudyState::Open);
}

#[tokio::test]
async fn one_study_failing_does_not_stop_the_batch() {
    bookclub_testing::init_tracing();
    let clock = ManualClock::on(today());
    let studies = InMemoryStudyRepository::new();
    let accounts = InMemoryAccountDirectory::new();
    let faulty = FaultyStudyRepository::new(Arc::new(studies.clone()));
    let runtime = StudyRuntime::new(StudyEnvironment::new(
        Arc::new(clock.clone()),
        Arc::new(faulty.clone()),
        Arc::new(accounts.clone()),
    ));

    let start = today() + Days::new(1);
    let mut ids = Vec::new();
    for n in 0..3 {
        let admin = accounts.register(&format!("admin{n}@example.com"));
        let input = StudyInputBuilder::new(today()).dates(start, start + Days::new(5)).build();
        ids.push(runtime.studies().create(&admin.email, &input).await.unwrap());
    }

    faulty.fail_saves_of(ids[1]);
    clock.set_today(start);
    let outcome = runtime.sweep().run().await;
    let report = completed(&outcome);
    assert_eq!(report.closed, vec![ids[0], ids[2]]);
    assert_eq!(report.failed, vec![ids[1]]);
    assert!(!report.is_clean());
    assert_eq!(studies.get(ids[1]).unwrap().state(), StudyState::Open);

    faulty.heal();
    let outcome = runtime.sweep().run().await;
    assert_eq!(completed(&outcome).closed, vec![ids[1]]);
}

#[tokio::test]
async fn failed_state_scan_still_sweeps_the_other_state() {
    let clock = ManualClock::on(today());
    let studies = InMemoryStudyRepository::new();
    let accounts = InMemoryAccountDirectory::new();
    let faulty = FaultyStudyRepository::new(Arc::new(studies.clone()));
    let runtime = StudyRuntime::new(StudyEnvironment::new(
        Arc::new(clock.clone()),
        Arc::new(faulty.clone()),
        Arc::new(accounts.clone()),
    ));

    let start = today() + Days::new(1);
    let admin = accounts.register("admin@example.com");
    let input = StudyInputBuilder::new(today()).dates(start, start).build();
    let id = runtime.studies().create(&admin.email, &input).await.unwrap();
    clock.set_today(start);
    runtime.sweep().run().await;

    faulty.fail_scans_of(StudyState::Open);
    clock.advance_days(1);
    let outcome = runtime.sweep().run().await;
    let report = completed(&outcome);
    assert_eq!(report.unfetched, vec![StudyState::Open]);
    assert_eq!(report.ended, vec![id]);
}

#[tokio::test]
async fn study_deleted_mid_sweep_is_skipped() {
    let world = world();
    let start = today() + Days::new(1);
    let id = create(&world, "admin@example.com", start, start + Days::new(3)).await;
    world.clock.set_today(start);

    let locks = world.runtime.locks();
    let guard = locks.study(id).await;
    let sweep = world.runtime.sweep();
    let run = tokio::spawn(async move { sweep.run().await });

    while !world.runtime.sweep().is_running() {
        tokio::task::yield_now().await;
    }
    world.studies.delete(id).await.unwrap();
    drop(guard);

    let outcome = run.await.unwrap();
    let report = completed(&outcome);
    assert!(report.closed.is_empty());
    assert!(report.is_clean());
}

#[tokio::test]
async fn overlapping_trigger_is_skipped() {
    let world = world();
    let start = today() + Days::new(1);
    let id = create(&world, "admin@example.com", start, start + Days::new(3)).await;
    world.clock.set_today(start);

    // Hold the study so the first run parks mid-batch.
    let locks = world.runtime.locks();
    let guard = locks.study(id).await;
    let first = world.runtime.sweep();
    let running = tokio::spawn(async move { first.run().await });

    while !world.runtime.sweep().is_running() {
        tokio::task::yield_now().await;
    }
    assert_eq!(world.runtime.sweep().run().await, SweepOutcome::Skipped);

    drop(guard);
    let outcome = running.await.unwrap();
    assert_eq!(completed(&outcome).closed, vec![id]);
    assert!(!world.runtime.sweep().is_running());
}

#[tokio::test]
async fn scheduler_sweeps_on_each_tick_until_shutdown() {
    let world = world();
    let start = today() + Days::new(1);
    let id = create(&world, "admin@example.com", start, start).await;

    let (ticker, handle) = ManualTicker::new();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let (outcomes_tx, mut outcomes) = mpsc::unbounded_channel();
    let scheduler = SweepScheduler::new(world.runtime.sweep(), Box::new(ticker), shutdown_rx)
        .run_on_start(true)
        .with_outcomes(outcomes_tx)
        .spawn();

    let initial = outcomes.recv().await.unwrap();
    assert_eq!(completed(&initial).transitions(), 0);

    world.clock.set_today(start);
    assert!(handle.tick());
    let closing = outcomes.recv().await.unwrap();
    assert_eq!(completed(&closing).closed, vec![id]);

    world.clock.advance_days(1);
    assert!(handle.tick());
    let ending = outcomes.recv().await.unwrap();
    assert_eq!(completed(&ending).ended, vec![id]);

    shutdown_tx.send(()).unwrap();
    let summary = tokio::time::timeout(Duration::from_secs(5), scheduler)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.completed, 3);
    assert_eq!(summary.skipped, 0);
    assert_eq!(world.studies.get(id).unwrap().state(), StudyState::End);
}

#[tokio::test]
async fn scheduler_stops_when_ticker_is_exhausted() {
    let world = world();
    let (ticker, handle) = ManualTicker::new();
    let (_shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

    assert!(handle.tick());
    assert!(handle.tick());
    drop(handle);

    let summary = SweepScheduler::new(world.runtime.sweep(), Box::new(ticker), shutdown_rx)
        .run()
        .await;
    assert_eq!(summary.completed, 2);
}
