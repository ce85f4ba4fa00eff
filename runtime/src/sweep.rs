//! The daily lifecycle sweep.
//!
//! [`TransitionSweep::run`] applies the lifecycle state machine to every
//! `Open` study, then every `Close` study, persisting each change on its
//! own. A study that fails is logged and skipped; the rest of the batch
//! still runs. Only one run is ever active: a trigger that arrives while a
//! run is in progress returns [`SweepOutcome::Skipped`] immediately.
//!
//! [`SweepScheduler`] fires the sweep whenever its [`Ticker`] ticks, until
//! shutdown is signalled. Production uses [`DailyTicker`]; tests drive the
//! scheduler by hand.

use crate::StudyEnvironment;
use crate::locks::StudyLocks;
use crate::metrics::SweepMetrics;
use bookclub_core::environment::Clock;
use bookclub_core::lifecycle::{self, StudyTransition};
use bookclub_core::{RepositoryError, StudyId, StudyState};
use chrono::{DateTime, Days, FixedOffset, NaiveDate, NaiveTime, TimeDelta, Utc};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, broadcast, mpsc};
use tracing::{debug, error, info, warn};

// ============================================================================
// Sweep
// ============================================================================

/// What one completed run did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Date the run evaluated transitions against
    pub date: Option<NaiveDate>,
    /// Studies moved `Open → Close`
    pub closed: Vec<StudyId>,
    /// Studies moved `Close → End`
    pub ended: Vec<StudyId>,
    /// Studies that could not be processed
    pub failed: Vec<StudyId>,
    /// States whose study list could not be fetched
    pub unfetched: Vec<StudyState>,
}

impl SweepReport {
    fn new(date: NaiveDate) -> Self {
        Self {
            date: Some(date),
            ..Self::default()
        }
    }

    fn record(&mut self, id: StudyId, transition: StudyTransition) {
        match transition {
            StudyTransition::OpenToClose => self.closed.push(id),
            StudyTransition::CloseToEnd => self.ended.push(id),
        }
    }

    /// Total transitions applied
    #[must_use]
    pub fn transitions(&self) -> usize {
        self.closed.len() + self.ended.len()
    }

    /// True when every study was processed
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.unfetched.is_empty()
    }
}

/// Result of a sweep trigger
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SweepOutcome {
    /// The run finished
    Completed(SweepReport),
    /// Another run was in progress
    Skipped,
}

impl SweepOutcome {
    /// The report of a completed run
    #[must_use]
    pub const fn report(&self) -> Option<&SweepReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Skipped => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Completed(report) if report.is_clean() => "completed",
            Self::Completed(_) => "completed_with_failures",
            Self::Skipped => "skipped",
        }
    }
}

/// Applies due lifecycle transitions to every study.
///
/// Clones share one single-flight guard.
#[derive(Clone, Debug)]
pub struct TransitionSweep {
    env: StudyEnvironment,
    locks: Arc<StudyLocks>,
    running: Arc<Mutex<()>>,
}

impl TransitionSweep {
    /// Creates the sweep.
    ///
    /// `locks` must be the registry shared with the request-driven services
    /// so sweep writes never interleave with enrollment writes.
    #[must_use]
    pub fn new(env: StudyEnvironment, locks: Arc<StudyLocks>) -> Self {
        Self {
            env,
            locks,
            running: Arc::new(Mutex::new(())),
        }
    }

    /// True while a run is in progress
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    /// Runs one sweep against the clock's current date.
    ///
    /// Never fails as a whole; per-study failures are listed in the report.
    #[tracing::instrument(skip(self), name = "transition_sweep")]
    pub async fn run(&self) -> SweepOutcome {
        let started = Instant::now();

        let Ok(_running) = self.running.try_lock() else {
            warn!("Sweep already in progress, skipping trigger");
            let outcome = SweepOutcome::Skipped;
            SweepMetrics::record_run(outcome.label(), started.elapsed());
            return outcome;
        };

        let today = self.env.clock.today();
        let mut report = SweepReport::new(today);

        for state in [StudyState::Open, StudyState::Close] {
            self.sweep_state(state, today, &mut report).await;
        }

        let outcome = SweepOutcome::Completed(report);
        SweepMetrics::record_run(outcome.label(), started.elapsed());

        if let SweepOutcome::Completed(report) = &outcome {
            info!(
                date = %today,
                closed = report.closed.len(),
                ended = report.ended.len(),
                failed = report.failed.len(),
                elapsed_ms = started.elapsed().as_millis(),
                "Sweep completed"
            );
        }
        outcome
    }

    async fn sweep_state(&self, state: StudyState, today: NaiveDate, report: &mut SweepReport) {
        let candidates = match self.env.studies.find_by_state(state).await {
            Ok(studies) => studies,
            Err(e) => {
                error!(state = %state, error = %e, "Failed to fetch studies for sweep");
                report.unfetched.push(state);
                return;
            }
        };

        debug!(state = %state, count = candidates.len(), "Sweeping studies");

        for candidate in candidates {
            let id = candidate.id();
            match self.sweep_one(id, today).await {
                Ok(Some(transition)) => {
                    SweepMetrics::record_transition(transition.to());
                    report.record(id, transition);
                }
                Ok(None) => {}
                Err(e) => {
                    error!(study_id = %id, error = %e, "Failed to transition study");
                    SweepMetrics::record_failure();
                    report.failed.push(id);
                }
            }
        }
    }

    /// Re-reads the study under its lock, then advances and saves it
    async fn sweep_one(
        &self,
        id: StudyId,
        today: NaiveDate,
    ) -> Result<Option<StudyTransition>, RepositoryError> {
        let _study_guard = self.locks.study(id).await;

        let mut study = match self.env.studies.find_by_id(id).await {
            Ok(study) => study,
            Err(RepositoryError::NotFound { .. }) => {
                debug!(study_id = %id, "Study deleted before sweep reached it");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let Some(transition) = lifecycle::advance(&mut study, today) else {
            return Ok(None);
        };

        self.env.studies.save(study).await?;
        info!(study_id = %id, transition = %transition, "Study transitioned");
        Ok(Some(transition))
    }
}

// ============================================================================
// Schedule
// ============================================================================

/// A fixed time of day in a fixed offset
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DailySchedule {
    at: NaiveTime,
    offset: FixedOffset,
}

impl DailySchedule {
    /// Fires every day at `at`, read in `offset`
    #[must_use]
    pub const fn new(at: NaiveTime, offset: FixedOffset) -> Self {
        Self { at, offset }
    }

    /// Time of day the schedule fires
    #[must_use]
    pub const fn at(&self) -> NaiveTime {
        self.at
    }

    /// First fire instant strictly after `now`
    #[must_use]
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.naive_utc() + TimeDelta::seconds(i64::from(self.offset.local_minus_utc()));
        let today = local.date().and_time(self.at);
        let candidate = if today <= local {
            today + Days::new(1)
        } else {
            today
        };

        let utc = candidate - TimeDelta::seconds(i64::from(self.offset.local_minus_utc()));
        utc.and_utc()
    }
}

/// Source of sweep triggers.
///
/// `tick` resolves at the next trigger, or to `None` once no more triggers
/// will come.
pub trait Ticker: Send + Sync {
    /// Waits for the next trigger
    fn tick(&mut self) -> Pin<Box<dyn Future<Output = Option<DateTime<Utc>>> + Send + '_>>;
}

/// Ticks once a day on tokio timers
pub struct DailyTicker {
    schedule: DailySchedule,
    clock: Arc<dyn Clock>,
    last: Option<DateTime<Utc>>,
}

impl DailyTicker {
    /// Ticker following `schedule`, reading the time from `clock`
    #[must_use]
    pub fn new(schedule: DailySchedule, clock: Arc<dyn Clock>) -> Self {
        Self {
            schedule,
            clock,
            last: None,
        }
    }
}

impl Ticker for DailyTicker {
    fn tick(&mut self) -> Pin<Box<dyn Future<Output = Option<DateTime<Utc>>> + Send + '_>> {
        Box::pin(async move {
            let now = self.clock.now();
            // A timer that wakes slightly early must not fire the same slot twice.
            let from = self.last.map_or(now, |last| last.max(now));
            let next = self.schedule.next_after(from);

            let delay = (next - now).to_std().unwrap_or(Duration::ZERO);
            debug!(next = %next, delay_secs = delay.as_secs(), "Waiting for next sweep");
            tokio::time::sleep(delay).await;

            self.last = Some(next);
            Some(next)
        })
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Counts of what a scheduler did before it stopped
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerSummary {
    /// Runs that completed
    pub completed: usize,
    /// Triggers skipped because a run was in progress
    pub skipped: usize,
}

/// Fires the sweep on every tick until shutdown
pub struct SweepScheduler {
    sweep: TransitionSweep,
    ticker: Box<dyn Ticker>,
    shutdown: broadcast::Receiver<()>,
    run_on_start: bool,
    outcomes: Option<mpsc::UnboundedSender<SweepOutcome>>,
}

impl SweepScheduler {
    /// Creates a scheduler.
    ///
    /// It stops when `shutdown` receives a message or its sender is dropped,
    /// or when the ticker runs out.
    #[must_use]
    pub fn new(
        sweep: TransitionSweep,
        ticker: Box<dyn Ticker>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            sweep,
            ticker,
            shutdown,
            run_on_start: false,
            outcomes: None,
        }
    }

    /// Also run once immediately on start
    #[must_use]
    pub const fn run_on_start(mut self, enabled: bool) -> Self {
        self.run_on_start = enabled;
        self
    }

    /// Send every outcome to `outcomes`
    #[must_use]
    pub fn with_outcomes(mut self, outcomes: mpsc::UnboundedSender<SweepOutcome>) -> Self {
        self.outcomes = Some(outcomes);
        self
    }

    /// Spawn the scheduler as a background task.
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<SchedulerSummary> {
        tokio::spawn(self.run())
    }

    /// Runs until shutdown or until the ticker is exhausted.
    pub async fn run(mut self) -> SchedulerSummary {
        info!(run_on_start = self.run_on_start, "Sweep scheduler started");
        let mut summary = SchedulerSummary::default();

        if self.run_on_start {
            fire(&self.sweep, self.outcomes.as_ref(), &mut summary).await;
        }

        loop {
            let tick = tokio::select! {
                _ = self.shutdown.recv() => {
                    info!("Sweep scheduler received shutdown signal");
                    break;
                }
                tick = self.ticker.tick() => tick,
            };

            let Some(at) = tick else {
                info!("Sweep ticker exhausted");
                break;
            };
            debug!(scheduled_for = %at, "Sweep triggered");
            fire(&self.sweep, self.outcomes.as_ref(), &mut summary).await;
        }

        info!(
            completed = summary.completed,
            skipped = summary.skipped,
            "Sweep scheduler stopped"
        );
        summary
    }
}

async fn fire(
    sweep: &TransitionSweep,
    outcomes: Option<&mpsc::UnboundedSender<SweepOutcome>>,
    summary: &mut SchedulerSummary,
) {
    let outcome = sweep.run().await;
    match outcome {
        SweepOutcome::Completed(_) => summary.completed += 1,
        SweepOutcome::Skipped => summary.skipped += 1,
    }

    if let Some(outcomes) = outcomes {
        // Observer may have gone away; the scheduler keeps running.
        let _ = outcomes.send(outcome);
    }
}
