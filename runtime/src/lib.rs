//! # Bookclub Runtime
//!
//! Runs the rules from `bookclub-core` against the persistence and identity
//! collaborators.
//!
//! ## Core Components
//!
//! - **`StudyService`**: create, update, delete and get
//! - **`EnrollmentManager`**: apply and cancel
//! - **`QueryService`**: filtered, paginated and counted listings
//! - **`TransitionSweep`**: one pass of the lifecycle state machine over every study
//! - **`SweepScheduler`**: drives the sweep from a [`Ticker`](sweep::Ticker)
//!
//! Every service built from the same [`StudyRuntime`] shares one
//! [`StudyLocks`] registry, which is what makes each mutation atomic with
//! respect to the study and account it touches.
//!
//! ## Example
//!
//! ```ignore
//! use bookclub_runtime::{StudyEnvironment, StudyRuntime};
//!
//! let runtime = StudyRuntime::new(environment);
//! let id = runtime.studies().create("admin@example.com", &input).await?;
//! runtime.enrollment().apply("reader@example.com", id).await?;
//!
//! let outcome = runtime.sweep().run().await;
//! ```

use bookclub_core::environment::Clock;
use bookclub_core::{
    Account, AccountDirectory, RepositoryError, Study, StudyRepository, UpdatePolicy,
};
use std::sync::Arc;

/// Apply and cancel
pub mod enrollment;

/// Per-key locks
pub mod locks;

/// In-memory storage and identity
pub mod memory;

/// Prometheus metrics for observability
pub mod metrics;

/// Read-side queries
pub mod query;

/// Create, update, delete and get
pub mod service;

/// The daily lifecycle sweep and its scheduler
pub mod sweep;

pub use enrollment::EnrollmentManager;
pub use locks::StudyLocks;
pub use memory::{InMemoryAccountDirectory, InMemoryStudyRepository};
pub use query::{MemberSummary, QueryService, StudyCounts, StudyDetail};
pub use service::StudyService;
pub use sweep::{
    DailySchedule, DailyTicker, SchedulerSummary, SweepOutcome, SweepReport, SweepScheduler,
    Ticker, TransitionSweep,
};

/// Collaborators every service depends on.
///
/// The clock is read-only and shared; tests swap it for a manual clock.
#[derive(Clone)]
pub struct StudyEnvironment {
    /// Source of "today"
    pub clock: Arc<dyn Clock>,
    /// Study storage
    pub studies: Arc<dyn StudyRepository>,
    /// Identity provider
    pub accounts: Arc<dyn AccountDirectory>,
}

impl StudyEnvironment {
    /// Bundles the three collaborators
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        studies: Arc<dyn StudyRepository>,
        accounts: Arc<dyn AccountDirectory>,
    ) -> Self {
        Self {
            clock,
            studies,
            accounts,
        }
    }

    /// Study the account's link points at.
    ///
    /// `None` when the link is unset or points at a deleted study.
    ///
    /// # Errors
    ///
    /// Any repository failure other than `NotFound`.
    pub async fn linked_study(&self, account: &Account) -> Result<Option<Study>, RepositoryError> {
        let Some(linked) = account.current_study_id else {
            return Ok(None);
        };

        match self.studies.find_by_id(linked).await {
            Ok(study) => Ok(Some(study)),
            Err(RepositoryError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for StudyEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StudyEnvironment")
            .field("today", &self.clock.today())
            .finish_non_exhaustive()
    }
}

/// Builds services that share one environment and one lock registry
#[derive(Clone, Debug)]
pub struct StudyRuntime {
    environment: StudyEnvironment,
    locks: Arc<StudyLocks>,
    policy: UpdatePolicy,
    sweep: TransitionSweep,
}

impl StudyRuntime {
    /// Runtime with the default update policy
    #[must_use]
    pub fn new(environment: StudyEnvironment) -> Self {
        Self::with_policy(environment, UpdatePolicy::default())
    }

    /// Runtime with an explicit update policy
    #[must_use]
    pub fn with_policy(environment: StudyEnvironment, policy: UpdatePolicy) -> Self {
        let locks = Arc::new(StudyLocks::new());
        let sweep = TransitionSweep::new(environment.clone(), Arc::clone(&locks));
        Self {
            environment,
            locks,
            policy,
            sweep,
        }
    }

    /// The shared environment
    #[must_use]
    pub const fn environment(&self) -> &StudyEnvironment {
        &self.environment
    }

    /// The shared lock registry
    #[must_use]
    pub fn locks(&self) -> Arc<StudyLocks> {
        Arc::clone(&self.locks)
    }

    /// Create, update, delete and get
    #[must_use]
    pub fn studies(&self) -> StudyService {
        StudyService::new(self.environment.clone(), self.locks(), self.policy)
    }

    /// Apply and cancel
    #[must_use]
    pub fn enrollment(&self) -> EnrollmentManager {
        EnrollmentManager::new(self.environment.clone(), self.locks())
    }

    /// Read-side queries
    #[must_use]
    pub fn queries(&self) -> QueryService {
        QueryService::new(self.environment.clone())
    }

    /// The lifecycle sweep.
    ///
    /// Every clone shares one single-flight guard.
    #[must_use]
    pub fn sweep(&self) -> TransitionSweep {
        self.sweep.clone()
    }
}
