//! Builders, a ready-wired test world and proptest strategies.

use crate::mocks::ManualClock;
use bookclub_core::environment::Clock;
use bookclub_core::validation::ValidatedStudy;
use bookclub_core::{
    Account, AccountId, Capacity, NaiveDate, NaiveTime, Study, StudyId, StudyInput, UpdatePolicy,
    Weekday, Zone,
};
use bookclub_runtime::{
    InMemoryAccountDirectory, InMemoryStudyRepository, StudyEnvironment, StudyRuntime,
};
use chrono::Days;
use std::sync::Arc;

/// Builds a valid [`StudyInput`] relative to a given "today".
///
/// Defaults: starts tomorrow, ends a week later, meets Mondays 13:00 to
/// 15:30 in Seoul, five seats.
#[derive(Clone, Debug)]
pub struct StudyInputBuilder {
    input: StudyInput,
}

impl StudyInputBuilder {
    /// Valid input for a study created on `today`
    #[must_use]
    pub fn new(today: NaiveDate) -> Self {
        Self {
            input: StudyInput {
                name: "Rust reading group".to_string(),
                book_name: "The Rust Programming Language".to_string(),
                book_image: "trpl.png".to_string(),
                description: "Two chapters a week".to_string(),
                contact: "open chat".to_string(),
                capacity: Capacity::new(5),
                start_date: today + Days::new(1),
                end_date: today + Days::new(8),
                start_time: "13:00".to_string(),
                end_time: "15:30".to_string(),
                day: Weekday::Mon,
                zone: Zone::Seoul,
            },
        }
    }

    /// Sets the study name
    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.input.name = name.to_string();
        self
    }

    /// Sets the book name
    #[must_use]
    pub fn book(mut self, book: &str) -> Self {
        self.input.book_name = book.to_string();
        self
    }

    /// Sets the capacity
    #[must_use]
    pub fn capacity(mut self, capacity: u32) -> Self {
        self.input.capacity = Capacity::new(capacity);
        self
    }

    /// Sets both dates
    #[must_use]
    pub fn dates(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.input.start_date = start;
        self.input.end_date = end;
        self
    }

    /// Sets both meeting times
    #[must_use]
    pub fn times(mut self, start: &str, end: &str) -> Self {
        self.input.start_time = start.to_string();
        self.input.end_time = end.to_string();
        self
    }

    /// Sets the zone
    #[must_use]
    pub fn zone(mut self, zone: Zone) -> Self {
        self.input.zone = zone;
        self
    }

    /// The finished input
    #[must_use]
    pub fn build(self) -> StudyInput {
        self.input
    }
}

/// An `Open` study built without validation, for storage-level tests.
///
/// Runs from 2025-04-01 to 2025-04-30; the admin has the same raw id as
/// the study.
#[must_use]
pub fn study(id: u64, name: &str, book: &str) -> Study {
    let details = ValidatedStudy {
        name: name.to_string(),
        book_name: book.to_string(),
        book_image: String::new(),
        description: String::new(),
        contact: String::new(),
        capacity: Capacity::new(5),
        start_date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap_or_default(),
        end_date: NaiveDate::from_ymd_opt(2025, 4, 30).unwrap_or_default(),
        start_time: NaiveTime::from_hms_opt(19, 0, 0).unwrap_or_default(),
        end_time: NaiveTime::from_hms_opt(21, 0, 0).unwrap_or_default(),
        day: Weekday::Tue,
        zone: Zone::Seoul,
    };
    let admin = Account::new(AccountId::new(id), format!("admin{id}@example.com"));
    Study::create(StudyId::new(id), details, &admin)
}

/// In-memory collaborators wired into a [`StudyRuntime`].
///
/// Keeps typed handles to the clock and storage for arranging and
/// asserting.
#[derive(Clone, Debug)]
pub struct TestWorld {
    /// Shared clock
    pub clock: ManualClock,
    /// Study storage
    pub studies: InMemoryStudyRepository,
    /// Identity provider
    pub accounts: InMemoryAccountDirectory,
    /// Services over the collaborators above
    pub runtime: StudyRuntime,
}

impl TestWorld {
    /// World with the default update policy
    #[must_use]
    pub fn new(clock: ManualClock) -> Self {
        Self::with_policy(clock, UpdatePolicy::default())
    }

    /// World with an explicit update policy
    #[must_use]
    pub fn with_policy(clock: ManualClock, policy: UpdatePolicy) -> Self {
        let studies = InMemoryStudyRepository::new();
        let accounts = InMemoryAccountDirectory::new();
        let environment = StudyEnvironment::new(
            Arc::new(clock.clone()),
            Arc::new(studies.clone()),
            Arc::new(accounts.clone()),
        );
        Self {
            clock,
            studies,
            accounts,
            runtime: StudyRuntime::with_policy(environment, policy),
        }
    }

    /// Registers a new account
    pub fn register(&self, email: &str) -> Account {
        self.accounts.register(email)
    }

    /// Current stored state of an account
    #[must_use]
    pub fn account(&self, id: AccountId) -> Option<Account> {
        self.accounts.get(id)
    }

    /// Valid input relative to the clock's today
    #[must_use]
    pub fn input(&self) -> StudyInputBuilder {
        StudyInputBuilder::new(self.clock.today())
    }
}

/// Installs a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Property-based testing strategies for domain types.
pub mod strategies {
    use bookclub_core::{Capacity, StudyState, Zone};
    use proptest::prelude::*;

    /// Any zone
    pub fn zone() -> impl Strategy<Value = Zone> {
        proptest::sample::select(Zone::ALL.to_vec())
    }

    /// Any lifecycle state
    pub fn state() -> impl Strategy<Value = StudyState> {
        proptest::sample::select(StudyState::ALL.to_vec())
    }

    /// Small capacities, including zero
    pub fn capacity() -> impl Strategy<Value = Capacity> {
        (0u32..=6).prop_map(Capacity::new)
    }

    /// A valid `HH:mm` pair with start not after end
    pub fn time_range() -> impl Strategy<Value = (String, String)> {
        (0u32..24, 0u32..60, 0u32..24, 0u32..60).prop_map(|(h1, m1, h2, m2)| {
            let (start, end) = if (h1, m1) <= (h2, m2) {
                ((h1, m1), (h2, m2))
            } else {
                ((h2, m2), (h1, m1))
            };
            (
                format!("{:02}:{:02}", start.0, start.1),
                format!("{:02}:{:02}", end.0, end.1),
            )
        })
    }
}
