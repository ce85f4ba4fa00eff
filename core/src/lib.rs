//! # Bookclub Core
//!
//! Domain model and pure business rules for time-boxed, capacity-limited
//! group activities ("studies").
//!
//! This crate owns everything that can be decided without I/O:
//!
//! - **Study**: the aggregate, its membership set and its invariants
//! - **Validation**: cross-field checks gating create and update
//! - **Lifecycle**: the `OPEN → CLOSE → END` transition function
//! - **Filter**: the filter value used to list studies
//! - **Environment**: the injected [`Clock`](environment::Clock)
//! - **Repository**: collaborator traits for persistence and identity
//!
//! Running these rules against collaborators (locking, persistence,
//! scheduling) lives in `bookclub-runtime`.
//!
//! ## Example
//!
//! ```
//! use bookclub_core::lifecycle::{self, StudyTransition};
//! use bookclub_core::validation::validate_create_or_update;
//! use bookclub_core::{Account, AccountId, Capacity, Study, StudyId, StudyInput, StudyState, Zone};
//! use chrono::{NaiveDate, Weekday};
//!
//! let today = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
//! let input = StudyInput {
//!     name: "Rust in Action".to_string(),
//!     book_name: "Rust in Action".to_string(),
//!     book_image: String::new(),
//!     description: "weekly reading".to_string(),
//!     contact: "open chat".to_string(),
//!     capacity: Capacity::new(5),
//!     start_date: today.succ_opt().unwrap(),
//!     end_date: NaiveDate::from_ymd_opt(2025, 3, 8).unwrap(),
//!     start_time: "13:00".to_string(),
//!     end_time: "15:30".to_string(),
//!     day: Weekday::Mon,
//!     zone: Zone::Seoul,
//! };
//!
//! let details = validate_create_or_update(&input, today).unwrap();
//! let admin = Account::new(AccountId::new(1), "admin@example.com");
//! let mut study = Study::create(StudyId::new(1), details, &admin);
//! assert_eq!(study.state(), StudyState::Open);
//!
//! // The day the study starts, applications close.
//! let start = study.start_date();
//! assert_eq!(lifecycle::advance(&mut study, start), Some(StudyTransition::OpenToClose));
//! ```

pub mod error;
pub mod filter;
pub mod lifecycle;
pub mod repository;
pub mod study;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use chrono::{NaiveDate, NaiveTime, Weekday};
pub use error::{
    AuthorizationError, CapacityError, EntityKind, ErrorKind, RepositoryError,
    StateConflictError, StudyError, ValidationError,
};
pub use filter::{Page, PageRequest, StudyFilter};
pub use lifecycle::StudyTransition;
pub use repository::{AccountDirectory, RepositoryFuture, StudyRepository};
pub use study::Study;
pub use types::{
    Account, AccountId, Capacity, ParseCodeError, StudyId, StudyInput, StudyState, Zone,
};
pub use validation::{UpdatePolicy, ValidatedStudy};

/// Environment module - Dependency injection traits
///
/// All time-dependent rules read "today" from an injected [`Clock`]
/// rather than a global time source, so validation and the sweep are
/// deterministic under test.
///
/// [`Clock`]: environment::Clock
pub mod environment {
    use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Production - uses system clock
    /// let clock = SystemClock::utc();
    ///
    /// // Test - fixed time for deterministic tests
    /// let clock = FixedClock::on(date);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current instant
        fn now(&self) -> DateTime<Utc>;

        /// Offset used to turn an instant into a calendar date.
        ///
        /// Defaults to UTC.
        fn offset(&self) -> FixedOffset {
            Utc.fix()
        }

        /// The current calendar date in this clock's offset.
        fn today(&self) -> NaiveDate {
            self.now().with_timezone(&self.offset()).date_naive()
        }
    }

    /// Wall clock backed by [`Utc::now`].
    #[derive(Debug, Clone, Copy)]
    pub struct SystemClock {
        offset: FixedOffset,
    }

    impl SystemClock {
        /// System clock whose calendar day is computed in UTC.
        #[must_use]
        pub fn utc() -> Self {
            Self { offset: Utc.fix() }
        }

        /// System clock whose calendar day is computed in `offset`.
        #[must_use]
        pub const fn with_offset(offset: FixedOffset) -> Self {
            Self { offset }
        }
    }

    impl Default for SystemClock {
        fn default() -> Self {
            Self::utc()
        }
    }

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }

        fn offset(&self) -> FixedOffset {
            self.offset
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::environment::{Clock, SystemClock};
    use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

    struct At(DateTime<Utc>, FixedOffset);

    impl Clock for At {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }

        fn offset(&self) -> FixedOffset {
            self.1
        }
    }

    #[test]
    fn today_respects_offset() {
        let instant = DateTime::parse_from_rfc3339("2025-03-01T20:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let utc = At(instant, FixedOffset::east_opt(0).unwrap());
        let seoul = At(instant, FixedOffset::east_opt(9 * 3600).unwrap());

        assert_eq!(utc.today(), NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(seoul.today(), NaiveDate::from_ymd_opt(2025, 3, 2).unwrap());
    }

    #[test]
    fn system_clock_defaults_to_utc() {
        let clock = SystemClock::default();
        assert_eq!(clock.offset(), FixedOffset::east_opt(0).unwrap());
    }
}
