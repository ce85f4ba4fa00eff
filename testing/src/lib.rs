//! # Bookclub Testing
//!
//! Testing utilities for the bookclub crates.
//!
//! This crate provides:
//! - Clocks: [`FixedClock`] and the adjustable [`ManualClock`]
//! - In-memory collaborators, re-exported from `bookclub-runtime`
//! - Fault injection: [`FaultyStudyRepository`], [`FaultyAccountDirectory`]
//! - [`ManualTicker`] for driving the sweep scheduler by hand
//! - Fixtures and proptest strategies
//!
//! ## Example
//!
//! ```
//! use bookclub_testing::{ManualClock, TestWorld};
//! use chrono::NaiveDate;
//!
//! # tokio_test::block_on(async {
//! let today = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
//! let world = TestWorld::new(ManualClock::on(today));
//! let admin = world.register("admin@example.com");
//!
//! let id = world
//!     .runtime
//!     .studies()
//!     .create(&admin.email, &world.input().build())
//!     .await
//!     .unwrap();
//! assert_eq!(world.studies.get(id).unwrap().enrolled_count(), 0);
//! # });
//! ```

use bookclub_core::environment::Clock;
use chrono::{DateTime, Days, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use std::sync::{Arc, PoisonError, RwLock};

pub mod faults;
pub mod fixtures;
pub mod ticker;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{
        Arc, Clock, DateTime, Days, FixedOffset, NaiveDate, NaiveTime, Offset, PoisonError,
        RwLock, TimeZone, Utc,
    };

    fn noon_utc(date: NaiveDate) -> DateTime<Utc> {
        Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN + chrono::TimeDelta::hours(12)))
    }

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use bookclub_testing::mocks::FixedClock;
    /// use bookclub_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
        offset: FixedOffset,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time,
                offset: Utc.fix(),
            }
        }

        /// Fixed clock at noon UTC on `date`
        #[must_use]
        pub fn on(date: NaiveDate) -> Self {
            Self::new(noon_utc(date))
        }

        /// Reads calendar dates in `offset`
        #[must_use]
        pub const fn with_offset(mut self, offset: FixedOffset) -> Self {
            self.offset = offset;
            self
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }

        fn offset(&self) -> FixedOffset {
            self.offset
        }
    }

    /// Clock that only moves when a test moves it.
    ///
    /// Clones share the same time, so a test can keep one handle while the
    /// services under test hold another.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Manual clock starting at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Manual clock starting at noon UTC on `date`
        #[must_use]
        pub fn on(date: NaiveDate) -> Self {
            Self::new(noon_utc(date))
        }

        /// Moves to `time`
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.write().unwrap_or_else(PoisonError::into_inner) = time;
        }

        /// Moves to noon UTC on `date`
        pub fn set_today(&self, date: NaiveDate) {
            self.set(noon_utc(date));
        }

        /// Moves forward by whole days
        pub fn advance_days(&self, days: u64) {
            let mut time = self.time.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(later) = time.checked_add_days(Days::new(days)) {
                *time = later;
            }
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

pub use faults::{FaultyAccountDirectory, FaultyStudyRepository};
pub use fixtures::{StudyInputBuilder, TestWorld, init_tracing};
pub use bookclub_runtime::{InMemoryAccountDirectory, InMemoryStudyRepository};
pub use mocks::{FixedClock, ManualClock, test_clock};
pub use ticker::{ManualTicker, ManualTickerHandle};
