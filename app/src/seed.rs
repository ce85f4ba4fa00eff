//! Demo data for the in-memory backend.

use bookclub_core::environment::Clock;
use bookclub_core::{Capacity, StudyError, StudyId, StudyInput, Weekday, Zone};
use bookclub_runtime::StudyRuntime;
use bookclub_runtime::InMemoryAccountDirectory;
use chrono::Days;
use tracing::info;

/// What [`seed_demo_data`] created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedSummary {
    /// Accounts registered
    pub accounts: usize,
    /// Studies created, oldest first
    pub studies: Vec<StudyId>,
}

/// Registers a handful of accounts, opens two studies and enrolls readers.
///
/// Dates are relative to the runtime clock, so the studies are always
/// valid and `Open` right after seeding.
///
/// # Errors
///
/// Propagates any [`StudyError`] raised by the services.
pub async fn seed_demo_data(
    runtime: &StudyRuntime,
    accounts: &InMemoryAccountDirectory,
) -> Result<SeedSummary, StudyError> {
    let today = runtime.environment().clock.today();

    let host = accounts.register_named("host@bookclub.dev", "Minji Park", "minji");
    let guide = accounts.register_named("guide@bookclub.dev", "Jisoo Han", "jisoo");
    let readers = [
        accounts.register_named("reader1@bookclub.dev", "Hyun Woo", "hyun"),
        accounts.register_named("reader2@bookclub.dev", "Seo Yeon", "seoyeon"),
        accounts.register_named("reader3@bookclub.dev", "Dong Hae", "donghae"),
    ];

    let rust = StudyInput {
        name: "Rust evenings".to_string(),
        book_name: "The Rust Programming Language".to_string(),
        book_image: "trpl.png".to_string(),
        description: "Two chapters a week, exercises on Thursdays".to_string(),
        contact: "open chat: rust-evenings".to_string(),
        capacity: Capacity::new(4),
        start_date: today + Days::new(3),
        end_date: today + Days::new(45),
        start_time: "19:00".to_string(),
        end_time: "21:00".to_string(),
        day: Weekday::Thu,
        zone: Zone::Seoul,
    };
    let async_rust = StudyInput {
        name: "Async on weekends".to_string(),
        book_name: "Asynchronous Programming in Rust".to_string(),
        book_image: "async.png".to_string(),
        description: "Slow reading with live coding".to_string(),
        contact: "open chat: async-weekends".to_string(),
        capacity: Capacity::new(2),
        start_date: today + Days::new(7),
        end_date: today + Days::new(35),
        start_time: "10:00".to_string(),
        end_time: "12:00".to_string(),
        day: Weekday::Sat,
        zone: Zone::Busan,
    };

    let studies = runtime.studies();
    let first = studies.create(&host.email, &rust).await?;
    let second = studies.create(&guide.email, &async_rust).await?;

    let enrollment = runtime.enrollment();
    enrollment.apply(&readers[0].email, first).await?;
    enrollment.apply(&readers[1].email, first).await?;
    enrollment.apply(&readers[2].email, second).await?;

    let summary = SeedSummary {
        accounts: accounts.len(),
        studies: vec![first, second],
    };
    info!(
        accounts = summary.accounts,
        studies = summary.studies.len(),
        "Demo data seeded"
    );
    Ok(summary)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bookclub_core::StudyState;
    use bookclub_testing::{ManualClock, TestWorld};
    use chrono::NaiveDate;

    #[tokio::test]
    async fn seeded_studies_are_open_and_linked() {
        let world = TestWorld::new(ManualClock::on(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()));
        let summary = seed_demo_data(&world.runtime, &world.accounts).await.unwrap();

        assert_eq!(summary.accounts, 5);
        assert_eq!(summary.studies.len(), 2);

        let counts = world.runtime.queries().counts().await.unwrap();
        assert_eq!(counts.open, 2);

        let first = world.studies.get(summary.studies[0]).unwrap();
        assert_eq!(first.state(), StudyState::Open);
        assert_eq!(first.enrolled_count(), 2);
        for member in first.members() {
            let account = world.account(member).unwrap();
            assert_eq!(account.current_study_id, Some(first.id()));
        }
    }
}
