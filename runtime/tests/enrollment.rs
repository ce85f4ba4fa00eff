//! Apply and cancel, including races and partial failures.

#![allow(clippy::unwrap_used, clippy::panic)]

use bookclub_core::{
    AccountId, CapacityError, StateConflictError, StudyError, StudyId, StudyState,
};
use bookclub_runtime::{StudyEnvironment, StudyRuntime};
use bookclub_testing::{
    FaultyAccountDirectory, InMemoryAccountDirectory, InMemoryStudyRepository, ManualClock,
    StudyInputBuilder, TestWorld,
};
use chrono::NaiveDate;
use proptest::prelude::*;
use std::sync::Arc;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
}

fn world() -> TestWorld {
    bookclub_testing::init_tracing();
    TestWorld::new(ManualClock::on(today()))
}

async fn open_study(world: &TestWorld, admin: &str, capacity: u32) -> StudyId {
    let admin = world.register(admin);
    world
        .runtime
        .studies()
        .create(&admin.email, &world.input().capacity(capacity).build())
        .await
        .unwrap()
}

#[tokio::test]
async fn last_seat_is_taken_then_study_is_full() {
    let world = world();
    let id = open_study(&world, "admin@example.com", 2).await;
    let enrollment = world.runtime.enrollment();

    let first = world.register("first@example.com");
    enrollment.apply(&first.email, id).await.unwrap();
    assert_eq!(world.studies.get(id).unwrap().enrolled_count(), 1);

    let a = world.register("a@example.com");
    enrollment.apply(&a.email, id).await.unwrap();
    let study = world.studies.get(id).unwrap();
    assert_eq!(study.enrolled_count(), 2);
    assert!(study.is_full());
    assert_eq!(world.account(a.id).unwrap().current_study_id, Some(id));

    let b = world.register("b@example.com");
    let err = enrollment.apply(&b.email, id).await.unwrap_err();
    assert_eq!(err, StudyError::Capacity(CapacityError::StudyFull));
    assert_eq!(world.studies.get(id).unwrap().enrolled_count(), 2);
    assert_eq!(world.account(b.id).unwrap().current_study_id, None);
}

#[tokio::test]
async fn cancel_without_enrollment_is_rejected() {
    let world = world();
    let id = open_study(&world, "admin@example.com", 3).await;
    let stranger = world.register("stranger@example.com");

    let err = world.runtime.enrollment().cancel(&stranger.email, id).await.unwrap_err();
    assert_eq!(
        err,
        StudyError::StateConflict(StateConflictError::NotEnrolledBefore)
    );
    assert_eq!(world.studies.get(id).unwrap().enrolled_count(), 0);
}

#[tokio::test]
async fn cancel_frees_the_seat_and_the_link() {
    let world = world();
    let id = open_study(&world, "admin@example.com", 1).await;
    let enrollment = world.runtime.enrollment();
    let reader = world.register("reader@example.com");

    enrollment.apply(&reader.email, id).await.unwrap();
    enrollment.cancel(&reader.email, id).await.unwrap();

    let study = world.studies.get(id).unwrap();
    assert_eq!(study.enrolled_count(), 0);
    assert!(!study.is_member(reader.id));
    assert_eq!(world.account(reader.id).unwrap().current_study_id, None);

    let next = world.register("next@example.com");
    enrollment.apply(&next.email, id).await.unwrap();
}

#[tokio::test]
async fn applying_twice_is_rejected() {
    let world = world();
    let id = open_study(&world, "admin@example.com", 3).await;
    let reader = world.register("reader@example.com");
    let enrollment = world.runtime.enrollment();

    enrollment.apply(&reader.email, id).await.unwrap();
    let err = enrollment.apply(&reader.email, id).await.unwrap_err();
    assert_eq!(err, StudyError::StateConflict(StateConflictError::AlreadyEnrolled));
    assert_eq!(world.studies.get(id).unwrap().enrolled_count(), 1);
}

#[tokio::test]
async fn admin_cannot_join_own_or_another_study() {
    let world = world();
    let admin = world.register("admin@example.com");
    let mine = world
        .runtime
        .studies()
        .create(&admin.email, &world.input().build())
        .await
        .unwrap();
    let other = open_study(&world, "other@example.com", 3).await;
    let enrollment = world.runtime.enrollment();

    for id in [mine, other] {
        let err = enrollment.apply(&admin.email, id).await.unwrap_err();
        assert_eq!(err, StudyError::StateConflict(StateConflictError::AlreadyEnrolled));
    }
}

#[tokio::test]
async fn member_of_one_study_cannot_join_another() {
    let world = world();
    let first = open_study(&world, "one@example.com", 3).await;
    let second = open_study(&world, "two@example.com", 3).await;
    let reader = world.register("reader@example.com");
    let enrollment = world.runtime.enrollment();

    enrollment.apply(&reader.email, first).await.unwrap();
    let err = enrollment.apply(&reader.email, second).await.unwrap_err();
    assert_eq!(err, StudyError::StateConflict(StateConflictError::AlreadyEnrolled));
    assert_eq!(world.studies.get(second).unwrap().enrolled_count(), 0);
}

#[tokio::test]
async fn closed_study_takes_no_applications() {
    let world = world();
    let id = open_study(&world, "admin@example.com", 3).await;
    world.clock.set_today(world.studies.get(id).unwrap().start_date());
    world.runtime.sweep().run().await;

    let reader = world.register("reader@example.com");
    let err = world.runtime.enrollment().apply(&reader.email, id).await.unwrap_err();
    assert_eq!(
        err,
        StudyError::StateConflict(StateConflictError::NotOpenForApplication {
            state: StudyState::Close
        })
    );
}

#[tokio::test]
async fn stale_link_to_ended_study_is_overwritten() {
    let world = world();
    let old = open_study(&world, "old@example.com", 3).await;
    let reader = world.register("reader@example.com");
    world.runtime.enrollment().apply(&reader.email, old).await.unwrap();

    let old_study = world.studies.get(old).unwrap();
    world.clock.set_today(old_study.start_date());
    world.runtime.sweep().run().await;
    world.clock.set_today(old_study.end_date().succ_opt().unwrap());
    world.runtime.sweep().run().await;
    assert_eq!(world.studies.get(old).unwrap().state(), StudyState::End);

    let fresh = open_study(&world, "fresh@example.com", 3).await;
    world.runtime.enrollment().apply(&reader.email, fresh).await.unwrap();
    assert_eq!(world.account(reader.id).unwrap().current_study_id, Some(fresh));
}

#[tokio::test]
async fn dangling_link_to_deleted_study_is_overwritten() {
    let world = world();
    let id = open_study(&world, "admin@example.com", 3).await;
    let mut reader = world.register("reader@example.com");
    reader.current_study_id = Some(StudyId::new(999));
    world.accounts.insert(reader.clone());

    world.runtime.enrollment().apply(&reader.email, id).await.unwrap();
    assert_eq!(world.account(reader.id).unwrap().current_study_id, Some(id));
}

#[tokio::test]
async fn unknown_study_or_account_is_not_found() {
    let world = world();
    let reader = world.register("reader@example.com");
    let enrollment = world.runtime.enrollment();

    let err = enrollment.apply(&reader.email, StudyId::new(42)).await.unwrap_err();
    assert_eq!(err, StudyError::study_not_found(StudyId::new(42)));

    let id = open_study(&world, "admin@example.com", 3).await;
    let err = enrollment.apply("ghost@example.com", id).await.unwrap_err();
    assert_eq!(err, StudyError::account_not_found("ghost@example.com"));
}

#[tokio::test]
async fn failed_account_write_rolls_back_the_seat() {
    bookclub_testing::init_tracing();
    let clock = ManualClock::on(today());
    let studies = InMemoryStudyRepository::new();
    let accounts = InMemoryAccountDirectory::new();
    let faulty = FaultyAccountDirectory::new(Arc::new(accounts.clone()));
    let runtime = StudyRuntime::new(StudyEnvironment::new(
        Arc::new(clock.clone()),
        Arc::new(studies.clone()),
        Arc::new(faulty.clone()),
    ));

    let admin = accounts.register("admin@example.com");
    let input = StudyInputBuilder::new(today()).capacity(2).build();
    let id = runtime.studies().create(&admin.email, &input).await.unwrap();

    let reader = accounts.register("reader@example.com");
    faulty.fail_saves_of(reader.id);

    let err = runtime.enrollment().apply(&reader.email, id).await.unwrap_err();
    assert_eq!(err.kind(), bookclub_core::ErrorKind::Repository);
    let study = studies.get(id).unwrap();
    assert_eq!(study.enrolled_count(), 0);
    assert!(!study.is_member(reader.id));
    assert_eq!(accounts.get(reader.id).unwrap().current_study_id, None);

    faulty.heal();
    runtime.enrollment().apply(&reader.email, id).await.unwrap();

    faulty.fail_saves_of(reader.id);
    runtime.enrollment().cancel(&reader.email, id).await.unwrap_err();
    let study = studies.get(id).unwrap();
    assert!(study.is_member(reader.id));
    assert_eq!(accounts.get(reader.id).unwrap().current_study_id, Some(id));
}

#[tokio::test]
async fn failed_admin_link_undoes_create() {
    let clock = ManualClock::on(today());
    let studies = InMemoryStudyRepository::new();
    let accounts = InMemoryAccountDirectory::new();
    let faulty = FaultyAccountDirectory::new(Arc::new(accounts.clone()));
    let runtime = StudyRuntime::new(StudyEnvironment::new(
        Arc::new(clock),
        Arc::new(studies.clone()),
        Arc::new(faulty.clone()),
    ));

    let admin = accounts.register("admin@example.com");
    faulty.fail_all_saves();

    let input = StudyInputBuilder::new(today()).build();
    runtime.studies().create(&admin.email, &input).await.unwrap_err();
    assert!(studies.is_empty());
    assert_eq!(accounts.get(admin.id).unwrap().current_study_id, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_applications_never_overbook() {
    const CAPACITY: u32 = 3;
    const APPLICANTS: usize = 24;

    let world = world();
    let id = open_study(&world, "admin@example.com", CAPACITY).await;

    let mut handles = Vec::new();
    for n in 0..APPLICANTS {
        let reader = world.register(&format!("reader{n}@example.com"));
        let enrollment = world.runtime.enrollment();
        handles.push(tokio::spawn(async move {
            enrollment.apply(&reader.email, id).await
        }));
    }

    let mut accepted = 0;
    let mut full = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(StudyError::Capacity(CapacityError::StudyFull)) => full += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(accepted, CAPACITY as usize);
    assert_eq!(full, APPLICANTS - CAPACITY as usize);

    let study = world.studies.get(id).unwrap();
    assert_eq!(study.enrolled_count(), CAPACITY);
    assert_eq!(study.members().count(), CAPACITY as usize);
    for member in study.members() {
        assert_eq!(world.account(member).unwrap().current_study_id, Some(id));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_account_racing_into_two_studies_gets_one() {
    let world = world();
    let first = open_study(&world, "one@example.com", 5).await;
    let second = open_study(&world, "two@example.com", 5).await;
    let reader = world.register("reader@example.com");

    let a = {
        let enrollment = world.runtime.enrollment();
        let email = reader.email.clone();
        tokio::spawn(async move { enrollment.apply(&email, first).await })
    };
    let b = {
        let enrollment = world.runtime.enrollment();
        let email = reader.email.clone();
        tokio::spawn(async move { enrollment.apply(&email, second).await })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);

    let joined = [first, second]
        .into_iter()
        .filter(|id| world.studies.get(*id).unwrap().is_member(reader.id))
        .count();
    assert_eq!(joined, 1);
}

#[derive(Clone, Debug)]
enum Op {
    Apply { account: usize, study: usize },
    Cancel { account: usize, study: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..5, 0usize..2).prop_map(|(account, study)| Op::Apply { account, study }),
        (0usize..5, 0usize..2).prop_map(|(account, study)| Op::Cancel { account, study }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn membership_invariants_hold(
        capacities in (0u32..=3, 0u32..=3),
        ops in prop::collection::vec(op(), 0..40),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let world = TestWorld::new(ManualClock::on(today()));
            let studies = [
                open_study(&world, "admin0@example.com", capacities.0).await,
                open_study(&world, "admin1@example.com", capacities.1).await,
            ];
            let readers: Vec<_> = (0..5)
                .map(|n| world.register(&format!("r{n}@example.com")))
                .collect();

            for op in ops {
                let enrollment = world.runtime.enrollment();
                // Domain rejections are expected; only the invariants matter.
                let _ = match op {
                    Op::Apply { account, study } => {
                        enrollment.apply(&readers[account].email, studies[study]).await
                    }
                    Op::Cancel { account, study } => {
                        enrollment.cancel(&readers[account].email, studies[study]).await
                    }
                };
            }

            for id in studies {
                let study = world.studies.get(id).unwrap();
                assert!(study.enrolled_count() <= study.capacity().value());
                assert_eq!(study.members().count(), study.enrolled_count() as usize);
            }

            for reader in &readers {
                let memberships: Vec<StudyId> = studies
                    .iter()
                    .copied()
                    .filter(|id| world.studies.get(*id).unwrap().is_member(reader.id))
                    .collect();
                assert!(memberships.len() <= 1);

                let link = world.account(reader.id).unwrap().current_study_id;
                assert_eq!(link, memberships.first().copied());
            }

            let admins: Vec<AccountId> = studies
                .iter()
                .map(|id| world.studies.get(*id).unwrap().admin())
                .collect();
            for (admin, id) in admins.into_iter().zip(studies) {
                assert_eq!(world.account(admin).unwrap().current_study_id, Some(id));
            }
        });
    }
}
