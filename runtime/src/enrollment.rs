//! Capacity-aware membership changes.
//!
//! `apply` and `cancel` each change one study's membership set and one
//! account's `current_study_id` as a single unit: both run under the study
//! lock and then the account lock, check everything first, and undo the
//! study write if the account write fails.

use crate::StudyEnvironment;
use crate::locks::StudyLocks;
use crate::metrics::{StudyMetrics, outcome};
use bookclub_core::{Account, StateConflictError, Study, StudyError, StudyId, StudyState};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Apply and cancel
#[derive(Clone, Debug)]
pub struct EnrollmentManager {
    env: StudyEnvironment,
    locks: Arc<StudyLocks>,
}

impl EnrollmentManager {
    /// Creates the manager.
    ///
    /// `locks` must be the registry shared with every other service mutating
    /// the same studies.
    #[must_use]
    pub const fn new(env: StudyEnvironment, locks: Arc<StudyLocks>) -> Self {
        Self { env, locks }
    }

    /// Enrolls the account behind `requester` in study `id`.
    ///
    /// A link to a study that has ended or was deleted is stale: it does not
    /// block the application and is overwritten.
    ///
    /// # Errors
    ///
    /// Checked in this order:
    ///
    /// 1. `NotFound` when the requester or study is unknown
    /// 2. `AlreadyEnrolled` when the account is linked to an open or closed study
    /// 3. `NotOpenForApplication` when the study has left `Open`
    /// 4. `StudyFull` when no seats are left
    #[tracing::instrument(skip(self), fields(requester = %requester, study_id = %id))]
    pub async fn apply(&self, requester: &str, id: StudyId) -> Result<StudyId, StudyError> {
        let result = self.apply_inner(requester, id).await;
        StudyMetrics::record_enrollment("apply", outcome(&result));
        result
    }

    async fn apply_inner(&self, requester: &str, id: StudyId) -> Result<StudyId, StudyError> {
        let account_id = self.env.accounts.find_by_email(requester).await?.id;

        let _study_guard = self.locks.study(id).await;
        let study = self.env.studies.find_by_id(id).await?;

        let _account_guard = self.locks.account(account_id).await;
        let mut account = self.env.accounts.find_by_id(account_id).await?;

        self.ensure_not_enrolled(&account, &study).await?;

        if study.state() != StudyState::Open {
            return Err(StateConflictError::NotOpenForApplication {
                state: study.state(),
            }
            .into());
        }

        let mut updated = study.clone();
        updated.add_member(account_id).inspect_err(|e| {
            debug!(error = %e, "Application rejected");
        })?;

        let remaining = updated.remaining_seats();
        self.env.studies.save(updated).await?;

        account.current_study_id = Some(id);
        if let Err(e) = self.env.accounts.save(account).await {
            self.restore(study).await;
            return Err(e.into());
        }

        info!(study_id = %id, account_id = %account_id, remaining, "Account enrolled");
        Ok(id)
    }

    /// Removes the account behind `requester` from study `id`.
    ///
    /// # Errors
    ///
    /// - `NotFound` when the requester or study is unknown
    /// - `NotEnrolledBefore` when the account is not a member
    #[tracing::instrument(skip(self), fields(requester = %requester, study_id = %id))]
    pub async fn cancel(&self, requester: &str, id: StudyId) -> Result<StudyId, StudyError> {
        let result = self.cancel_inner(requester, id).await;
        StudyMetrics::record_enrollment("cancel", outcome(&result));
        result
    }

    async fn cancel_inner(&self, requester: &str, id: StudyId) -> Result<StudyId, StudyError> {
        let account_id = self.env.accounts.find_by_email(requester).await?.id;

        let _study_guard = self.locks.study(id).await;
        let study = self.env.studies.find_by_id(id).await?;

        let _account_guard = self.locks.account(account_id).await;
        let mut account = self.env.accounts.find_by_id(account_id).await?;

        let mut updated = study.clone();
        updated.remove_member(account_id)?;
        self.env.studies.save(updated).await?;

        if account.is_linked_to(id) {
            account.current_study_id = None;
            if let Err(e) = self.env.accounts.save(account).await {
                self.restore(study).await;
                return Err(e.into());
            }
        }

        info!(study_id = %id, account_id = %account_id, "Enrollment cancelled");
        Ok(id)
    }

    /// Rejects accounts already bound to this or another active study
    async fn ensure_not_enrolled(
        &self,
        account: &Account,
        study: &Study,
    ) -> Result<(), StudyError> {
        if account.is_applier_of(study) || account.is_linked_to(study.id()) {
            return Err(StateConflictError::AlreadyEnrolled.into());
        }

        match self.env.linked_study(account).await? {
            Some(current) if current.state().is_active() => {
                Err(StateConflictError::AlreadyEnrolled.into())
            }
            Some(current) => {
                debug!(
                    account_id = %account.id,
                    stale_study_id = %current.id(),
                    "Overwriting link to ended study"
                );
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Puts back the study snapshot taken before a failed unit of work
    async fn restore(&self, previous: Study) {
        let id = previous.id();
        warn!(study_id = %id, "Account write failed, restoring study");
        if let Err(e) = self.env.studies.save(previous).await {
            warn!(study_id = %id, error = %e, "Failed to restore study");
        }
    }
}
