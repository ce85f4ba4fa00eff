//! Create, update, delete and get.
//!
//! Each mutation validates fully before writing anything, and runs under
//! the locks described in [`crate::locks`].

use crate::StudyEnvironment;
use crate::locks::StudyLocks;
use crate::metrics::{StudyMetrics, outcome};
use bookclub_core::validation::{
    UpdatePolicy, ensure_manager, ensure_no_active_study, validate_create_or_update,
};
use bookclub_core::{AccountId, Study, StudyError, StudyId, StudyInput};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Study create/update/delete/get
#[derive(Clone, Debug)]
pub struct StudyService {
    env: StudyEnvironment,
    locks: Arc<StudyLocks>,
    policy: UpdatePolicy,
}

impl StudyService {
    /// Creates the service.
    ///
    /// `locks` must be the registry shared with every other service mutating
    /// the same studies.
    #[must_use]
    pub const fn new(
        env: StudyEnvironment,
        locks: Arc<StudyLocks>,
        policy: UpdatePolicy,
    ) -> Self {
        Self { env, locks, policy }
    }

    /// Update policy in force
    #[must_use]
    pub const fn policy(&self) -> UpdatePolicy {
        self.policy
    }

    /// Creates a study administered by the account behind `requester`.
    ///
    /// # Errors
    ///
    /// - `NotFound` when `requester` is unknown
    /// - `AlreadyHasActiveStudy` when the requester is bound to an open or closed study
    /// - any `Validation` error
    /// - `Repository` when a collaborator fails
    #[tracing::instrument(skip(self, input), fields(requester = %requester))]
    pub async fn create(&self, requester: &str, input: &StudyInput) -> Result<StudyId, StudyError> {
        let result = self.create_inner(requester, input).await;
        StudyMetrics::record_mutation("create", outcome(&result));
        result
    }

    async fn create_inner(
        &self,
        requester: &str,
        input: &StudyInput,
    ) -> Result<StudyId, StudyError> {
        let account_id = self.env.accounts.find_by_email(requester).await?.id;
        let _account_guard = self.locks.account(account_id).await;
        let mut admin = self.env.accounts.find_by_id(account_id).await?;

        let current = self.env.linked_study(&admin).await?;
        ensure_no_active_study(current.as_ref())?;

        let details = validate_create_or_update(input, self.env.clock.today()).inspect_err(|e| {
            debug!(error = %e, "Create rejected by validation");
        })?;

        let id = self.env.studies.next_id().await?;
        let study = Study::create(id, details, &admin);
        self.env.studies.save(study).await?;

        admin.current_study_id = Some(id);
        if let Err(e) = self.env.accounts.save(admin).await {
            warn!(study_id = %id, error = %e, "Linking admin failed, removing new study");
            if let Err(undo) = self.env.studies.delete(id).await {
                warn!(study_id = %id, error = %undo, "Failed to remove unlinked study");
            }
            return Err(e.into());
        }

        info!(study_id = %id, account_id = %account_id, "Study created");
        Ok(id)
    }

    /// Replaces the editable fields of a study.
    ///
    /// State and membership are never changed by an update.
    ///
    /// # Errors
    ///
    /// - `NotFound` when the requester or study is unknown
    /// - `NotManager` when the requester is not the admin
    /// - `NotEditable` when the update policy forbids editing in the current state
    /// - any `Validation` error
    /// - `BelowEnrolled` when the new capacity is below current enrollment
    #[tracing::instrument(skip(self, input), fields(requester = %requester, study_id = %id))]
    pub async fn update(
        &self,
        requester: &str,
        id: StudyId,
        input: &StudyInput,
    ) -> Result<StudyId, StudyError> {
        let result = self.update_inner(requester, id, input).await;
        StudyMetrics::record_mutation("update", outcome(&result));
        result
    }

    async fn update_inner(
        &self,
        requester: &str,
        id: StudyId,
        input: &StudyInput,
    ) -> Result<StudyId, StudyError> {
        let account = self.env.accounts.find_by_email(requester).await?;
        let _study_guard = self.locks.study(id).await;
        let mut study = self.env.studies.find_by_id(id).await?;

        ensure_manager(&study, &account)?;
        self.policy.ensure_editable(study.state())?;
        let details = validate_create_or_update(input, self.env.clock.today())?;
        study.update_with(details)?;

        self.env.studies.save(study).await?;
        info!(study_id = %id, "Study updated");
        Ok(id)
    }

    /// Deletes a study and clears every account link pointing at it.
    ///
    /// Returns the deleted study. A link that cannot be cleared is logged
    /// and left behind; it points at a missing study and is treated as stale.
    ///
    /// # Errors
    ///
    /// - `NotFound` when the requester or study is unknown
    /// - `NotManager` when the requester is not the admin
    /// - `Repository` when the study cannot be deleted
    #[tracing::instrument(skip(self), fields(requester = %requester, study_id = %id))]
    pub async fn delete(&self, requester: &str, id: StudyId) -> Result<Study, StudyError> {
        let result = self.delete_inner(requester, id).await;
        StudyMetrics::record_mutation("delete", outcome(&result));
        result
    }

    async fn delete_inner(&self, requester: &str, id: StudyId) -> Result<Study, StudyError> {
        let account = self.env.accounts.find_by_email(requester).await?;
        let _study_guard = self.locks.study(id).await;
        let study = self.env.studies.find_by_id(id).await?;
        ensure_manager(&study, &account)?;

        let linked: Vec<AccountId> = std::iter::once(study.admin())
            .chain(study.members())
            .collect();
        let _account_guards = self.locks.accounts(linked.iter().copied()).await;

        self.env.studies.delete(id).await?;

        for account_id in linked {
            self.unlink(account_id, id).await;
        }

        info!(study_id = %id, members = study.enrolled_count(), "Study deleted");
        Ok(study)
    }

    /// Loads one study.
    ///
    /// # Errors
    ///
    /// `NotFound` when `id` does not exist.
    pub async fn get(&self, id: StudyId) -> Result<Study, StudyError> {
        Ok(self.env.studies.find_by_id(id).await?)
    }

    async fn unlink(&self, account_id: AccountId, study: StudyId) {
        let mut account = match self.env.accounts.find_by_id(account_id).await {
            Ok(account) => account,
            Err(e) => {
                warn!(account_id = %account_id, error = %e, "Could not load account to unlink");
                return;
            }
        };

        if !account.is_linked_to(study) {
            return;
        }

        account.current_study_id = None;
        if let Err(e) = self.env.accounts.save(account).await {
            warn!(
                account_id = %account_id,
                study_id = %study,
                error = %e,
                "Could not clear study link"
            );
        }
    }
}
