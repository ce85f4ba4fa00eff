//! Collaborator traits for persistence and identity.
//!
//! The core never owns storage. Services talk to a [`StudyRepository`] for
//! studies and an [`AccountDirectory`] for accounts; both are object safe so
//! they can be shared as `Arc<dyn ...>` in an environment.
//!
//! A missing entity is reported as [`RepositoryError::NotFound`], distinct
//! from an empty result set.
//!
//! # Implementations
//!
//! - `InMemoryStudyRepository` / `InMemoryAccountDirectory` (in
//!   `bookclub-testing`): deterministic, process-local backends

use crate::error::RepositoryError;
use crate::filter::{Page, PageRequest, StudyFilter};
use crate::study::Study;
use crate::types::{Account, AccountId, StudyId, StudyState};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by collaborator methods
pub type RepositoryFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, RepositoryError>> + Send + 'a>>;

/// Storage for studies
pub trait StudyRepository: Send + Sync {
    /// Allocates the next study id.
    ///
    /// Ids increase monotonically, so ordering by id orders by creation.
    fn next_id(&self) -> RepositoryFuture<'_, StudyId>;

    /// Loads one study.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] when `id` does not exist.
    fn find_by_id(&self, id: StudyId) -> RepositoryFuture<'_, Study>;

    /// Loads every study
    fn find_all(&self) -> RepositoryFuture<'_, Vec<Study>>;

    /// Loads every study in `state`
    fn find_by_state(&self, state: StudyState) -> RepositoryFuture<'_, Vec<Study>>;

    /// Loads studies whose name contains `fragment`
    fn find_by_name_containing<'a>(&'a self, fragment: &'a str) -> RepositoryFuture<'a, Vec<Study>>;

    /// Loads every study matching `filter`, newest first
    fn find_matching<'a>(&'a self, filter: &'a StudyFilter) -> RepositoryFuture<'a, Vec<Study>>;

    /// Loads one page of studies matching `filter`, newest first
    fn find_page<'a>(
        &'a self,
        filter: &'a StudyFilter,
        page: PageRequest,
    ) -> RepositoryFuture<'a, Page<Study>>;

    /// Counts studies matching `filter`
    fn count<'a>(&'a self, filter: &'a StudyFilter) -> RepositoryFuture<'a, usize>;

    /// Inserts or replaces a study
    fn save(&self, study: Study) -> RepositoryFuture<'_, ()>;

    /// Removes a study.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] when `id` does not exist.
    fn delete(&self, id: StudyId) -> RepositoryFuture<'_, ()>;
}

/// Identity provider owning accounts and their `current_study_id` link
pub trait AccountDirectory: Send + Sync {
    /// Resolves an account by id.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] when the account does not exist.
    fn find_by_id(&self, id: AccountId) -> RepositoryFuture<'_, Account>;

    /// Resolves an account by login email.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] when no account uses `email`.
    fn find_by_email<'a>(&'a self, email: &'a str) -> RepositoryFuture<'a, Account>;

    /// Persists an account, including its study link
    fn save(&self, account: Account) -> RepositoryFuture<'_, ()>;
}
