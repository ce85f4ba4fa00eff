//! In-memory collaborators.
//!
//! The backend the binary runs on, and the storage every test world uses.
//!
//! - [`InMemoryStudyRepository`]: `BTreeMap`-backed study storage with
//!   monotonically allocated ids
//! - [`InMemoryAccountDirectory`]: `HashMap`-backed identity provider
//!
//! Both are cheap to clone; clones share storage, so a test can hand one
//! clone to the services and keep another for assertions.

use bookclub_core::filter::{paginate, sort_newest_first};
use bookclub_core::repository::RepositoryFuture;
use bookclub_core::{
    Account, AccountDirectory, AccountId, EntityKind, Page, PageRequest, RepositoryError, Study,
    StudyFilter, StudyId, StudyRepository, StudyState,
};
use std::collections::{BTreeMap, HashMap};
use std::future::ready;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

// ============================================================================
// Studies
// ============================================================================

#[derive(Debug, Default)]
struct StudyTable {
    rows: BTreeMap<StudyId, Study>,
    last_id: u64,
}

/// In-memory study storage.
///
/// # Example
///
/// ```
/// use bookclub_runtime::memory::InMemoryStudyRepository;
/// use bookclub_core::StudyRepository;
///
/// # tokio_test::block_on(async {
/// let repo = InMemoryStudyRepository::new();
/// let first = repo.next_id().await.unwrap();
/// let second = repo.next_id().await.unwrap();
/// assert!(second > first);
/// assert!(repo.is_empty());
/// # });
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryStudyRepository {
    table: Arc<RwLock<StudyTable>>,
}

impl InMemoryStudyRepository {
    /// Create a new empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, StudyTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StudyTable> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stored copy of a study, if present
    #[must_use]
    pub fn get(&self, id: StudyId) -> Option<Study> {
        self.read().rows.get(&id).cloned()
    }

    /// Stores a study directly, bypassing the services.
    ///
    /// Keeps id allocation ahead of every inserted id.
    pub fn insert(&self, study: Study) {
        let mut table = self.write();
        table.last_id = table.last_id.max(study.id().value());
        table.rows.insert(study.id(), study);
    }

    /// Number of stored studies
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().rows.len()
    }

    /// Check if the repository is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().rows.is_empty()
    }

    fn collect(&self, mut keep: impl FnMut(&Study) -> bool) -> Vec<Study> {
        self.read()
            .rows
            .values()
            .filter(|study| keep(study))
            .cloned()
            .collect()
    }
}

impl StudyRepository for InMemoryStudyRepository {
    fn next_id(&self) -> RepositoryFuture<'_, StudyId> {
        let mut table = self.write();
        table.last_id += 1;
        Box::pin(ready(Ok(StudyId::new(table.last_id))))
    }

    fn find_by_id(&self, id: StudyId) -> RepositoryFuture<'_, Study> {
        let result = self.get(id).ok_or_else(|| RepositoryError::NotFound {
            entity: EntityKind::Study,
            id: id.to_string(),
        });
        Box::pin(ready(result))
    }

    fn find_all(&self) -> RepositoryFuture<'_, Vec<Study>> {
        Box::pin(ready(Ok(self.collect(|_| true))))
    }

    fn find_by_state(&self, state: StudyState) -> RepositoryFuture<'_, Vec<Study>> {
        Box::pin(ready(Ok(self.collect(|study| study.state() == state))))
    }

    fn find_by_name_containing<'a>(
        &'a self,
        fragment: &'a str,
    ) -> RepositoryFuture<'a, Vec<Study>> {
        Box::pin(ready(Ok(self.collect(|study| study.name().contains(fragment)))))
    }

    fn find_matching<'a>(&'a self, filter: &'a StudyFilter) -> RepositoryFuture<'a, Vec<Study>> {
        let mut studies = self.collect(|study| filter.matches(study));
        sort_newest_first(&mut studies);
        Box::pin(ready(Ok(studies)))
    }

    fn find_page<'a>(
        &'a self,
        filter: &'a StudyFilter,
        page: PageRequest,
    ) -> RepositoryFuture<'a, Page<Study>> {
        let studies = self.collect(|_| true);
        Box::pin(ready(Ok(paginate(studies, filter, page))))
    }

    fn count<'a>(&'a self, filter: &'a StudyFilter) -> RepositoryFuture<'a, usize> {
        let total = self.read().rows.values().filter(|s| filter.matches(s)).count();
        Box::pin(ready(Ok(total)))
    }

    fn save(&self, study: Study) -> RepositoryFuture<'_, ()> {
        self.insert(study);
        Box::pin(ready(Ok(())))
    }

    fn delete(&self, id: StudyId) -> RepositoryFuture<'_, ()> {
        let result = match self.write().rows.remove(&id) {
            Some(_) => Ok(()),
            None => Err(RepositoryError::NotFound {
                entity: EntityKind::Study,
                id: id.to_string(),
            }),
        };
        Box::pin(ready(result))
    }
}

// ============================================================================
// Accounts
// ============================================================================

#[derive(Debug, Default)]
struct AccountTable {
    rows: HashMap<AccountId, Account>,
    last_id: u64,
}

/// In-memory identity provider
#[derive(Clone, Debug, Default)]
pub struct InMemoryAccountDirectory {
    table: Arc<RwLock<AccountTable>>,
}

impl InMemoryAccountDirectory {
    /// Create a new empty directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, AccountTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, AccountTable> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates an account with the next free id and no study link
    pub fn register(&self, email: &str) -> Account {
        let nickname = email.split('@').next().unwrap_or(email);
        self.register_named(email, nickname, nickname)
    }

    /// Creates an account with names and the next free id
    pub fn register_named(&self, email: &str, name: &str, nickname: &str) -> Account {
        let mut table = self.write();
        table.last_id += 1;
        let account =
            Account::new(AccountId::new(table.last_id), email).with_names(name, nickname);
        table.rows.insert(account.id, account.clone());
        account
    }

    /// Stores an account directly
    pub fn insert(&self, account: Account) {
        let mut table = self.write();
        table.last_id = table.last_id.max(account.id.value());
        table.rows.insert(account.id, account);
    }

    /// Stored copy of an account, if present
    #[must_use]
    pub fn get(&self, id: AccountId) -> Option<Account> {
        self.read().rows.get(&id).cloned()
    }

    /// Number of stored accounts
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().rows.len()
    }

    /// Check if the directory is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().rows.is_empty()
    }
}

impl AccountDirectory for InMemoryAccountDirectory {
    fn find_by_id(&self, id: AccountId) -> RepositoryFuture<'_, Account> {
        let result = self.get(id).ok_or_else(|| RepositoryError::NotFound {
            entity: EntityKind::Account,
            id: id.to_string(),
        });
        Box::pin(ready(result))
    }

    fn find_by_email<'a>(&'a self, email: &'a str) -> RepositoryFuture<'a, Account> {
        let found = self
            .read()
            .rows
            .values()
            .find(|account| account.email == email)
            .cloned();
        let result = found.ok_or_else(|| RepositoryError::NotFound {
            entity: EntityKind::Account,
            id: email.to_string(),
        });
        Box::pin(ready(result))
    }

    fn save(&self, account: Account) -> RepositoryFuture<'_, ()> {
        self.insert(account);
        Box::pin(ready(Ok(())))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bookclub_testing::fixtures::study;
    use bookclub_core::StudyTransition;

    #[tokio::test]
    async fn find_by_id_distinguishes_missing() {
        let repo = InMemoryStudyRepository::new();
        let err = repo.find_by_id(StudyId::new(4)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { entity: EntityKind::Study, .. }));

        assert!(repo.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn insert_keeps_ids_ahead() {
        let repo = InMemoryStudyRepository::new();
        repo.insert(study(7, "a", "b"));
        assert_eq!(repo.next_id().await.unwrap(), StudyId::new(8));
    }

    #[tokio::test]
    async fn state_and_name_queries() {
        let repo = InMemoryStudyRepository::new();
        let mut closed = study(1, "tokio deep dive", "Async Rust");
        closed.apply_transition(StudyTransition::OpenToClose);
        repo.insert(closed);
        repo.insert(study(2, "serde club", "Serde Internals"));

        let open = repo.find_by_state(StudyState::Open).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id(), StudyId::new(2));

        let named = repo.find_by_name_containing("tokio").await.unwrap();
        assert_eq!(named.len(), 1);

        let filter = StudyFilter::all().with_keyword("Rust");
        assert_eq!(repo.count(&filter).await.unwrap(), 1);
        assert_eq!(repo.count(&StudyFilter::all()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let repo = InMemoryStudyRepository::new();
        assert!(repo.delete(StudyId::new(1)).await.is_err());

        repo.insert(study(1, "a", "b"));
        repo.delete(StudyId::new(1)).await.unwrap();
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn accounts_resolve_by_email() {
        let directory = InMemoryAccountDirectory::new();
        let alice = directory.register("alice@example.com");
        assert_eq!(alice.nickname, "alice");

        let found = directory.find_by_email("alice@example.com").await.unwrap();
        assert_eq!(found.id, alice.id);

        let missing = directory.find_by_email("bob@example.com").await.unwrap_err();
        assert_eq!(missing.to_string(), "account bob@example.com not found");
    }
}
