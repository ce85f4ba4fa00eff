//! Fault-injecting collaborators.
//!
//! Wrap any repository or directory and make chosen calls fail with
//! [`RepositoryError::Backend`], to exercise failure isolation and
//! compensation paths.

use bookclub_core::repository::RepositoryFuture;
use bookclub_core::{
    Account, AccountDirectory, AccountId, Page, PageRequest, RepositoryError, Study,
    StudyFilter, StudyId, StudyRepository, StudyState,
};
use std::collections::HashSet;
use std::future::ready;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

fn injected(what: &str) -> RepositoryError {
    RepositoryError::Backend(format!("injected failure: {what}"))
}

/// Study repository that fails selected operations
#[derive(Clone)]
pub struct FaultyStudyRepository {
    inner: Arc<dyn StudyRepository>,
    failing_saves: Arc<RwLock<HashSet<StudyId>>>,
    failing_loads: Arc<RwLock<HashSet<StudyId>>>,
    failing_state_scans: Arc<RwLock<HashSet<StudyState>>>,
}

impl FaultyStudyRepository {
    /// Wraps `inner` with no faults armed
    #[must_use]
    pub fn new(inner: Arc<dyn StudyRepository>) -> Self {
        Self {
            inner,
            failing_saves: Arc::default(),
            failing_loads: Arc::default(),
            failing_state_scans: Arc::default(),
        }
    }

    /// Makes every save of study `id` fail
    pub fn fail_saves_of(&self, id: StudyId) {
        self.failing_saves
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
    }

    /// Makes every load of study `id` fail
    pub fn fail_loads_of(&self, id: StudyId) {
        self.failing_loads
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
    }

    /// Makes listing studies in `state` fail
    pub fn fail_scans_of(&self, state: StudyState) {
        self.failing_state_scans
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(state);
    }

    /// Disarms every fault
    pub fn heal(&self) {
        self.failing_saves
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.failing_loads
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.failing_state_scans
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn armed<T: Eq + std::hash::Hash>(set: &RwLock<HashSet<T>>, key: &T) -> bool {
        set.read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }
}

impl StudyRepository for FaultyStudyRepository {
    fn next_id(&self) -> RepositoryFuture<'_, StudyId> {
        self.inner.next_id()
    }

    fn find_by_id(&self, id: StudyId) -> RepositoryFuture<'_, Study> {
        if Self::armed(&self.failing_loads, &id) {
            return Box::pin(ready(Err(injected("load"))));
        }
        self.inner.find_by_id(id)
    }

    fn find_all(&self) -> RepositoryFuture<'_, Vec<Study>> {
        self.inner.find_all()
    }

    fn find_by_state(&self, state: StudyState) -> RepositoryFuture<'_, Vec<Study>> {
        if Self::armed(&self.failing_state_scans, &state) {
            return Box::pin(ready(Err(injected("scan"))));
        }
        self.inner.find_by_state(state)
    }

    fn find_by_name_containing<'a>(
        &'a self,
        fragment: &'a str,
    ) -> RepositoryFuture<'a, Vec<Study>> {
        self.inner.find_by_name_containing(fragment)
    }

    fn find_matching<'a>(&'a self, filter: &'a StudyFilter) -> RepositoryFuture<'a, Vec<Study>> {
        self.inner.find_matching(filter)
    }

    fn find_page<'a>(
        &'a self,
        filter: &'a StudyFilter,
        page: PageRequest,
    ) -> RepositoryFuture<'a, Page<Study>> {
        self.inner.find_page(filter, page)
    }

    fn count<'a>(&'a self, filter: &'a StudyFilter) -> RepositoryFuture<'a, usize> {
        self.inner.count(filter)
    }

    fn save(&self, study: Study) -> RepositoryFuture<'_, ()> {
        if Self::armed(&self.failing_saves, &study.id()) {
            return Box::pin(ready(Err(injected("save"))));
        }
        self.inner.save(study)
    }

    fn delete(&self, id: StudyId) -> RepositoryFuture<'_, ()> {
        self.inner.delete(id)
    }
}

/// Account directory that fails selected saves
#[derive(Clone)]
pub struct FaultyAccountDirectory {
    inner: Arc<dyn AccountDirectory>,
    failing_saves: Arc<RwLock<HashSet<AccountId>>>,
    fail_all_saves: Arc<AtomicBool>,
}

impl FaultyAccountDirectory {
    /// Wraps `inner` with no faults armed
    #[must_use]
    pub fn new(inner: Arc<dyn AccountDirectory>) -> Self {
        Self {
            inner,
            failing_saves: Arc::default(),
            fail_all_saves: Arc::default(),
        }
    }

    /// Makes every save of account `id` fail
    pub fn fail_saves_of(&self, id: AccountId) {
        self.failing_saves
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
    }

    /// Makes every save fail
    pub fn fail_all_saves(&self) {
        self.fail_all_saves.store(true, Ordering::SeqCst);
    }

    /// Disarms every fault
    pub fn heal(&self) {
        self.fail_all_saves.store(false, Ordering::SeqCst);
        self.failing_saves
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl AccountDirectory for FaultyAccountDirectory {
    fn find_by_id(&self, id: AccountId) -> RepositoryFuture<'_, Account> {
        self.inner.find_by_id(id)
    }

    fn find_by_email<'a>(&'a self, email: &'a str) -> RepositoryFuture<'a, Account> {
        self.inner.find_by_email(email)
    }

    fn save(&self, account: Account) -> RepositoryFuture<'_, ()> {
        let armed = self.fail_all_saves.load(Ordering::SeqCst)
            || self
                .failing_saves
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(&account.id);
        if armed {
            return Box::pin(ready(Err(injected("account save"))));
        }
        self.inner.save(account)
    }
}
