//! Per-key mutual exclusion for studies and accounts.
//!
//! Every mutating operation runs under the lock of the study it touches
//! and, where an account link changes, the lock of that account. Keys that
//! are not contended share nothing, so different studies never wait on each
//! other.
//!
//! # Lock order
//!
//! 1. At most one study lock
//! 2. Account locks, in ascending id order
//!
//! Every caller in this crate acquires in that order, which rules out
//! lock-order deadlocks.

use bookclub_core::{AccountId, StudyId};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of async locks, one per key, created on demand.
///
/// Entries are removed once no guard or waiter references them, so the
/// registry only ever holds keys that are currently in use.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Copy + Eq + Hash> KeyedLocks<K> {
    /// Creates an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`
    pub async fn lock(&self, key: K) -> KeyGuard<'_, K> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(key).or_default())
        };

        let guard = slot.lock_owned().await;
        KeyGuard {
            registry: self,
            key,
            guard: Some(guard),
        }
    }

    /// Number of keys currently locked or awaited
    #[must_use]
    pub fn active(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn release(&self, key: K, guard: OwnedMutexGuard<()>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        drop(guard);

        // Only the registry's own reference left: nobody holds or awaits it.
        if slots.get(&key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            slots.remove(&key);
        }
    }
}

/// Exclusive access to one key; released on drop
#[derive(Debug)]
pub struct KeyGuard<'a, K: Copy + Eq + Hash> {
    registry: &'a KeyedLocks<K>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Copy + Eq + Hash> KeyGuard<'_, K> {
    /// Key this guard protects
    #[must_use]
    pub const fn key(&self) -> K {
        self.key
    }
}

impl<K: Copy + Eq + Hash> Drop for KeyGuard<'_, K> {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            self.registry.release(self.key, guard);
        }
    }
}

/// Lock registries shared by every service touching studies
#[derive(Debug, Default)]
pub struct StudyLocks {
    studies: KeyedLocks<StudyId>,
    accounts: KeyedLocks<AccountId>,
}

impl StudyLocks {
    /// Creates empty registries
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks one study
    pub async fn study(&self, id: StudyId) -> KeyGuard<'_, StudyId> {
        self.studies.lock(id).await
    }

    /// Locks one account
    pub async fn account(&self, id: AccountId) -> KeyGuard<'_, AccountId> {
        self.accounts.lock(id).await
    }

    /// Locks several accounts in ascending id order, skipping duplicates
    pub async fn accounts(
        &self,
        ids: impl IntoIterator<Item = AccountId>,
    ) -> Vec<KeyGuard<'_, AccountId>> {
        let mut ids: Vec<AccountId> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();

        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            guards.push(self.accounts.lock(id).await);
        }
        guards
    }

    /// Number of study keys currently locked or awaited
    #[must_use]
    pub fn active_studies(&self) -> usize {
        self.studies.active()
    }

    /// Number of account keys currently locked or awaited
    #[must_use]
    pub fn active_accounts(&self) -> usize {
        self.accounts.active()
    }
}
