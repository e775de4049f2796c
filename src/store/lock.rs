// ABOUTME: Scoped locks over the store: one per application, one per job queue type.
// ABOUTME: Guards release their lock when dropped, on every exit path.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};

use crate::types::{JobType, TenantAndApplicationId};

/// Named exclusive locks, created on first use and kept for reuse.
#[derive(Debug)]
pub(super) struct LockTable<K> {
    locks: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K> Default for LockTable<K> {
    fn default() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> LockTable<K> {
    pub(super) fn acquire(&self, key: &K) -> ArcMutexGuard<RawMutex, ()> {
        let lock = self.locks.lock().entry(key.clone()).or_default().clone();
        lock.lock_arc()
    }

    pub(super) fn try_acquire(&self, key: &K) -> Option<ArcMutexGuard<RawMutex, ()>> {
        let lock = self.locks.lock().entry(key.clone()).or_default().clone();
        lock.try_lock_arc()
    }
}

/// Held lock on one application; required to store changes to it.
pub struct ApplicationLock {
    id: TenantAndApplicationId,
    _guard: ArcMutexGuard<RawMutex, ()>,
}

impl std::fmt::Debug for ApplicationLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationLock")
            .field("id", &self.id)
            .finish()
    }
}

impl ApplicationLock {
    pub(super) fn new(id: TenantAndApplicationId, guard: ArcMutexGuard<RawMutex, ()>) -> Self {
        Self { id, _guard: guard }
    }

    pub fn id(&self) -> &TenantAndApplicationId {
        &self.id
    }
}

/// Held lock on the queue of one job type.
pub struct QueueLock {
    job_type: JobType,
    _guard: ArcMutexGuard<RawMutex, ()>,
}

impl std::fmt::Debug for QueueLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueLock")
            .field("job_type", &self.job_type)
            .finish()
    }
}

impl QueueLock {
    pub(super) fn new(job_type: JobType, guard: ArcMutexGuard<RawMutex, ()>) -> Self {
        Self {
            job_type,
            _guard: guard,
        }
    }

    pub fn job_type(&self) -> &JobType {
        &self.job_type
    }
}

/// Held lock on the queue of jobs waiting for their tests before being re-triggered.
pub struct RetriggerLock {
    _guard: ArcMutexGuard<RawMutex, ()>,
}

impl std::fmt::Debug for RetriggerLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetriggerLock").finish_non_exhaustive()
    }
}

impl RetriggerLock {
    pub(super) fn new(guard: ArcMutexGuard<RawMutex, ()>) -> Self {
        Self { _guard: guard }
    }
}
