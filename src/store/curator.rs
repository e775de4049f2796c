// ABOUTME: In-memory store of applications, runs and job queues.
// ABOUTME: Writes to applications and queues require the matching scoped lock.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use super::lock::{ApplicationLock, LockTable, QueueLock, RetriggerLock};
use crate::deployment::{Application, RetriggerEntry, Run, RunId};
use crate::queue::BuildJob;
use crate::types::{JobId, JobType, TenantAndApplicationId};

#[derive(Debug, Default)]
pub struct Curator {
    applications: Mutex<BTreeMap<TenantAndApplicationId, Application>>,
    runs: Mutex<BTreeMap<JobId, BTreeMap<u64, Run>>>,
    job_queues: Mutex<BTreeMap<JobType, VecDeque<BuildJob>>>,
    retrigger_queue: Mutex<Vec<RetriggerEntry>>,
    application_locks: LockTable<TenantAndApplicationId>,
    queue_locks: LockTable<JobType>,
    retrigger_lock: Arc<Mutex<()>>,
}

impl Curator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until the application's lock is free.
    pub fn lock_application(&self, id: &TenantAndApplicationId) -> ApplicationLock {
        ApplicationLock::new(id.clone(), self.application_locks.acquire(id))
    }

    /// The application's lock, unless someone else holds it.
    pub fn try_lock_application(&self, id: &TenantAndApplicationId) -> Option<ApplicationLock> {
        self.application_locks
            .try_acquire(id)
            .map(|guard| ApplicationLock::new(id.clone(), guard))
    }

    pub fn read_application(&self, id: &TenantAndApplicationId) -> Option<Application> {
        self.applications.lock().get(id).cloned()
    }

    pub fn applications(&self) -> Vec<Application> {
        self.applications.lock().values().cloned().collect()
    }

    pub fn store_application(&self, lock: &ApplicationLock, application: Application) {
        assert_eq!(
            lock.id(),
            application.id(),
            "storing {} under the lock of another application",
            application.id()
        );
        self.applications
            .lock()
            .insert(application.id().clone(), application);
    }

    pub fn remove_application(&self, lock: &ApplicationLock) -> Option<Application> {
        self.runs
            .lock()
            .retain(|job, _| job.application.application() != *lock.id());
        self.applications.lock().remove(lock.id())
    }

    pub fn lock_job_queues(&self, job_type: &JobType) -> QueueLock {
        QueueLock::new(job_type.clone(), self.queue_locks.acquire(job_type))
    }

    pub fn read_job_queue(&self, job_type: &JobType) -> VecDeque<BuildJob> {
        self.job_queues
            .lock()
            .get(job_type)
            .cloned()
            .unwrap_or_default()
    }

    /// Job types with a non-empty queue.
    pub fn queued_job_types(&self) -> Vec<JobType> {
        self.job_queues
            .lock()
            .iter()
            .filter(|(_, queue)| !queue.is_empty())
            .map(|(job_type, _)| job_type.clone())
            .collect()
    }

    pub fn write_job_queue(&self, lock: &QueueLock, queue: VecDeque<BuildJob>) {
        self.job_queues
            .lock()
            .insert(lock.job_type().clone(), queue);
    }

    pub fn lock_retrigger_queue(&self) -> RetriggerLock {
        RetriggerLock::new(self.retrigger_lock.lock_arc())
    }

    pub fn read_retrigger_queue(&self) -> Vec<RetriggerEntry> {
        self.retrigger_queue.lock().clone()
    }

    pub fn write_retrigger_queue(&self, _lock: &RetriggerLock, entries: Vec<RetriggerEntry>) {
        *self.retrigger_queue.lock() = entries;
    }

    pub fn write_run(&self, run: Run) {
        self.runs
            .lock()
            .entry(run.id().job.clone())
            .or_default()
            .insert(run.id().number, run);
    }

    pub fn read_run(&self, id: &RunId) -> Option<Run> {
        self.runs.lock().get(&id.job)?.get(&id.number).cloned()
    }

    /// All runs of a job, oldest first.
    pub fn runs(&self, job: &JobId) -> Vec<Run> {
        self.runs
            .lock()
            .get(job)
            .map(|runs| runs.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn last_run(&self, job: &JobId) -> Option<Run> {
        self.runs
            .lock()
            .get(job)?
            .values()
            .next_back()
            .cloned()
    }

    /// Jobs of the application which have any runs.
    pub fn jobs(&self, application: &TenantAndApplicationId) -> Vec<JobId> {
        self.runs
            .lock()
            .keys()
            .filter(|job| job.application.application() == *application)
            .cloned()
            .collect()
    }

    /// Runs which haven't ended, across all applications.
    pub fn active_runs(&self) -> Vec<Run> {
        self.runs
            .lock()
            .values()
            .filter_map(|runs| runs.values().next_back())
            .filter(|run| !run.has_ended())
            .cloned()
            .collect()
    }
}
