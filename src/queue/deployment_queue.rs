// ABOUTME: Per job type FIFO queues of build jobs, drained by polling build systems.
// ABOUTME: Capacity-constrained test job types hand out a bounded number of jobs per call.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::build_job::{BuildJob, BuildService, BuildServiceError, BuildState};
use crate::config::ControllerConfig;
use crate::store::Curator;
use crate::types::{JobType, TenantAndApplicationId};

#[derive(Debug)]
pub struct DeploymentQueue {
    curator: Arc<Curator>,
    test_capacity: usize,
}

impl DeploymentQueue {
    pub fn new(curator: Arc<Curator>, config: &ControllerConfig) -> Self {
        Self {
            curator,
            test_capacity: config.test_capacity,
        }
    }

    /// Queues the job unless it is already queued; `first` puts it at the front.
    pub fn add_job(&self, job: BuildJob, first: bool) {
        let job_type = job.job.job_type.clone();
        let lock = self.curator.lock_job_queues(&job_type);
        let mut queue = self.curator.read_job_queue(&job_type);
        if queue.contains(&job) {
            tracing::debug!("{} is already queued", job);
            return;
        }
        if first {
            queue.push_front(job);
        } else {
            queue.push_back(job);
        }
        self.curator.write_job_queue(&lock, queue);
    }

    /// Removes and returns the jobs to run now: all production jobs, and up to
    /// the test capacity of each test job type.
    pub fn take_jobs_to_run(&self) -> Vec<BuildJob> {
        let mut taken = Vec::new();
        for job_type in self.curator.queued_job_types() {
            let lock = self.curator.lock_job_queues(&job_type);
            let mut queue = self.curator.read_job_queue(&job_type);
            let count = if job_type.is_test() {
                self.test_capacity.min(queue.len())
            } else {
                queue.len()
            };
            taken.extend(queue.drain(..count));
            self.curator.write_job_queue(&lock, queue);
        }
        taken
    }

    pub fn remove_jobs(&self, application: &TenantAndApplicationId) {
        for job_type in self.curator.queued_job_types() {
            let lock = self.curator.lock_job_queues(&job_type);
            let mut queue = self.curator.read_job_queue(&job_type);
            queue.retain(|job| job.job.application.application() != *application);
            self.curator.write_job_queue(&lock, queue);
        }
    }

    pub fn jobs(&self, job_type: &JobType) -> Vec<BuildJob> {
        self.curator.read_job_queue(job_type).into_iter().collect()
    }
}

/// A build service for externally built applications, which poll the queue for work.
#[derive(Debug)]
pub struct PolledBuildService {
    queue: Arc<DeploymentQueue>,
    applications: Mutex<HashSet<TenantAndApplicationId>>,
}

impl PolledBuildService {
    pub fn new(queue: Arc<DeploymentQueue>) -> Self {
        Self {
            queue,
            applications: Mutex::new(HashSet::new()),
        }
    }

    /// Claims all jobs of the application for this service.
    pub fn with_application(self, application: TenantAndApplicationId) -> Self {
        self.applications.lock().insert(application);
        self
    }

    pub fn queue(&self) -> &DeploymentQueue {
        &self.queue
    }
}

#[async_trait]
impl BuildService for PolledBuildService {
    async fn trigger(&self, job: &BuildJob) -> Result<bool, BuildServiceError> {
        self.queue.add_job(job.clone(), false);
        Ok(true)
    }

    async fn state_of(&self, job: &BuildJob) -> Result<BuildState, BuildServiceError> {
        let queued = self.queue.jobs(&job.job.job_type).contains(job);
        Ok(if queued {
            BuildState::Running
        } else {
            BuildState::Idle
        })
    }

    fn builds(&self, job: &BuildJob) -> bool {
        self.applications
            .lock()
            .contains(&job.job.application.application())
    }
}
