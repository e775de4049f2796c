// ABOUTME: Decides which jobs to trigger, and keeps instance changes up to date.
// ABOUTME: The only component which starts jobs, internally or through external build services.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tracing::{debug, info, warn};

use super::application::{Application, Instance};
use super::change::Change;
use super::deployment_status::{DeploymentStatus, PendingJob, accept_new_application_version};
use super::error::TriggerError;
use super::run::{RunId, RunStatus};
use super::versions::Versions;
use crate::clock::Clock;
use crate::config::ControllerConfig;
use crate::execution::{JobController, ServiceMonitor};
use crate::queue::{BuildJob, BuildService, BuildState};
use crate::store::{ApplicationLock, Curator};
use crate::types::{ApplicationId, ApplicationVersion, JobId, JobType, TenantAndApplicationId};

/// A job which is ready to run now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub versions: Versions,
    pub available_since: DateTime<Utc>,
    /// A test job retried after running out of capacity.
    pub is_retry: bool,
    /// Rolls out a new revision without a platform upgrade.
    pub is_application_upgrade: bool,
}

impl Job {
    fn new(id: JobId, pending: &PendingJob, is_retry: bool) -> Self {
        Self {
            id,
            versions: pending.versions.clone(),
            available_since: pending.ready_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            is_retry,
            is_application_upgrade: pending.change.platform().is_none()
                && pending.change.revision().is_some(),
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.id, self.versions)
    }
}

/// Order of test jobs competing for capacity: retries after capacity
/// shortage, then application-only upgrades, then the longest waiting.
fn queue_order(a: &Job, b: &Job) -> Ordering {
    b.is_retry
        .cmp(&a.is_retry)
        .then(b.is_application_upgrade.cmp(&a.is_application_upgrade))
        .then(a.available_since.cmp(&b.available_since))
}

/// Which parts of an instance's change to cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangesToCancel {
    /// Platform, revision and pin.
    All,
    Platform,
    Application,
    Pin,
    /// Platform and revision, keeping any pin.
    Versions,
}

impl FromStr for ChangesToCancel {
    type Err = TriggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(ChangesToCancel::All),
            "platform" => Ok(ChangesToCancel::Platform),
            "application" => Ok(ChangesToCancel::Application),
            "pin" => Ok(ChangesToCancel::Pin),
            "versions" => Ok(ChangesToCancel::Versions),
            _ => Err(TriggerError::InvalidCancellation(s.to_string())),
        }
    }
}

/// A job waiting for its tests to complete before it is triggered again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetriggerEntry {
    pub job: JobId,
    pub versions: Versions,
    pub required: Vec<JobId>,
    pub queued_at: DateTime<Utc>,
}

pub struct DeploymentTrigger {
    controller: Arc<JobController>,
    monitor: Arc<dyn ServiceMonitor>,
    build_services: Vec<Arc<dyn BuildService>>,
    clock: Arc<dyn Clock>,
    config: ControllerConfig,
}

impl fmt::Debug for DeploymentTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentTrigger")
            .field("build_services", &self.build_services.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DeploymentTrigger {
    pub fn new(
        controller: Arc<JobController>,
        monitor: Arc<dyn ServiceMonitor>,
        clock: Arc<dyn Clock>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            controller,
            monitor,
            build_services: Vec::new(),
            clock,
            config,
        }
    }

    /// Adds an external build service, which takes the jobs it claims to build.
    pub fn with_build_service(mut self, service: Arc<dyn BuildService>) -> Self {
        self.build_services.push(service);
        self
    }

    fn curator(&self) -> &Curator {
        self.controller.curator()
    }

    fn require_application(
        &self,
        id: &TenantAndApplicationId,
    ) -> Result<Application, TriggerError> {
        self.curator()
            .read_application(id)
            .ok_or_else(|| TriggerError::UnknownApplication(id.clone()))
    }

    /// Records a new revision, and lets instances which are ready pick it up.
    /// Submissions for unknown applications are dropped.
    pub fn notify_of_submission(
        &self,
        id: &TenantAndApplicationId,
        version: ApplicationVersion,
        project_id: u64,
    ) {
        {
            let lock = self.curator().lock_application(id);
            let Some(application) = self.curator().read_application(id) else {
                warn!("ignoring submission of {} for unknown application {}", version, id);
                return;
            };
            info!("new revision {} of {}", version, id);
            let revisions = application.revisions().clone().with(version);
            let application = application
                .with_project_id(project_id)
                .with_revisions(revisions);
            self.curator().store_application(&lock, application);
        }
        self.trigger_new_revision(id);
    }

    /// Adds the outstanding revision to the change of each instance which is
    /// ready for it and accepts it.
    pub fn trigger_new_revision(&self, id: &TenantAndApplicationId) {
        let lock = self.curator().lock_application(id);
        let Some(application) = self.curator().read_application(id) else {
            return;
        };
        let Some(spec) = application.deployment_spec() else {
            return;
        };
        let names = spec.instance_names();
        let status = self.controller.deployment_status(&application);
        let now = self.clock.now();

        let mut updated = application.clone();
        for name in &names {
            let outstanding = status.outstanding_change(name);
            if !outstanding.has_targets() {
                continue;
            }
            let ready = status
                .instance_ready_at(name, &outstanding)
                .is_some_and(|at| at <= now);
            if ready && accept_new_application_version(&status, name) {
                debug!("{} of {} now rolls out {}", name, id, outstanding);
                updated = updated.with_instance(name, |instance| {
                    let change = outstanding.on_top_of(instance.change());
                    instance.with_change(change)
                });
            }
        }
        if updated != application {
            self.curator().store_application(&lock, updated);
        }
    }

    /// Picks up outstanding revisions for all applications.
    pub fn deploy_outstanding_changes(&self) {
        for application in self.curator().applications() {
            self.trigger_new_revision(application.id());
        }
    }

    /// Shrinks instance changes to what remains after a job completed.
    pub fn notify_of_completion(&self, id: &TenantAndApplicationId) {
        self.controller.notify_of_completion(id);
    }

    /// Ends a run handed to an external build service, with the outcome it reported.
    pub fn report_build(&self, run: &RunId, status: RunStatus) -> Result<(), TriggerError> {
        self.controller.report_external(run, status)?;
        Ok(())
    }

    /// All jobs which may run now, across all applications. Running jobs on
    /// versions no longer wanted are aborted, and their new runs wait for them.
    pub async fn compute_ready_jobs(&self) -> Vec<Job> {
        let now = self.clock.now();
        let mut ready = Vec::new();
        for application in self.curator().applications() {
            if application.project_id().is_none() || application.deployment_spec().is_none() {
                continue;
            }
            let status = self.controller.deployment_status(&application);
            for (job, pending) in status.jobs_to_run().iter() {
                let Some(candidate) = pending
                    .iter()
                    .find(|p| p.ready_at.is_some_and(|at| at <= now))
                else {
                    continue;
                };
                if job.job_type.is_production()
                    && self.is_unhealthy_in_another_zone(&status, job).await
                {
                    debug!("withholding {} while another zone is unhealthy", job);
                    continue;
                }
                if self.abort_if_running(&status, job, pending) {
                    continue;
                }
                let is_retry = status.job(job).is_some_and(|s| s.is_out_of_capacity());
                ready.push(Job::new(job.clone(), candidate, is_retry));
            }
        }
        ready
    }

    async fn is_unhealthy_in_another_zone(&self, status: &DeploymentStatus, job: &JobId) -> bool {
        let Some(instance) = status.application().instance(&job.application.instance) else {
            return false;
        };
        let own_zone = job.job_type.production_zone();
        for deployment in instance.production_deployments() {
            if Some(&deployment.zone) == own_zone.as_ref() {
                continue;
            }
            if !self.monitor.is_healthy(&job.application, &deployment.zone).await {
                return true;
            }
        }
        false
    }

    /// Whether the job is running; a run on versions none of the candidates
    /// want any more is aborted.
    fn abort_if_running(&self, status: &DeploymentStatus, job: &JobId, pending: &[PendingJob]) -> bool {
        let Some(last) = status
            .job(job)
            .filter(|s| s.is_running())
            .and_then(|s| s.last_triggered())
        else {
            return false;
        };
        let wanted = pending.iter().any(|p| {
            p.versions.targets_match(last.versions())
                && p.versions.sources_match_if_present(last.versions())
        });
        if !wanted {
            info!("aborting outdated {} on {}", last.id(), last.versions());
            if let Err(e) = self.controller.abort(last.id()) {
                warn!("failed aborting {}: {}", last.id(), e);
            }
        }
        true
    }

    /// Triggers ready jobs: the first in line of each test job type, and all
    /// ready production jobs. Returns the number of jobs triggered.
    pub async fn trigger_ready_jobs(&self) -> usize {
        let ready = self.compute_ready_jobs().await;
        let (test, production): (Vec<Job>, Vec<Job>) =
            ready.into_iter().partition(|job| job.id.job_type.is_test());

        let mut test_groups: BTreeMap<JobType, Vec<Job>> = BTreeMap::new();
        for job in test {
            test_groups.entry(job.id.job_type.clone()).or_default().push(job);
        }
        let mut production_groups: BTreeMap<TenantAndApplicationId, Vec<Job>> = BTreeMap::new();
        for job in production {
            production_groups
                .entry(job.id.application.application())
                .or_default()
                .push(job);
        }

        let mut groups: Vec<Vec<Job>> = Vec::new();
        for (_, mut jobs) in test_groups {
            jobs.sort_by(queue_order);
            jobs.truncate(1);
            groups.push(jobs);
        }
        groups.extend(production_groups.into_values());

        futures::stream::iter(groups)
            .map(|group| async move {
                let mut triggered = 0;
                for job in group {
                    match self.trigger(&job, "available change in component").await {
                        Ok(()) => triggered += 1,
                        Err(e) => warn!("failed triggering {}: {}", job, e),
                    }
                }
                triggered
            })
            .buffer_unordered(self.config.trigger_workers)
            .fold(0, |total, triggered| async move { total + triggered })
            .await
    }

    /// Triggers the job, and lifts any pause on it.
    pub async fn trigger(&self, job: &Job, reason: &str) -> Result<(), TriggerError> {
        let application_id = job.id.application.application();
        let application = self.require_application(&application_id)?;
        let external = application.project_id().and_then(|project_id| {
            let build_job = BuildJob::new(job.id.clone(), project_id);
            self.build_services
                .iter()
                .find(|service| service.builds(&build_job))
                .map(|service| (Arc::clone(service), build_job))
        });

        match external {
            Some((service, build_job)) => {
                if !self.dispatch(service.as_ref(), &build_job).await {
                    return Err(TriggerError::NotAccepted(job.id.clone()));
                }
                let lock = self.curator().lock_application(&application_id);
                self.controller
                    .start_external(&lock, &job.id, job.versions.clone(), reason)?;
                self.clear_pause(&lock, &job.id);
            }
            None => {
                let lock = self.curator().lock_application(&application_id);
                self.controller
                    .start(&lock, &job.id, job.versions.clone(), reason)?;
                self.clear_pause(&lock, &job.id);
            }
        }
        info!("triggered {}: {}", job, reason);
        Ok(())
    }

    /// Hands the job to an external build service, retrying a bounded number of times.
    async fn dispatch(&self, service: &dyn BuildService, job: &BuildJob) -> bool {
        if matches!(service.state_of(job).await, Ok(BuildState::Running)) {
            debug!("{} is already running", job);
            return true;
        }
        for attempt in 1..=self.config.trigger_attempts {
            match service.trigger(job).await {
                Ok(true) => return true,
                Ok(false) => debug!("attempt {} at triggering {} was declined", attempt, job),
                Err(e) => debug!("attempt {} at triggering {} failed: {}", attempt, job, e),
            }
        }
        warn!(
            "giving up triggering {} after {} attempts",
            job, self.config.trigger_attempts
        );
        false
    }

    fn clear_pause(&self, lock: &ApplicationLock, job: &JobId) {
        let Some(application) = self.curator().read_application(lock.id()) else {
            return;
        };
        let paused = application
            .instance(&job.application.instance)
            .is_some_and(|i| i.job_pause(&job.job_type).is_some());
        if paused {
            let application = application.with_instance(&job.application.instance, |i| {
                i.with_job_pause(job.job_type.clone(), None)
            });
            self.curator().store_application(lock, application);
        }
    }

    /// Triggers the job again on the versions of its last run.
    pub async fn re_trigger(&self, job: &JobId, reason: &str) -> Result<Job, TriggerError> {
        self.require_application(&job.application.application())?;
        let last = self
            .controller
            .last_run(job)
            .ok_or_else(|| TriggerError::NeverTriggered(job.clone()))?;
        let job = Job {
            id: job.clone(),
            versions: last.versions().clone(),
            available_since: self.clock.now(),
            is_retry: false,
            is_application_upgrade: false,
        };
        self.trigger(&job, reason).await?;
        Ok(job)
    }

    /// Triggers the job on the versions of its instance's current change,
    /// regardless of readiness. With `require_tests`, missing test runs for a
    /// production job are triggered first, and the job follows once they succeed.
    pub async fn force_trigger(
        &self,
        job: &JobId,
        reason: &str,
        require_tests: bool,
    ) -> Result<Vec<JobId>, TriggerError> {
        let application = self.require_application(&job.application.application())?;
        if application.deployment_spec().is_none() {
            return Err(TriggerError::NoDeploymentSpec(application.id().clone()));
        }
        let instance = application.require_instance(&job.application.instance)?;
        let status = self.controller.deployment_status(&application);
        if job.job_type.is_production() && !status.is_declared(job) {
            return Err(TriggerError::UndeclaredJob(job.clone()));
        }
        let change = instance.change().clone();
        let versions = Versions::from(
            &change,
            &application,
            status.deployment_for(job),
            self.config.system_version,
        );
        let now = self.clock.now();

        if job.job_type.is_production() && require_tests {
            let tests = status.test_jobs_for(job, &versions, &change);
            if !tests.is_empty() {
                let mut triggered = Vec::new();
                for (test, pending) in tests.iter() {
                    let Some(first) = pending.first() else {
                        continue;
                    };
                    self.trigger(&Job::new(test.clone(), first, false), reason)
                        .await?;
                    triggered.push(test.clone());
                }
                let lock = self.curator().lock_retrigger_queue();
                let mut queue = self.curator().read_retrigger_queue();
                queue.retain(|entry| entry.job != *job);
                queue.push(RetriggerEntry {
                    job: job.clone(),
                    versions,
                    required: triggered.clone(),
                    queued_at: now,
                });
                self.curator().write_retrigger_queue(&lock, queue);
                return Ok(triggered);
            }
        }

        let forced = Job {
            id: job.clone(),
            versions,
            available_since: now,
            is_retry: false,
            is_application_upgrade: false,
        };
        self.trigger(&forced, reason).await?;
        Ok(vec![job.clone()])
    }

    /// Triggers queued jobs whose tests have completed; entries whose tests failed are dropped.
    /// Returns the number of jobs triggered.
    pub async fn trigger_queued_retriggers(&self) -> usize {
        let due = {
            let lock = self.curator().lock_retrigger_queue();
            let (done, waiting): (Vec<RetriggerEntry>, Vec<RetriggerEntry>) = self
                .curator()
                .read_retrigger_queue()
                .into_iter()
                .partition(|entry| self.tests_completed(entry));
            self.curator().write_retrigger_queue(&lock, waiting);
            done
        };

        let mut triggered = 0;
        for entry in due {
            if !self.tests_succeeded(&entry) {
                warn!("not re-triggering {}, as its tests failed", entry.job);
                continue;
            }
            let job = Job {
                id: entry.job.clone(),
                versions: entry.versions.clone(),
                available_since: entry.queued_at,
                is_retry: false,
                is_application_upgrade: false,
            };
            match self.trigger(&job, "required tests completed").await {
                Ok(()) => triggered += 1,
                Err(e) => warn!("failed re-triggering {}: {}", entry.job, e),
            }
        }
        triggered
    }

    fn tests_completed(&self, entry: &RetriggerEntry) -> bool {
        entry.required.iter().all(|test| {
            self.controller
                .last_run(test)
                .is_some_and(|run| run.start() >= entry.queued_at && run.has_ended())
        })
    }

    fn tests_succeeded(&self, entry: &RetriggerEntry) -> bool {
        entry.required.iter().all(|test| {
            self.controller
                .last_run(test)
                .is_some_and(|run| run.has_succeeded())
        })
    }

    /// Pauses the job until the given instant, at most the configured maximum ahead.
    pub fn pause_job(&self, job: &JobId, until: DateTime<Utc>) -> Result<(), TriggerError> {
        let max_pause = self.config.max_pause;
        let limit = chrono::Duration::from_std(max_pause)
            .ok()
            .and_then(|max| self.clock.now().checked_add_signed(max));
        if limit.is_some_and(|limit| until > limit) {
            return Err(TriggerError::PauseTooLong(max_pause));
        }
        self.with_instance(&job.application, |instance| {
            Ok(instance.with_job_pause(job.job_type.clone(), Some(until)))
        })
    }

    pub fn resume_job(&self, job: &JobId) -> Result<(), TriggerError> {
        self.with_instance(&job.application, |instance| {
            Ok(instance.with_job_pause(job.job_type.clone(), None))
        })
    }

    /// Removes the chosen parts of the instance's change.
    pub fn cancel_change(&self, instance: &ApplicationId, which: ChangesToCancel) -> Result<(), TriggerError> {
        self.with_instance(instance, |current| {
            let change = current.change().clone();
            let change = match which {
                ChangesToCancel::All => Change::empty(),
                ChangesToCancel::Platform => change.without_platform(),
                ChangesToCancel::Application => change.without_revision(),
                ChangesToCancel::Pin => change.without_pin(),
                ChangesToCancel::Versions => change.without_platform().without_revision(),
            };
            info!("changed {} to {} after cancelling {:?}", instance, change, which);
            Ok(current.with_change(change))
        })
    }

    /// Makes the instance roll out the given change, on top of what it already rolls out.
    /// A pinned instance refuses new platform targets.
    pub fn trigger_change(&self, instance: &ApplicationId, change: Change) -> Result<(), TriggerError> {
        self.with_instance(instance, |current| {
            let existing = current.change();
            if existing.is_pinned()
                && let Some(platform) = change.platform()
                && existing.platform() != Some(platform)
            {
                return Err(TriggerError::Pinned(*platform));
            }
            let change = change.on_top_of(existing);
            info!("{} now rolls out {}", instance, change);
            Ok(current.with_change(change))
        })
    }

    fn with_instance(
        &self,
        id: &ApplicationId,
        f: impl FnOnce(Instance) -> Result<Instance, TriggerError>,
    ) -> Result<(), TriggerError> {
        let application_id = id.application();
        let lock = self.curator().lock_application(&application_id);
        let application = self.require_application(&application_id)?;
        let instance = application.require_instance(&id.instance)?.clone();
        let updated = f(instance)?;
        let application = application.with_instance(&id.instance, |_| updated);
        self.curator().store_application(&lock, application);
        Ok(())
    }
}
