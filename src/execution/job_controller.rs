// ABOUTME: Starts, advances and aborts runs, and keeps their history in the store.
// ABOUTME: Finished runs shrink the owning instance's change to what remains.

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::error::ExecutionError;
use super::step_runner::{StepOutcome, StepRunner};
use crate::clock::Clock;
use crate::config::ControllerConfig;
use crate::deployment::{
    Application, Deployment, DeploymentStatus, JobProfile, JobStatus, Run, RunId, RunStatus,
    Step, Versions, remaining_change,
};
use crate::store::{ApplicationLock, Curator};
use crate::types::{InstanceName, JobId, TenantAndApplicationId};

pub struct JobController {
    curator: Arc<Curator>,
    runner: Arc<dyn StepRunner>,
    clock: Arc<dyn Clock>,
    config: ControllerConfig,
    advancing: Mutex<HashSet<RunId>>,
}

impl std::fmt::Debug for JobController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobController")
            .field("advancing", &self.advancing.lock().len())
            .finish_non_exhaustive()
    }
}

/// Marks a run as being advanced; at most one claim per run exists at a time.
struct RunClaim<'a> {
    id: RunId,
    advancing: &'a Mutex<HashSet<RunId>>,
}

impl Drop for RunClaim<'_> {
    fn drop(&mut self) {
        self.advancing.lock().remove(&self.id);
    }
}

impl JobController {
    pub fn new(
        curator: Arc<Curator>,
        runner: Arc<dyn StepRunner>,
        clock: Arc<dyn Clock>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            curator,
            runner,
            clock,
            config,
            advancing: Mutex::new(HashSet::new()),
        }
    }

    pub fn curator(&self) -> &Arc<Curator> {
        &self.curator
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Starts a new run of the job on the given versions.
    pub fn start(
        &self,
        lock: &ApplicationLock,
        job: &JobId,
        versions: Versions,
        reason: &str,
    ) -> Result<RunId, ExecutionError> {
        self.start_run(lock, job, versions, reason, false)
    }

    /// Records a run of the job handed to an external build service. The run
    /// isn't advanced here, and ends when the service reports its outcome.
    pub fn start_external(
        &self,
        lock: &ApplicationLock,
        job: &JobId,
        versions: Versions,
        reason: &str,
    ) -> Result<RunId, ExecutionError> {
        self.start_run(lock, job, versions, reason, true)
    }

    fn start_run(
        &self,
        lock: &ApplicationLock,
        job: &JobId,
        versions: Versions,
        reason: &str,
        external: bool,
    ) -> Result<RunId, ExecutionError> {
        assert_eq!(
            *lock.id(),
            job.application.application(),
            "starting {} under the lock of another application",
            job
        );
        if JobProfile::of(&job.job_type).is_none() {
            return Err(ExecutionError::NotAutomatable(job.clone()));
        }
        let last = self.curator.last_run(job);
        if last.as_ref().is_some_and(|run| !run.has_ended()) {
            return Err(ExecutionError::AlreadyRunning(job.clone()));
        }

        let id = RunId::new(job.clone(), last.map_or(1, |run| run.id().number + 1));
        info!("starting {} on {}: {}", id, versions, reason);
        let run = Run::initial(id.clone(), versions, self.clock.now());
        self.curator
            .write_run(if external { run.external() } else { run });
        Ok(id)
    }

    /// Ends an externally built run with the outcome its build service reported.
    /// Reporting on an ended run does nothing.
    pub fn report_external(&self, id: &RunId, status: RunStatus) -> Result<Run, ExecutionError> {
        let application_id = id.job.application.application();
        let run = {
            let lock = self.curator.lock_application(&application_id);
            let run = self
                .curator
                .read_run(id)
                .ok_or_else(|| ExecutionError::UnknownRun(id.clone()))?;
            if !run.is_external() {
                return Err(ExecutionError::NotExternal(id.clone()));
            }
            if run.has_ended() {
                return Ok(run);
            }
            let run = match status {
                RunStatus::Running | RunStatus::Success => run,
                failure => run.with_failure(failure),
            }
            .finished(self.clock.now());
            if run.has_succeeded() {
                self.record_deployment(&lock, &run);
            }
            self.curator.write_run(run.clone());
            run
        };
        info!("{} ended: {}", id, run.status());
        self.notify_of_completion(&application_id);
        Ok(run)
    }

    /// Marks the run as aborted; only its always-run steps are run after this.
    /// Externally built runs end at once. Aborting an aborted or ended run does nothing.
    pub fn abort(&self, id: &RunId) -> Result<(), ExecutionError> {
        let _lock = self
            .curator
            .lock_application(&id.job.application.application());
        let run = self
            .curator
            .read_run(id)
            .ok_or_else(|| ExecutionError::UnknownRun(id.clone()))?;
        if run.has_ended() || run.is_aborted() {
            return Ok(());
        }
        info!("aborting {}", id);
        let run = if run.is_external() {
            run.aborted().finished(self.clock.now())
        } else {
            run.aborted()
        };
        self.curator.write_run(run);
        Ok(())
    }

    pub fn run(&self, id: &RunId) -> Option<Run> {
        self.curator.read_run(id)
    }

    /// All runs of the job, oldest first.
    pub fn runs(&self, job: &JobId) -> Vec<Run> {
        self.curator.runs(job)
    }

    pub fn last_run(&self, job: &JobId) -> Option<Run> {
        self.curator.last_run(job)
    }

    pub fn active(&self) -> Vec<Run> {
        self.curator.active_runs()
    }

    pub fn job_status(&self, job: &JobId) -> JobStatus {
        JobStatus::new(job.clone(), self.curator.runs(job))
    }

    pub fn deployment_status(&self, application: &Application) -> DeploymentStatus {
        let jobs = self
            .curator
            .jobs(application.id())
            .into_iter()
            .map(|job| self.job_status(&job));
        DeploymentStatus::new(
            application.clone(),
            jobs,
            self.config.system_version,
            self.clock.now(),
        )
    }

    /// Runs ready steps until none make progress, and finishes the run once
    /// no steps are left. Returns the run as it is afterwards, or `None` if
    /// it is unknown or already being advanced elsewhere.
    pub async fn advance(&self, id: &RunId) -> Option<Run> {
        let Some(_claim) = self.claim(id) else {
            debug!("{} is already being advanced", id);
            return None;
        };
        loop {
            let run = self.curator.read_run(id)?;
            if run.has_ended() || run.is_external() {
                return Some(run);
            }
            let ready = run.ready_steps();
            if ready.is_empty() {
                return self.finish(id);
            }
            let run = self.mark_ready(id, &ready)?;

            let mut progressed = false;
            for step in ready {
                let outcome = self.runner.run(step, &run).await;
                if outcome != StepOutcome::Unfinished {
                    self.record(id, step, outcome);
                    progressed = true;
                }
            }
            if !progressed {
                return self.curator.read_run(id);
            }
        }
    }

    /// Advances all active runs, a bounded number at a time. Returns the number of runs which ended.
    pub async fn advance_all(&self) -> usize {
        let active = self
            .curator
            .active_runs()
            .into_iter()
            .filter(|run| !run.is_external());
        futures::stream::iter(active)
            .map(|run| async move { self.advance(run.id()).await })
            .buffer_unordered(self.config.trigger_workers)
            .filter(|run| futures::future::ready(run.as_ref().is_some_and(Run::has_ended)))
            .count()
            .await
    }

    fn claim(&self, id: &RunId) -> Option<RunClaim<'_>> {
        self.advancing.lock().insert(id.clone()).then(|| RunClaim {
            id: id.clone(),
            advancing: &self.advancing,
        })
    }

    fn mark_ready(&self, id: &RunId, ready: &[Step]) -> Option<Run> {
        let _lock = self
            .curator
            .lock_application(&id.job.application.application());
        let run = self.curator.read_run(id)?;
        if run.has_ended() {
            return Some(run);
        }
        let run = run.with_ready(ready, self.clock.now());
        self.curator.write_run(run.clone());
        Some(run)
    }

    fn record(&self, id: &RunId, step: Step, outcome: StepOutcome) {
        let status = match outcome {
            StepOutcome::Unfinished => return,
            StepOutcome::Succeeded => RunStatus::Running,
            StepOutcome::Failed(status) => status,
        };
        let application_id = id.job.application.application();
        let lock = self.curator.lock_application(&application_id);
        let Some(run) = self.curator.read_run(id) else {
            return;
        };
        if run.has_ended() {
            return;
        }
        debug!("{} of {}: {:?}", step, id, outcome);
        let run = run.with(status, step);
        if step == Step::DeployReal && outcome == StepOutcome::Succeeded {
            self.record_deployment(&lock, &run);
        }
        self.curator.write_run(run);
    }

    /// Records the run's target versions as deployed, for production jobs.
    fn record_deployment(&self, lock: &ApplicationLock, run: &Run) {
        let job = &run.id().job;
        let Some(zone) = job.job_type.production_zone() else {
            return;
        };
        let Some(application) = self.curator.read_application(lock.id()) else {
            return;
        };
        let deployment = Deployment::new(
            zone,
            run.versions().target_revision().clone(),
            *run.versions().target_platform(),
            self.clock.now(),
        );
        let application =
            application.with_instance(&job.application.instance, |i| i.with_deployment(deployment));
        self.curator.store_application(lock, application);
    }

    fn finish(&self, id: &RunId) -> Option<Run> {
        let run = {
            let _lock = self
                .curator
                .lock_application(&id.job.application.application());
            let run = self.curator.read_run(id)?;
            if run.has_ended() {
                return Some(run);
            }
            let run = run.finished(self.clock.now());
            self.curator.write_run(run.clone());
            run
        };
        info!("{} ended: {}", id, run.status());
        self.notify_of_completion(&id.job.application.application());
        Some(run)
    }

    /// Shrinks the change of each instance of the application to what remains to roll out.
    pub fn notify_of_completion(&self, id: &TenantAndApplicationId) {
        let lock = self.curator.lock_application(id);
        let Some(application) = self.curator.read_application(id) else {
            warn!("ignoring completion of a job of unknown application {}", id);
            return;
        };
        let status = self.deployment_status(&application);
        let names: Vec<InstanceName> = application.instances().map(|i| i.name().clone()).collect();
        let application = names.iter().fold(application, |application, name| {
            let remaining = remaining_change(&status, name);
            application.with_instance(name, |i| i.with_change(remaining))
        });
        self.curator.store_application(&lock, application);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{DeploymentSpec, DeploymentStep};
    use crate::deployment::{Change, RevisionHistory};
    use crate::types::{ApplicationId, ApplicationVersion, JobType, Version};
    use async_trait::async_trait;

    /// Succeeds every step, except one which fails with the given status.
    struct ScriptedRunner {
        failing: Option<(Step, RunStatus)>,
        ran: Mutex<Vec<Step>>,
    }

    #[async_trait]
    impl StepRunner for ScriptedRunner {
        async fn run(&self, step: Step, _run: &Run) -> StepOutcome {
            self.ran.lock().push(step);
            match self.failing {
                Some((failing, status)) if failing == step => StepOutcome::Failed(status),
                _ => StepOutcome::Succeeded,
            }
        }
    }

    fn app_id() -> TenantAndApplicationId {
        TenantAndApplicationId::from_names("tenant", "app")
    }

    fn job(job_type: JobType) -> JobId {
        JobId::new(ApplicationId::from_names("tenant", "app", "default"), job_type)
    }

    fn versions() -> Versions {
        Versions::new(Version::new(8, 0, 0), ApplicationVersion::from_build(1), None)
    }

    fn controller(failing: Option<(Step, RunStatus)>) -> (JobController, Arc<ScriptedRunner>) {
        let curator = Arc::new(Curator::new());
        let revision = ApplicationVersion::from_build(1);
        let application = Application::new(app_id())
            .with_deployment_spec(DeploymentSpec::single(vec![DeploymentStep::prod("us-east-1")]))
            .with_project_id(1)
            .with_revisions(RevisionHistory::empty().with(revision.clone()))
            .with_instance(&InstanceName::default_instance(), |i| {
                i.with_change(Change::of_revision(revision))
            });
        {
            let lock = curator.lock_application(&app_id());
            curator.store_application(&lock, application);
        }
        let runner = Arc::new(ScriptedRunner {
            failing,
            ran: Mutex::new(Vec::new()),
        });
        let clock = Arc::new(ManualClock::at("2024-03-04T12:00:00Z").unwrap());
        let controller = JobController::new(curator, runner.clone(), clock, ControllerConfig::default());
        (controller, runner)
    }

    fn start(controller: &JobController, job: &JobId) -> Result<RunId, ExecutionError> {
        let lock = controller.curator().lock_application(&app_id());
        controller.start(&lock, job, versions(), "test")
    }

    #[tokio::test]
    async fn successful_run_records_deployment() {
        let (controller, _) = controller(None);
        let east = job(JobType::production("us-east-1"));
        let id = start(&controller, &east).unwrap();
        assert!(matches!(start(&controller, &east), Err(ExecutionError::AlreadyRunning(_))));

        let run = controller.advance(&id).await.unwrap();
        assert!(run.has_succeeded());
        assert!(controller.active().is_empty());

        let application = controller.curator().read_application(&app_id()).unwrap();
        let instance = application.instance(&InstanceName::default_instance()).unwrap();
        assert_eq!(instance.deployments().len(), 1);

        let next = start(&controller, &east).unwrap();
        assert_eq!(next.number, 2);
    }

    #[tokio::test]
    async fn failed_run_still_tears_down() {
        let (controller, runner) = controller(Some((Step::InstallReal, RunStatus::InstallationFailed)));
        let id = start(&controller, &job(JobType::SystemTest)).unwrap();

        let run = controller.advance(&id).await.unwrap();
        assert!(run.has_ended());
        assert_eq!(run.status(), RunStatus::InstallationFailed);

        let ran = runner.ran.lock().clone();
        assert!(!ran.contains(&Step::RunTests));
        assert!(ran.contains(&Step::StoreData));
        assert!(ran.contains(&Step::DeactivateTester));
        assert!(ran.contains(&Step::DeactivateReal));
        assert_eq!(ran.iter().filter(|s| **s == Step::StoreData).count(), 1);
    }

    #[tokio::test]
    async fn abort_is_idempotent() {
        let (controller, _) = controller(None);
        let id = start(&controller, &job(JobType::StagingTest)).unwrap();

        controller.abort(&id).unwrap();
        controller.abort(&id).unwrap();
        let run = controller.advance(&id).await.unwrap();
        assert!(run.is_aborted());
        assert_eq!(run.status(), RunStatus::Aborted);
        controller.abort(&id).unwrap();

        let unknown = RunId::new(job(JobType::StagingTest), 9);
        assert!(matches!(controller.abort(&unknown), Err(ExecutionError::UnknownRun(_))));
    }

    #[tokio::test]
    async fn completion_drops_finished_change() {
        let (controller, _) = controller(None);
        for job_type in [JobType::SystemTest, JobType::StagingTest, JobType::production("us-east-1")] {
            let id = start(&controller, &job(job_type)).unwrap();
            controller.advance(&id).await.unwrap();
        }

        let application = controller.curator().read_application(&app_id()).unwrap();
        let instance = application.instance(&InstanceName::default_instance()).unwrap();
        assert_eq!(instance.change(), &Change::empty());
    }

    #[tokio::test]
    async fn advance_all_counts_ended_runs() {
        let (controller, _) = controller(None);
        start(&controller, &job(JobType::SystemTest)).unwrap();
        start(&controller, &job(JobType::StagingTest)).unwrap();
        assert_eq!(controller.advance_all().await, 2);
        assert_eq!(controller.advance_all().await, 0);
    }

    #[tokio::test]
    async fn external_runs_wait_for_their_build_service() {
        let (controller, runner) = controller(None);
        let east = job(JobType::production("us-east-1"));
        let id = {
            let lock = controller.curator().lock_application(&app_id());
            controller.start_external(&lock, &east, versions(), "test").unwrap()
        };

        assert_eq!(controller.advance_all().await, 0);
        assert!(!controller.advance(&id).await.unwrap().has_ended());
        assert!(runner.ran.lock().is_empty());

        let run = controller.report_external(&id, RunStatus::Success).unwrap();
        assert!(run.has_succeeded());
        let application = controller.curator().read_application(&app_id()).unwrap();
        let instance = application.instance(&InstanceName::default_instance()).unwrap();
        assert_eq!(instance.deployments().len(), 1);

        let again = controller.report_external(&id, RunStatus::TestFailure).unwrap();
        assert_eq!(again.status(), RunStatus::Success);
    }

    #[tokio::test]
    async fn only_external_runs_take_reports() {
        let (controller, _) = controller(None);
        let internal = start(&controller, &job(JobType::SystemTest)).unwrap();
        assert!(matches!(
            controller.report_external(&internal, RunStatus::Success),
            Err(ExecutionError::NotExternal(_))
        ));

        let staging = {
            let lock = controller.curator().lock_application(&app_id());
            controller
                .start_external(&lock, &job(JobType::StagingTest), versions(), "test")
                .unwrap()
        };
        controller.abort(&staging).unwrap();
        let run = controller.run(&staging).unwrap();
        assert!(run.has_ended());
        assert_eq!(run.status(), RunStatus::Aborted);
    }

    #[tokio::test]
    async fn advancing_records_when_steps_became_ready() {
        let (controller, _) = controller(None);
        let id = start(&controller, &job(JobType::SystemTest)).unwrap();
        controller.advance(&id).await.unwrap();

        let run = controller.run(&id).unwrap();
        assert_eq!(run.ready_since(Step::Report), controller.now());
    }

    #[test]
    fn component_jobs_are_not_run_here() {
        let (controller, _) = controller(None);
        assert!(matches!(
            start(&controller, &job(JobType::Component)),
            Err(ExecutionError::NotAutomatable(_))
        ));
    }
}
