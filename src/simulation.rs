// ABOUTME: In-memory cloud and a driver which runs orchestration passes against it.
// ABOUTME: Backs the `simulate` command and end-to-end tests of the engine.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::clock::{Clock, ManualClock};
use crate::config::{ControllerConfig, DeploymentSpec};
use crate::deployment::{Application, DeploymentTrigger, RunId, RunStatus};
use crate::execution::{
    CollaboratorError, ConvergenceReader, ConvergenceSummary, DeployRequest, DeploymentExecutor,
    DeploymentFailure, InternalStepRunner, JobController, ServiceMonitor, TesterCloud,
    TesterStatus,
};
use crate::queue::BuildService;
use crate::store::Curator;
use crate::types::{ApplicationId, ApplicationVersion, JobId, JobType, TenantAndApplicationId, ZoneId};

/// A cloud where deployments land instantly and converge at once, and where
/// tests pass unless told otherwise.
#[derive(Debug, Default)]
pub struct InMemoryCloud {
    deployed: Mutex<BTreeMap<(ApplicationId, ZoneId), DeployRequest>>,
    history: Mutex<Vec<DeployRequest>>,
    failures: Mutex<BTreeMap<ZoneId, VecDeque<DeploymentFailure>>>,
    test_results: Mutex<BTreeMap<JobType, TesterStatus>>,
    started: Mutex<BTreeSet<RunId>>,
    unhealthy: Mutex<BTreeSet<ZoneId>>,
}

impl InMemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next deployment to the zone fail with the given failure.
    pub fn fail_next_deployment(&self, zone: ZoneId, failure: DeploymentFailure) {
        self.failures.lock().entry(zone).or_default().push_back(failure);
    }

    /// Sets what tests of the job type report once started.
    pub fn set_test_result(&self, job_type: JobType, status: TesterStatus) {
        self.test_results.lock().insert(job_type, status);
    }

    pub fn set_healthy(&self, zone: ZoneId, healthy: bool) {
        let mut unhealthy = self.unhealthy.lock();
        if healthy {
            unhealthy.remove(&zone);
        } else {
            unhealthy.insert(zone);
        }
    }

    /// What is currently active in the zone.
    pub fn deployment(&self, application: &ApplicationId, zone: &ZoneId) -> Option<DeployRequest> {
        self.deployed
            .lock()
            .get(&(application.clone(), zone.clone()))
            .cloned()
    }

    /// Every successful deployment, in order.
    pub fn history(&self) -> Vec<DeployRequest> {
        self.history.lock().clone()
    }
}

#[async_trait]
impl DeploymentExecutor for InMemoryCloud {
    async fn deploy(&self, request: &DeployRequest) -> Result<(), DeploymentFailure> {
        let failure = self
            .failures
            .lock()
            .get_mut(&request.zone)
            .and_then(VecDeque::pop_front);
        if let Some(failure) = failure {
            return Err(failure);
        }
        self.deployed.lock().insert(
            (request.application.clone(), request.zone.clone()),
            request.clone(),
        );
        self.history.lock().push(request.clone());
        Ok(())
    }

    async fn deactivate(&self, application: &ApplicationId, zone: &ZoneId) -> Result<(), DeploymentFailure> {
        self.deployed
            .lock()
            .remove(&(application.clone(), zone.clone()));
        Ok(())
    }
}

#[async_trait]
impl ConvergenceReader for InMemoryCloud {
    async fn summary(
        &self,
        application: &ApplicationId,
        zone: &ZoneId,
    ) -> Result<Option<ConvergenceSummary>, CollaboratorError> {
        let deployed = self
            .deployed
            .lock()
            .contains_key(&(application.clone(), zone.clone()));
        Ok(deployed.then_some(ConvergenceSummary {
            nodes: 1,
            services: 1,
            ..ConvergenceSummary::default()
        }))
    }
}

#[async_trait]
impl TesterCloud for InMemoryCloud {
    async fn start(&self, run: &RunId, _zone: &ZoneId) -> Result<(), CollaboratorError> {
        self.started.lock().insert(run.clone());
        Ok(())
    }

    async fn status(&self, run: &RunId) -> Result<TesterStatus, CollaboratorError> {
        if !self.started.lock().contains(run) {
            return Ok(TesterStatus::NotStarted);
        }
        Ok(self
            .test_results
            .lock()
            .get(&run.job.job_type)
            .copied()
            .unwrap_or(TesterStatus::Success))
    }

    async fn stop(&self, run: &RunId) -> Result<(), CollaboratorError> {
        self.started.lock().remove(run);
        Ok(())
    }
}

#[async_trait]
impl ServiceMonitor for InMemoryCloud {
    async fn is_healthy(&self, _application: &ApplicationId, zone: &ZoneId) -> bool {
        !self.unhealthy.lock().contains(zone)
    }
}

/// What happened during one orchestration pass.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub pass: usize,
    pub at: DateTime<Utc>,
    pub triggered: Vec<JobId>,
    pub ended: Vec<(JobId, RunStatus)>,
}

/// Wires the engine to an [`InMemoryCloud`] and a manual clock.
pub struct Simulation {
    cloud: Arc<InMemoryCloud>,
    clock: Arc<ManualClock>,
    curator: Arc<Curator>,
    controller: Arc<JobController>,
    trigger: DeploymentTrigger,
    config: ControllerConfig,
    passes: usize,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("now", &self.clock.now())
            .field("passes", &self.passes)
            .finish_non_exhaustive()
    }
}

impl Simulation {
    pub fn new(config: ControllerConfig, start: DateTime<Utc>) -> Self {
        let cloud = Arc::new(InMemoryCloud::new());
        let clock = Arc::new(ManualClock::new(start));
        let curator = Arc::new(Curator::new());
        let runner = Arc::new(InternalStepRunner::new(
            cloud.clone(),
            cloud.clone(),
            cloud.clone(),
            clock.clone(),
            config.clone(),
        ));
        let controller = Arc::new(JobController::new(
            curator.clone(),
            runner,
            clock.clone(),
            config.clone(),
        ));
        let trigger = DeploymentTrigger::new(
            controller.clone(),
            cloud.clone(),
            clock.clone(),
            config.clone(),
        );
        Self {
            cloud,
            clock,
            curator,
            controller,
            trigger,
            config,
            passes: 0,
        }
    }

    pub fn cloud(&self) -> &InMemoryCloud {
        &self.cloud
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    pub fn curator(&self) -> &Arc<Curator> {
        &self.curator
    }

    pub fn controller(&self) -> &JobController {
        &self.controller
    }

    pub fn trigger(&self) -> &DeploymentTrigger {
        &self.trigger
    }

    /// Routes jobs claimed by the service through it instead of running them here.
    pub fn with_build_service(mut self, service: Arc<dyn BuildService>) -> Self {
        self.trigger = DeploymentTrigger::new(
            self.controller.clone(),
            self.cloud.clone(),
            self.clock.clone(),
            self.config.clone(),
        )
        .with_build_service(service);
        self
    }

    /// Creates an application with the given deployment spec and build project.
    pub fn create_application(
        &self,
        id: &TenantAndApplicationId,
        spec: DeploymentSpec,
        project_id: u64,
    ) {
        let lock = self.curator.lock_application(id);
        let application = Application::new(id.clone())
            .with_deployment_spec(spec)
            .with_project_id(project_id);
        self.curator.store_application(&lock, application);
    }

    /// Submits a build of the application, as its build pipeline would.
    pub fn submit(&self, id: &TenantAndApplicationId, build: u64) {
        let project_id = self
            .curator
            .read_application(id)
            .and_then(|application| application.project_id())
            .unwrap_or_default();
        let version = ApplicationVersion::from_build(build).built_at(self.clock.now());
        self.trigger.notify_of_submission(id, version, project_id);
    }

    /// Triggers what is ready, advances all runs, then moves the clock one
    /// trigger interval ahead.
    pub async fn pass(&mut self) -> PassReport {
        self.passes += 1;
        let at = self.clock.now();
        let before: BTreeSet<RunId> = self.runs();

        self.trigger.deploy_outstanding_changes();
        self.trigger.trigger_queued_retriggers().await;
        self.trigger.trigger_ready_jobs().await;
        let after: BTreeSet<RunId> = self.runs();
        self.controller.advance_all().await;

        let triggered: Vec<JobId> = after
            .difference(&before)
            .map(|id| id.job.clone())
            .collect();
        let ended = after
            .iter()
            .filter_map(|id| self.controller.run(id))
            .filter(|run| run.end() == Some(self.clock.now()))
            .map(|run| (run.id().job.clone(), run.status()))
            .collect();
        debug!("pass {} at {}: triggered {:?}", self.passes, at, triggered);

        self.clock.advance(self.config.trigger_interval);
        PassReport {
            pass: self.passes,
            at,
            triggered,
            ended,
        }
    }

    fn runs(&self) -> BTreeSet<RunId> {
        self.curator
            .applications()
            .iter()
            .flat_map(|application| self.curator.jobs(application.id()))
            .flat_map(|job| self.curator.runs(&job))
            .map(|run| run.id().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeploymentStep;
    use crate::types::InstanceName;

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-04T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn submission_rolls_out_to_production() {
        let mut simulation = Simulation::new(ControllerConfig::default(), start());
        let id = TenantAndApplicationId::from_names("tenant", "app");
        simulation.create_application(
            &id,
            DeploymentSpec::single(vec![DeploymentStep::prod("us-east-1")]),
            1,
        );
        simulation.submit(&id, 1);

        for _ in 0..5 {
            simulation.pass().await;
        }

        let instance = id.instance(InstanceName::default_instance());
        let deployed = simulation
            .cloud()
            .deployment(&instance, &ZoneId::prod("us-east-1"))
            .unwrap();
        assert_eq!(deployed.revision, ApplicationVersion::from_build(1));
        let application = simulation.curator().read_application(&id).unwrap();
        assert!(
            application
                .instance(&instance.instance)
                .unwrap()
                .change()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn unhealthy_zone_is_reported_by_monitor() {
        let cloud = InMemoryCloud::new();
        let app = ApplicationId::from_names("t", "a", "default");
        let zone = ZoneId::prod("eu-west-1");
        assert!(cloud.is_healthy(&app, &zone).await);
        cloud.set_healthy(zone.clone(), false);
        assert!(!cloud.is_healthy(&app, &zone).await);
    }
}
