// ABOUTME: Executes single steps of runs against the deployment collaborators.
// ABOUTME: Transient conditions leave a step unfinished, to be retried on the next pass.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::collaborators::{
    ConvergenceReader, DeployRequest, DeploymentExecutor, TesterCloud, TesterStatus,
};
use super::error::{DeploymentFailure, ErrorCode};
use crate::clock::Clock;
use crate::config::ControllerConfig;
use crate::deployment::{Run, RunStatus, Step};
use crate::types::{ApplicationId, ZoneId};

/// Result of one attempt at a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Not done yet; try again later.
    Unfinished,
    Succeeded,
    /// Done, and the run failed for the given reason.
    Failed(RunStatus),
}

/// Runs steps. Must be safe to call again for a step which is still unfinished.
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run(&self, step: Step, run: &Run) -> StepOutcome;
}

pub struct InternalStepRunner {
    executor: Arc<dyn DeploymentExecutor>,
    convergence: Arc<dyn ConvergenceReader>,
    tester: Arc<dyn TesterCloud>,
    clock: Arc<dyn Clock>,
    config: ControllerConfig,
}

impl std::fmt::Debug for InternalStepRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InternalStepRunner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl InternalStepRunner {
    pub fn new(
        executor: Arc<dyn DeploymentExecutor>,
        convergence: Arc<dyn ConvergenceReader>,
        tester: Arc<dyn TesterCloud>,
        clock: Arc<dyn Clock>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            executor,
            convergence,
            tester,
            clock,
            config,
        }
    }

    async fn deploy(&self, step: Step, run: &Run, request: DeployRequest) -> StepOutcome {
        match self.executor.deploy(&request).await {
            Ok(()) => StepOutcome::Succeeded,
            Err(failure) => {
                self.deployment_failed(step, run, &request.zone, failure, RunStatus::DeploymentFailed)
            }
        }
    }

    async fn deactivate(&self, step: Step, run: &Run, application: &ApplicationId, zone: &ZoneId) -> StepOutcome {
        match self.executor.deactivate(application, zone).await {
            Ok(()) => StepOutcome::Succeeded,
            Err(failure) => self.deployment_failed(step, run, zone, failure, RunStatus::Error),
        }
    }

    fn deployment_failed(
        &self,
        step: Step,
        run: &Run,
        zone: &ZoneId,
        failure: DeploymentFailure,
        status: RunStatus,
    ) -> StepOutcome {
        match failure.kind() {
            ErrorCode::ActivationConflict | ErrorCode::ApplicationLockFailure => {
                debug!("retrying {} later: {}", run.id(), failure);
                StepOutcome::Unfinished
            }
            ErrorCode::OutOfCapacity if zone.environment.is_test() => {
                if self.expired(step, run, self.config.capacity_timeout) {
                    warn!("giving up on {}: {}", run.id(), failure);
                    StepOutcome::Failed(RunStatus::OutOfCapacity)
                } else {
                    debug!("waiting for capacity for {}: {}", run.id(), failure);
                    StepOutcome::Unfinished
                }
            }
            _ => {
                warn!("{} failed: {}", run.id(), failure);
                StepOutcome::Failed(status)
            }
        }
    }

    async fn install(&self, step: Step, run: &Run, application: &ApplicationId, zone: &ZoneId) -> StepOutcome {
        match self.convergence.summary(application, zone).await {
            Ok(Some(summary)) if summary.converged() => return StepOutcome::Succeeded,
            Ok(summary) => debug!("{} in {} not converged yet: {:?}", application, zone, summary),
            Err(e) => warn!("failed reading convergence of {} in {}: {}", application, zone, e),
        }
        if self.expired(step, run, self.config.install_timeout) {
            warn!("installation of {} in {} timed out", application, zone);
            StepOutcome::Failed(RunStatus::InstallationFailed)
        } else {
            StepOutcome::Unfinished
        }
    }

    async fn run_tests(&self, run: &Run, zone: &ZoneId) -> StepOutcome {
        match self.tester.status(run.id()).await {
            Ok(TesterStatus::NotStarted) => {
                if let Err(e) = self.tester.start(run.id(), zone).await {
                    warn!("failed starting tests of {}: {}", run.id(), e);
                }
                StepOutcome::Unfinished
            }
            Ok(TesterStatus::Running) => StepOutcome::Unfinished,
            Ok(TesterStatus::Success) => StepOutcome::Succeeded,
            Ok(TesterStatus::Failure) => StepOutcome::Failed(RunStatus::TestFailure),
            Ok(TesterStatus::Error) => StepOutcome::Failed(RunStatus::Error),
            Err(e) => {
                warn!("failed polling tests of {}: {}", run.id(), e);
                StepOutcome::Unfinished
            }
        }
    }

    async fn deactivate_tester(&self, run: &Run, zone: &ZoneId) -> StepOutcome {
        if let Err(e) = self.tester.stop(run.id()).await {
            warn!("failed stopping tests of {}: {}", run.id(), e);
        }
        self.deactivate(Step::DeactivateTester, run, &run.id().job.application.tester(), zone)
            .await
    }

    /// Whether the step has been ready for longer than the timeout.
    fn expired(&self, step: Step, run: &Run, timeout: Duration) -> bool {
        chrono::Duration::from_std(timeout)
            .is_ok_and(|timeout| self.clock.now() - run.ready_since(step) > timeout)
    }
}

#[async_trait]
impl StepRunner for InternalStepRunner {
    async fn run(&self, step: Step, run: &Run) -> StepOutcome {
        let job = &run.id().job;
        let Some(zone) = self.config.zones.zone_of(&job.job_type) else {
            warn!("{} has no zone to run in", job);
            return StepOutcome::Failed(RunStatus::Error);
        };
        let versions = run.versions();
        let application = &job.application;

        match step {
            Step::DeployTester => {
                let request = DeployRequest {
                    application: application.tester(),
                    zone,
                    platform: *versions.target_platform(),
                    revision: versions.target_revision().clone(),
                };
                self.deploy(step, run, request).await
            }
            Step::InstallTester => self.install(step, run, &application.tester(), &zone).await,
            Step::DeployInitialReal => match (versions.source_platform(), versions.source_revision()) {
                (Some(platform), Some(revision)) => {
                    let request = DeployRequest {
                        application: application.clone(),
                        zone,
                        platform: *platform,
                        revision: revision.clone(),
                    };
                    self.deploy(step, run, request).await
                }
                _ => StepOutcome::Succeeded,
            },
            Step::InstallInitialReal if versions.source_platform().is_none() => StepOutcome::Succeeded,
            Step::InstallInitialReal | Step::InstallReal => {
                self.install(step, run, application, &zone).await
            }
            Step::DeployReal => {
                let request = DeployRequest {
                    application: application.clone(),
                    zone,
                    platform: *versions.target_platform(),
                    revision: versions.target_revision().clone(),
                };
                self.deploy(step, run, request).await
            }
            Step::RunTests => self.run_tests(run, &zone).await,
            Step::StoreData => {
                debug!("stored test data of {}", run.id());
                StepOutcome::Succeeded
            }
            Step::DeactivateReal => self.deactivate(step, run, application, &zone).await,
            Step::DeactivateTester => self.deactivate_tester(run, &zone).await,
            Step::Report => StepOutcome::Succeeded,
        }
    }
}
