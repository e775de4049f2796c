// ABOUTME: Canonical job order of an instance, derived from its declared steps.
// ABOUTME: Also sorts jobs and deployments by that order and computes declared delays.

use std::time::Duration;

use super::application::Deployment;
use super::error::TriggerError;
use super::job_status::JobStatus;
use crate::config::{DeclaredZone, DeploymentStep, InstanceSpec};
use crate::types::{Environment, JobType, ZoneId};

#[derive(Debug, Clone, Copy)]
pub struct DeploymentSteps<'a> {
    steps: &'a [DeploymentStep],
}

impl<'a> DeploymentSteps<'a> {
    pub fn new(steps: &'a [DeploymentStep]) -> Self {
        Self { steps }
    }

    /// Steps of the given instance, or no steps at all.
    pub fn of(spec: Option<&'a InstanceSpec>) -> Self {
        Self::new(spec.map(|s| s.steps.as_slice()).unwrap_or_default())
    }

    /// All jobs to run, in order, without duplicates.
    ///
    /// Any production step implies both test jobs, which then come first.
    pub fn jobs(&self) -> Vec<JobType> {
        let mut jobs = Vec::new();
        if self.steps.iter().any(|s| s.concerns(Environment::Prod)) {
            jobs.push(JobType::SystemTest);
            jobs.push(JobType::StagingTest);
        }
        for zone in self.steps.iter().flat_map(|s| s.zones()) {
            if let Ok(job) = Self::to_job(zone)
                && !jobs.contains(&job)
            {
                jobs.push(job);
            }
        }
        jobs
    }

    pub fn test_jobs(&self) -> Vec<JobType> {
        self.jobs().into_iter().filter(JobType::is_test).collect()
    }

    pub fn production_jobs(&self) -> Vec<JobType> {
        self.jobs()
            .into_iter()
            .filter(JobType::is_production)
            .collect()
    }

    /// The job deploying to a declared zone.
    pub fn to_job(zone: &DeclaredZone) -> Result<JobType, TriggerError> {
        match (zone.environment, &zone.region) {
            (Environment::Test, _) => Ok(JobType::SystemTest),
            (Environment::Staging, _) => Ok(JobType::StagingTest),
            (Environment::Prod, Some(region)) => Ok(JobType::Production(region.clone())),
            (environment, region) => Err(TriggerError::NotAutomatable(match region {
                Some(region) => format!("{}.{}", environment, region),
                None => environment.to_string(),
            })),
        }
    }

    /// The job deploying to a zone, for zones this core deploys to.
    pub fn job_of(zone: &ZoneId) -> Option<JobType> {
        Self::to_job(&DeclaredZone::new(zone.environment, Some(zone.region.clone()))).ok()
    }

    /// Job statuses in declared order; undeclared jobs follow in their given order.
    pub fn sorted_jobs<'s>(&self, jobs: impl IntoIterator<Item = &'s JobStatus>) -> Vec<&'s JobStatus> {
        self.sorted(jobs, |job| Some(job.id().job_type.clone()))
    }

    /// Deployments in declared order; undeclared zones follow in their given order.
    pub fn sorted_deployments<'d>(
        &self,
        deployments: impl IntoIterator<Item = &'d Deployment>,
    ) -> Vec<&'d Deployment> {
        self.sorted(deployments, |deployment| Self::job_of(&deployment.zone))
    }

    fn sorted<T>(
        &self,
        items: impl IntoIterator<Item = T>,
        job_of: impl Fn(&T) -> Option<JobType>,
    ) -> Vec<T> {
        let order = self.jobs();
        let mut items: Vec<T> = items.into_iter().collect();
        items.sort_by_key(|item| {
            job_of(item)
                .and_then(|job| order.iter().position(|declared| *declared == job))
                .unwrap_or(usize::MAX)
        });
        items
    }

    /// Total delay declared right after the step which deploys `job`.
    pub fn delay_after(&self, job: &JobType) -> Duration {
        let Some(index) = self.steps.iter().position(|step| {
            step.zones()
                .iter()
                .any(|zone| Self::to_job(zone).is_ok_and(|j| &j == job))
        }) else {
            return Duration::ZERO;
        };
        self.steps[index + 1..]
            .iter()
            .map_while(|step| match step {
                DeploymentStep::Delay(delay) => Some(*delay),
                _ => None,
            })
            .sum()
    }
}
