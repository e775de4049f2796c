// ABOUTME: Per-application view of all job histories, laid out as the declared step graph.
// ABOUTME: Answers which jobs must run for a change, and when each becomes ready.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, DurationRound, Utc};

use super::application::{Application, Deployment};
use super::change::Change;
use super::deployment_steps::DeploymentSteps;
use super::job_list::JobList;
use super::job_status::JobStatus;
use super::run::RunStatus;
use super::run_list::RunList;
use super::versions::Versions;
use crate::config::{DeploymentStep, InstanceSpec, UpgradeRollout};
use crate::types::{ApplicationId, InstanceName, JobId, JobType, Version};

/// Pause after the last failure before retrying, on top of half the failure streak.
fn cool_down() -> chrono::Duration {
    chrono::Duration::minutes(10)
}

/// How far ahead change blockers are searched for an open slot.
fn blocker_horizon() -> chrono::Duration {
    chrono::Duration::days(7)
}

/// A job which should run to roll out a change, with the versions it should run on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingJob {
    pub job_type: JobType,
    pub versions: Versions,
    /// When the job may run; `None` if it isn't known yet.
    pub ready_at: Option<DateTime<Utc>>,
    pub change: Change,
}

/// Jobs to run, in the order they were found: tests before production jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobsToRun {
    entries: Vec<(JobId, Vec<PendingJob>)>,
}

impl JobsToRun {
    fn merge(&mut self, job: JobId, pending: PendingJob) {
        match self.entries.iter_mut().find(|(id, _)| *id == job) {
            Some((_, list)) => {
                if !list.iter().any(|p| p.versions == pending.versions) {
                    list.push(pending);
                }
            }
            None => self.entries.push((job, vec![pending])),
        }
    }

    pub fn get(&self, job: &JobId) -> Option<&[PendingJob]> {
        self.entries
            .iter()
            .find(|(id, _)| id == job)
            .map(|(_, list)| list.as_slice())
    }

    pub fn contains(&self, job: &JobId) -> bool {
        self.get(job).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&JobId, &[PendingJob])> {
        self.entries.iter().map(|(id, list)| (id, list.as_slice()))
    }

    pub fn jobs(&self) -> impl Iterator<Item = &JobId> {
        self.entries.iter().map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone)]
enum StepKind {
    Instance,
    Delay(Duration),
    Test { job: JobId, declared: bool },
    Production { job: JobId },
}

#[derive(Debug, Clone)]
struct StepNode {
    instance: InstanceName,
    kind: StepKind,
    dependencies: Vec<usize>,
}

/// Builds the step graph: instances run in sequence; within an instance,
/// production steps follow each other, delays hold back what comes after
/// them, and parallel steps all follow the same predecessors.
#[derive(Default)]
struct GraphBuilder {
    steps: Vec<StepNode>,
    job_steps: Vec<(JobId, usize)>,
    instance_steps: BTreeMap<InstanceName, usize>,
}

impl GraphBuilder {
    fn build(application: &Application) -> Self {
        let mut builder = Self::default();
        if let Some(spec) = application.deployment_spec() {
            let mut previous = Vec::new();
            for instance in spec.instances.iter() {
                previous = builder.fill_instance(application, instance, previous);
            }
        }
        builder
    }

    fn push(&mut self, instance: &InstanceName, kind: StepKind, dependencies: Vec<usize>) -> usize {
        self.steps.push(StepNode {
            instance: instance.clone(),
            kind,
            dependencies,
        });
        self.steps.len() - 1
    }

    fn fill_instance(
        &mut self,
        application: &Application,
        spec: &InstanceSpec,
        previous: Vec<usize>,
    ) -> Vec<usize> {
        let name = &spec.name;
        let index = self.push(name, StepKind::Instance, previous);
        self.instance_steps.insert(name.clone(), index);

        let id = application.id().instance(name.clone());
        for test in [JobType::SystemTest, JobType::StagingTest] {
            let job = JobId::new(id.clone(), test);
            let step = self.push(
                name,
                StepKind::Test {
                    job: job.clone(),
                    declared: false,
                },
                Vec::new(),
            );
            self.job_steps.push((job, step));
        }

        let mut previous = vec![index];
        for step in &spec.steps {
            previous = self.fill_step(&id, step, previous);
        }
        previous
    }

    fn fill_step(
        &mut self,
        instance: &ApplicationId,
        step: &DeploymentStep,
        previous: Vec<usize>,
    ) -> Vec<usize> {
        let name = &instance.instance;
        match step {
            DeploymentStep::Delay(delay) => vec![self.push(name, StepKind::Delay(*delay), previous)],
            DeploymentStep::Zone(zone) => match DeploymentSteps::to_job(zone) {
                Ok(job_type) if job_type.is_test() => {
                    let job = JobId::new(instance.clone(), job_type);
                    let index = match self.job_steps.iter().find(|(id, _)| *id == job) {
                        Some((_, index)) => {
                            let index = *index;
                            self.steps[index].kind = StepKind::Test { job, declared: true };
                            index
                        }
                        None => {
                            let index = self.push(
                                name,
                                StepKind::Test {
                                    job: job.clone(),
                                    declared: true,
                                },
                                Vec::new(),
                            );
                            self.job_steps.push((job, index));
                            index
                        }
                    };
                    let mut previous = previous;
                    previous.push(index);
                    previous
                }
                Ok(job_type) => {
                    let job = JobId::new(instance.clone(), job_type);
                    let index = self.push(name, StepKind::Production { job: job.clone() }, previous);
                    self.job_steps.push((job, index));
                    vec![index]
                }
                Err(e) => {
                    tracing::debug!("ignoring step in {}: {}", instance, e);
                    previous
                }
            },
            DeploymentStep::Parallel(steps) => {
                let parallel: Vec<usize> = steps
                    .iter()
                    .flat_map(|nested| self.fill_step(instance, nested, previous.clone()))
                    .collect();
                if parallel.is_empty() {
                    previous
                } else {
                    parallel
                }
            }
        }
    }
}

/// Status of all jobs of an application at one instant.
#[derive(Debug, Clone)]
pub struct DeploymentStatus {
    application: Application,
    jobs: BTreeMap<JobId, JobStatus>,
    system_version: Version,
    now: DateTime<Utc>,
    steps: Vec<StepNode>,
    job_steps: Vec<(JobId, usize)>,
    instance_steps: BTreeMap<InstanceName, usize>,
}

impl DeploymentStatus {
    pub fn new(
        application: Application,
        jobs: impl IntoIterator<Item = JobStatus>,
        system_version: Version,
        now: DateTime<Utc>,
    ) -> Self {
        let graph = GraphBuilder::build(&application);
        let mut jobs: BTreeMap<JobId, JobStatus> = jobs
            .into_iter()
            .map(|status| (status.id().clone(), status))
            .collect();
        for (job, _) in &graph.job_steps {
            jobs.entry(job.clone())
                .or_insert_with(|| JobStatus::new(job.clone(), Vec::new()));
        }
        Self {
            application,
            jobs,
            system_version,
            now,
            steps: graph.steps,
            job_steps: graph.job_steps,
            instance_steps: graph.instance_steps,
        }
    }

    pub fn application(&self) -> &Application {
        &self.application
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn system_version(&self) -> Version {
        self.system_version
    }

    /// All jobs of the application.
    pub fn jobs(&self) -> JobList<'_> {
        JobList::from(self.jobs.values())
    }

    pub fn job(&self, job: &JobId) -> Option<&JobStatus> {
        self.jobs.get(job)
    }

    pub fn instance_jobs(&self, instance: &InstanceName) -> JobList<'_> {
        self.jobs().instance(instance)
    }

    /// Whether any job is failing for reasons other than test capacity.
    pub fn has_failures(&self) -> bool {
        !self
            .jobs()
            .failing()
            .not()
            .matching(JobStatus::is_out_of_capacity)
            .is_empty()
    }

    /// The deployment the given job last made, if it is still there.
    pub fn deployment_for(&self, job: &JobId) -> Option<&Deployment> {
        self.application
            .instance(&job.application.instance)?
            .deployments()
            .values()
            .find(|d| DeploymentSteps::job_of(&d.zone).as_ref() == Some(&job.job_type))
    }

    /// Whether the job is part of the declared pipeline, implicitly or explicitly.
    pub fn is_declared(&self, job: &JobId) -> bool {
        self.job_step(job).is_some()
    }

    fn job_step(&self, job: &JobId) -> Option<usize> {
        self.job_steps
            .iter()
            .find(|(id, _)| id == job)
            .map(|(_, index)| *index)
    }

    /// Jobs to run for the current changes, plus test jobs for any outstanding revisions.
    pub fn jobs_to_run(&self) -> JobsToRun {
        let names = self.instance_names();
        let changes: Vec<(InstanceName, Change)> = names
            .iter()
            .map(|name| (name.clone(), self.change_of(name)))
            .collect();
        let mut jobs = self.jobs_to_run_for(&changes, false);

        let eager: Vec<(InstanceName, Change)> = names
            .iter()
            .map(|name| {
                let current = self.change_of(name);
                (name.clone(), self.outstanding_change(name).on_top_of(&current))
            })
            .collect();
        for (job, pending) in self.jobs_to_run_for(&eager, true).entries {
            if job.job_type.is_production() {
                continue;
            }
            for p in pending {
                jobs.merge(job.clone(), p);
            }
        }
        jobs
    }

    /// Jobs to run for the given changes to the given instances.
    ///
    /// With `assume_upgrades_succeed`, production deployments are taken to
    /// already run the platform of the change, which is used to compute
    /// versions of tests for changes which aren't rolling out yet.
    pub fn jobs_to_run_for(
        &self,
        changes: &[(InstanceName, Change)],
        assume_upgrades_succeed: bool,
    ) -> JobsToRun {
        let mut production = JobsToRun::default();
        for (instance, change) in changes {
            self.production_jobs(&mut production, instance, change, assume_upgrades_succeed);
        }

        let mut jobs = self.test_jobs(&production);
        for (job, pending) in production.entries {
            for p in pending {
                jobs.merge(job.clone(), p);
            }
        }

        // Declared tests which are idle still verify their instance's change.
        for (job, index) in &self.job_steps {
            if !matches!(self.steps[*index].kind, StepKind::Test { declared: true, .. })
                || jobs.contains(job)
            {
                continue;
            }
            let Some((_, change)) = changes
                .iter()
                .find(|(name, _)| *name == job.application.instance)
            else {
                continue;
            };
            if !change.has_targets() {
                continue;
            }
            let first_deployed = self
                .job_steps
                .iter()
                .map(|(id, _)| id)
                .find(|id| id.job_type.is_production() && self.deployment_for(id).is_some());
            let versions = Versions::from(
                change,
                &self.application,
                first_deployed.and_then(|id| self.deployment_for(id)),
                self.system_version,
            );
            if self.completed_at(*index, change, first_deployed).is_none() {
                jobs.merge(
                    job.clone(),
                    PendingJob {
                        job_type: job.job_type.clone(),
                        versions,
                        ready_at: self.ready_at(*index, change, None),
                        change: change.clone(),
                    },
                );
            }
        }
        jobs
    }

    fn production_jobs(
        &self,
        jobs: &mut JobsToRun,
        instance: &InstanceName,
        change: &Change,
        assume_upgrades_succeed: bool,
    ) {
        if !change.has_targets() {
            return;
        }
        for (job, index) in &self.job_steps {
            if job.application.instance != *instance || !job.job_type.is_production() {
                continue;
            }
            if self.completed_at(*index, change, Some(job)).is_some() {
                continue;
            }
            let deployment = self.deployment_for(job).cloned().map(|d| {
                match (assume_upgrades_succeed, change.platform()) {
                    (true, Some(platform)) => Deployment {
                        version: *platform,
                        ..d
                    },
                    _ => d,
                }
            });
            let versions = Versions::from(
                change,
                &self.application,
                deployment.as_ref(),
                self.system_version,
            );
            jobs.merge(
                job.clone(),
                PendingJob {
                    job_type: job.job_type.clone(),
                    versions,
                    ready_at: self.ready_at(*index, change, Some(job)),
                    change: change.clone(),
                },
            );
        }
    }

    /// Test jobs needed to verify the versions of the given production jobs.
    ///
    /// An instance's declared tests verify its own production jobs; remaining
    /// versions are verified by the first declared, or else implicit, test.
    pub fn test_jobs(&self, production: &JobsToRun) -> JobsToRun {
        let mut tests = JobsToRun::default();
        for test_type in [JobType::SystemTest, JobType::StagingTest] {
            for (job, pending) in production.iter() {
                if !job.job_type.is_production() {
                    continue;
                }
                let Some(test) = self.declared_test(&job.application, &test_type) else {
                    continue;
                };
                for p in pending {
                    if !self.succeeded_on(&test, &p.versions) {
                        self.merge_test(&mut tests, &test, p);
                    }
                }
            }
        }
        for test_type in [JobType::SystemTest, JobType::StagingTest] {
            for (job, pending) in production.iter() {
                if !job.job_type.is_production() {
                    continue;
                }
                for p in pending {
                    let verified = self
                        .jobs
                        .keys()
                        .filter(|id| id.job_type == test_type)
                        .any(|id| self.succeeded_on(id, &p.versions));
                    let scheduled = tests.iter().any(|(id, list)| {
                        id.job_type == test_type && list.iter().any(|t| t.versions == p.versions)
                    });
                    if verified || scheduled {
                        continue;
                    }
                    if let Some(test) = self.first_declared_or_implicit_test(&test_type) {
                        self.merge_test(&mut tests, &test, p);
                    }
                }
            }
        }
        tests
    }

    /// Test jobs needed before the given job may run on `versions` for `change`.
    pub fn test_jobs_for(&self, job: &JobId, versions: &Versions, change: &Change) -> JobsToRun {
        let mut production = JobsToRun::default();
        production.merge(
            job.clone(),
            PendingJob {
                job_type: job.job_type.clone(),
                versions: versions.clone(),
                ready_at: None,
                change: change.clone(),
            },
        );
        self.test_jobs(&production)
    }

    fn merge_test(&self, tests: &mut JobsToRun, test: &JobId, production: &PendingJob) {
        let ready_at = self
            .job_step(test)
            .and_then(|index| self.ready_at(index, &production.change, None));
        tests.merge(
            test.clone(),
            PendingJob {
                job_type: test.job_type.clone(),
                versions: production.versions.clone(),
                ready_at,
                change: production.change.clone(),
            },
        );
    }

    fn succeeded_on(&self, job: &JobId, versions: &Versions) -> bool {
        self.jobs.get(job).is_some_and(|status| {
            !RunList::of(status)
                .on(versions)
                .status(RunStatus::Success)
                .is_empty()
        })
    }

    /// The instance's own test of the given type, if it declares one.
    pub fn declared_test(&self, instance: &ApplicationId, test_type: &JobType) -> Option<JobId> {
        let job = JobId::new(instance.clone(), test_type.clone());
        let index = self.job_step(&job)?;
        matches!(self.steps[index].kind, StepKind::Test { declared: true, .. }).then_some(job)
    }

    fn first_declared_or_implicit_test(&self, test_type: &JobType) -> Option<JobId> {
        let names = self.instance_names();
        let candidates = names
            .iter()
            .map(|name| JobId::new(self.application.id().instance(name.clone()), test_type.clone()));
        let mut implicit = None;
        for job in candidates {
            let Some(index) = self.job_step(&job) else {
                continue;
            };
            match self.steps[index].kind {
                StepKind::Test { declared: true, .. } => return Some(job),
                _ => {
                    implicit.get_or_insert(job);
                }
            }
        }
        implicit
    }

    /// The next revision the instance should roll out, if there is one with work left.
    pub fn outstanding_change(&self, instance: &InstanceName) -> Change {
        let Some(next) = self.application.latest_version() else {
            return Change::empty();
        };
        let change = Change::of_revision(next.clone());
        if let Some(current) = self.change_of(instance).revision()
            && !change.upgrades_revision(current)
        {
            return Change::empty();
        }
        if self
            .jobs_to_run_for(&[(instance.clone(), change.clone())], false)
            .is_empty()
        {
            return Change::empty();
        }
        change
    }

    /// When the job was verified by tests on the given versions, or first triggered on them.
    pub fn tested_at(&self, job: &JobId, versions: &Versions) -> Option<DateTime<Utc>> {
        let triggered_at = self
            .jobs
            .get(job)
            .and_then(JobStatus::last_triggered)
            .filter(|run| run.versions() == versions)
            .map(|run| run.start());
        let system = self.test_verified_at(&job.application, &JobType::SystemTest, versions);
        let staging = self.test_verified_at(&job.application, &JobType::StagingTest, versions);
        match (system, staging) {
            (Some(system), Some(staging)) => {
                let tested = system.max(staging);
                Some(triggered_at.map_or(tested, |t| t.min(tested)))
            }
            _ => triggered_at,
        }
    }

    pub fn is_tested(&self, job: &JobId, versions: &Versions) -> bool {
        self.tested_at(job, versions).is_some()
    }

    fn test_verified_at(
        &self,
        instance: &ApplicationId,
        test_type: &JobType,
        versions: &Versions,
    ) -> Option<DateTime<Utc>> {
        let declared = self.declared_test(instance, test_type).is_some();
        self.jobs
            .values()
            .filter(|status| &status.id().job_type == test_type)
            .filter(|status| !declared || status.id().application == *instance)
            .filter_map(|status| {
                RunList::of(status)
                    .on(versions)
                    .status(RunStatus::Success)
                    .last()
                    .and_then(|run| run.end())
            })
            .max()
    }

    /// When the instance is ready to start rolling out the given change.
    pub fn instance_ready_at(&self, instance: &InstanceName, change: &Change) -> Option<DateTime<Utc>> {
        let index = *self.instance_steps.get(instance)?;
        self.ready_at(index, change, None)
    }

    /// When the job is ready to run for the given change.
    pub fn job_ready_at(&self, job: &JobId, change: &Change) -> Option<DateTime<Utc>> {
        let index = self.job_step(job)?;
        self.ready_at(index, change, Some(job))
    }

    /// When the job completed the given change.
    pub fn job_completed_at(&self, job: &JobId, change: &Change) -> Option<DateTime<Utc>> {
        let index = self.job_step(job)?;
        self.completed_at(index, change, Some(job))
    }

    fn instance_names(&self) -> Vec<InstanceName> {
        self.application
            .deployment_spec()
            .map(|spec| spec.instance_names())
            .unwrap_or_default()
    }

    fn change_of(&self, instance: &InstanceName) -> Change {
        self.application
            .instance(instance)
            .map(|i| i.change().clone())
            .unwrap_or_default()
    }

    fn instance_spec(&self, instance: &InstanceName) -> Option<&InstanceSpec> {
        self.application.deployment_spec()?.instance(instance)
    }

    fn dependencies_completed_at(
        &self,
        index: usize,
        change: &Change,
        dependent: Option<&JobId>,
    ) -> Option<DateTime<Utc>> {
        let mut latest = DateTime::<Utc>::UNIX_EPOCH;
        for dependency in &self.steps[index].dependencies {
            latest = latest.max(self.completed_at(*dependency, change, dependent)?);
        }
        Some(latest)
    }

    fn completed_at(
        &self,
        index: usize,
        change: &Change,
        dependent: Option<&JobId>,
    ) -> Option<DateTime<Utc>> {
        let node = &self.steps[index];
        match &node.kind {
            StepKind::Instance => {
                let current = self.change_of(&node.instance);
                let contained = change.platform().is_none_or(|p| current.platform() == Some(p))
                    && change.revision().is_none_or(|r| current.revision() == Some(r));
                let deploys_to_production = self
                    .instance_spec(&node.instance)
                    .is_some_and(|spec| spec.concerns(crate::types::Environment::Prod));
                if contained || !deploys_to_production {
                    self.dependencies_completed_at(index, change, dependent)
                } else {
                    None
                }
            }
            StepKind::Delay(delay) => {
                let ready = self.ready_at(index, change, dependent)?;
                chrono::Duration::from_std(*delay)
                    .ok()
                    .and_then(|delay| ready.checked_add_signed(delay))
            }
            StepKind::Test { job, .. } => {
                let versions = Versions::from(
                    change,
                    &self.application,
                    dependent.and_then(|d| self.deployment_for(d)),
                    self.system_version,
                );
                let status = self.jobs.get(job)?;
                RunList::of(status)
                    .on(&versions)
                    .status(RunStatus::Success)
                    .iter()
                    .filter_map(|run| run.end())
                    .max()
            }
            StepKind::Production { job } => self.production_completed_at(job, change),
        }
    }

    fn production_completed_at(&self, job: &JobId, change: &Change) -> Option<DateTime<Utc>> {
        let status = self.jobs.get(job)?;
        let existing = self.deployment_for(job);

        if change.is_pinned()
            && let Some(platform) = change.platform()
            && existing.map(|d| d.version) != Some(*platform)
        {
            return None;
        }

        // A rollback of the instance's change is done once it has been attempted here.
        let full_change = self.change_of(&job.application.instance);
        if let Some(deployment) = existing
            && !(change.upgrades_platform(&deployment.version)
                || change.upgrades_revision(&deployment.revision))
            && (full_change.downgrades_platform(&deployment.version)
                || full_change.downgrades_revision(&deployment.revision))
        {
            return status.last_completed().and_then(|run| run.end());
        }

        status
            .last_success()
            .filter(|run| run.versions().targets_match_change(change))
            .and_then(|run| run.end())
    }

    fn ready_at(
        &self,
        index: usize,
        change: &Change,
        dependent: Option<&JobId>,
    ) -> Option<DateTime<Utc>> {
        let node = &self.steps[index];
        let ready = self.dependencies_completed_at(index, change, dependent)?;
        match &node.kind {
            StepKind::Instance => Some(ready.max(
                self.blocked_until(&node.instance, change)
                    .unwrap_or(ready),
            )),
            StepKind::Delay(_) => Some(ready),
            StepKind::Test { job, .. } => Some(self.job_gates(ready, job, change)),
            StepKind::Production { job } => {
                let ready = self.job_gates(ready, job, change).max(
                    self.blocked_until(&node.instance, change)
                        .unwrap_or(ready),
                );
                let versions = Versions::from(
                    change,
                    &self.application,
                    self.deployment_for(job),
                    self.system_version,
                );
                let tested = self.tested_at(job, &versions)?;
                Some(ready.max(tested))
            }
        }
    }

    fn job_gates(&self, ready: DateTime<Utc>, job: &JobId, change: &Change) -> DateTime<Utc> {
        let paused = self.paused_until(job).unwrap_or(ready);
        let cooling = self.cooling_down_until(job, change).unwrap_or(ready);
        ready.max(paused).max(cooling)
    }

    fn paused_until(&self, job: &JobId) -> Option<DateTime<Utc>> {
        self.application
            .instance(&job.application.instance)?
            .job_pause(&job.job_type)
    }

    /// Time to hold off a job which keeps failing on the targets of the change.
    fn cooling_down_until(&self, job: &JobId, change: &Change) -> Option<DateTime<Utc>> {
        let status = self.jobs.get(job)?;
        let last = status.last_completed()?;
        let first_failing = status.first_failing()?;
        if !last.versions().targets_match_change(change) {
            return None;
        }
        if job.job_type.is_test() && status.is_out_of_capacity() {
            return None;
        }
        let first = first_failing.end()?;
        let last = last.end()?;
        if first == last {
            return Some(last);
        }
        Some(last + cool_down() + (last - first) / 2).filter(|until| self.now < *until)
    }

    /// When the instance's change blockers stop blocking the change, if they block it now.
    fn blocked_until(&self, instance: &InstanceName, change: &Change) -> Option<DateTime<Utc>> {
        let spec = self.instance_spec(instance)?;
        let blocks = |at: DateTime<Utc>| {
            spec.change_blockers.iter().any(|blocker| {
                blocker.window.includes(at)
                    && (change.platform().is_some() && blocker.blocks_versions()
                        || change.revision().is_some() && blocker.blocks_revisions())
            })
        };
        if !blocks(self.now) {
            return None;
        }
        let horizon = self.now + blocker_horizon();
        let mut current = self
            .now
            .duration_trunc(chrono::Duration::hours(1))
            .unwrap_or(self.now)
            + chrono::Duration::hours(1);
        while current < horizon {
            if !blocks(current) {
                return Some(current);
            }
            current += chrono::Duration::hours(1);
        }
        Some(horizon)
    }
}

/// Whether a new revision should join the instance's change now.
///
/// Always when a revision is already rolling out, or something is failing,
/// or the instance lets revisions lead platform upgrades; otherwise only
/// while no platform upgrade is rolling out.
pub fn accept_new_application_version(status: &DeploymentStatus, instance: &InstanceName) -> bool {
    let Some(spec) = status.instance_spec(instance) else {
        return false;
    };
    let Some(current) = status.application().instance(instance) else {
        return false;
    };
    if current.change().revision().is_some() {
        return true;
    }
    if status.has_failures() {
        return true;
    }
    if spec.upgrade_rollout == UpgradeRollout::Leading {
        return true;
    }
    current.change().platform().is_none()
}

/// The part of the instance's change which still has jobs left to run.
pub fn remaining_change(status: &DeploymentStatus, instance: &InstanceName) -> Change {
    let mut change = status.change_of(instance);
    let platform_only = [(instance.clone(), change.clone().without_revision())];
    if status.jobs_to_run_for(&platform_only, false).is_empty() {
        change = change.without_platform();
    }
    let revision_only = [(instance.clone(), change.clone().without_platform())];
    if status.jobs_to_run_for(&revision_only, false).is_empty() {
        change = change.without_revision();
    }
    change
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChangeBlocker, DeploymentSpec, TimeWindow};
    use crate::deployment::run::{Run, RunId};
    use crate::deployment::step::Step;
    use crate::types::{ApplicationVersion, TenantAndApplicationId, ZoneId};
    use chrono::TimeZone;
    use nonempty::NonEmpty;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap()
    }

    fn minutes(m: i64) -> chrono::Duration {
        chrono::Duration::minutes(m)
    }

    fn default() -> InstanceName {
        InstanceName::default_instance()
    }

    fn instance_id() -> ApplicationId {
        ApplicationId::from_names("tenant", "app", "default")
    }

    fn job(job_type: JobType) -> JobId {
        JobId::new(instance_id(), job_type)
    }

    fn linear_spec() -> DeploymentSpec {
        DeploymentSpec::single(vec![
            DeploymentStep::test(),
            DeploymentStep::staging(),
            DeploymentStep::prod("us-east-1"),
            DeploymentStep::Delay(Duration::from_secs(3600)),
            DeploymentStep::prod("us-west-1"),
        ])
    }

    fn application(spec: DeploymentSpec, change: Change) -> Application {
        Application::new(TenantAndApplicationId::from_names("tenant", "app"))
            .with_deployment_spec(spec)
            .with_instance(&default(), |i| i.with_change(change))
    }

    fn version() -> Version {
        Version::new(8, 0, 0)
    }

    fn run_on(job: &JobId, number: u64, versions: Versions, start: DateTime<Utc>, end: DateTime<Utc>, success: bool) -> Run {
        let run = Run::initial(RunId::new(job.clone(), number), versions, start);
        let run = if success {
            run
        } else {
            run.with(RunStatus::DeploymentFailed, Step::DeployReal)
        };
        run.finished(end)
    }

    fn success(job: &JobId, versions: Versions, end: DateTime<Utc>) -> JobStatus {
        JobStatus::new(
            job.clone(),
            vec![run_on(job, 1, versions, end - minutes(5), end, true)],
        )
    }

    fn rev(n: u64) -> ApplicationVersion {
        ApplicationVersion::from_build(n)
    }

    #[test]
    fn fresh_revision_starts_with_tests() {
        let change = Change::of_revision(rev(1));
        let status = DeploymentStatus::new(
            application(linear_spec(), change),
            Vec::new(),
            version(),
            t0(),
        );

        let jobs = status.jobs_to_run();
        let order: Vec<JobType> = jobs.jobs().map(|j| j.job_type.clone()).collect();
        assert_eq!(
            order,
            vec![
                JobType::SystemTest,
                JobType::StagingTest,
                JobType::production("us-east-1"),
                JobType::production("us-west-1"),
            ]
        );

        let ready: Vec<&JobId> = jobs
            .iter()
            .filter(|(_, pending)| pending.iter().any(|p| p.ready_at.is_some_and(|at| at <= t0())))
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ready, vec![&job(JobType::SystemTest), &job(JobType::StagingTest)]);
    }

    #[test]
    fn delay_holds_back_next_production_job() {
        let change = Change::of_revision(rev(1));
        let versions = Versions::new(version(), rev(1), None);
        let tested = t0() + minutes(10);
        let east_done = t0() + minutes(30);
        let app = application(linear_spec(), change.clone()).with_instance(&default(), |i| {
            i.with_deployment(Deployment::new(ZoneId::prod("us-east-1"), rev(1), version(), east_done))
        });
        let east = job(JobType::production("us-east-1"));
        let west = job(JobType::production("us-west-1"));
        let statuses = vec![
            success(&job(JobType::SystemTest), versions.clone(), tested),
            success(&job(JobType::StagingTest), versions.clone(), tested),
            success(&east, versions.clone(), east_done),
        ];
        let status = DeploymentStatus::new(app, statuses, version(), east_done + minutes(1));

        assert_eq!(status.job_completed_at(&east, &change), Some(east_done));
        assert_eq!(
            status.job_ready_at(&west, &change),
            Some(east_done + chrono::Duration::hours(1))
        );
        let jobs = status.jobs_to_run();
        assert_eq!(jobs.jobs().collect::<Vec<_>>(), vec![&west]);
    }

    #[test]
    fn production_waits_for_tests() {
        let change = Change::of_revision(rev(1));
        let versions = Versions::new(version(), rev(1), None);
        let east = job(JobType::production("us-east-1"));

        let untested = DeploymentStatus::new(
            application(linear_spec(), change.clone()),
            vec![success(&job(JobType::SystemTest), versions.clone(), t0())],
            version(),
            t0(),
        );
        assert_eq!(untested.job_ready_at(&east, &change), None);

        let tested = DeploymentStatus::new(
            application(linear_spec(), change.clone()),
            vec![
                success(&job(JobType::SystemTest), versions.clone(), t0()),
                success(&job(JobType::StagingTest), versions.clone(), t0() + minutes(3)),
            ],
            version(),
            t0() + minutes(5),
        );
        assert_eq!(tested.job_ready_at(&east, &change), Some(t0() + minutes(3)));
        assert!(tested.is_tested(&east, &versions));
    }

    #[test]
    fn repeated_failures_cool_down() {
        let change = Change::of_revision(rev(1));
        let versions = Versions::new(version(), rev(1), None);
        let system = job(JobType::SystemTest);
        let runs = JobStatus::new(
            system.clone(),
            vec![
                run_on(&system, 1, versions.clone(), t0(), t0() + minutes(5), false),
                run_on(&system, 2, versions.clone(), t0() + minutes(10), t0() + minutes(25), false),
            ],
        );
        let status = DeploymentStatus::new(
            application(linear_spec(), change.clone()),
            vec![runs],
            version(),
            t0() + minutes(30),
        );
        // 25 + 10 + (25 - 5) / 2
        assert_eq!(status.job_ready_at(&system, &change), Some(t0() + minutes(45)));
        assert!(status.has_failures());
    }

    #[test]
    fn single_failure_retries_immediately() {
        let change = Change::of_revision(rev(1));
        let versions = Versions::new(version(), rev(1), None);
        let system = job(JobType::SystemTest);
        let runs = JobStatus::new(
            system.clone(),
            vec![run_on(&system, 1, versions, t0(), t0() + minutes(5), false)],
        );
        let status = DeploymentStatus::new(
            application(linear_spec(), change.clone()),
            vec![runs],
            version(),
            t0() + minutes(6),
        );
        assert_eq!(status.job_ready_at(&system, &change), Some(t0() + minutes(5)));
    }

    #[test]
    fn paused_job_is_not_ready() {
        let change = Change::of_revision(rev(1));
        let until = t0() + chrono::Duration::hours(2);
        let app = application(linear_spec(), change.clone())
            .with_instance(&default(), |i| i.with_job_pause(JobType::SystemTest, Some(until)));
        let status = DeploymentStatus::new(app, Vec::new(), version(), t0());
        assert_eq!(status.job_ready_at(&job(JobType::SystemTest), &change), Some(until));
    }

    #[test]
    fn change_blockers_hold_back_instance() {
        let blocker = ChangeBlocker {
            revision: true,
            version: false,
            window: TimeWindow {
                days: Vec::new(),
                hours: vec![12, 13],
            },
        };
        let spec = DeploymentSpec::new(NonEmpty::new(
            InstanceSpec::new(default(), vec![DeploymentStep::prod("us-east-1")])
                .with_change_blocker(blocker),
        ));
        let app = application(spec, Change::empty());
        let status = DeploymentStatus::new(app, Vec::new(), version(), t0() + minutes(15));

        let revision = Change::of_revision(rev(1));
        assert_eq!(
            status.instance_ready_at(&default(), &revision),
            Some(t0() + chrono::Duration::hours(2))
        );
        let platform = Change::of_platform(Version::new(8, 1, 0));
        assert_eq!(
            status.instance_ready_at(&default(), &platform),
            Some(DateTime::<Utc>::UNIX_EPOCH)
        );
    }

    #[test]
    fn remaining_change_drops_completed_parts() {
        let change = Change::of_revision(rev(1));
        let versions = Versions::new(version(), rev(1), None);
        let done = t0() + minutes(30);
        let spec = DeploymentSpec::single(vec![DeploymentStep::prod("us-east-1")]);
        let east = job(JobType::production("us-east-1"));
        let app = application(spec.clone(), change.clone()).with_instance(&default(), |i| {
            i.with_deployment(Deployment::new(ZoneId::prod("us-east-1"), rev(1), version(), done))
        });
        let statuses = vec![
            success(&job(JobType::SystemTest), versions.clone(), t0()),
            success(&job(JobType::StagingTest), versions.clone(), t0()),
            success(&east, versions, done),
        ];
        let status = DeploymentStatus::new(app, statuses, version(), done);
        assert_eq!(remaining_change(&status, &default()), Change::empty());

        let pending = DeploymentStatus::new(application(spec, change.clone()), Vec::new(), version(), done);
        assert_eq!(remaining_change(&pending, &default()), change);
        assert_eq!(remaining_change(&pending, &default()), remaining_change(&pending, &default()));
    }

    #[test]
    fn accepts_revisions_unless_platform_is_rolling_out() {
        let spec = DeploymentSpec::single(vec![DeploymentStep::prod("us-east-1")]);
        let idle = DeploymentStatus::new(application(spec.clone(), Change::empty()), Vec::new(), version(), t0());
        assert!(accept_new_application_version(&idle, &default()));

        let upgrading = DeploymentStatus::new(
            application(spec.clone(), Change::of_platform(Version::new(8, 1, 0))),
            Vec::new(),
            version(),
            t0(),
        );
        assert!(!accept_new_application_version(&upgrading, &default()));
        assert!(!accept_new_application_version(&upgrading, &InstanceName::new("other")));

        let leading_spec = DeploymentSpec::new(NonEmpty::new(
            InstanceSpec::new(default(), vec![DeploymentStep::prod("us-east-1")])
                .with_upgrade_rollout(UpgradeRollout::Leading),
        ));
        let leading = DeploymentStatus::new(
            application(leading_spec, Change::of_platform(Version::new(8, 1, 0))),
            Vec::new(),
            version(),
            t0(),
        );
        assert!(accept_new_application_version(&leading, &default()));
    }

    #[test]
    fn accepts_revisions_while_one_is_in_flight_or_something_fails() {
        let spec = DeploymentSpec::single(vec![DeploymentStep::prod("us-east-1")]);
        let upgrade = Change::of_platform(Version::new(8, 1, 0));

        let in_flight = DeploymentStatus::new(
            application(spec.clone(), upgrade.clone().with_revision(rev(1))),
            Vec::new(),
            version(),
            t0(),
        );
        assert!(accept_new_application_version(&in_flight, &default()));

        let system = job(JobType::SystemTest);
        let failing = JobStatus::new(
            system.clone(),
            vec![run_on(
                &system,
                1,
                Versions::new(Version::new(8, 1, 0), rev(1), None),
                t0(),
                t0() + minutes(5),
                false,
            )],
        );
        let broken = DeploymentStatus::new(
            application(spec, upgrade),
            vec![failing],
            version(),
            t0() + minutes(6),
        );
        assert!(broken.has_failures());
        assert!(accept_new_application_version(&broken, &default()));
    }

    #[test]
    fn instances_roll_out_in_sequence() {
        let spec = DeploymentSpec::new(NonEmpty::from((
            InstanceSpec::new(InstanceName::new("beta"), vec![DeploymentStep::prod("us-east-1")]),
            vec![InstanceSpec::new(default(), vec![DeploymentStep::prod("us-east-1")])],
        )));
        let change = Change::of_revision(rev(1));
        let app = Application::new(TenantAndApplicationId::from_names("tenant", "app"))
            .with_deployment_spec(spec)
            .with_instance(&InstanceName::new("beta"), |i| i.with_change(change.clone()))
            .with_instance(&default(), |i| i.with_change(change.clone()));
        let beta_id = ApplicationId::from_names("tenant", "app", "beta");
        let versions = Versions::new(version(), rev(1), None);
        let statuses = vec![
            success(&JobId::new(beta_id.clone(), JobType::SystemTest), versions.clone(), t0()),
            success(&JobId::new(beta_id.clone(), JobType::StagingTest), versions.clone(), t0()),
        ];
        let status = DeploymentStatus::new(app, statuses, version(), t0() + minutes(1));

        let beta_east = JobId::new(beta_id, JobType::production("us-east-1"));
        assert_eq!(status.job_ready_at(&beta_east, &change), Some(t0()));
        assert_eq!(status.instance_ready_at(&default(), &change), None);
        assert_eq!(status.job_ready_at(&job(JobType::production("us-east-1")), &change), None);
    }
}
