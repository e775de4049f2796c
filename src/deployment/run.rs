// ABOUTME: One execution attempt of a job: step statuses, versions and timing.
// ABOUTME: Immutable; transitions return new values and ended runs can't change.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::job_profile::JobProfile;
use super::step::{Step, StepStatus};
use super::versions::Versions;
use crate::types::JobId;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RunId {
    pub job: JobId,
    pub number: u64,
}

impl RunId {
    pub fn new(job: JobId, number: u64) -> Self {
        Self { job, number }
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run {} of {}", self.number, self.job)
    }
}

/// Overall state of a run; anything but `Running` and `Success` is a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    Running,
    /// No capacity was available in a test zone.
    OutOfCapacity,
    DeploymentFailed,
    InstallationFailed,
    TestFailure,
    /// An unexpected error in the job machinery.
    Error,
    Aborted,
    Success,
}

impl RunStatus {
    pub fn is_failure(&self) -> bool {
        !matches!(self, RunStatus::Running | RunStatus::Success)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStatus::Running => "running",
            RunStatus::OutOfCapacity => "out of capacity",
            RunStatus::DeploymentFailed => "deployment failed",
            RunStatus::InstallationFailed => "installation failed",
            RunStatus::TestFailure => "test failure",
            RunStatus::Error => "error",
            RunStatus::Aborted => "aborted",
            RunStatus::Success => "success",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Run {
    id: RunId,
    steps: BTreeMap<Step, StepStatus>,
    versions: Versions,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    status: RunStatus,
    aborted: bool,
    /// Run by an external build service, which reports its outcome.
    external: bool,
    ready_since: BTreeMap<Step, DateTime<Utc>>,
}

impl Run {
    /// A new run with every step of its job's profile unfinished.
    ///
    /// # Panics
    ///
    /// If the job has no profile.
    pub fn initial(id: RunId, versions: Versions, now: DateTime<Utc>) -> Self {
        let profile = JobProfile::of(&id.job.job_type);
        assert!(profile.is_some(), "{} has no step profile", id.job);
        let steps = profile
            .map(|p| p.steps())
            .unwrap_or_default()
            .iter()
            .map(|step| (*step, StepStatus::Unfinished))
            .collect();
        Self {
            id,
            steps,
            versions,
            start: now,
            end: None,
            status: RunStatus::Running,
            aborted: false,
            external: false,
            ready_since: BTreeMap::new(),
        }
    }

    /// This run handed to an external build service; its steps are not run here.
    pub fn external(mut self) -> Self {
        self.external = true;
        self
    }

    /// This run with `now` recorded as the time the given steps became ready,
    /// for those not already ready before.
    pub fn with_ready(mut self, steps: &[Step], now: DateTime<Utc>) -> Self {
        self.require_active();
        for step in steps {
            self.ready_since.entry(*step).or_insert(now);
        }
        self
    }

    /// This run with `step` completed: succeeded if `status` is `Running`, failed otherwise.
    /// The first failure becomes the status of the run.
    ///
    /// # Panics
    ///
    /// If the run has ended, or `step` isn't part of it.
    pub fn with(mut self, status: RunStatus, step: Step) -> Self {
        self.require_active();
        assert!(
            self.steps.contains_key(&step),
            "{} is not a step of {}",
            step,
            self.id
        );
        let step_status = if status == RunStatus::Running {
            StepStatus::Succeeded
        } else {
            StepStatus::Failed
        };
        self.steps.insert(step, step_status);
        if self.status == RunStatus::Running {
            self.status = status;
        }
        self
    }

    /// This run marked as failed with `status`, without touching its steps.
    pub fn with_failure(mut self, status: RunStatus) -> Self {
        self.require_active();
        if self.status == RunStatus::Running {
            self.status = status;
        }
        self
    }

    /// This run ended at `now`; a run still running becomes a success.
    pub fn finished(mut self, now: DateTime<Utc>) -> Self {
        self.require_active();
        self.end = Some(now);
        if self.status == RunStatus::Running {
            self.status = RunStatus::Success;
        }
        self
    }

    /// This run aborted. Only always-run steps remain to be run before it ends.
    pub fn aborted(mut self) -> Self {
        self.require_active();
        self.status = RunStatus::Aborted;
        self.aborted = true;
        self
    }

    fn require_active(&self) {
        assert!(!self.has_ended(), "{} has already ended", self.id);
    }

    pub fn id(&self) -> &RunId {
        &self.id
    }

    pub fn versions(&self) -> &Versions {
        &self.versions
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn steps(&self) -> &BTreeMap<Step, StepStatus> {
        &self.steps
    }

    pub fn step_status(&self, step: Step) -> Option<StepStatus> {
        self.steps.get(&step).copied()
    }

    pub fn has_ended(&self) -> bool {
        self.end.is_some()
    }

    pub fn has_failed(&self) -> bool {
        self.aborted
            || self.status.is_failure()
            || self.steps.values().any(|s| *s == StepStatus::Failed)
    }

    pub fn has_succeeded(&self) -> bool {
        self.has_ended() && !self.has_failed()
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn is_external(&self) -> bool {
        self.external
    }

    /// When the step first became ready, or the start of the run if not recorded.
    pub fn ready_since(&self, step: Step) -> DateTime<Utc> {
        self.ready_since.get(&step).copied().unwrap_or(self.start)
    }

    pub fn is_out_of_capacity(&self) -> bool {
        self.status == RunStatus::OutOfCapacity
    }

    /// Steps which may run now.
    ///
    /// While the run is healthy, these are the unfinished steps whose
    /// prerequisites have all succeeded. Once it has failed, only unfinished
    /// always-run steps remain, and they wait until their always-run
    /// prerequisites are no longer unfinished.
    pub fn ready_steps(&self) -> Vec<Step> {
        if self.has_failed() {
            self.forced_steps()
        } else {
            self.normal_steps()
        }
    }

    fn normal_steps(&self) -> Vec<Step> {
        self.unfinished()
            .filter(|step| {
                step.prerequisites()
                    .iter()
                    .filter_map(|p| self.steps.get(p))
                    .all(|status| *status == StepStatus::Succeeded)
            })
            .collect()
    }

    fn forced_steps(&self) -> Vec<Step> {
        let Some(profile) = JobProfile::of(&self.id.job.job_type) else {
            return Vec::new();
        };
        self.unfinished()
            .filter(|step| profile.is_always_run(*step))
            .filter(|step| {
                step.prerequisites()
                    .iter()
                    .filter(|p| profile.is_always_run(**p))
                    .filter_map(|p| self.steps.get(p))
                    .all(|status| *status != StepStatus::Unfinished)
            })
            .collect()
    }

    fn unfinished(&self) -> impl Iterator<Item = Step> + '_ {
        self.steps
            .iter()
            .filter(|(_, status)| **status == StepStatus::Unfinished)
            .map(|(step, _)| *step)
    }
}
