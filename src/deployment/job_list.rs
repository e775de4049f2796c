// ABOUTME: Chainable, filterable view over job statuses.
// ABOUTME: Run filters select jobs by properties of one of their summary runs.

use chrono::{DateTime, Utc};

use super::job_status::JobStatus;
use super::run::Run;
use super::versions::Versions;
use crate::types::{InstanceName, JobType, Version};

#[derive(Debug, Clone, Default)]
pub struct JobList<'a> {
    jobs: Vec<&'a JobStatus>,
    negate: bool,
}

impl<'a> JobList<'a> {
    pub fn from(jobs: impl IntoIterator<Item = &'a JobStatus>) -> Self {
        Self {
            jobs: jobs.into_iter().collect(),
            negate: false,
        }
    }

    /// Inverts the next filter applied to this list.
    pub fn not(self) -> Self {
        Self {
            negate: !self.negate,
            ..self
        }
    }

    pub fn matching(self, predicate: impl Fn(&JobStatus) -> bool) -> Self {
        let negate = self.negate;
        Self {
            jobs: self
                .jobs
                .into_iter()
                .filter(|job| predicate(job) != negate)
                .collect(),
            negate: false,
        }
    }

    /// Jobs whose last completed run failed.
    pub fn failing(self) -> Self {
        self.matching(|job| job.last_completed().is_some_and(|run| run.has_failed()))
    }

    /// Failing jobs which most likely broke because of a new revision.
    ///
    /// This is a heuristic: a job counts if it has succeeded before, and the
    /// platform is unchanged between that success and the first failure,
    /// while the revision differs.
    pub fn failing_application_change(self) -> Self {
        self.matching(failing_application_change)
    }

    /// Running jobs which upgrade the platform from that of their last success.
    pub fn upgrading(self) -> Self {
        self.matching(|job| {
            job.is_running()
                && match (job.last_success(), job.last_triggered()) {
                    (Some(success), Some(triggered)) => success
                        .versions()
                        .target_platform()
                        .is_before(triggered.versions().target_platform()),
                    _ => false,
                }
        })
    }

    pub fn out_of_test_capacity(self) -> Self {
        self.matching(|job| job.id().job_type.is_test() && job.is_out_of_capacity())
    }

    pub fn running(self) -> Self {
        self.matching(|job| job.is_running())
    }

    pub fn production(self) -> Self {
        self.matching(|job| job.id().job_type.is_production())
    }

    pub fn test(self) -> Self {
        self.matching(|job| job.id().job_type.is_test())
    }

    pub fn instance(self, instance: &InstanceName) -> Self {
        self.matching(|job| &job.id().application.instance == instance)
    }

    pub fn type_(self, job_type: &JobType) -> Self {
        self.matching(|job| &job.id().job_type == job_type)
    }

    /// Jobs whose last success was on the targets of `versions`.
    pub fn success_on(self, versions: &Versions) -> Self {
        self.last_success().on(versions)
    }

    /// Jobs which were last triggered on the targets of `versions`.
    pub fn triggered_on(self, versions: &Versions) -> Self {
        self.last_triggered().on(versions)
    }

    pub fn last_triggered(self) -> RunFilter<'a> {
        RunFilter::new(self, JobStatus::last_triggered)
    }

    pub fn last_completed(self) -> RunFilter<'a> {
        RunFilter::new(self, JobStatus::last_completed)
    }

    pub fn last_success(self) -> RunFilter<'a> {
        RunFilter::new(self, JobStatus::last_success)
    }

    pub fn first_failing(self) -> RunFilter<'a> {
        RunFilter::new(self, JobStatus::first_failing)
    }

    pub fn first(&self) -> Option<&'a JobStatus> {
        self.jobs.first().copied()
    }

    pub fn get(&self, job_type: &JobType) -> Option<&'a JobStatus> {
        self.jobs
            .iter()
            .copied()
            .find(|job| &job.id().job_type == job_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a JobStatus> + '_ {
        self.jobs.iter().copied()
    }

    pub fn as_list(&self) -> Vec<&'a JobStatus> {
        self.jobs.clone()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

fn failing_application_change(job: &JobStatus) -> bool {
    let (Some(first_failing), Some(last_success)) = (job.first_failing(), job.last_success())
    else {
        return false;
    };
    first_failing.versions().target_platform() == last_success.versions().target_platform()
        && first_failing.versions().target_revision() != last_success.versions().target_revision()
}

type RunSelector = for<'r> fn(&'r JobStatus) -> Option<&'r Run>;

/// Filters jobs on one particular run of each; jobs without that run never match
/// unless negated.
pub struct RunFilter<'a> {
    list: JobList<'a>,
    which: RunSelector,
}

impl<'a> RunFilter<'a> {
    fn new(list: JobList<'a>, which: RunSelector) -> Self {
        Self { list, which }
    }

    pub fn matching(self, predicate: impl Fn(&Run) -> bool) -> JobList<'a> {
        let which = self.which;
        self.list
            .matching(|job| which(job).is_some_and(|run| predicate(run)))
    }

    pub fn is_present(self) -> JobList<'a> {
        self.matching(|_| true)
    }

    pub fn is_missing(self) -> JobList<'a> {
        let which = self.which;
        self.list.matching(|job| which(job).is_none())
    }

    /// Jobs where the run targets the same versions as `versions`.
    pub fn on(self, versions: &Versions) -> JobList<'a> {
        self.matching(|run| run.versions().targets_match(versions))
    }

    pub fn on_platform(self, platform: &Version) -> JobList<'a> {
        self.matching(|run| run.versions().target_platform() == platform)
    }

    pub fn ended_no_later_than(self, at: DateTime<Utc>) -> JobList<'a> {
        self.matching(|run| run.end().is_some_and(|end| end <= at))
    }

    pub fn started_before(self, at: DateTime<Utc>) -> JobList<'a> {
        self.matching(|run| run.start() < at)
    }
}
