// ABOUTME: Chainable, filterable view over runs.
// ABOUTME: Filters return new lists; not() inverts the next filter only.

use super::job_status::JobStatus;
use super::run::{Run, RunStatus};
use super::versions::Versions;

#[derive(Debug, Clone, Default)]
pub struct RunList<'a> {
    runs: Vec<&'a Run>,
    negate: bool,
}

impl<'a> RunList<'a> {
    pub fn from(runs: impl IntoIterator<Item = &'a Run>) -> Self {
        Self {
            runs: runs.into_iter().collect(),
            negate: false,
        }
    }

    /// All runs of the given job, oldest first.
    pub fn of(job: &'a JobStatus) -> Self {
        Self::from(job.runs())
    }

    /// Inverts the next filter applied to this list.
    pub fn not(self) -> Self {
        Self {
            negate: !self.negate,
            ..self
        }
    }

    pub fn matching(self, predicate: impl Fn(&Run) -> bool) -> Self {
        let negate = self.negate;
        Self {
            runs: self
                .runs
                .into_iter()
                .filter(|run| predicate(run) != negate)
                .collect(),
            negate: false,
        }
    }

    pub fn status(self, status: RunStatus) -> Self {
        self.matching(|run| run.status() == status)
    }

    /// Runs whose targets match those of `versions`.
    pub fn on(self, versions: &Versions) -> Self {
        self.matching(|run| run.versions().targets_match(versions))
    }

    pub fn failing(self) -> Self {
        self.matching(|run| run.has_failed())
    }

    pub fn ended(self) -> Self {
        self.matching(|run| run.has_ended())
    }

    pub fn first(&self) -> Option<&'a Run> {
        self.runs.first().copied()
    }

    pub fn last(&self) -> Option<&'a Run> {
        self.runs.last().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Run> + '_ {
        self.runs.iter().copied()
    }

    pub fn as_list(&self) -> Vec<&'a Run> {
        self.runs.clone()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}
