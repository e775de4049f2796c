// ABOUTME: History of all runs of one job, with the summary runs derived from it.
// ABOUTME: Derives last triggered, completed and successful runs and the failure streak.

use std::collections::BTreeMap;

use super::run::{Run, RunStatus};
use crate::types::JobId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    id: JobId,
    runs: BTreeMap<u64, Run>,
}

impl JobStatus {
    pub fn new(id: JobId, runs: impl IntoIterator<Item = Run>) -> Self {
        let runs = runs
            .into_iter()
            .map(|run| (run.id().number, run))
            .collect();
        Self { id, runs }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// All runs, oldest first.
    pub fn runs(&self) -> impl DoubleEndedIterator<Item = &Run> {
        self.runs.values()
    }

    pub fn last_triggered(&self) -> Option<&Run> {
        self.runs.values().next_back()
    }

    pub fn last_completed(&self) -> Option<&Run> {
        self.runs.values().rev().find(|run| run.has_ended())
    }

    pub fn last_success(&self) -> Option<&Run> {
        self.runs.values().rev().find(|run| run.has_succeeded())
    }

    /// The first run of the current streak of failed runs, if the job is failing.
    ///
    /// Runs which haven't ended are ignored, so an ongoing run neither breaks
    /// nor extends the streak.
    pub fn first_failing(&self) -> Option<&Run> {
        let mut first = None;
        for run in self.runs.values().rev() {
            if !run.has_ended() {
                continue;
            }
            if !run.has_failed() {
                break;
            }
            first = Some(run);
        }
        first
    }

    pub fn is_running(&self) -> bool {
        self.last_triggered().is_some_and(|run| !run.has_ended())
    }

    pub fn is_success(&self) -> bool {
        self.last_completed().is_some_and(|run| run.has_succeeded())
    }

    pub fn is_out_of_capacity(&self) -> bool {
        self.last_completed()
            .is_some_and(|run| run.status() == RunStatus::OutOfCapacity)
    }
}
