// ABOUTME: Known revisions of an application: production builds and per-job dev builds.
// ABOUTME: Supports trimming old revisions and skipping resubmitted identical bundles.

use std::collections::BTreeMap;

use crate::types::{ApplicationVersion, JobId, RevisionId};

/// Production revisions are ordered by build number for the whole application;
/// development revisions are kept per job that deployed them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevisionHistory {
    production: BTreeMap<RevisionId, ApplicationVersion>,
    development: BTreeMap<JobId, BTreeMap<RevisionId, ApplicationVersion>>,
}

impl RevisionHistory {
    pub fn empty() -> Self {
        Self::default()
    }

    /// This history with the given revision added.
    ///
    /// A production revision whose bundle hash equals that of the latest
    /// production revision is recorded as skipped, since it has nothing new
    /// to roll out.
    pub fn with(mut self, revision: ApplicationVersion) -> Self {
        match revision.id.job.clone() {
            None => {
                let duplicate = match (self.last(), &revision.bundle_hash) {
                    (Some(last), Some(hash)) => {
                        last.id != revision.id && last.bundle_hash.as_ref() == Some(hash)
                    }
                    _ => false,
                };
                let revision = if duplicate {
                    tracing::debug!("{} has the same bundle as its predecessor, skipping it", revision);
                    revision.skipped()
                } else {
                    revision
                };
                self.production.insert(revision.id.clone(), revision);
            }
            Some(job) => {
                self.development
                    .entry(job)
                    .or_default()
                    .insert(revision.id.clone(), revision);
            }
        }
        self
    }

    /// This history with production revisions older than `id` removed.
    pub fn without_older_than(mut self, id: &RevisionId) -> Self {
        self.production = self.production.split_off(id);
        self
    }

    /// This history with development revisions of `job` older than `id` removed.
    pub fn without_older_than_for_job(mut self, job: &JobId, id: &RevisionId) -> Self {
        if let Some(revisions) = self.development.get_mut(job) {
            *revisions = revisions.split_off(id);
            if revisions.is_empty() {
                self.development.remove(job);
            }
        }
        self
    }

    /// Production revisions, oldest first.
    pub fn production(&self) -> impl Iterator<Item = &ApplicationVersion> {
        self.production.values()
    }

    /// Development revisions deployed by `job`, oldest first.
    pub fn development(&self, job: &JobId) -> impl Iterator<Item = &ApplicationVersion> {
        self.development.get(job).into_iter().flat_map(|r| r.values())
    }

    /// The latest production revision.
    pub fn last(&self) -> Option<&ApplicationVersion> {
        self.production.values().next_back()
    }

    /// The latest production revision which should be deployed.
    pub fn last_deployable(&self) -> Option<&ApplicationVersion> {
        self.production.values().rev().find(|r| r.is_deployable())
    }

    pub fn get(&self, id: &RevisionId) -> Option<&ApplicationVersion> {
        match &id.job {
            None => self.production.get(id),
            Some(job) => self.development.get(job).and_then(|r| r.get(id)),
        }
    }
}
