// ABOUTME: Application revisions produced by builds and submitted for rollout.
// ABOUTME: Revisions are identified and ordered by their build number alone.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::job_type::JobId;
use super::version::Version;

/// Identifies a revision: production revisions are global to the application,
/// development revisions are scoped to the job they were deployed by.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RevisionId {
    pub number: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<JobId>,
}

impl RevisionId {
    pub fn production(number: u64) -> Self {
        Self { number, job: None }
    }

    pub fn development(number: u64, job: JobId) -> Self {
        Self {
            number,
            job: Some(job),
        }
    }

    pub fn is_production(&self) -> bool {
        self.job.is_none()
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.job {
            None => write!(f, "build {}", self.number),
            Some(job) => write!(f, "dev build {} for {}", self.number, job),
        }
    }
}

/// Where a revision was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRevision {
    pub repository: String,
    pub branch: String,
    pub commit: String,
}

/// A built application package.
///
/// Equality, hashing and ordering only consider the [`RevisionId`], so a
/// revision marked as skipped is still the same revision.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationVersion {
    pub id: RevisionId,
    pub source: Option<SourceRevision>,
    pub compile_version: Option<Version>,
    pub build_time: Option<DateTime<Utc>>,
    pub bundle_hash: Option<String>,
    pub skipped: bool,
}

impl ApplicationVersion {
    /// A production revision with the given build number and nothing else known.
    pub fn from_build(number: u64) -> Self {
        Self {
            id: RevisionId::production(number),
            source: None,
            compile_version: None,
            build_time: None,
            bundle_hash: None,
            skipped: false,
        }
    }

    /// Placeholder for applications that have never submitted anything.
    pub fn unknown() -> Self {
        Self::from_build(0)
    }

    pub fn is_unknown(&self) -> bool {
        self.id.number == 0 && self.id.is_production()
    }

    pub fn with_bundle_hash(mut self, hash: impl Into<String>) -> Self {
        self.bundle_hash = Some(hash.into());
        self
    }

    pub fn with_source(mut self, source: SourceRevision) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_compile_version(mut self, version: Version) -> Self {
        self.compile_version = Some(version);
        self
    }

    pub fn built_at(mut self, at: DateTime<Utc>) -> Self {
        self.build_time = Some(at);
        self
    }

    /// This revision, marked as not worth deploying.
    pub fn skipped(mut self) -> Self {
        self.skipped = true;
        self
    }

    pub fn is_deployable(&self) -> bool {
        !self.skipped
    }
}

impl PartialEq for ApplicationVersion {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ApplicationVersion {}

impl Hash for ApplicationVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for ApplicationVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ApplicationVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for ApplicationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            return write!(f, "unknown");
        }
        write!(f, "{}", self.id)?;
        if let Some(source) = &self.source {
            write!(f, " ({})", source.commit)?;
        }
        Ok(())
    }
}
