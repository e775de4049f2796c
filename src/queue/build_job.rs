// ABOUTME: A job handed to a build service, and the services which accept them.
// ABOUTME: External build services own some applications' jobs; the rest run internally.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::types::JobId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BuildJob {
    pub job: JobId,
    pub project_id: u64,
}

impl BuildJob {
    pub fn new(job: JobId, project_id: u64) -> Self {
        Self { job, project_id }
    }
}

impl fmt::Display for BuildJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (project {})", self.job, self.project_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildState {
    Idle,
    Running,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildServiceError {
    #[error("build service unavailable: {0}")]
    Unavailable(String),

    #[error("build service rejected {job}: {message}")]
    Rejected { job: BuildJob, message: String },
}

/// A sink for jobs, owned by some system which builds and runs them.
#[async_trait]
pub trait BuildService: Send + Sync {
    /// Hands the job over; `false` if the service declined it.
    async fn trigger(&self, job: &BuildJob) -> Result<bool, BuildServiceError>;

    async fn state_of(&self, job: &BuildJob) -> Result<BuildState, BuildServiceError>;

    /// Whether this service is the one running the given job.
    fn builds(&self, job: &BuildJob) -> bool;
}
