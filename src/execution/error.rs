// ABOUTME: Errors from running jobs and from the collaborators which deploy them.
// ABOUTME: Deployment failures carry a kind telling transient conditions from terminal ones.

use snafu::Snafu;

use crate::deployment::RunId;
use crate::types::{JobId, ZoneId};

/// Failure reported by a deployment executor.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DeploymentFailure {
    #[snafu(display("not enough capacity in {zone}: {message}"))]
    OutOfCapacity { zone: ZoneId, message: String },

    #[snafu(display("conflicting activation in {zone}: {message}"))]
    ActivationConflict { zone: ZoneId, message: String },

    #[snafu(display("application lock held in {zone}: {message}"))]
    ApplicationLockFailure { zone: ZoneId, message: String },

    #[snafu(display("invalid application package: {message}"))]
    InvalidPackage { message: String },

    #[snafu(display("deployment to {zone} failed: {message}"))]
    Internal { zone: ZoneId, message: String },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    OutOfCapacity,
    ActivationConflict,
    ApplicationLockFailure,
    InvalidApplicationPackage,
    InternalServerError,
}

impl DeploymentFailure {
    pub fn kind(&self) -> ErrorCode {
        match self {
            DeploymentFailure::OutOfCapacity { .. } => ErrorCode::OutOfCapacity,
            DeploymentFailure::ActivationConflict { .. } => ErrorCode::ActivationConflict,
            DeploymentFailure::ApplicationLockFailure { .. } => ErrorCode::ApplicationLockFailure,
            DeploymentFailure::InvalidPackage { .. } => ErrorCode::InvalidApplicationPackage,
            DeploymentFailure::Internal { .. } => ErrorCode::InternalServerError,
        }
    }
}

/// Failure reported by a tester or convergence collaborator.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("{0} is already running")]
    AlreadyRunning(JobId),

    #[error("{0} not found")]
    UnknownRun(RunId),

    #[error("{0} is not run by this controller")]
    NotAutomatable(JobId),

    #[error("{0} is not run by a build service")]
    NotExternal(RunId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_variants() {
        let zone = ZoneId::prod("us-east-1");
        let failure = OutOfCapacitySnafu {
            zone: zone.clone(),
            message: "no hosts",
        }
        .build();
        assert_eq!(failure.kind(), ErrorCode::OutOfCapacity);
        assert_eq!(failure.to_string(), "not enough capacity in prod.us-east-1: no hosts");

        let failure = InvalidPackageSnafu { message: "bad" }.build();
        assert_eq!(failure.kind(), ErrorCode::InvalidApplicationPackage);
    }
}
