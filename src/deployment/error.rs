// ABOUTME: Error types for orchestration requests.
// ABOUTME: Caller errors surfaced synchronously by the trigger and the status layer.

use std::time::Duration;

use crate::execution::ExecutionError;
use crate::types::{ApplicationId, JobId, TenantAndApplicationId, Version};

/// Errors returned to callers of the orchestration API.
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    /// No application with this id exists.
    #[error("unknown application '{0}'")]
    UnknownApplication(TenantAndApplicationId),

    /// The application exists, but not with this instance.
    #[error("unknown instance '{0}'")]
    UnknownInstance(ApplicationId),

    /// The application has no deployment spec, so it has no pipeline.
    #[error("application '{0}' has no deployment spec")]
    NoDeploymentSpec(TenantAndApplicationId),

    /// A pause was requested for longer than allowed.
    #[error("pause only allowed for up to {} hours", .0.as_secs() / 3600)]
    PauseTooLong(Duration),

    /// Re-triggering requires an earlier run to copy versions from.
    #[error("{0} has never been triggered")]
    NeverTriggered(JobId),

    /// The job is not part of the application's declared pipeline.
    #[error("{0} is not declared in the deployment spec")]
    UndeclaredJob(JobId),

    /// A zone whose environment this core doesn't deploy to.
    #[error("don't know how to deploy to {0}")]
    NotAutomatable(String),

    /// A platform target was requested while the change is pinned.
    #[error("not allowed to set platform version {0} while pinned")]
    Pinned(Version),

    /// Unrecognised cancellation choice.
    #[error("unknown cancellation choice '{0}'")]
    InvalidCancellation(String),

    /// The build service owning the job kept refusing or failing to take it.
    #[error("{0} was not accepted by its build service")]
    NotAccepted(JobId),

    /// Starting or aborting a run failed.
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}
