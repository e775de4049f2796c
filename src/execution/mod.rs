// ABOUTME: Execution of runs: the job controller, step runners and the collaborators they drive.
// ABOUTME: Collaborator traits are implemented by integrators, or by in-memory doubles.

mod collaborators;
mod error;
mod job_controller;
mod step_runner;

pub use collaborators::{
    ConvergenceReader, ConvergenceSummary, DeployRequest, DeploymentExecutor, ServiceMonitor,
    TesterCloud, TesterStatus,
};
pub use error::{
    ActivationConflictSnafu, ApplicationLockFailureSnafu, CollaboratorError, DeploymentFailure,
    ErrorCode, ExecutionError, InternalSnafu, InvalidPackageSnafu, OutOfCapacitySnafu,
};
pub use job_controller::JobController;
pub use step_runner::{InternalStepRunner, StepOutcome, StepRunner};
