// ABOUTME: Deployment state and the decisions made on it: changes, runs, job status and triggering.
// ABOUTME: Values here are immutable; updates produce new values which are stored under a lock.

mod application;
mod change;
mod deployment_status;
mod deployment_steps;
mod error;
mod job_list;
mod job_profile;
mod job_status;
mod revision_history;
mod run;
mod run_list;
mod step;
mod trigger;
mod versions;

pub use application::{Application, Deployment, Instance};
pub use change::Change;
pub use deployment_status::{
    DeploymentStatus, JobsToRun, PendingJob, accept_new_application_version, remaining_change,
};
pub use deployment_steps::DeploymentSteps;
pub use error::TriggerError;
pub use job_list::{JobList, RunFilter};
pub use job_profile::JobProfile;
pub use job_status::JobStatus;
pub use revision_history::RevisionHistory;
pub use run::{Run, RunId, RunStatus};
pub use run_list::RunList;
pub use step::{Step, StepStatus};
pub use trigger::{ChangesToCancel, DeploymentTrigger, Job, RetriggerEntry};
pub use versions::Versions;
