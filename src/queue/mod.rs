// ABOUTME: Hand-off of jobs to build systems: queued jobs and build service sinks.
// ABOUTME: Queues live in the store, behind a lock per job type.

mod build_job;
mod deployment_queue;

pub use build_job::{BuildJob, BuildService, BuildServiceError, BuildState};
pub use deployment_queue::{DeploymentQueue, PolledBuildService};
