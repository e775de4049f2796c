// ABOUTME: Job types of a deployment pipeline and the ids of recurring jobs.
// ABOUTME: A job is one pipeline stage of one application instance.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use super::application_id::ApplicationId;
use super::id::RegionName;
use super::zone::{Environment, ZoneId};

/// A pipeline stage. Production jobs are one per region.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobType {
    /// Builds the application package; owned by a build system, never by this core.
    Component,
    SystemTest,
    StagingTest,
    Production(RegionName),
}

impl JobType {
    pub fn production(region: &str) -> Self {
        JobType::Production(RegionName::new(region))
    }

    /// The environment this job deploys to, if it deploys at all.
    pub fn environment(&self) -> Option<Environment> {
        match self {
            JobType::Component => None,
            JobType::SystemTest => Some(Environment::Test),
            JobType::StagingTest => Some(Environment::Staging),
            JobType::Production(_) => Some(Environment::Prod),
        }
    }

    /// Whether this job runs in a capacity-constrained test environment.
    pub fn is_test(&self) -> bool {
        matches!(self, JobType::SystemTest | JobType::StagingTest)
    }

    pub fn is_production(&self) -> bool {
        matches!(self, JobType::Production(_))
    }

    pub fn is_deployment(&self) -> bool {
        !matches!(self, JobType::Component)
    }

    /// The production zone of this job, if it is a production job.
    pub fn production_zone(&self) -> Option<ZoneId> {
        match self {
            JobType::Production(region) => Some(ZoneId::new(Environment::Prod, region.clone())),
            _ => None,
        }
    }

    pub fn job_name(&self) -> String {
        match self {
            JobType::Component => "component".to_string(),
            JobType::SystemTest => "system-test".to_string(),
            JobType::StagingTest => "staging-test".to_string(),
            JobType::Production(region) => format!("production-{}", region),
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.job_name())
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "component" => Ok(JobType::Component),
            "system-test" => Ok(JobType::SystemTest),
            "staging-test" => Ok(JobType::StagingTest),
            s if s.starts_with("production-") => {
                let region = &s["production-".len()..];
                RegionName::parse(region)
                    .map(JobType::Production)
                    .map_err(|e| format!("invalid region in job name '{}': {}", s, e))
            }
            _ => Err(format!("unknown job type: {}", s)),
        }
    }
}

impl Serialize for JobType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.job_name().serialize(serializer)
    }
}

/// Identifies one recurring job: a pipeline stage of an application instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct JobId {
    pub application: ApplicationId,
    pub job_type: JobType,
}

impl JobId {
    pub fn new(application: ApplicationId, job_type: JobType) -> Self {
        Self {
            application,
            job_type,
        }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {}", self.job_type, self.application)
    }
}
