// ABOUTME: Controller configuration and declared deployment topologies.
// ABOUTME: Handles YAML parsing, defaults and config file discovery.

mod change_blocker;
mod deployment_spec;
mod deserialize;

pub use change_blocker::{ChangeBlocker, TimeWindow};
pub use deployment_spec::{
    DeclaredZone, DeploymentSpec, DeploymentStep, InstanceSpec, UpgradeRollout,
};

use crate::error::{Error, Result};
use crate::types::{Environment, JobType, RegionName, Version, ZoneId};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "waypoint.yml";
pub const CONFIG_FILENAME_ALT: &str = "waypoint.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".waypoint/config.yml";

/// Settings for the orchestration engine, passed explicitly to the trigger,
/// the job controller and the step runner.
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    /// Longest a job may be paused by an operator.
    #[serde(default = "default_max_pause", with = "humantime_serde")]
    pub max_pause: Duration,

    /// Attempts made to hand a job to an external build service.
    #[serde(default = "default_trigger_attempts")]
    pub trigger_attempts: u32,

    /// Trigger groups processed concurrently in one pass.
    #[serde(default = "default_trigger_workers")]
    pub trigger_workers: usize,

    /// Queued jobs handed out per call, per capacity-constrained job type.
    #[serde(default = "default_test_capacity")]
    pub test_capacity: usize,

    /// Platform version used when nothing else determines one.
    #[serde(default = "default_system_version")]
    pub system_version: Version,

    /// How long an installation may take before the run fails.
    #[serde(default = "default_install_timeout", with = "humantime_serde")]
    pub install_timeout: Duration,

    /// How long a test deployment may wait for capacity before the run fails.
    #[serde(default = "default_capacity_timeout", with = "humantime_serde")]
    pub capacity_timeout: Duration,

    /// Cadence of the orchestration loop.
    #[serde(default = "default_trigger_interval", with = "humantime_serde")]
    pub trigger_interval: Duration,

    #[serde(default)]
    pub zones: ZonesConfig,
}

/// Regions hosting the shared test and staging zones.
#[derive(Debug, Clone, Deserialize)]
pub struct ZonesConfig {
    #[serde(default = "default_region")]
    pub test_region: RegionName,

    #[serde(default = "default_region")]
    pub staging_region: RegionName,
}

impl Default for ZonesConfig {
    fn default() -> Self {
        Self {
            test_region: default_region(),
            staging_region: default_region(),
        }
    }
}

impl ZonesConfig {
    /// The zone a job deploys to.
    pub fn zone_of(&self, job: &JobType) -> Option<ZoneId> {
        match job {
            JobType::Component => None,
            JobType::SystemTest => Some(ZoneId::new(Environment::Test, self.test_region.clone())),
            JobType::StagingTest => Some(ZoneId::new(
                Environment::Staging,
                self.staging_region.clone(),
            )),
            JobType::Production(_) => job.production_zone(),
        }
    }
}

fn default_max_pause() -> Duration {
    Duration::from_secs(3 * 24 * 60 * 60)
}

fn default_trigger_attempts() -> u32 {
    5
}

fn default_trigger_workers() -> usize {
    8
}

fn default_test_capacity() -> usize {
    1
}

fn default_system_version() -> Version {
    Version::new(8, 0, 0)
}

fn default_install_timeout() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_capacity_timeout() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_trigger_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_region() -> RegionName {
    RegionName::new("default")
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_pause: default_max_pause(),
            trigger_attempts: default_trigger_attempts(),
            trigger_workers: default_trigger_workers(),
            test_capacity: default_test_capacity(),
            system_version: default_system_version(),
            install_timeout: default_install_timeout(),
            capacity_timeout: default_capacity_timeout(),
            trigger_interval: default_trigger_interval(),
            zones: ZonesConfig::default(),
        }
    }
}

impl ControllerConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ControllerConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    fn validate(&self) -> Result<()> {
        if self.trigger_attempts == 0 {
            return Err(Error::InvalidConfig(
                "trigger_attempts must be at least 1".to_string(),
            ));
        }
        if self.trigger_workers == 0 {
            return Err(Error::InvalidConfig(
                "trigger_workers must be at least 1".to_string(),
            ));
        }
        if self.test_capacity == 0 {
            return Err(Error::InvalidConfig(
                "test_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
