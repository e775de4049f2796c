// ABOUTME: Environments and zones an application can be deployed to.
// ABOUTME: A zone is an environment in a region, e.g. prod.us-east-1.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::id::RegionName;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Test,
    Staging,
    Prod,
    Dev,
    Perf,
}

impl Environment {
    /// Whether this environment verifies changes before production.
    pub fn is_test(&self) -> bool {
        matches!(self, Environment::Test | Environment::Staging)
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Prod)
    }

    /// Whether deployments here are made by users rather than the pipeline.
    pub fn is_manually_deployed(&self) -> bool {
        matches!(self, Environment::Dev | Environment::Perf)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Test => "test",
            Environment::Staging => "staging",
            Environment::Prod => "prod",
            Environment::Dev => "dev",
            Environment::Perf => "perf",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "test" => Ok(Environment::Test),
            "staging" => Ok(Environment::Staging),
            "prod" => Ok(Environment::Prod),
            "dev" => Ok(Environment::Dev),
            "perf" => Ok(Environment::Perf),
            other => Err(format!("unknown environment: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ZoneId {
    pub environment: Environment,
    pub region: RegionName,
}

impl ZoneId {
    pub fn new(environment: Environment, region: RegionName) -> Self {
        Self {
            environment,
            region,
        }
    }

    pub fn prod(region: &str) -> Self {
        Self::new(Environment::Prod, RegionName::new(region))
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.environment, self.region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_classes() {
        assert!(Environment::Test.is_test());
        assert!(Environment::Staging.is_test());
        assert!(!Environment::Prod.is_test());
        assert!(Environment::Prod.is_production());
        assert!(Environment::Dev.is_manually_deployed());
        assert!(Environment::Perf.is_manually_deployed());
    }

    #[test]
    fn parses_and_displays_environment() {
        for environment in [
            Environment::Test,
            Environment::Staging,
            Environment::Prod,
            Environment::Dev,
            Environment::Perf,
        ] {
            assert_eq!(environment.to_string().parse::<Environment>(), Ok(environment));
        }
        assert!("qa".parse::<Environment>().is_err());
    }

    #[test]
    fn zone_display() {
        assert_eq!(ZoneId::prod("us-east-1").to_string(), "prod.us-east-1");
    }
}
