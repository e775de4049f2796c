// ABOUTME: Declared deployment topology of an application, read from YAML.
// ABOUTME: Instances list ordered zone steps, delays and parallel blocks.

use std::path::Path;
use std::time::Duration;

use nonempty::NonEmpty;
use serde::Deserialize;

use super::change_blocker::ChangeBlocker;
use super::deserialize::{deserialize_instances, deserialize_steps};
use crate::error::{Error, Result};
use crate::types::{Environment, InstanceName, RegionName, ZoneId};

/// A zone declared as a deployment step. Test and staging zones have no region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredZone {
    pub environment: Environment,
    pub region: Option<RegionName>,
}

impl DeclaredZone {
    pub fn new(environment: Environment, region: Option<RegionName>) -> Self {
        Self {
            environment,
            region,
        }
    }

    pub fn prod(region: &str) -> Self {
        Self::new(Environment::Prod, Some(RegionName::new(region)))
    }

    pub fn concerns(&self, environment: Environment) -> bool {
        self.environment == environment
    }

    /// The zone this declaration resolves to, when it names a region.
    pub fn zone(&self) -> Option<ZoneId> {
        self.region
            .as_ref()
            .map(|region| ZoneId::new(self.environment, region.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentStep {
    Zone(DeclaredZone),
    Delay(Duration),
    /// Steps which all start when the previous step completes.
    Parallel(Vec<DeploymentStep>),
}

impl DeploymentStep {
    pub fn prod(region: &str) -> Self {
        DeploymentStep::Zone(DeclaredZone::prod(region))
    }

    pub fn test() -> Self {
        DeploymentStep::Zone(DeclaredZone::new(Environment::Test, None))
    }

    pub fn staging() -> Self {
        DeploymentStep::Zone(DeclaredZone::new(Environment::Staging, None))
    }

    /// All zones declared by this step, in declaration order.
    pub fn zones(&self) -> Vec<&DeclaredZone> {
        match self {
            DeploymentStep::Zone(zone) => vec![zone],
            DeploymentStep::Delay(_) => Vec::new(),
            DeploymentStep::Parallel(steps) => steps.iter().flat_map(|s| s.zones()).collect(),
        }
    }

    pub fn concerns(&self, environment: Environment) -> bool {
        self.zones().iter().any(|zone| zone.concerns(environment))
    }

    /// Whether this step deploys to the given zone.
    pub fn deploys_to(&self, environment: Environment, region: Option<&RegionName>) -> bool {
        self.zones()
            .iter()
            .any(|zone| zone.environment == environment && zone.region.as_ref() == region)
    }
}

/// How a platform upgrade and a new revision relate when both are pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpgradeRollout {
    /// Revisions wait until an ongoing platform upgrade is done.
    #[default]
    Separate,
    /// Revisions join an ongoing platform upgrade.
    Leading,
    Simultaneous,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstanceSpec {
    #[serde(default = "InstanceName::default_instance")]
    pub name: InstanceName,

    #[serde(default, deserialize_with = "deserialize_steps")]
    pub steps: Vec<DeploymentStep>,

    #[serde(default)]
    pub upgrade_rollout: UpgradeRollout,

    #[serde(default)]
    pub change_blockers: Vec<ChangeBlocker>,
}

impl InstanceSpec {
    pub fn new(name: InstanceName, steps: Vec<DeploymentStep>) -> Self {
        Self {
            name,
            steps,
            upgrade_rollout: UpgradeRollout::default(),
            change_blockers: Vec::new(),
        }
    }

    pub fn with_upgrade_rollout(mut self, rollout: UpgradeRollout) -> Self {
        self.upgrade_rollout = rollout;
        self
    }

    pub fn with_change_blocker(mut self, blocker: ChangeBlocker) -> Self {
        self.change_blockers.push(blocker);
        self
    }

    pub fn zones(&self) -> Vec<&DeclaredZone> {
        self.steps.iter().flat_map(|step| step.zones()).collect()
    }

    pub fn concerns(&self, environment: Environment) -> bool {
        self.steps.iter().any(|step| step.concerns(environment))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeploymentSpec {
    #[serde(deserialize_with = "deserialize_instances")]
    pub instances: NonEmpty<InstanceSpec>,
}

impl DeploymentSpec {
    pub fn new(instances: NonEmpty<InstanceSpec>) -> Self {
        Self { instances }
    }

    /// A spec with one default instance running the given steps.
    pub fn single(steps: Vec<DeploymentStep>) -> Self {
        Self::new(NonEmpty::new(InstanceSpec::new(
            InstanceName::default_instance(),
            steps,
        )))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let spec: DeploymentSpec = serde_yaml::from_str(yaml)?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn instance(&self, name: &InstanceName) -> Option<&InstanceSpec> {
        self.instances.iter().find(|instance| &instance.name == name)
    }

    pub fn instance_names(&self) -> Vec<InstanceName> {
        self.instances.iter().map(|i| i.name.clone()).collect()
    }

    fn validate(&self) -> Result<()> {
        for instance in self.instances.iter() {
            let mut regions = std::collections::BTreeSet::new();
            for zone in instance.zones() {
                if let Some(region) = &zone.region
                    && !regions.insert(region.clone())
                {
                    return Err(Error::InvalidDeploymentSpec(format!(
                        "region '{}' is declared more than once in instance '{}'",
                        region, instance.name
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_steps_in_order() {
        let spec = DeploymentSpec::from_yaml(
            r#"
instances:
  - name: default
    steps:
      - test
      - staging
      - prod: us-east-1
      - delay: 1h
      - parallel:
          - prod: us-west-1
          - prod: eu-west-1
"#,
        )
        .unwrap();

        let instance = spec.instances.first();
        assert_eq!(instance.steps.len(), 5);
        assert_eq!(instance.steps[2], DeploymentStep::prod("us-east-1"));
        assert_eq!(
            instance.steps[3],
            DeploymentStep::Delay(Duration::from_secs(3600))
        );
        assert_eq!(instance.zones().len(), 5);
        assert!(instance.concerns(Environment::Prod));
    }

    #[test]
    fn rejects_prod_without_region() {
        let result = DeploymentSpec::from_yaml(
            r#"
instances:
  - steps: [prod]
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_duplicate_regions() {
        let result = DeploymentSpec::from_yaml(
            r#"
instances:
  - steps:
      - prod: us-east-1
      - prod: us-east-1
"#,
        );
        assert!(matches!(result, Err(Error::InvalidDeploymentSpec(_))));
    }

    #[test]
    fn rejects_empty_instance_list() {
        assert!(DeploymentSpec::from_yaml("instances: []").is_err());
    }

    #[test]
    fn defaults_instance_name_and_rollout() {
        let spec = DeploymentSpec::from_yaml(
            r#"
instances:
  - steps: [test]
"#,
        )
        .unwrap();
        let instance = spec.instances.first();
        assert_eq!(instance.name, InstanceName::default_instance());
        assert_eq!(instance.upgrade_rollout, UpgradeRollout::Separate);
    }
}
