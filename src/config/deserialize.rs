// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Handles weekday and hour lists, instance lists and deployment steps.

use std::time::Duration;

use chrono::Weekday;
use nonempty::NonEmpty;
use serde::Deserialize;

use super::deployment_spec::{DeclaredZone, DeploymentStep, InstanceSpec};
use crate::types::{Environment, RegionName};

pub fn deserialize_weekdays<'de, D>(deserializer: D) -> Result<Vec<Weekday>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values: Vec<String> = Vec::deserialize(deserializer)?;
    values
        .iter()
        .map(|day| {
            day.parse::<Weekday>()
                .map_err(|_| serde::de::Error::custom(format!("invalid weekday: {}", day)))
        })
        .collect()
}

pub fn deserialize_hours<'de, D>(deserializer: D) -> Result<Vec<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values: Vec<u32> = Vec::deserialize(deserializer)?;
    if let Some(hour) = values.iter().find(|hour| **hour > 23) {
        return Err(serde::de::Error::custom(format!(
            "hour must be between 0 and 23, got {}",
            hour
        )));
    }
    Ok(values)
}

pub fn deserialize_instances<'de, D>(deserializer: D) -> Result<NonEmpty<InstanceSpec>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let instances: Vec<InstanceSpec> = Vec::deserialize(deserializer)?;
    let mut seen = std::collections::BTreeSet::new();
    for instance in &instances {
        if !seen.insert(instance.name.clone()) {
            return Err(serde::de::Error::custom(format!(
                "instance '{}' is declared more than once",
                instance.name
            )));
        }
    }
    NonEmpty::from_vec(instances)
        .ok_or_else(|| serde::de::Error::custom("at least one instance is required"))
}

pub fn deserialize_steps<'de, D>(deserializer: D) -> Result<Vec<DeploymentStep>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values: Vec<StepEntry> = Vec::deserialize(deserializer)?;
    values
        .into_iter()
        .map(StepEntry::into_step)
        .collect::<Result<Vec<_>, _>>()
        .map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StepEntry {
    Simple(String),
    Prod {
        prod: String,
    },
    Delay {
        #[serde(with = "humantime_serde")]
        delay: Duration,
    },
    Parallel {
        parallel: Vec<StepEntry>,
    },
}

impl StepEntry {
    fn into_step(self) -> Result<DeploymentStep, String> {
        match self {
            StepEntry::Simple(name) => match name.as_str() {
                "test" => Ok(DeploymentStep::Zone(DeclaredZone::new(Environment::Test, None))),
                "staging" => Ok(DeploymentStep::Zone(DeclaredZone::new(
                    Environment::Staging,
                    None,
                ))),
                "prod" => Err("production steps must name a region, e.g. 'prod: us-east-1'".into()),
                other => Err(format!("unknown deployment step: {}", other)),
            },
            StepEntry::Prod { prod } => {
                let region = RegionName::parse(&prod)
                    .map_err(|e| format!("invalid region '{}': {}", prod, e))?;
                Ok(DeploymentStep::Zone(DeclaredZone::new(
                    Environment::Prod,
                    Some(region),
                )))
            }
            StepEntry::Delay { delay } => Ok(DeploymentStep::Delay(delay)),
            StepEntry::Parallel { parallel } => {
                if parallel.is_empty() {
                    return Err("parallel block cannot be empty".into());
                }
                parallel
                    .into_iter()
                    .map(StepEntry::into_step)
                    .collect::<Result<Vec<_>, _>>()
                    .map(DeploymentStep::Parallel)
            }
        }
    }
}
