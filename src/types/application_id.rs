// ABOUTME: Identifiers for applications and their instances.
// ABOUTME: Parses the dotted "tenant.application[.instance]" form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::id::{ApplicationName, InstanceName, NameError, TenantName};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseApplicationIdError {
    #[error("expected 'tenant.application' or 'tenant.application.instance', got '{0}'")]
    InvalidFormat(String),

    #[error("invalid name in '{id}': {source}")]
    InvalidName { id: String, source: NameError },
}

/// An application, independent of its instances.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TenantAndApplicationId {
    pub tenant: TenantName,
    pub application: ApplicationName,
}

impl TenantAndApplicationId {
    pub fn new(tenant: TenantName, application: ApplicationName) -> Self {
        Self {
            tenant,
            application,
        }
    }

    /// Shorthand for tests and fixtures; names are not validated.
    pub fn from_names(tenant: &str, application: &str) -> Self {
        Self::new(TenantName::new(tenant), ApplicationName::new(application))
    }

    /// The id of the given instance of this application.
    pub fn instance(&self, instance: InstanceName) -> ApplicationId {
        ApplicationId {
            tenant: self.tenant.clone(),
            application: self.application.clone(),
            instance,
        }
    }

    pub fn default_instance(&self) -> ApplicationId {
        self.instance(InstanceName::default_instance())
    }
}

impl From<&ApplicationId> for TenantAndApplicationId {
    fn from(id: &ApplicationId) -> Self {
        Self::new(id.tenant.clone(), id.application.clone())
    }
}

impl fmt::Display for TenantAndApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.tenant, self.application)
    }
}

impl FromStr for TenantAndApplicationId {
    type Err = ParseApplicationIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        match parts.as_slice() {
            [tenant, application] => Ok(Self::new(
                name(s, tenant, TenantName::parse)?,
                name(s, application, ApplicationName::parse)?,
            )),
            _ => Err(ParseApplicationIdError::InvalidFormat(s.to_string())),
        }
    }
}

/// One instance of an application: the unit that owns a `Change` and jobs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApplicationId {
    pub tenant: TenantName,
    pub application: ApplicationName,
    pub instance: InstanceName,
}

impl ApplicationId {
    /// Shorthand for tests and fixtures; names are not validated.
    pub fn from_names(tenant: &str, application: &str, instance: &str) -> Self {
        Self {
            tenant: TenantName::new(tenant),
            application: ApplicationName::new(application),
            instance: InstanceName::new(instance),
        }
    }

    pub fn application(&self) -> TenantAndApplicationId {
        TenantAndApplicationId::from(self)
    }

    /// The throwaway tester application which verifies this instance.
    pub fn tester(&self) -> ApplicationId {
        Self {
            tenant: self.tenant.clone(),
            application: self.application.clone(),
            instance: InstanceName::new(format!("{}-t", self.instance)),
        }
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.tenant, self.application, self.instance)
    }
}

impl FromStr for ApplicationId {
    type Err = ParseApplicationIdError;

    /// Parses "tenant.application.instance", or "tenant.application" for the
    /// default instance.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        match parts.as_slice() {
            [_, _] => Ok(s.parse::<TenantAndApplicationId>()?.default_instance()),
            [tenant, application, instance] => Ok(Self {
                tenant: name(s, tenant, TenantName::parse)?,
                application: name(s, application, ApplicationName::parse)?,
                instance: name(s, instance, InstanceName::parse)?,
            }),
            _ => Err(ParseApplicationIdError::InvalidFormat(s.to_string())),
        }
    }
}

impl Serialize for ApplicationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ApplicationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

fn name<T>(
    id: &str,
    part: &str,
    parse: fn(&str) -> Result<T, NameError>,
) -> Result<T, ParseApplicationIdError> {
    parse(part).map_err(|source| ParseApplicationIdError::InvalidName {
        id: id.to_string(),
        source,
    })
}
