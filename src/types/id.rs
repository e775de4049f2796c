// ABOUTME: Phantom-typed names for tenants, applications, instances and regions.
// ABOUTME: Prevents accidental swapping of names that share a string representation.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use thiserror::Error;

/// Marker types for phantom type parameters.
/// Using empty enums prevents instantiation and requires no trait bounds.
pub enum TenantMarker {}
pub enum ApplicationMarker {}
pub enum InstanceMarker {}
pub enum RegionMarker {}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("name cannot be empty")]
    Empty,

    #[error("name exceeds maximum length of 63 characters")]
    TooLong,

    #[error("name must start with a lowercase letter")]
    InvalidStart,

    #[error("invalid character in name: '{0}'")]
    InvalidChar(char),
}

/// A type-safe name that prevents accidental mixing of different name kinds.
///
/// An `InstanceName` can't be passed where a `RegionName` is expected, even
/// though both are plain strings underneath.
#[must_use = "names identify deployment entities and should not be ignored"]
pub struct Id<T> {
    value: String,
    _marker: PhantomData<T>,
}

impl<T> Id<T> {
    /// Wrap a name without validation.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    /// Parse and validate a name: lowercase letter first, then lowercase
    /// alphanumerics, hyphens or underscores.
    pub fn parse(value: &str) -> Result<Self, NameError> {
        let value = value.trim();
        let mut chars = value.chars();
        let first = chars.next().ok_or(NameError::Empty)?;
        if value.len() > 63 {
            return Err(NameError::TooLong);
        }
        if !first.is_ascii_lowercase() {
            return Err(NameError::InvalidStart);
        }
        if let Some(c) = chars
            .find(|c| !c.is_ascii_lowercase() && !c.is_ascii_digit() && *c != '-' && *c != '_')
        {
            return Err(NameError::InvalidChar(c));
        }
        Ok(Self::new(value))
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_inner(self) -> String {
        self.value
    }
}

impl InstanceName {
    /// The instance used when a deployment spec doesn't name one.
    pub fn default_instance() -> Self {
        Self::new("default")
    }
}

// Manual trait implementations that don't require T to implement the trait.
// This is necessary because T is only used as a phantom type marker.

impl<T> std::fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Id").field(&self.value).finish()
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> std::fmt::Display for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(serde::de::Error::custom)
    }
}

pub type TenantName = Id<TenantMarker>;
pub type ApplicationName = Id<ApplicationMarker>;
pub type InstanceName = Id<InstanceMarker>;
pub type RegionName = Id<RegionMarker>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_names() {
        assert_eq!(RegionName::parse("us-east-3").unwrap().as_str(), "us-east-3");
        assert_eq!(InstanceName::parse(" beta_1 ").unwrap().as_str(), "beta_1");
    }

    #[test]
    fn rejects_invalid_names() {
        assert_eq!(TenantName::parse(""), Err(NameError::Empty));
        assert_eq!(TenantName::parse("1tenant"), Err(NameError::InvalidStart));
        assert_eq!(TenantName::parse("Tenant"), Err(NameError::InvalidStart));
        assert_eq!(TenantName::parse("ten.ant"), Err(NameError::InvalidChar('.')));
        assert_eq!(TenantName::parse(&"a".repeat(64)), Err(NameError::TooLong));
    }

    #[test]
    fn names_order_lexically() {
        let mut names = vec![RegionName::new("us-west-1"), RegionName::new("eu-west-1")];
        names.sort();
        assert_eq!(names[0].as_str(), "eu-west-1");
    }
}
