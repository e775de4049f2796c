// ABOUTME: Declared rollout intent of an instance: a platform and/or revision target.
// ABOUTME: Immutable; every modification returns a new Change.

use std::fmt;

use serde::Serialize;

use super::error::TriggerError;
use crate::types::{ApplicationVersion, Version};

/// What an instance should roll out. An empty change means nothing is desired.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Change {
    platform: Option<Version>,
    revision: Option<ApplicationVersion>,
    pinned: bool,
}

impl Change {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn of_platform(version: Version) -> Self {
        Self {
            platform: Some(version),
            ..Self::default()
        }
    }

    pub fn of_revision(revision: ApplicationVersion) -> Self {
        Self {
            revision: Some(revision),
            ..Self::default()
        }
    }

    pub fn platform(&self) -> Option<&Version> {
        self.platform.as_ref()
    }

    pub fn revision(&self) -> Option<&ApplicationVersion> {
        self.revision.as_ref()
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// Whether this change has anything to deploy.
    pub fn has_targets(&self) -> bool {
        self.platform.is_some() || self.revision.is_some()
    }

    /// Whether this change neither deploys anything nor holds a pin.
    pub fn is_empty(&self) -> bool {
        !self.has_targets() && !self.pinned
    }

    /// This change with the given platform target; not allowed while pinned.
    pub fn with_platform(self, version: Version) -> Result<Self, TriggerError> {
        if self.pinned {
            return Err(TriggerError::Pinned(version));
        }
        Ok(Self {
            platform: Some(version),
            ..self
        })
    }

    pub fn with_revision(self, revision: ApplicationVersion) -> Self {
        Self {
            revision: Some(revision),
            ..self
        }
    }

    pub fn without_platform(self) -> Self {
        Self {
            platform: None,
            ..self
        }
    }

    pub fn without_revision(self) -> Self {
        Self {
            revision: None,
            ..self
        }
    }

    pub fn with_pin(self) -> Self {
        Self {
            pinned: true,
            ..self
        }
    }

    pub fn without_pin(self) -> Self {
        Self {
            pinned: false,
            ..self
        }
    }

    /// This change, with any component it lacks taken from `other`.
    pub fn on_top_of(&self, other: &Change) -> Self {
        Self {
            platform: self.platform.or(other.platform),
            revision: self.revision.clone().or_else(|| other.revision.clone()),
            pinned: self.pinned || other.pinned,
        }
    }

    /// Whether this change targets a newer platform than `version`.
    pub fn upgrades_platform(&self, version: &Version) -> bool {
        self.platform.is_some_and(|target| version.is_before(&target))
    }

    /// Whether this change targets a newer revision than `revision`.
    pub fn upgrades_revision(&self, revision: &ApplicationVersion) -> bool {
        self.revision.as_ref().is_some_and(|target| target > revision)
    }

    /// Whether this change targets an older platform than `version`.
    pub fn downgrades_platform(&self, version: &Version) -> bool {
        self.platform.is_some_and(|target| target.is_before(version))
    }

    /// Whether this change targets an older revision than `revision`.
    pub fn downgrades_revision(&self, revision: &ApplicationVersion) -> bool {
        self.revision.as_ref().is_some_and(|target| target < revision)
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.pinned {
            parts.push("pin to".to_string());
        }
        if let Some(platform) = &self.platform {
            parts.push(format!("upgrade to {}", platform));
        }
        if let Some(revision) = &self.revision {
            parts.push(format!("revision change to {}", revision));
        }
        if parts.is_empty() {
            return f.write_str("no change");
        }
        f.write_str(&parts.join(" and "))
    }
}
