// ABOUTME: Target and source platform/revision of a single run.
// ABOUTME: Sources are either both known or both absent.

use std::fmt;

use serde::Serialize;

use super::application::{Application, Deployment};
use super::change::Change;
use crate::types::{ApplicationVersion, Version};

/// What a run deploys, and what was deployed before it, if anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Versions {
    target_platform: Version,
    target_revision: ApplicationVersion,
    source: Option<(Version, ApplicationVersion)>,
}

impl Versions {
    pub fn new(
        target_platform: Version,
        target_revision: ApplicationVersion,
        source: Option<(Version, ApplicationVersion)>,
    ) -> Self {
        Self {
            target_platform,
            target_revision,
            source,
        }
    }

    /// Versions for deploying `change` over `deployment`.
    ///
    /// A pinned platform is always the target. Otherwise the newer of the
    /// change and the current deployment wins, falling back to what the
    /// application already runs elsewhere, then to `default_platform`.
    pub fn from(
        change: &Change,
        application: &Application,
        deployment: Option<&Deployment>,
        default_platform: Version,
    ) -> Self {
        let target_platform = match change.platform() {
            Some(platform) if change.is_pinned() => *platform,
            _ => change
                .platform()
                .copied()
                .into_iter()
                .chain(deployment.map(|d| d.version))
                .max()
                .or_else(|| application.oldest_deployed_platform())
                .unwrap_or(default_platform),
        };

        let target_revision = change
            .revision()
            .into_iter()
            .chain(deployment.map(|d| &d.revision))
            .max()
            .or_else(|| application.oldest_deployed_revision())
            .or_else(|| application.latest_version())
            .cloned()
            .unwrap_or_else(ApplicationVersion::unknown);

        Self {
            target_platform,
            target_revision,
            source: deployment.map(|d| (d.version, d.revision.clone())),
        }
    }

    pub fn target_platform(&self) -> &Version {
        &self.target_platform
    }

    pub fn target_revision(&self) -> &ApplicationVersion {
        &self.target_revision
    }

    pub fn source_platform(&self) -> Option<&Version> {
        self.source.as_ref().map(|(platform, _)| platform)
    }

    pub fn source_revision(&self) -> Option<&ApplicationVersion> {
        self.source.as_ref().map(|(_, revision)| revision)
    }

    /// Whether both targets equal those of `other`.
    pub fn targets_match(&self, other: &Versions) -> bool {
        self.target_platform == other.target_platform
            && self.target_revision == other.target_revision
    }

    /// Whether the targets agree with every component `change` specifies.
    pub fn targets_match_change(&self, change: &Change) -> bool {
        change.platform().is_none_or(|p| *p == self.target_platform)
            && change.revision().is_none_or(|r| *r == self.target_revision)
    }

    /// Whether each source which differs from its target equals the source of `other`.
    pub fn sources_match_if_present(&self, other: &Versions) -> bool {
        let platform_ok = match self.source_platform() {
            None => true,
            Some(source) => {
                *source == self.target_platform || Some(source) == other.source_platform()
            }
        };
        let revision_ok = match self.source_revision() {
            None => true,
            Some(source) => {
                *source == self.target_revision || Some(source) == other.source_revision()
            }
        };
        platform_ok && revision_ok
    }
}

impl fmt::Display for Versions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "platform {} and revision {}",
            self.target_platform, self.target_revision
        )?;
        if let Some((platform, revision)) = &self.source {
            write!(f, ", from platform {} and revision {}", platform, revision)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeploymentSpec, DeploymentStep};
    use crate::types::{InstanceName, TenantAndApplicationId, ZoneId};
    use chrono::{DateTime, Utc};

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    fn build(n: u64) -> ApplicationVersion {
        ApplicationVersion::from_build(n)
    }

    fn application() -> Application {
        Application::new(TenantAndApplicationId::from_names("t", "a"))
            .with_deployment_spec(DeploymentSpec::single(vec![DeploymentStep::prod("r1")]))
    }

    fn deployment(version: &str, revision: u64) -> Deployment {
        Deployment::new(
            ZoneId::prod("r1"),
            build(revision),
            v(version),
            DateTime::<Utc>::UNIX_EPOCH,
        )
    }

    #[test]
    fn pinned_platform_wins_over_newer_deployment() {
        let change = Change::of_platform(v("8.1")).with_pin();
        let current = deployment("8.3", 1);
        let versions = Versions::from(&change, &application(), Some(&current), v("8.5"));
        assert_eq!(versions.target_platform(), &v("8.1"));
        assert_eq!(versions.source_platform(), Some(&v("8.3")));
    }

    #[test]
    fn never_downgrades_unpinned() {
        let change = Change::of_platform(v("8.1")).with_revision(build(1));
        let current = deployment("8.3", 4);
        let versions = Versions::from(&change, &application(), Some(&current), v("8.5"));
        assert_eq!(versions.target_platform(), &v("8.3"));
        assert_eq!(versions.target_revision(), &build(4));
    }

    #[test]
    fn falls_back_to_oldest_deployed_then_default() {
        let app = application();
        let empty = Versions::from(&Change::empty(), &app, None, v("8.5"));
        assert_eq!(empty.target_platform(), &v("8.5"));
        assert!(empty.target_revision().is_unknown());
        assert!(empty.source_platform().is_none() && empty.source_revision().is_none());

        let app = app.with_instance(&InstanceName::default_instance(), |i| {
            i.with_deployment(deployment("8.2", 3))
        });
        let versions = Versions::from(&Change::empty(), &app, None, v("8.5"));
        assert_eq!(versions.target_platform(), &v("8.2"));
        assert_eq!(versions.target_revision(), &build(3));
    }

    #[test]
    fn targets_match_change_ignores_absent_components() {
        let versions = Versions::new(v("8.1"), build(2), None);
        assert!(versions.targets_match_change(&Change::empty()));
        assert!(versions.targets_match_change(&Change::of_revision(build(2))));
        assert!(!versions.targets_match_change(&Change::of_platform(v("8.2"))));
    }

    #[test]
    fn sources_only_matter_when_they_differ_from_targets() {
        let upgrade = Versions::new(v("8.2"), build(2), Some((v("8.1"), build(2))));
        let same_source = Versions::new(v("8.2"), build(2), Some((v("8.1"), build(1))));
        let other_source = Versions::new(v("8.2"), build(2), Some((v("8.0"), build(2))));
        assert!(upgrade.sources_match_if_present(&same_source));
        assert!(!upgrade.sources_match_if_present(&other_source));
        assert!(Versions::new(v("8.2"), build(2), None).sources_match_if_present(&other_source));
    }
}
