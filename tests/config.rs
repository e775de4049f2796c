// ABOUTME: Integration tests for configuration parsing and validation.
// ABOUTME: Tests controller config defaults, discovery, and deployment spec parsing.

use std::fs;
use std::time::Duration;

use chrono::Weekday;
use waypoint::config::*;
use waypoint::error::Error;
use waypoint::types::{InstanceName, RegionName, Version};

mod controller {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = ControllerConfig::from_yaml("{}").unwrap();
        assert_eq!(config.max_pause, Duration::from_secs(3 * 24 * 3600));
        assert_eq!(config.trigger_attempts, 5);
        assert_eq!(config.trigger_workers, 8);
        assert_eq!(config.test_capacity, 1);
        assert_eq!(config.system_version, Version::new(8, 0, 0));
        assert_eq!(config.install_timeout, Duration::from_secs(3600));
        assert_eq!(config.capacity_timeout, Duration::from_secs(600));
        assert_eq!(config.trigger_interval, Duration::from_secs(60));
        assert_eq!(config.zones.test_region, RegionName::new("default"));
    }

    #[test]
    fn parse_full_config() {
        let yaml = r#"
max_pause: 1day
trigger_attempts: 3
trigger_workers: 2
test_capacity: 4
system_version: 8.2.1
install_timeout: 30m
capacity_timeout: 5m
trigger_interval: 10s
zones:
  test_region: us-east-1
  staging_region: us-east-3
"#;
        let config = ControllerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.max_pause, Duration::from_secs(24 * 3600));
        assert_eq!(config.trigger_attempts, 3);
        assert_eq!(config.trigger_workers, 2);
        assert_eq!(config.test_capacity, 4);
        assert_eq!(config.system_version, Version::new(8, 2, 1));
        assert_eq!(config.install_timeout, Duration::from_secs(30 * 60));
        assert_eq!(config.capacity_timeout, Duration::from_secs(5 * 60));
        assert_eq!(config.trigger_interval, Duration::from_secs(10));
        assert_eq!(config.zones.staging_region, RegionName::new("us-east-3"));
    }

    #[test]
    fn rejects_zero_workers() {
        let result = ControllerConfig::from_yaml("trigger_workers: 0");
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn rejects_malformed_durations() {
        let result = ControllerConfig::from_yaml("max_pause: forever");
        assert!(matches!(result, Err(Error::Yaml(_))));
    }
}

mod discovery {
    use super::*;

    #[test]
    fn finds_config_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("waypoint.yml"), "trigger_attempts: 2").unwrap();
        let config = ControllerConfig::discover(dir.path()).unwrap();
        assert_eq!(config.trigger_attempts, 2);
    }

    #[test]
    fn finds_config_in_dot_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(".waypoint")).unwrap();
        fs::write(dir.path().join(".waypoint/config.yml"), "test_capacity: 3").unwrap();
        let config = ControllerConfig::discover(dir.path()).unwrap();
        assert_eq!(config.test_capacity, 3);
    }

    #[test]
    fn prefers_primary_file_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("waypoint.yml"), "trigger_workers: 1").unwrap();
        fs::write(dir.path().join("waypoint.yaml"), "trigger_workers: 2").unwrap();
        let config = ControllerConfig::discover(dir.path()).unwrap();
        assert_eq!(config.trigger_workers, 1);
    }

    #[test]
    fn reports_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let result = ControllerConfig::discover(dir.path());
        assert!(matches!(result, Err(Error::ConfigNotFound(_))));
    }
}

mod deployment_spec {
    use super::*;

    #[test]
    fn parses_instances_with_rollout_and_blockers() {
        let spec = DeploymentSpec::from_yaml(
            r#"
instances:
  - name: beta
    steps:
      - prod: us-east-1
  - name: default
    upgrade_rollout: leading
    change_blockers:
      - version: true
        days: [sat, sun]
        hours: [0, 1, 2]
    steps:
      - test
      - prod: us-east-1
      - delay: 30m
      - parallel:
          - prod: us-west-1
          - prod: eu-west-1
"#,
        )
        .unwrap();

        assert_eq!(
            spec.instance_names(),
            vec![InstanceName::new("beta"), InstanceName::default_instance()]
        );
        let default = spec.instance(&InstanceName::default_instance()).unwrap();
        assert_eq!(default.upgrade_rollout, UpgradeRollout::Leading);
        assert_eq!(default.steps.len(), 4);
        assert_eq!(default.steps[2], DeploymentStep::Delay(Duration::from_secs(30 * 60)));

        let blocker = &default.change_blockers[0];
        assert!(blocker.blocks_versions());
        assert!(!blocker.blocks_revisions());
        assert_eq!(blocker.window.days, vec![Weekday::Sat, Weekday::Sun]);
        assert_eq!(blocker.window.hours, vec![0, 1, 2]);
    }

    #[test]
    fn rejects_duplicate_instances() {
        let result = DeploymentSpec::from_yaml(
            r#"
instances:
  - name: default
  - name: default
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_hours_out_of_range() {
        let result = DeploymentSpec::from_yaml(
            r#"
instances:
  - change_blockers:
      - revision: true
        hours: [24]
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deployment.yml");
        fs::write(&path, "instances:\n  - steps: [test, staging]\n").unwrap();
        let spec = DeploymentSpec::load(&path).unwrap();
        assert_eq!(spec.instances.len(), 1);
    }
}
