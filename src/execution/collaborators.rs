// ABOUTME: Interfaces to the systems which deploy, install, test and monitor applications.
// ABOUTME: Implemented by integrators; this crate only drives them.

use async_trait::async_trait;

use super::error::{CollaboratorError, DeploymentFailure};
use crate::deployment::RunId;
use crate::types::{ApplicationId, ApplicationVersion, Version, ZoneId};

/// What to deploy where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    pub application: ApplicationId,
    pub zone: ZoneId,
    pub platform: Version,
    pub revision: ApplicationVersion,
}

#[async_trait]
pub trait DeploymentExecutor: Send + Sync {
    async fn deploy(&self, request: &DeployRequest) -> Result<(), DeploymentFailure>;

    async fn deactivate(&self, application: &ApplicationId, zone: &ZoneId) -> Result<(), DeploymentFailure>;
}

/// Node and service counts of one deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvergenceSummary {
    pub nodes: u64,
    pub down: u64,
    pub upgrading_os: u64,
    pub upgrading_firmware: u64,
    pub need_platform_upgrade: u64,
    pub upgrading_platform: u64,
    pub need_reboot: u64,
    pub rebooting: u64,
    pub need_restart: u64,
    pub restarting: u64,
    pub services: u64,
    pub need_new_config: u64,
    pub retiring: u64,
}

impl ConvergenceSummary {
    /// Whether all nodes run the wanted platform and all services the wanted config.
    pub fn converged(&self) -> bool {
        self.nodes > 0
            && self.need_platform_upgrade == 0
            && self.need_reboot == 0
            && self.need_restart == 0
            && self.services > 0
            && self.need_new_config == 0
    }
}

#[async_trait]
pub trait ConvergenceReader: Send + Sync {
    /// Convergence of the deployment, or `None` if nothing is deployed there.
    async fn summary(
        &self,
        application: &ApplicationId,
        zone: &ZoneId,
    ) -> Result<Option<ConvergenceSummary>, CollaboratorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TesterStatus {
    NotStarted,
    Running,
    Success,
    Failure,
    Error,
}

/// Control plane for the tester deployed alongside a run.
#[async_trait]
pub trait TesterCloud: Send + Sync {
    async fn start(&self, run: &RunId, zone: &ZoneId) -> Result<(), CollaboratorError>;

    async fn status(&self, run: &RunId) -> Result<TesterStatus, CollaboratorError>;

    async fn stop(&self, run: &RunId) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait ServiceMonitor: Send + Sync {
    async fn is_healthy(&self, application: &ApplicationId, zone: &ZoneId) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy() -> ConvergenceSummary {
        ConvergenceSummary {
            nodes: 3,
            services: 6,
            ..ConvergenceSummary::default()
        }
    }

    #[test]
    fn converged_requires_nodes_and_services() {
        assert!(healthy().converged());
        assert!(!ConvergenceSummary::default().converged());
        assert!(
            !ConvergenceSummary {
                services: 0,
                ..healthy()
            }
            .converged()
        );
    }

    #[test]
    fn pending_work_blocks_convergence() {
        for pending in [
            ConvergenceSummary { need_platform_upgrade: 1, ..healthy() },
            ConvergenceSummary { need_reboot: 1, ..healthy() },
            ConvergenceSummary { need_restart: 1, ..healthy() },
            ConvergenceSummary { need_new_config: 2, ..healthy() },
        ] {
            assert!(!pending.converged(), "{:?}", pending);
        }
        assert!(ConvergenceSummary { down: 1, retiring: 1, ..healthy() }.converged());
    }
}
