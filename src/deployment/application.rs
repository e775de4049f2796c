// ABOUTME: Stored state of applications: instances, their changes, deployments and pauses.
// ABOUTME: Values are immutable; modifications return updated copies for the store.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::change::Change;
use super::error::TriggerError;
use super::revision_history::RevisionHistory;
use crate::config::DeploymentSpec;
use crate::types::{
    ApplicationId, ApplicationVersion, InstanceName, JobType, TenantAndApplicationId, Version,
    ZoneId,
};

/// What is currently deployed to one zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub zone: ZoneId,
    pub revision: ApplicationVersion,
    pub version: Version,
    pub at: DateTime<Utc>,
}

impl Deployment {
    pub fn new(
        zone: ZoneId,
        revision: ApplicationVersion,
        version: Version,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            zone,
            revision,
            version,
            at,
        }
    }
}

/// One independently deployed variant of an application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    id: ApplicationId,
    change: Change,
    deployments: BTreeMap<ZoneId, Deployment>,
    job_pauses: BTreeMap<JobType, DateTime<Utc>>,
}

impl Instance {
    pub fn new(id: ApplicationId) -> Self {
        Self {
            id,
            change: Change::empty(),
            deployments: BTreeMap::new(),
            job_pauses: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &ApplicationId {
        &self.id
    }

    pub fn name(&self) -> &InstanceName {
        &self.id.instance
    }

    pub fn change(&self) -> &Change {
        &self.change
    }

    pub fn deployments(&self) -> &BTreeMap<ZoneId, Deployment> {
        &self.deployments
    }

    pub fn deployment(&self, zone: &ZoneId) -> Option<&Deployment> {
        self.deployments.get(zone)
    }

    pub fn production_deployments(&self) -> impl Iterator<Item = &Deployment> {
        self.deployments
            .values()
            .filter(|d| d.zone.environment.is_production())
    }

    /// When the given job is paused until, if it is.
    pub fn job_pause(&self, job_type: &JobType) -> Option<DateTime<Utc>> {
        self.job_pauses.get(job_type).copied()
    }

    pub fn with_change(self, change: Change) -> Self {
        Self { change, ..self }
    }

    /// This instance with the given pause set, or cleared when `until` is `None`.
    pub fn with_job_pause(mut self, job_type: JobType, until: Option<DateTime<Utc>>) -> Self {
        match until {
            Some(until) => {
                self.job_pauses.insert(job_type, until);
            }
            None => {
                self.job_pauses.remove(&job_type);
            }
        }
        self
    }

    pub fn with_deployment(mut self, deployment: Deployment) -> Self {
        self.deployments.insert(deployment.zone.clone(), deployment);
        self
    }

    pub fn without_deployment(mut self, zone: &ZoneId) -> Self {
        self.deployments.remove(zone);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    id: TenantAndApplicationId,
    deployment_spec: Option<DeploymentSpec>,
    project_id: Option<u64>,
    revisions: RevisionHistory,
    instances: BTreeMap<InstanceName, Instance>,
}

impl Application {
    pub fn new(id: TenantAndApplicationId) -> Self {
        Self {
            id,
            deployment_spec: None,
            project_id: None,
            revisions: RevisionHistory::empty(),
            instances: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &TenantAndApplicationId {
        &self.id
    }

    pub fn deployment_spec(&self) -> Option<&DeploymentSpec> {
        self.deployment_spec.as_ref()
    }

    /// The build project submitting revisions for this application.
    pub fn project_id(&self) -> Option<u64> {
        self.project_id
    }

    pub fn revisions(&self) -> &RevisionHistory {
        &self.revisions
    }

    pub fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.instances.values()
    }

    pub fn instance(&self, name: &InstanceName) -> Option<&Instance> {
        self.instances.get(name)
    }

    pub fn require_instance(&self, name: &InstanceName) -> Result<&Instance, TriggerError> {
        self.instance(name)
            .ok_or_else(|| TriggerError::UnknownInstance(self.id.instance(name.clone())))
    }

    /// The latest revision which should be rolled out, if any was submitted.
    pub fn latest_version(&self) -> Option<&ApplicationVersion> {
        self.revisions.last_deployable()
    }

    /// The oldest platform running in any production zone of any instance.
    pub fn oldest_deployed_platform(&self) -> Option<Version> {
        self.production_deployments().map(|d| d.version).min()
    }

    /// The oldest revision running in any production zone of any instance.
    pub fn oldest_deployed_revision(&self) -> Option<&ApplicationVersion> {
        self.production_deployments().map(|d| &d.revision).min()
    }

    pub fn production_deployments(&self) -> impl Iterator<Item = &Deployment> {
        self.instances
            .values()
            .flat_map(|instance| instance.production_deployments())
    }

    pub fn with_project_id(self, project_id: u64) -> Self {
        Self {
            project_id: Some(project_id),
            ..self
        }
    }

    /// This application with the given spec, adding any newly declared instances.
    pub fn with_deployment_spec(mut self, spec: DeploymentSpec) -> Self {
        for name in spec.instance_names() {
            let id = self.id.instance(name.clone());
            self.instances.entry(name).or_insert_with(|| Instance::new(id));
        }
        self.deployment_spec = Some(spec);
        self
    }

    pub fn with_revisions(self, revisions: RevisionHistory) -> Self {
        Self { revisions, ..self }
    }

    /// This application with `f` applied to the named instance, if it exists.
    pub fn with_instance(mut self, name: &InstanceName, f: impl FnOnce(Instance) -> Instance) -> Self {
        if let Some(instance) = self.instances.remove(name) {
            self.instances.insert(name.clone(), f(instance));
        }
        self
    }
}
