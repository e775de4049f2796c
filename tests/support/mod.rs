// ABOUTME: Test support utilities.
// ABOUTME: Tracing setup and a simulation wired to a fixed start time.

use std::sync::Once;

use chrono::{DateTime, Utc};
use waypoint::config::{ControllerConfig, DeploymentSpec};
use waypoint::simulation::Simulation;
use waypoint::types::{ApplicationId, InstanceName, TenantAndApplicationId};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("waypoint=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

#[allow(dead_code)]
pub fn start() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-03-04T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

#[allow(dead_code)]
pub fn app(name: &str) -> TenantAndApplicationId {
    TenantAndApplicationId::from_names("tenant", name)
}

#[allow(dead_code)]
pub fn default_instance(id: &TenantAndApplicationId) -> ApplicationId {
    id.instance(InstanceName::default_instance())
}

/// A simulation with one application using the given spec.
#[allow(dead_code)]
pub fn simulation_with(name: &str, spec_yaml: &str) -> (Simulation, TenantAndApplicationId) {
    init_tracing();
    let simulation = Simulation::new(ControllerConfig::default(), start());
    let id = app(name);
    let spec = DeploymentSpec::from_yaml(spec_yaml).unwrap();
    simulation.create_application(&id, spec, 1);
    (simulation, id)
}

/// Runs passes until no runs are active, at most `limit` of them.
#[allow(dead_code)]
pub async fn settle(simulation: &mut Simulation, limit: usize) {
    for _ in 0..limit {
        simulation.pass().await;
        if simulation.controller().active().is_empty()
            && simulation.trigger().compute_ready_jobs().await.is_empty()
        {
            return;
        }
    }
}
