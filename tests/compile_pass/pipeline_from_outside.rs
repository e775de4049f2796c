// ABOUTME: Compile-pass test using the public API the way an integrator would.
// ABOUTME: Builds a spec, derives its job order and computes versions for a change.

use waypoint::config::{DeploymentSpec, DeploymentStep};
use waypoint::deployment::{Application, Change, DeploymentSteps, Versions};
use waypoint::types::{ApplicationVersion, JobType, TenantAndApplicationId, Version};

fn main() {
    let spec = DeploymentSpec::single(vec![
        DeploymentStep::test(),
        DeploymentStep::prod("us-east-1"),
    ]);
    let jobs = DeploymentSteps::of(Some(spec.instances.first())).jobs();
    assert_eq!(jobs.first(), Some(&JobType::SystemTest));

    let application = Application::new(TenantAndApplicationId::from_names("tenant", "app"))
        .with_deployment_spec(spec);
    let change = Change::of_revision(ApplicationVersion::from_build(3));
    let versions = Versions::from(&change, &application, None, Version::new(8, 0, 0));
    assert_eq!(versions.target_revision(), &ApplicationVersion::from_build(3));
}
