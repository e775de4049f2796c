// ABOUTME: Compile-fail test verifying InstanceName and RegionName are not interchangeable.
// ABOUTME: This test should fail to compile, validating type safety.

use waypoint::types::{InstanceName, RegionName};

fn deploy_to(_region: RegionName) {}

fn main() {
    let instance = InstanceName::new("beta");
    deploy_to(instance); // ERROR: expected RegionName, found InstanceName
}
