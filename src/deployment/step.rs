// ABOUTME: Steps of a deployment run and their prerequisite graph.
// ABOUTME: A step may run once all its prerequisites in the run's profile have succeeded.

use std::fmt;

use serde::Serialize;

/// A sub-phase of a run. Variants are listed in a valid execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Step {
    /// Deploy the tester application which runs the tests.
    DeployTester,
    InstallTester,
    /// Deploy the source versions, for upgrade tests in staging.
    DeployInitialReal,
    InstallInitialReal,
    DeployReal,
    InstallReal,
    RunTests,
    /// Keep test results and logs.
    StoreData,
    DeactivateReal,
    DeactivateTester,
    /// Report the outcome to the build system.
    Report,
}

impl Step {
    pub const ALL: [Step; 11] = [
        Step::DeployTester,
        Step::InstallTester,
        Step::DeployInitialReal,
        Step::InstallInitialReal,
        Step::DeployReal,
        Step::InstallReal,
        Step::RunTests,
        Step::StoreData,
        Step::DeactivateReal,
        Step::DeactivateTester,
        Step::Report,
    ];

    /// Steps which must have completed before this one may run.
    pub fn prerequisites(&self) -> &'static [Step] {
        match self {
            Step::DeployTester => &[],
            Step::InstallTester => &[Step::DeployTester],
            Step::DeployInitialReal => &[],
            Step::InstallInitialReal => &[Step::DeployInitialReal],
            Step::DeployReal => &[Step::InstallInitialReal],
            Step::InstallReal => &[Step::DeployReal],
            Step::RunTests => &[Step::InstallReal, Step::InstallTester],
            Step::StoreData => &[Step::RunTests],
            Step::DeactivateReal => &[
                Step::DeployInitialReal,
                Step::DeployReal,
                Step::RunTests,
                Step::StoreData,
            ],
            Step::DeactivateTester => &[Step::DeployTester, Step::RunTests, Step::StoreData],
            Step::Report => &[
                Step::InstallInitialReal,
                Step::InstallReal,
                Step::DeactivateReal,
                Step::DeactivateTester,
            ],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Step::DeployTester => "deployTester",
            Step::InstallTester => "installTester",
            Step::DeployInitialReal => "deployInitialReal",
            Step::InstallInitialReal => "installInitialReal",
            Step::DeployReal => "deployReal",
            Step::InstallReal => "installReal",
            Step::RunTests => "runTests",
            Step::StoreData => "storeData",
            Step::DeactivateReal => "deactivateReal",
            Step::DeactivateTester => "deactivateTester",
            Step::Report => "report",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Unfinished,
    Succeeded,
    Failed,
}
