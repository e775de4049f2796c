// ABOUTME: Fixed step sets for each kind of job, with their always-run subsets.
// ABOUTME: Always-run steps release resources and record results even after failures.

use super::step::Step;
use crate::types::JobType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobProfile {
    steps: &'static [Step],
    always_run: &'static [Step],
}

const SYSTEM_TEST: JobProfile = JobProfile {
    steps: &[
        Step::DeployTester,
        Step::InstallTester,
        Step::DeployReal,
        Step::InstallReal,
        Step::RunTests,
        Step::StoreData,
        Step::DeactivateReal,
        Step::DeactivateTester,
        Step::Report,
    ],
    always_run: &[
        Step::StoreData,
        Step::DeactivateReal,
        Step::DeactivateTester,
        Step::Report,
    ],
};

const STAGING_TEST: JobProfile = JobProfile {
    steps: &[
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
    ],
    always_run: &[
        Step::StoreData,
        Step::DeactivateReal,
        Step::DeactivateTester,
        Step::Report,
    ],
};

// Production keeps the real deployment, so it is never deactivated.
const PRODUCTION: JobProfile = JobProfile {
    steps: &[
        Step::DeployTester,
        Step::InstallTester,
        Step::DeployReal,
        Step::InstallReal,
        Step::RunTests,
        Step::StoreData,
        Step::DeactivateTester,
        Step::Report,
    ],
    always_run: &[Step::StoreData, Step::DeactivateTester, Step::Report],
};

impl JobProfile {
    pub fn system_test() -> Self {
        SYSTEM_TEST
    }

    pub fn staging_test() -> Self {
        STAGING_TEST
    }

    pub fn production() -> Self {
        PRODUCTION
    }

    /// The profile of a job type, or `None` for jobs this core doesn't run.
    pub fn of(job_type: &JobType) -> Option<Self> {
        match job_type {
            JobType::Component => None,
            JobType::SystemTest => Some(SYSTEM_TEST),
            JobType::StagingTest => Some(STAGING_TEST),
            JobType::Production(_) => Some(PRODUCTION),
        }
    }

    pub fn steps(&self) -> &'static [Step] {
        self.steps
    }

    pub fn always_run(&self) -> &'static [Step] {
        self.always_run
    }

    pub fn contains(&self, step: Step) -> bool {
        self.steps.contains(&step)
    }

    pub fn is_always_run(&self, step: Step) -> bool {
        self.always_run.contains(&step)
    }
}
