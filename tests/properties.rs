// ABOUTME: Property tests for run step ordering and failure streaks.
// ABOUTME: Drives runs and job histories with generated outcomes.

use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;
use waypoint::deployment::{JobProfile, JobStatus, Run, RunId, RunStatus, StepStatus, Versions};
use waypoint::types::{ApplicationId, ApplicationVersion, JobId, JobType, Version};

fn start() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-03-04T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn job(job_type: JobType) -> JobId {
    JobId::new(ApplicationId::from_names("t", "a", "default"), job_type)
}

fn versions() -> Versions {
    Versions::new(Version::new(8, 0, 0), ApplicationVersion::from_build(1), None)
}

fn job_type() -> impl Strategy<Value = JobType> {
    prop_oneof![
        Just(JobType::SystemTest),
        Just(JobType::StagingTest),
        Just(JobType::production("us-east-1")),
    ]
}

/// Completes steps of a run, picking among ready steps and outcomes by the given choices.
fn drive(job_type: JobType, choices: &[(usize, bool)]) -> Run {
    let profile = JobProfile::of(&job_type).unwrap();
    let mut run = Run::initial(RunId::new(job(job_type), 1), versions(), start());
    let mut choices = choices.iter().cycle();
    loop {
        let ready = run.ready_steps();
        if ready.is_empty() {
            return run;
        }
        let (pick, succeed) = *choices.next().unwrap();
        let step = ready[pick % ready.len()];

        if run.has_failed() {
            assert!(profile.is_always_run(step), "{} ran after failure", step);
            for prerequisite in step.prerequisites() {
                if profile.is_always_run(*prerequisite) {
                    assert_ne!(run.step_status(*prerequisite), Some(StepStatus::Unfinished));
                }
            }
        } else {
            for prerequisite in step.prerequisites() {
                if let Some(status) = run.step_status(*prerequisite) {
                    assert_eq!(status, StepStatus::Succeeded, "{} before {}", step, prerequisite);
                }
            }
        }

        let status = if succeed {
            RunStatus::Running
        } else {
            RunStatus::DeploymentFailed
        };
        run = run.with(status, step);
    }
}

proptest! {
    #[test]
    fn steps_only_run_after_their_prerequisites(
        job_type in job_type(),
        choices in prop::collection::vec((0usize..8, prop::bool::weighted(0.85)), 1..40),
    ) {
        drive(job_type, &choices);
    }

    #[test]
    fn always_run_steps_complete_even_after_failures(
        job_type in job_type(),
        choices in prop::collection::vec((0usize..8, prop::bool::weighted(0.5)), 1..40),
    ) {
        let profile = JobProfile::of(&job_type).unwrap();
        let run = drive(job_type, &choices);
        for step in profile.always_run() {
            prop_assert_ne!(run.step_status(*step), Some(StepStatus::Unfinished));
        }
        if !run.has_failed() {
            prop_assert!(run.steps().values().all(|s| *s == StepStatus::Succeeded));
        }
    }

    #[test]
    fn first_failing_starts_the_trailing_failure_streak(
        outcomes in prop::collection::vec(any::<bool>(), 0..20),
        ongoing in any::<bool>(),
    ) {
        let id = job(JobType::SystemTest);
        let mut runs: Vec<Run> = outcomes
            .iter()
            .enumerate()
            .map(|(i, success)| {
                let at = start() + Duration::minutes(i as i64);
                let run = Run::initial(RunId::new(id.clone(), i as u64 + 1), versions(), at);
                let run = if *success { run } else { run.with_failure(RunStatus::TestFailure) };
                run.finished(at)
            })
            .collect();
        if ongoing {
            let number = runs.len() as u64 + 1;
            runs.push(Run::initial(RunId::new(id.clone(), number), versions(), start()));
        }
        let status = JobStatus::new(id, runs);

        let streak = outcomes.iter().rev().take_while(|success| !**success).count();
        let expected = (streak > 0).then(|| (outcomes.len() - streak + 1) as u64);
        prop_assert_eq!(status.first_failing().map(|run| run.id().number), expected);
        prop_assert_eq!(status.is_success(), outcomes.last().copied().unwrap_or(false));
    }
}
