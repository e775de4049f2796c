// ABOUTME: Entry point for the waypoint CLI application.
// ABOUTME: Parses arguments and dispatches to the order and simulate commands.

mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use serde::Serialize;
use std::env;
use std::path::Path;
use tracing_subscriber::EnvFilter;
use waypoint::config::{ControllerConfig, DeploymentSpec};
use waypoint::deployment::DeploymentSteps;
use waypoint::error::{Error, Result};
use waypoint::output::{Output, OutputMode};
use waypoint::simulation::Simulation;
use waypoint::types::{JobType, TenantAndApplicationId};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let output = Output::new(if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Normal
    });

    if let Err(e) = run(cli.command, &output).await {
        output.error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(command: Commands, output: &Output) -> Result<()> {
    match command {
        Commands::Order { spec } => {
            let spec = DeploymentSpec::load(&spec)?;
            print_order(&spec, output);
            Ok(())
        }
        Commands::Simulate {
            spec,
            passes,
            config,
            application,
            builds,
        } => {
            let spec = DeploymentSpec::load(&spec)?;
            let config = match config {
                Some(path) => ControllerConfig::load(&path)?,
                None => discover_config(&env::current_dir()?)?,
            };
            simulate(spec, config, &application, passes, builds, output).await;
            Ok(())
        }
    }
}

/// The config found in `dir`, or the defaults when there is none.
fn discover_config(dir: &Path) -> Result<ControllerConfig> {
    match ControllerConfig::discover(dir) {
        Err(Error::ConfigNotFound(_)) => Ok(ControllerConfig::default()),
        other => other,
    }
}

#[derive(Serialize)]
struct OrderedJob<'a> {
    instance: &'a str,
    job: &'a JobType,
    delay_after_secs: u64,
}

fn print_order(spec: &DeploymentSpec, output: &Output) {
    for instance in spec.instances.iter() {
        let steps = DeploymentSteps::of(Some(instance));
        output.line(&format!("{}:", instance.name));
        for job in steps.jobs() {
            let delay = steps.delay_after(&job);
            if delay.is_zero() {
                output.line(&format!("  {}", job));
            } else {
                output.line(&format!(
                    "  {} (then wait {})",
                    job,
                    humantime_serde::re::humantime::format_duration(delay)
                ));
            }
            output.record(
                "job",
                &OrderedJob {
                    instance: instance.name.as_str(),
                    job: &job,
                    delay_after_secs: delay.as_secs(),
                },
            );
        }
    }
}

async fn simulate(
    spec: DeploymentSpec,
    config: ControllerConfig,
    application: &TenantAndApplicationId,
    passes: usize,
    builds: u64,
    output: &Output,
) {
    let mut simulation = Simulation::new(config, chrono::Utc::now());
    simulation.create_application(application, spec, 1);

    for pass in 0..passes {
        if let Ok(build) = u64::try_from(pass + 1)
            && build <= builds
        {
            simulation.submit(application, build);
            output.line(&format!("submitted build {} of {}", build, application));
        }
        let report = simulation.pass().await;
        for job in &report.triggered {
            output.line(&format!("pass {}: triggered {}", report.pass, job));
        }
        for (job, status) in &report.ended {
            output.line(&format!("pass {}: {} ended: {}", report.pass, job, status));
        }
        output.record("pass", &report);
    }

    let deployed = simulation.cloud().history().len();
    output.success(&format!(
        "simulated {} passes with {} deployments",
        passes, deployed
    ));
}
