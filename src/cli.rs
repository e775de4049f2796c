// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines the subcommands for inspecting and simulating deployment pipelines.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use waypoint::types::TenantAndApplicationId;

#[derive(Parser)]
#[command(name = "waypoint")]
#[command(about = "Orchestrates application rollouts through test and production zones")]
#[command(version)]
pub struct Cli {
    /// Log debug output from the engine
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print JSON lines instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the order in which each instance's jobs run
    Order {
        /// Deployment spec to read
        spec: PathBuf,
    },

    /// Roll out builds of an application against an in-memory cloud
    Simulate {
        /// Deployment spec of the simulated application
        spec: PathBuf,

        /// Number of orchestration passes to run
        #[arg(short, long, default_value_t = 10)]
        passes: usize,

        /// Controller config file (discovered in the current directory if omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Id of the simulated application, as tenant.application
        #[arg(long, default_value = "local.application")]
        application: TenantAndApplicationId,

        /// Number of builds to submit, one at the start of each pass
        #[arg(long, default_value_t = 1)]
        builds: u64,
    },
}
