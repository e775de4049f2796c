// ABOUTME: Library root for waypoint, a deployment orchestration engine.
// ABOUTME: The main binary is in main.rs.

pub mod clock;
pub mod config;
pub mod deployment;
pub mod error;
pub mod execution;
pub mod output;
pub mod queue;
pub mod simulation;
pub mod store;
pub mod types;
