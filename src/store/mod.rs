// ABOUTME: Transactional storage for the orchestration engine.
// ABOUTME: Two independent lock domains: per application and per job queue type.

mod curator;
mod lock;

pub use curator::Curator;
pub use lock::{ApplicationLock, QueueLock, RetriggerLock};
