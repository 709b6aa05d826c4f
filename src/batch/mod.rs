//! Batched structure fetch and the per-UID repair pipeline.

pub mod cursor;
pub mod orchestrator;

pub use cursor::{UidBatches, DEFAULT_BATCH_SIZE};
pub use orchestrator::{Phase, RepairOptions, RepairReport, Repairer, RunSummary, UidState};
