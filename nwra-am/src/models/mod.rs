//! Data models for the multiplier workflow

pub mod file_record;
pub mod processing;

pub use file_record::FileRecord;
pub use processing::{CombinationResult, FileOutcome, FileState, RunReport, StateTransition};
