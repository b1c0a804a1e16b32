//! Sequential experiment coordination with per-run records

pub mod coordinator;
pub mod launcher;
pub mod manifest;

pub use coordinator::{Coordinator, SuiteConfig, SuiteOutcome};
pub use launcher::{Launcher, ProcessLauncher};
pub use manifest::{ExperimentStatus, LocalRunRecordStorage, RunRecord};
