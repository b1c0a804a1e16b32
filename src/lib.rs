// Public API - the runner module plus the experiment definitions it consumes
pub mod experiment;
pub mod runner;

// Internal modules - organized by subsystem
mod config;
mod coordination;
mod telemetry;

pub use config::{DEFAULT_INTERPRETER, DEFAULT_PROGRAM};
