//! Experiment definitions and the suites they are grouped into

pub mod catalog;
pub mod definition;
pub mod suite_file;

pub use catalog::{CatalogPaths, builtin_experiments};
pub use definition::{
    ExperimentConfig, ExperimentConfigBuilder, Invocation, SharedOptions, validate_experiments,
};
pub use suite_file::SuiteFile;
