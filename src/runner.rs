//! High-level runner API for the experiment runner.
//!
//! This module provides a simplified public interface that encapsulates the
//! setup of launchers, record storage and the coordinator.
//!
//! This is the primary API for external users and for the CLI.

use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use crate::coordination::{
    Coordinator, LocalRunRecordStorage, ProcessLauncher, SuiteConfig, SuiteOutcome,
};
use crate::experiment::{
    CatalogPaths, ExperimentConfig, SharedOptions, SuiteFile, validate_experiments,
};

pub use crate::coordination::{ExperimentStatus, RunRecord};
pub use crate::experiment::Invocation;

/// Where the experiment list comes from
#[derive(Debug, Clone)]
pub struct PlanArgs {
    pub embeddings_dir: PathBuf,
    pub output_dir: PathBuf,
    /// JSON suite file; created from the built-in catalog if missing
    pub suite_file: Option<PathBuf>,
    /// Run every experiment as a training run instead of an eval-only run
    pub train: bool,
    /// Restrict to these experiment names (empty means all)
    pub only: Vec<String>,
    pub data: Option<String>,
    pub ids: Option<String>,
    pub batch_size: Option<u32>,
    pub max_steps: Option<u32>,
    pub eval_every: Option<u32>,
    pub log_every: Option<u32>,
}

impl PlanArgs {
    fn has_custom_dirs(&self) -> bool {
        self.embeddings_dir != Path::new(".") || self.output_dir != Path::new(".")
    }

    fn shared_options(&self) -> SharedOptions {
        SharedOptions {
            data: self.data.clone(),
            ids: self.ids.clone(),
            batch_size: self.batch_size,
            max_steps: self.max_steps,
            eval_every: self.eval_every,
            log_every: self.log_every,
        }
    }
}

impl Default for PlanArgs {
    fn default() -> Self {
        Self {
            embeddings_dir: PathBuf::from("."),
            output_dir: PathBuf::from("."),
            suite_file: None,
            train: false,
            only: Vec::new(),
            data: None,
            ids: None,
            batch_size: None,
            max_steps: None,
            eval_every: None,
            log_every: None,
        }
    }
}

/// Ordered experiments plus the options shared by all of them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub experiments: Vec<ExperimentConfig>,
    pub shared: SharedOptions,
}

impl Plan {
    /// Resolve every experiment into the command that would be launched
    pub fn invocations(&self, interpreter: &str, program: &str) -> Vec<Invocation> {
        self.experiments
            .iter()
            .map(|e| Invocation::new(interpreter, program, e, &self.shared))
            .collect()
    }
}

/// Resolve the experiments to run, in order
///
/// An existing suite file is authoritative for paths, so custom directories are
/// rejected rather than silently ignored. `train` applies to every experiment,
/// whichever source it came from.
pub fn plan_suite(args: &PlanArgs) -> Result<Plan> {
    let catalog_paths = CatalogPaths {
        embeddings_dir: &args.embeddings_dir,
        output_dir: &args.output_dir,
    };
    let eval_only = !args.train;
    let catalog_suite = || SuiteFile {
        shared: SharedOptions::default(),
        experiments: crate::experiment::builtin_experiments(&catalog_paths, eval_only),
    };

    let mut suite = match args.suite_file {
        Some(ref path) => {
            if path.exists() && args.has_custom_dirs() {
                return Err(anyhow!(
                    "--embeddings-dir and --output-dir only apply to the built-in experiments; \
                     edit the paths in {} instead",
                    path.display()
                ));
            }
            crate::experiment::suite_file::load_or_init(path, catalog_suite)?
        }
        None => catalog_suite(),
    };

    if args.train {
        for experiment in &mut suite.experiments {
            experiment.eval_only = false;
        }
    }

    // Command line options win over the suite file
    let shared = args.shared_options().or(suite.shared);

    let experiments = select_experiments(suite.experiments, &args.only)?;

    Ok(Plan {
        experiments,
        shared,
    })
}

/// Keep only the named experiments, preserving suite order
fn select_experiments(
    experiments: Vec<ExperimentConfig>,
    only: &[String],
) -> Result<Vec<ExperimentConfig>> {
    if only.is_empty() {
        return Ok(experiments);
    }

    if let Some(unknown) = only
        .iter()
        .find(|name| !experiments.iter().any(|e| &e.name == *name))
    {
        let available: Vec<&str> = experiments.iter().map(|e| e.name.as_str()).collect();
        return Err(anyhow!(
            "Unknown experiment '{}'. Available experiments: {}",
            unknown,
            available.join(", ")
        ));
    }

    Ok(experiments
        .into_iter()
        .filter(|e| only.contains(&e.name))
        .collect())
}

/// Arguments for running a suite
#[derive(Clone)]
pub struct RunArgs {
    pub interpreter: String,
    pub program: String,
    pub plan: Plan,
    /// Stop after the first failure
    pub strict: bool,
    /// Directory for run records (default: temporary, kept only on failure)
    pub record_dir: Option<PathBuf>,
    /// Working directory for the child processes
    pub working_dir: Option<PathBuf>,
    /// Validate and resolve every command without launching anything
    pub dry_run: bool,

    // Test-only: inject a launcher instead of spawning real processes
    #[cfg(test)]
    pub test_launcher: Option<Arc<dyn crate::coordination::Launcher>>,
}

/// Result of a completed suite
#[derive(Debug)]
pub struct SuiteResult {
    pub suite_id: String,
    pub experiments_run: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Experiments skipped because strict mode stopped the suite
    pub skipped: usize,
    pub duration: Duration,
    pub median_run: Option<Duration>,
    pub slowest_run: Option<Duration>,
    /// Every command of the plan, in launch order
    pub planned: Vec<Invocation>,
    /// True when nothing was launched
    pub dry_run: bool,
    pub records: Vec<RunRecord>,
    /// Path to persisted record directory (if failures occurred and temp dir was used)
    pub persisted_record_dir: Option<PathBuf>,
}

impl SuiteResult {
    pub fn failed_experiments(&self) -> impl Iterator<Item = &RunRecord> {
        self.records.iter().filter(|r| !r.status.is_success())
    }

    /// Turn failures into an error, for callers that want exit-code propagation
    pub fn ensure_success(&self) -> Result<()> {
        if self.failed == 0 {
            return Ok(());
        }

        let names: Vec<&str> = self
            .failed_experiments()
            .map(|r| r.experiment.as_str())
            .collect();
        Err(anyhow!(
            "{} of {} experiments failed: {}",
            self.failed,
            self.experiments_run,
            names.join(", ")
        ))
    }
}

/// Run every experiment of the plan in order
///
/// Children inherit stdout/stderr and write their predictions themselves. A
/// failed experiment is recorded and the next one starts; only `strict` stops
/// the suite early. The returned `SuiteResult` reports failures but this
/// function still returns `Ok`; use [`SuiteResult::ensure_success`] to turn
/// them into an error.
///
/// With `dry_run` the plan is validated and `planned` filled in, but no
/// process is launched and no record is written.
///
/// # Example
///
/// ```no_run
/// use experiment_runner::runner::{PlanArgs, RunArgs, plan_suite, run_suite};
///
/// # async fn example() -> anyhow::Result<()> {
/// let plan = plan_suite(&PlanArgs::default())?;
/// let args = RunArgs {
///     interpreter: "python".to_string(),
///     program: "assign4.py".to_string(),
///     plan,
///     strict: false,
///     record_dir: None,
///     working_dir: None,
///     dry_run: false,
/// };
///
/// let result = run_suite(args).await?;
/// println!("{} of {} experiments succeeded", result.succeeded, result.experiments_run);
/// # Ok(())
/// # }
/// ```
pub async fn run_suite(args: RunArgs) -> Result<SuiteResult> {
    let planned = args.plan.invocations(&args.interpreter, &args.program);

    if args.dry_run {
        validate_experiments(&args.plan.experiments)?;
        return Ok(SuiteResult {
            suite_id: String::new(),
            experiments_run: 0,
            succeeded: 0,
            failed: 0,
            skipped: planned.len(),
            duration: Duration::ZERO,
            median_run: None,
            slowest_run: None,
            planned,
            dry_run: true,
            records: Vec::new(),
            persisted_record_dir: None,
        });
    }

    // Set up record directory (use temp dir if not provided)
    let (mut temp_dir, record_dir_path) = if let Some(dir) = args.record_dir {
        (None, dir)
    } else {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().to_path_buf();
        (Some(temp_dir), path)
    };

    #[cfg(test)]
    let launcher: Arc<dyn crate::coordination::Launcher> = match args.test_launcher {
        Some(launcher) => launcher,
        None => Arc::new(process_launcher(args.working_dir.as_deref())),
    };

    #[cfg(not(test))]
    let launcher: Arc<dyn crate::coordination::Launcher> =
        Arc::new(process_launcher(args.working_dir.as_deref()));

    let record_storage = Arc::new(LocalRunRecordStorage::new(record_dir_path));
    let coordinator = Coordinator::new(launcher, record_storage);

    let total = args.plan.experiments.len();
    let config = SuiteConfig {
        interpreter: args.interpreter,
        program: args.program,
        shared: args.plan.shared,
        experiments: args.plan.experiments,
        strict: args.strict,
    };

    let outcome: SuiteOutcome = coordinator.run_suite(&config).await?;

    // If there were failures and we used a temp directory, persist it for debugging
    let persisted_record_dir = match temp_dir.take() {
        Some(temp) if outcome.failed > 0 => Some(temp.keep()),
        _ => None,
    };

    Ok(SuiteResult {
        suite_id: outcome.suite_id,
        experiments_run: outcome.experiments_run,
        succeeded: outcome.succeeded,
        failed: outcome.failed,
        skipped: total - outcome.experiments_run,
        duration: outcome.duration,
        median_run: outcome.median_run,
        slowest_run: outcome.slowest_run,
        planned,
        dry_run: false,
        records: outcome.records,
        persisted_record_dir,
    })
}

fn process_launcher(working_dir: Option<&Path>) -> ProcessLauncher {
    match working_dir {
        Some(dir) => ProcessLauncher::new().with_working_dir(dir),
        None => ProcessLauncher::new(),
    }
}
