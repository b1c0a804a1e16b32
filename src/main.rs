use clap::{Args as ClapArgs, Parser, Subcommand};
use experiment_runner::runner::{PlanArgs, RunArgs, plan_suite, run_suite};
use experiment_runner::{DEFAULT_INTERPRETER, DEFAULT_PROGRAM};
use std::path::PathBuf;

#[derive(Parser, Clone)]
#[command(
    author,
    version,
    about = "Run the word-embedding classifier experiments one after another"
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

/// Options that decide which experiments run and with which files
#[derive(ClapArgs, Clone)]
struct SuiteOptions {
    /// Directory holding the pretrained embedding files
    #[arg(long, default_value = ".")]
    embeddings_dir: PathBuf,

    /// Directory for model checkpoints and predictions files
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// JSON suite file (created from the built-in experiments if missing)
    #[arg(long)]
    suite: Option<PathBuf>,

    /// Run the built-in experiments as training runs instead of eval-only
    #[arg(long)]
    train: bool,

    /// Only run the named experiment (repeatable, e.g. --only exp1 --only exp4)
    #[arg(long)]
    only: Vec<String>,

    /// Dataset directory forwarded as --data
    #[arg(long)]
    data: Option<String>,

    /// Phrase-ids directory forwarded as --ids
    #[arg(long)]
    ids: Option<String>,

    /// Forwarded as --batch_size
    #[arg(long)]
    batch_size: Option<u32>,

    /// Forwarded as --max_steps
    #[arg(long)]
    max_steps: Option<u32>,

    /// Forwarded as --eval_every
    #[arg(long)]
    eval_every: Option<u32>,

    /// Forwarded as --log_every
    #[arg(long)]
    log_every: Option<u32>,
}

impl SuiteOptions {
    fn into_plan_args(self) -> PlanArgs {
        PlanArgs {
            embeddings_dir: self.embeddings_dir,
            output_dir: self.output_dir,
            suite_file: self.suite,
            train: self.train,
            only: self.only,
            data: self.data,
            ids: self.ids,
            batch_size: self.batch_size,
            max_steps: self.max_steps,
            eval_every: self.eval_every,
            log_every: self.log_every,
        }
    }
}

#[derive(Clone, Subcommand)]
enum Command {
    /// Launch every experiment in order
    Run {
        #[command(flatten)]
        suite: SuiteOptions,

        /// Evaluation program to launch
        #[arg(short, long, default_value = DEFAULT_PROGRAM)]
        program: String,

        /// Interpreter used to launch the program
        #[arg(short, long, default_value = DEFAULT_INTERPRETER)]
        interpreter: String,

        /// Working directory for the child processes
        #[arg(long)]
        workdir: Option<PathBuf>,

        /// Stop at the first failed experiment and exit non-zero
        #[arg(long)]
        strict: bool,

        /// Show the commands without launching anything
        #[arg(long)]
        dry_run: bool,

        /// Directory for run records (default: system temp directory, kept on failure)
        #[arg(long)]
        record_dir: Option<PathBuf>,

        /// Quiet mode - only warnings and the summary
        #[arg(short, long)]
        quiet: bool,
    },
    /// Print the experiments that would run
    List {
        #[command(flatten)]
        suite: SuiteOptions,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Run {
            suite,
            program,
            interpreter,
            workdir,
            strict,
            dry_run,
            record_dir,
            quiet,
        } => {
            run_experiments(
                suite,
                program,
                interpreter,
                workdir,
                strict,
                dry_run,
                record_dir,
                quiet,
            )
            .await?;
        }
        Command::List { suite } => {
            list_experiments(suite)?;
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_experiments(
    suite: SuiteOptions,
    program: String,
    interpreter: String,
    workdir: Option<PathBuf>,
    strict: bool,
    dry_run: bool,
    record_dir: Option<PathBuf>,
    quiet: bool,
) -> anyhow::Result<()> {
    // Initialize tracing based on quiet mode
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    let filter = if quiet {
        EnvFilter::new("experiment_runner=warn")
    } else {
        EnvFilter::new("experiment_runner=info")
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let plan = plan_suite(&suite.into_plan_args())?;

    if !quiet {
        println!("Experiment Runner");
        println!("=================");
        println!("Program: {} {}", interpreter, program);
        println!("Experiments: {}", plan.experiments.len());
        println!("Strict: {}", strict);
        println!();
    }

    let run_args = RunArgs {
        interpreter,
        program,
        plan,
        strict,
        record_dir,
        working_dir: workdir,
        dry_run,
    };

    let result = run_suite(run_args).await?;

    if result.dry_run {
        println!("DRY RUN MODE - No experiments will be launched");
        println!();
        for invocation in &result.planned {
            println!("[{}] {}", invocation.experiment, invocation.command_line());
        }
        println!();
        println!("To execute, run without --dry-run");
        return Ok(());
    }

    println!();
    println!("Suite Summary");
    println!("=============");
    println!("Suite ID: {}", result.suite_id);
    println!("Experiments run: {}", result.experiments_run);
    println!("Succeeded: {}", result.succeeded);
    println!("Failed: {}", result.failed);
    if result.skipped > 0 {
        println!("Skipped: {}", result.skipped);
    }
    println!("Duration: {:.2}s", result.duration.as_secs_f64());
    if let Some(median) = result.median_run {
        println!("Median experiment: {:.2}s", median.as_secs_f64());
    }
    if let Some(slowest) = result.slowest_run {
        println!("Slowest experiment: {:.2}s", slowest.as_secs_f64());
    }

    for record in result.failed_experiments() {
        match (record.exit_code, &record.error) {
            (_, Some(error)) => println!("  {} could not be started: {}", record.experiment, error),
            (Some(code), None) => println!("  {} exited with code {}", record.experiment, code),
            (None, None) => println!("  {} was terminated by a signal", record.experiment),
        }
    }

    // If failures occurred and records were persisted, tell the user where to find them
    if let Some(ref persisted_path) = result.persisted_record_dir {
        println!();
        println!("Failures detected! Run records have been preserved for debugging:");
        println!("  {}", persisted_path.display());
        println!();
        println!("To inspect them:");
        println!("  ls {}/suites/{}/runs/", persisted_path.display(), result.suite_id);
    }

    // Failures only change the exit code when asked to
    if strict {
        result.ensure_success()?;
    }

    Ok(())
}

fn list_experiments(suite: SuiteOptions) -> anyhow::Result<()> {
    let plan = plan_suite(&suite.into_plan_args())?;

    for (idx, experiment) in plan.experiments.iter().enumerate() {
        let embeddings = match experiment.embeddings2 {
            Some(ref second) => format!("{} + {}", experiment.embeddings, second),
            None => experiment.embeddings.clone(),
        };

        println!("{}. {}", idx + 1, experiment.name);
        println!("   embeddings:  {}", embeddings);
        println!(
            "   mode:        {}{}{}",
            if experiment.two_channel { "two-channel" } else { "single-channel" },
            if experiment.is_static { ", static" } else { ", fine-tuned" },
            if experiment.eval_only { ", eval-only" } else { ", training" },
        );
        println!("   model:       {}", experiment.model);
        println!("   predictions: {}", experiment.predictions);
    }

    Ok(())
}
