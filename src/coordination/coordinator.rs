use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use derive_builder::Builder;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::launcher::Launcher;
use super::manifest::{ExperimentStatus, RunRecord, RunRecordStorage, SuiteRecord};
use crate::config::SEPARATOR;
use crate::experiment::{ExperimentConfig, Invocation, SharedOptions, validate_experiments};
use crate::telemetry::{SuiteStats, TelemetryEvent};

/// Configuration for a suite run
#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct SuiteConfig {
    pub interpreter: String,
    pub program: String,
    #[builder(default)]
    pub shared: SharedOptions,
    pub experiments: Vec<ExperimentConfig>,
    /// Stop after the first failed experiment
    #[builder(default)]
    pub strict: bool,
}

/// Result of a completed suite run
#[derive(Debug)]
pub struct SuiteOutcome {
    pub suite_id: String,
    pub experiments_run: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// True when strict mode skipped the remaining experiments
    pub aborted: bool,
    pub duration: Duration,
    pub median_run: Option<Duration>,
    pub slowest_run: Option<Duration>,
    pub failed_names: Vec<String>,
    pub records: Vec<RunRecord>,
}

/// The Coordinator runs the experiments of a suite one after another.
pub struct Coordinator {
    launcher: Arc<dyn Launcher>,
    record_storage: Arc<dyn RunRecordStorage>,
    /// Destination of the banners and separators, stdout unless replaced
    output: Mutex<Box<dyn Write + Send>>,
}

impl Coordinator {
    pub fn new(launcher: Arc<dyn Launcher>, record_storage: Arc<dyn RunRecordStorage>) -> Self {
        Self {
            launcher,
            record_storage,
            output: Mutex::new(Box::new(io::stdout())),
        }
    }

    /// Send banners and separators somewhere other than stdout
    pub fn with_output(mut self, output: Box<dyn Write + Send>) -> Self {
        self.output = Mutex::new(output);
        self
    }

    /// Run the complete suite
    ///
    /// 1. Validate every experiment before launching anything
    /// 2. Write the suite record
    /// 3. Launch each experiment in order and wait for it
    /// 4. Aggregate the per-experiment records
    ///
    /// A failed experiment does not stop the suite unless `strict` is set.
    pub async fn run_suite(&self, config: &SuiteConfig) -> Result<SuiteOutcome> {
        let start_time = Instant::now();

        // 1. Validate
        validate_experiments(&config.experiments)?;

        let suite_id = Uuid::new_v4().to_string();
        info!(
            "Starting suite {} with {} experiments",
            suite_id,
            config.experiments.len()
        );

        // 2. Suite record
        self.write_suite_record(&suite_id, config).await?;

        // 3. Telemetry collector and sequential launches
        let (telemetry_tx, telemetry_rx) = mpsc::unbounded_channel::<TelemetryEvent>();
        let collector = Self::spawn_stats_collector(config.experiments.len(), telemetry_rx);

        let total = config.experiments.len();
        let mut records = Vec::with_capacity(total);
        let mut aborted = false;

        for (idx, experiment) in config.experiments.iter().enumerate() {
            let index = idx as u32 + 1;
            let invocation = Invocation::new(
                &config.interpreter,
                &config.program,
                experiment,
                &config.shared,
            );

            self.emit(&[
                SEPARATOR.to_string(),
                format!("Experiment {}/{}: {}", index, total, experiment.name),
                invocation.command_line(),
                SEPARATOR.to_string(),
            ]);

            let _ = telemetry_tx.send(TelemetryEvent::ExperimentStarted {
                name: experiment.name.clone(),
            });

            let record = self.run_experiment(index, &invocation).await;

            self.emit(&[SEPARATOR.to_string(), String::new()]);

            let _ = telemetry_tx.send(TelemetryEvent::ExperimentFinished {
                name: record.experiment.clone(),
                succeeded: record.status.is_success(),
                duration_ms: record.duration_ms,
            });

            // Records on disk are informational only
            if let Err(e) = self.record_storage.write_run(&suite_id, &record).await {
                warn!(
                    "Failed to write run record of {}: {:#}",
                    record.experiment, e
                );
            }

            let failed = !record.status.is_success();
            let name = record.experiment.clone();
            records.push(record);

            if config.strict && failed {
                warn!(
                    "Strict mode: stopping after failed experiment {}, {} not run",
                    name,
                    total - records.len()
                );
                aborted = true;
                break;
            }
        }

        // Close the channel so the collector finishes
        drop(telemetry_tx);
        let stats = collector
            .await
            .map_err(|e| anyhow!("Telemetry collector panicked: {}", e))?;

        // 4. Aggregate
        Ok(Self::aggregate(suite_id, records, &stats, aborted, start_time))
    }

    /// Write lines to the banner output
    ///
    /// Flushed right away so banners land before the child's own output.
    fn emit(&self, lines: &[String]) {
        let mut output = match self.output.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for line in lines {
            if let Err(e) = writeln!(output, "{}", line) {
                warn!("Failed to write banner: {}", e);
                return;
            }
        }
        let _ = output.flush();
    }

    async fn write_suite_record(&self, suite_id: &str, config: &SuiteConfig) -> Result<()> {
        let suite = SuiteRecord {
            suite_id: suite_id.to_string(),
            created_at: Utc::now().to_rfc3339(),
            interpreter: config.interpreter.clone(),
            program: config.program.clone(),
            strict: config.strict,
            shared: config.shared.clone(),
            experiments: config.experiments.clone(),
        };

        self.record_storage
            .write_suite(&suite)
            .await
            .context("Failed to write suite record")
    }

    /// Launch one experiment and turn whatever happens into a record
    async fn run_experiment(&self, index: u32, invocation: &Invocation) -> RunRecord {
        info!("Launching {}", invocation.experiment);

        let started_at = Utc::now();
        let start_instant = Instant::now();
        let launch_result = self.launcher.launch(invocation).await;
        let duration_ms = start_instant.elapsed().as_millis() as u64;

        let (status, exit_code, error) = match launch_result {
            Ok(outcome) if outcome.success => {
                info!(
                    "{} finished successfully in {:.2}s",
                    invocation.experiment,
                    duration_ms as f64 / 1000.0
                );
                (ExperimentStatus::Succeeded, outcome.code, None)
            }
            Ok(outcome) => {
                match outcome.code {
                    Some(code) => warn!("{} exited with code {}", invocation.experiment, code),
                    None => warn!("{} was terminated by a signal", invocation.experiment),
                }
                (ExperimentStatus::Failed, outcome.code, None)
            }
            Err(e) => {
                warn!("{} could not be started: {:#}", invocation.experiment, e);
                (ExperimentStatus::SpawnFailed, None, Some(format!("{:#}", e)))
            }
        };

        let mut command = Vec::with_capacity(invocation.args.len() + 1);
        command.push(invocation.interpreter.clone());
        command.extend(invocation.args.iter().cloned());

        RunRecord {
            index,
            experiment: invocation.experiment.clone(),
            command,
            status,
            exit_code,
            error,
            started_at: started_at.to_rfc3339(),
            completed_at: Utc::now().to_rfc3339(),
            duration_ms,
        }
    }

    /// Aggregate telemetry events until the sender side is dropped
    fn spawn_stats_collector(
        total: usize,
        mut telemetry_rx: mpsc::UnboundedReceiver<TelemetryEvent>,
    ) -> tokio::task::JoinHandle<SuiteStats> {
        tokio::spawn(async move {
            let mut stats = SuiteStats::new();

            while let Some(event) = telemetry_rx.recv().await {
                stats.update(&event);

                match event {
                    TelemetryEvent::ExperimentStarted { name } => {
                        debug!(
                            "Started {} ({}/{} launched)",
                            name, stats.experiments_started, total
                        );
                    }
                    TelemetryEvent::ExperimentFinished { .. } => {
                        info!(
                            "Progress: {}/{} experiments finished ({} failed)",
                            stats.experiments_finished, total, stats.failed
                        );
                    }
                }
            }

            stats
        })
    }

    fn aggregate(
        suite_id: String,
        records: Vec<RunRecord>,
        stats: &SuiteStats,
        aborted: bool,
        start_time: Instant,
    ) -> SuiteOutcome {
        let duration = start_time.elapsed();
        let (median_ms, slowest_ms) = stats.duration_summary();

        info!(
            "Suite complete: {} experiments, {} succeeded, {} failed in {:.2}s",
            stats.experiments_finished,
            stats.succeeded,
            stats.failed,
            duration.as_secs_f64()
        );
        if !stats.failed_names.is_empty() {
            warn!("Failed experiments: {}", stats.failed_names.join(", "));
        }

        SuiteOutcome {
            suite_id,
            experiments_run: stats.experiments_finished,
            succeeded: stats.succeeded,
            failed: stats.failed,
            aborted,
            duration,
            median_run: median_ms.map(Duration::from_millis),
            slowest_run: slowest_ms.map(Duration::from_millis),
            failed_names: stats.failed_names.clone(),
            records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::launcher::fake::RecordingLauncher;
    use crate::coordination::manifest::LocalRunRecordStorage;
    use crate::experiment::{CatalogPaths, builtin_experiments};
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Banner sink shared with the test body
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Storage whose run record writes fail for one index
    struct FlakyStorage {
        inner: LocalRunRecordStorage,
        fail_index: u32,
    }

    #[async_trait]
    impl RunRecordStorage for FlakyStorage {
        async fn write_suite(&self, suite: &SuiteRecord) -> Result<()> {
            self.inner.write_suite(suite).await
        }

        async fn read_suite(&self, suite_id: &str) -> Result<SuiteRecord> {
            self.inner.read_suite(suite_id).await
        }

        async fn write_run(&self, suite_id: &str, record: &RunRecord) -> Result<()> {
            if record.index == self.fail_index {
                return Err(anyhow!("disk full"));
            }
            self.inner.write_run(suite_id, record).await
        }

        async fn read_run(&self, suite_id: &str, index: u32) -> Result<RunRecord> {
            self.inner.read_run(suite_id, index).await
        }
    }

    fn suite_config(strict: bool) -> SuiteConfig {
        SuiteConfigBuilder::default()
            .interpreter("python")
            .program("assign4.py")
            .experiments(builtin_experiments(&CatalogPaths::default(), true))
            .strict(strict)
            .build()
            .unwrap()
    }

    fn coordinator(launcher: Arc<RecordingLauncher>, dir: &TempDir) -> Coordinator {
        Coordinator::new(
            launcher,
            Arc::new(LocalRunRecordStorage::new(dir.path().to_path_buf())),
        )
    }

    #[tokio::test]
    async fn test_runs_all_experiments_in_order() {
        let dir = TempDir::new().unwrap();
        let launcher = Arc::new(RecordingLauncher::new());

        let outcome = coordinator(launcher.clone(), &dir)
            .run_suite(&suite_config(false))
            .await
            .unwrap();

        assert_eq!(
            launcher.launched_names(),
            ["exp1", "exp2", "exp3", "exp4", "exp5", "exp6"]
        );
        assert_eq!(outcome.experiments_run, 6);
        assert_eq!(outcome.succeeded, 6);
        assert_eq!(outcome.failed, 0);
        assert!(!outcome.aborted);
        assert_eq!(outcome.records.len(), 6);
        assert_eq!(outcome.records[0].index, 1);
        assert_eq!(outcome.records[5].experiment, "exp6");
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_suite() {
        let dir = TempDir::new().unwrap();
        let launcher = Arc::new(RecordingLauncher::new().exit_with("exp2", 1));

        let outcome = coordinator(launcher.clone(), &dir)
            .run_suite(&suite_config(false))
            .await
            .unwrap();

        assert_eq!(launcher.launched_names().len(), 6);
        assert_eq!(outcome.succeeded, 5);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.failed_names, ["exp2"]);
        assert!(outcome.slowest_run.is_some());
        assert_eq!(outcome.records[1].status, ExperimentStatus::Failed);
        assert_eq!(outcome.records[1].exit_code, Some(1));
        assert_eq!(outcome.records[2].status, ExperimentStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_recorded_and_skipped() {
        let dir = TempDir::new().unwrap();
        let launcher = Arc::new(RecordingLauncher::new().fail_spawn("exp1"));

        let outcome = coordinator(launcher.clone(), &dir)
            .run_suite(&suite_config(false))
            .await
            .unwrap();

        assert_eq!(outcome.experiments_run, 6);
        let first = &outcome.records[0];
        assert_eq!(first.status, ExperimentStatus::SpawnFailed);
        assert_eq!(first.exit_code, None);
        assert!(first.error.as_deref().unwrap().contains("os error 2"));
    }

    #[tokio::test]
    async fn test_strict_mode_stops_at_first_failure() {
        let dir = TempDir::new().unwrap();
        let launcher = Arc::new(RecordingLauncher::new().exit_with("exp3", 2));

        let outcome = coordinator(launcher.clone(), &dir)
            .run_suite(&suite_config(true))
            .await
            .unwrap();

        assert_eq!(launcher.launched_names(), ["exp1", "exp2", "exp3"]);
        assert!(outcome.aborted);
        assert_eq!(outcome.experiments_run, 3);
        assert_eq!(outcome.failed, 1);
    }

    #[tokio::test]
    async fn test_invocation_arguments_match_catalog() {
        let dir = TempDir::new().unwrap();
        let launcher = Arc::new(RecordingLauncher::new());
        let config = suite_config(false);

        coordinator(launcher.clone(), &dir)
            .run_suite(&config)
            .await
            .unwrap();

        let invocations = launcher.invocations.lock().unwrap();
        for (invocation, experiment) in invocations.iter().zip(&config.experiments) {
            assert_eq!(invocation.interpreter, "python");
            assert_eq!(invocation.args[0], "assign4.py");
            assert_eq!(invocation.program_args(), experiment.to_args().as_slice());
        }
    }

    #[tokio::test]
    async fn test_invalid_experiment_launches_nothing() {
        let dir = TempDir::new().unwrap();
        let launcher = Arc::new(RecordingLauncher::new());
        let mut config = suite_config(false);
        config.experiments[4].two_channel = true;

        let err = coordinator(launcher.clone(), &dir)
            .run_suite(&config)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("exp5"));
        assert!(launcher.launched_names().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_names_rejected() {
        let dir = TempDir::new().unwrap();
        let launcher = Arc::new(RecordingLauncher::new());
        let mut config = suite_config(false);
        config.experiments[1].name = "exp1".to_string();

        assert!(
            coordinator(launcher, &dir)
                .run_suite(&config)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_suite_record_written() {
        let dir = TempDir::new().unwrap();
        let launcher = Arc::new(RecordingLauncher::new());
        let storage = Arc::new(LocalRunRecordStorage::new(dir.path().to_path_buf()));
        let coordinator = Coordinator::new(launcher, storage.clone());

        let outcome = coordinator.run_suite(&suite_config(true)).await.unwrap();

        let suite = storage.read_suite(&outcome.suite_id).await.unwrap();
        assert!(suite.strict);
        assert_eq!(suite.experiments.len(), 6);
        assert_eq!(suite.program, "assign4.py");
    }

    #[tokio::test]
    async fn test_record_write_failure_does_not_stop_suite() {
        let dir = TempDir::new().unwrap();
        let launcher = Arc::new(RecordingLauncher::new());
        let storage = Arc::new(FlakyStorage {
            inner: LocalRunRecordStorage::new(dir.path().to_path_buf()),
            fail_index: 2,
        });

        let outcome = Coordinator::new(launcher.clone(), storage.clone())
            .run_suite(&suite_config(false))
            .await
            .unwrap();

        assert_eq!(launcher.launched_names().len(), 6);
        assert_eq!(outcome.experiments_run, 6);
        assert_eq!(outcome.records.len(), 6);
        assert_eq!(outcome.records[1].experiment, "exp2");
        assert!(storage.read_run(&outcome.suite_id, 2).await.is_err());
        assert!(storage.read_run(&outcome.suite_id, 3).await.is_ok());
    }

    #[tokio::test]
    async fn test_separators_surround_every_experiment() {
        let dir = TempDir::new().unwrap();
        let buffer = SharedBuffer::default();
        let launcher = Arc::new(
            RecordingLauncher::new()
                .exit_with("exp2", 1)
                .fail_spawn("exp4"),
        );

        coordinator(launcher, &dir)
            .with_output(Box::new(buffer.clone()))
            .run_suite(&suite_config(false))
            .await
            .unwrap();

        let output = buffer.contents();
        let blocks: Vec<&str> = output.split("\n\n").filter(|b| !b.is_empty()).collect();
        assert_eq!(blocks.len(), 6);

        for (idx, block) in blocks.iter().enumerate() {
            let lines: Vec<&str> = block.lines().collect();
            assert_eq!(lines.len(), 5, "unexpected block: {block}");
            assert_eq!(lines[0], SEPARATOR);
            assert_eq!(lines[1], format!("Experiment {}/6: exp{}", idx + 1, idx + 1));
            assert!(lines[2].starts_with("python assign4.py "));
            assert_eq!(lines[3], SEPARATOR);
            assert_eq!(lines[4], SEPARATOR);
        }
    }

    #[tokio::test]
    async fn test_separators_closed_before_strict_stop() {
        let dir = TempDir::new().unwrap();
        let buffer = SharedBuffer::default();
        let launcher = Arc::new(RecordingLauncher::new().fail_spawn("exp1"));

        coordinator(launcher, &dir)
            .with_output(Box::new(buffer.clone()))
            .run_suite(&suite_config(true))
            .await
            .unwrap();

        let output = buffer.contents();
        assert_eq!(output.matches(SEPARATOR).count(), 3);
        assert!(output.ends_with(&format!("{}\n\n", SEPARATOR)));
        assert!(!output.contains("exp2"));
    }
}
