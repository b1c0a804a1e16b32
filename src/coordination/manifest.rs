use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::config::SUITE_RECORD_FILE;
use crate::experiment::{ExperimentConfig, SharedOptions};

/// Outcome of a single experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    /// Child exited with status 0
    Succeeded,
    /// Child exited non-zero or was killed by a signal
    Failed,
    /// Child could not be started at all
    SpawnFailed,
}

impl ExperimentStatus {
    pub fn is_success(self) -> bool {
        matches!(self, ExperimentStatus::Succeeded)
    }
}

/// Suite description written by the coordinator before the first launch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteRecord {
    pub suite_id: String,
    pub created_at: String, // ISO 8601
    pub interpreter: String,
    pub program: String,
    pub strict: bool,
    #[serde(default)]
    pub shared: SharedOptions,
    pub experiments: Vec<ExperimentConfig>,
}

/// The record written after each experiment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub index: u32,
    pub experiment: String,
    /// Interpreter followed by its arguments
    pub command: Vec<String>,
    pub status: ExperimentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: String,   // ISO 8601
    pub completed_at: String, // ISO 8601
    pub duration_ms: u64,
}

/// Trait for run record storage operations
///
/// Records are informational only; nothing reads them back to make decisions
/// during a run.
#[async_trait]
pub trait RunRecordStorage: Send + Sync {
    /// Write the suite description
    async fn write_suite(&self, suite: &SuiteRecord) -> Result<()>;

    /// Read the suite description
    async fn read_suite(&self, suite_id: &str) -> Result<SuiteRecord>;

    /// Write the record of a finished experiment
    async fn write_run(&self, suite_id: &str, record: &RunRecord) -> Result<()>;

    /// Read the record of a finished experiment
    async fn read_run(&self, suite_id: &str, index: u32) -> Result<RunRecord>;
}

/// Local filesystem implementation of RunRecordStorage
///
/// Directory structure:
///   {base_dir}/suites/{suite_id}/suite.json
///   {base_dir}/suites/{suite_id}/runs/{index:02}.json
pub struct LocalRunRecordStorage {
    base_dir: PathBuf,
}

impl LocalRunRecordStorage {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    fn suite_dir(&self, suite_id: &str) -> PathBuf {
        self.base_dir.join("suites").join(suite_id)
    }

    fn runs_dir(&self, suite_id: &str) -> PathBuf {
        self.suite_dir(suite_id).join("runs")
    }

    fn suite_path(&self, suite_id: &str) -> PathBuf {
        self.suite_dir(suite_id).join(SUITE_RECORD_FILE)
    }

    /// Get the record file path for an experiment
    pub fn run_path(&self, suite_id: &str, index: u32) -> PathBuf {
        self.runs_dir(suite_id).join(format!("{:02}.json", index))
    }
}

#[async_trait]
impl RunRecordStorage for LocalRunRecordStorage {
    async fn write_suite(&self, suite: &SuiteRecord) -> Result<()> {
        let runs_dir = self.runs_dir(&suite.suite_id);
        fs::create_dir_all(&runs_dir)
            .await
            .context("Failed to create run record directory")?;

        let json = serde_json::to_string_pretty(suite).context("Failed to serialize suite")?;
        fs::write(self.suite_path(&suite.suite_id), json)
            .await
            .context("Failed to write suite file")?;

        Ok(())
    }

    async fn read_suite(&self, suite_id: &str) -> Result<SuiteRecord> {
        let contents = fs::read_to_string(self.suite_path(suite_id))
            .await
            .context("Failed to read suite file")?;

        serde_json::from_str(&contents).context("Failed to parse suite file")
    }

    async fn write_run(&self, suite_id: &str, record: &RunRecord) -> Result<()> {
        let json = serde_json::to_string_pretty(record).context("Failed to serialize run record")?;

        fs::write(self.run_path(suite_id, record.index), json)
            .await
            .context("Failed to write run record")?;

        Ok(())
    }

    async fn read_run(&self, suite_id: &str, index: u32) -> Result<RunRecord> {
        let contents = fs::read_to_string(self.run_path(suite_id, index))
            .await
            .context("Failed to read run record")?;

        serde_json::from_str(&contents).context("Failed to parse run record")
    }
}
