use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::definition::{ExperimentConfig, SharedOptions, validate_experiments};

/// Suite description stored as JSON
///
/// ```json
/// {
///   "shared": { "data": "/data/stanfordSentimentTreebank" },
///   "experiments": [
///     { "name": "exp1", "model": "model_exp1.ckpt", "embeddings": "w2v.txt",
///       "static": true, "predictions": "predictions_exp1.txt" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteFile {
    #[serde(default)]
    pub shared: SharedOptions,
    pub experiments: Vec<ExperimentConfig>,
}

impl SuiteFile {
    /// Validate every experiment and reject duplicate names
    pub fn validate(&self) -> Result<()> {
        validate_experiments(&self.experiments)
    }
}

/// Load a suite file from disk, creating it with the provided initializer if missing.
pub fn load_or_init<F>(path: &Path, initializer: F) -> Result<SuiteFile>
where
    F: FnOnce() -> SuiteFile,
{
    let suite = if path.exists() {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read suite from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse suite from {}", path.display()))?
    } else {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        let value = initializer();
        let serialized = serde_json::to_string_pretty(&value)?;
        fs::write(path, serialized)
            .with_context(|| format!("failed to write suite to {}", path.display()))?;
        tracing::info!("Wrote default suite to {}", path.display());
        value
    };

    suite
        .validate()
        .with_context(|| format!("invalid suite in {}", path.display()))?;
    Ok(suite)
}
