use anyhow::{Result, anyhow};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One experiment: a single invocation of the evaluation program
///
/// Paths are passed to the child verbatim; relative paths resolve against the
/// runner's working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[builder(setter(into))]
pub struct ExperimentConfig {
    /// Short label used in banners, logs and run records (e.g. "exp1")
    pub name: String,
    /// Model checkpoint path (`--model`)
    pub model: String,
    /// Primary embeddings file (`--embeddings`)
    pub embeddings: String,
    /// Secondary embeddings file (`--embeddings2`), two-channel runs only
    #[builder(default, setter(into, strip_option))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embeddings2: Option<String>,
    /// Use both embedding sources side by side (`--two_channel`)
    #[builder(default)]
    #[serde(default)]
    pub two_channel: bool,
    /// Keep embeddings frozen (`--static`)
    #[builder(default)]
    #[serde(default, rename = "static")]
    pub is_static: bool,
    /// Load the checkpoint and only write predictions (`--eval_only_mode`)
    #[builder(default = "true")]
    #[serde(default = "default_eval_only")]
    pub eval_only: bool,
    /// Output predictions path (`--predictions`)
    pub predictions: String,
}

fn default_eval_only() -> bool {
    true
}

impl ExperimentConfig {
    /// Check the flag combination before anything is launched
    ///
    /// The evaluation program aborts when two-channel mode is requested without a
    /// second embeddings file, so that combination is rejected here instead.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow!("Experiment name cannot be empty"));
        }

        for (flag, value) in [
            ("--model", &self.model),
            ("--embeddings", &self.embeddings),
            ("--predictions", &self.predictions),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow!(
                    "Experiment '{}' has an empty {} path",
                    self.name,
                    flag
                ));
            }
        }

        match (&self.embeddings2, self.two_channel) {
            (None, true) => Err(anyhow!(
                "Experiment '{}' is two-channel but has no second embeddings file",
                self.name
            )),
            (Some(_), false) => Err(anyhow!(
                "Experiment '{}' sets a second embeddings file without two-channel mode",
                self.name
            )),
            (Some(path), true) if path.trim().is_empty() => Err(anyhow!(
                "Experiment '{}' has an empty --embeddings2 path",
                self.name
            )),
            _ => Ok(()),
        }
    }

    /// Build the argument vector passed to the evaluation program
    ///
    /// Order: --model, --embeddings, [--embeddings2], [--eval_only_mode],
    /// [--static], [--two_channel], --predictions.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--model".to_string(),
            self.model.clone(),
            "--embeddings".to_string(),
            self.embeddings.clone(),
        ];

        if let Some(ref embeddings2) = self.embeddings2 {
            args.push("--embeddings2".to_string());
            args.push(embeddings2.clone());
        }
        if self.eval_only {
            args.push("--eval_only_mode".to_string());
        }
        if self.is_static {
            args.push("--static".to_string());
        }
        if self.two_channel {
            args.push("--two_channel".to_string());
        }

        args.push("--predictions".to_string());
        args.push(self.predictions.clone());
        args
    }
}

/// Validate a whole experiment list: non-empty, each valid, unique names
pub fn validate_experiments(experiments: &[ExperimentConfig]) -> Result<()> {
    if experiments.is_empty() {
        return Err(anyhow!("No experiments to run"));
    }

    let mut seen = HashSet::new();
    for experiment in experiments {
        experiment.validate()?;
        if !seen.insert(experiment.name.as_str()) {
            return Err(anyhow!("Duplicate experiment name '{}'", experiment.name));
        }
    }
    Ok(())
}

/// Options forwarded unchanged to every experiment
///
/// The step and batch settings only affect training runs; the program ignores
/// them in eval-only mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedOptions {
    /// Dataset directory (`--data`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Phrase-ids directory (`--ids`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<String>,
    /// Training batch size (`--batch_size`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    /// Training step limit (`--max_steps`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u32>,
    /// Validation interval in steps (`--eval_every`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_every: Option<u32>,
    /// Log interval in steps (`--log_every`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_every: Option<u32>,
}

impl SharedOptions {
    /// Fill every unset option from `fallback`
    pub fn or(self, fallback: SharedOptions) -> SharedOptions {
        SharedOptions {
            data: self.data.or(fallback.data),
            ids: self.ids.or(fallback.ids),
            batch_size: self.batch_size.or(fallback.batch_size),
            max_steps: self.max_steps.or(fallback.max_steps),
            eval_every: self.eval_every.or(fallback.eval_every),
            log_every: self.log_every.or(fallback.log_every),
        }
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for (flag, value) in [("--data", &self.data), ("--ids", &self.ids)] {
            if let Some(value) = value {
                args.push(flag.to_string());
                args.push(value.clone());
            }
        }
        for (flag, value) in [
            ("--batch_size", self.batch_size),
            ("--max_steps", self.max_steps),
            ("--eval_every", self.eval_every),
            ("--log_every", self.log_every),
        ] {
            if let Some(value) = value {
                args.push(flag.to_string());
                args.push(value.to_string());
            }
        }
        args
    }
}

/// A fully resolved child process command for one experiment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub experiment: String,
    pub interpreter: String,
    /// Arguments after the interpreter, starting with the program path
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(
        interpreter: &str,
        program: &str,
        experiment: &ExperimentConfig,
        shared: &SharedOptions,
    ) -> Self {
        let mut args = Vec::with_capacity(16);
        args.push(program.to_string());
        args.extend(experiment.to_args());
        args.extend(shared.to_args());

        Self {
            experiment: experiment.name.clone(),
            interpreter: interpreter.to_string(),
            args,
        }
    }

    /// Arguments after the program path, i.e. what the evaluation program parses
    pub fn program_args(&self) -> &[String] {
        self.args.get(1..).unwrap_or_default()
    }

    /// Render as a single shell-like line for display
    pub fn command_line(&self) -> String {
        std::iter::once(&self.interpreter)
            .chain(self.args.iter())
            .map(|part| quote_arg(part))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// POSIX single-quoting for anything outside a conservative safe set
fn quote_arg(arg: &str) -> String {
    let safe = |c: char| c.is_ascii_alphanumeric() || "_-./:=,+@%".contains(c);
    if !arg.is_empty() && arg.chars().all(safe) {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
