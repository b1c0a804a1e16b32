use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::experiment::Invocation;

/// Exit status of a child process that was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    pub success: bool,
    /// None when the child was terminated by a signal
    pub code: Option<i32>,
}

/// Starts the evaluation program for one experiment and waits for it
///
/// An `Err` means the child never started; a child that ran and failed is an
/// `Ok` with `success == false`.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, invocation: &Invocation) -> Result<ExitOutcome>;
}

/// Launches real child processes with inherited stdio
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher {
    working_dir: Option<PathBuf>,
}

impl ProcessLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run children in `dir` instead of the runner's working directory
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(&self, invocation: &Invocation) -> Result<ExitOutcome> {
        let mut command = Command::new(&invocation.interpreter);
        command
            .args(&invocation.args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        if let Some(ref dir) = self.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().with_context(|| {
            format!(
                "Failed to start '{}' for experiment {}",
                invocation.interpreter, invocation.experiment
            )
        })?;
        debug!(pid = child.id(), experiment = %invocation.experiment, "child started");

        let status = child
            .wait()
            .await
            .with_context(|| format!("Failed to wait for experiment {}", invocation.experiment))?;

        Ok(ExitOutcome {
            success: status.success(),
            code: status.code(),
        })
    }
}
