//! External commands: make targets and support-bundle collection

use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::process::Command;
use tracing::{info, warn};

use kcm_common::Error;

/// `make test-apply` builds images and installs the chart, so it gets a
/// generous budget.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// One external command invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    /// Program to run
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
}

impl Invocation {
    /// `program` with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Append an argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set an environment variable for the child
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Command line for logs and errors
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Runs external commands to completion
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `invocation`, returning stdout on success
    async fn run(&self, invocation: &Invocation) -> Result<String, Error>;
}

/// Runs commands as child processes with a timeout
#[derive(Clone, Debug)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl ProcessRunner {
    /// Runner that kills commands after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<String, Error> {
        let description = invocation.display();
        info!(command = %description, "running");

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                Error::command(
                    &description,
                    format!("timed out after {:?}", self.timeout),
                    None,
                )
            })?
            .map_err(|e| Error::command(&description, format!("failed to execute: {e}"), None))?;

        if output.status.success() {
            info!(command = %description, "succeeded");
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(command = %description, stderr = %stderr, "failed");
            Err(Error::command(description, stderr, output.status.code()))
        }
    }
}
