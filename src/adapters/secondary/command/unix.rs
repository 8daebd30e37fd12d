/*
Copyright 2024 San Francisco Compute Company

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Unix command execution adapter

use crate::domain::{CommandError, SystemError};
use crate::ports::{CommandExecutor, CommandOutput, SystemCommand};
use async_trait::async_trait;
use log::debug;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Unix-based command executor that enforces timeouts
pub struct UnixCommandExecutor {
    /// Default timeout for commands
    default_timeout: Duration,
    /// Number of retry attempts for failed commands
    retry_count: u32,
    /// Whether to log command execution (for debugging)
    verbose: bool,
}

impl UnixCommandExecutor {
    /// Create a new Unix command executor
    ///
    /// # Arguments
    /// * `default_timeout` - Default timeout for commands
    /// * `retry_count` - Number of retry attempts
    /// * `verbose` - Enable verbose logging
    pub fn new(default_timeout: Duration, retry_count: u32, verbose: bool) -> Self {
        Self {
            default_timeout,
            retry_count,
            verbose,
        }
    }

    /// Create a Unix command executor with default settings
    ///
    /// Hardware reads are never retried by default.
    pub fn with_defaults() -> Self {
        Self::new(Duration::from_secs(5), 0, false)
    }

    /// Execute a command with optional retry logic
    async fn execute_with_retry(
        &self,
        command: &SystemCommand,
    ) -> Result<CommandOutput, CommandError> {
        let mut attempt = 0;
        loop {
            match self.execute_once(command).await {
                Ok(output) => return Ok(output),
                Err(e) if attempt < self.retry_count => {
                    if self.verbose {
                        debug!(
                            "'{}' failed on attempt {}, retrying: {e}",
                            command.program,
                            attempt + 1
                        );
                    }
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(100 * u64::from(attempt))).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Execute a command once
    async fn execute_once(&self, command: &SystemCommand) -> Result<CommandOutput, CommandError> {
        let command_timeout = command.timeout.unwrap_or(self.default_timeout);

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if self.verbose {
            debug!("Executing: {}", command.display());
        }

        match timeout(command_timeout, cmd.output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let success = output.status.success();
                let exit_code = output.status.code();

                if self.verbose && !success {
                    debug!("Command failed with exit code: {exit_code:?}");
                    if !stderr.is_empty() {
                        debug!("stderr: {}", stderr.trim_end());
                    }
                }

                Ok(CommandOutput {
                    stdout,
                    stderr,
                    exit_code,
                    success,
                })
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => Err(
                SystemError::CommandNotFound(command.program.clone()).into(),
            ),
            Ok(Err(e)) => Err(CommandError::ExecutionFailed(format!(
                "Failed to execute command '{}': {}",
                command.program, e
            ))),
            Err(_) => Err(CommandError::ExecutionFailed(format!(
                "Command '{}' timed out after {:?}",
                command.program, command_timeout
            ))),
        }
    }
}

impl Default for UnixCommandExecutor {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl CommandExecutor for UnixCommandExecutor {
    async fn execute(&self, command: &SystemCommand) -> Result<CommandOutput, CommandError> {
        self.execute_with_retry(command).await
    }

    async fn is_command_available(&self, command_name: &str) -> Result<bool, CommandError> {
        let which_cmd = SystemCommand::new("which")
            .args(&[command_name])
            .timeout(Duration::from_secs(5));

        match self.execute(&which_cmd).await {
            Ok(output) => Ok(output.success && !output.stdout.trim().is_empty()),
            Err(_) => Ok(false), // If 'which' fails, assume command is not available
        }
    }

    async fn has_elevated_privileges(&self) -> Result<bool, CommandError> {
        // SAFETY: geteuid has no preconditions and cannot fail
        Ok(unsafe { libc::geteuid() } == 0)
    }
}
