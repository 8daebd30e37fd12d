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

use thiserror::Error;

/// System-level errors for adapters (not exposed past the status adapter)
#[derive(Debug, Clone, Error)]
pub enum SystemError {
    /// Command execution failed
    #[error("Command '{command}' failed{}{}", exit_suffix(.exit_code), stderr_suffix(.stderr))]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },
    /// Command not found
    #[error("Command not found: {0}")]
    CommandNotFound(String),
    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    /// I/O operation failed
    #[error("I/O error: {0}")]
    IoError(String),
    /// Parsing error
    #[error("Parse error: {0}")]
    ParseError(String),
    /// Timeout
    #[error("Timeout: {0}")]
    Timeout(String),
}

fn exit_suffix(exit_code: &Option<i32>) -> String {
    exit_code
        .map(|code| format!(" with exit code {code}"))
        .unwrap_or_default()
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

impl From<std::io::Error> for SystemError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => SystemError::PermissionDenied(err.to_string()),
            std::io::ErrorKind::TimedOut => SystemError::Timeout(err.to_string()),
            _ => SystemError::IoError(err.to_string()),
        }
    }
}

/// Command execution errors
#[derive(Debug, Clone, Error)]
pub enum CommandError {
    /// System error occurred
    #[error(transparent)]
    System(#[from] SystemError),
    /// Command execution failed
    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),
}

/// Errors raised while loading or validating platform configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("Failed to read configuration {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// Configuration file could not be parsed
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
    /// Configuration parsed but is not usable
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    /// File extension is neither TOML nor JSON
    #[error("Unsupported configuration format: {0}")]
    UnsupportedFormat(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

/// Failures inside the status adapter.
///
/// These never cross the public accessor boundary: each accessor folds them
/// into its fail-safe value (absent, `Unknown`, 0) after logging.
#[derive(Debug, Clone, Error)]
pub enum StatusError {
    /// Bus transaction or management-controller query failed or timed out
    #[error("I/O failure: {0}")]
    IoFailure(String),
    /// No configured limit for the unit class / airflow combination
    #[error("No configuration entry for {0}")]
    ConfigLookup(String),
}

impl From<SystemError> for StatusError {
    fn from(err: SystemError) -> Self {
        StatusError::IoFailure(err.to_string())
    }
}

impl From<CommandError> for StatusError {
    fn from(err: CommandError) -> Self {
        StatusError::IoFailure(err.to_string())
    }
}
