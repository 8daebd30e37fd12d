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

//! Configuration providers

use crate::domain::{ConfigError, PlatformConfig};
use crate::ports::ConfigurationProvider;
use async_trait::async_trait;
use log::info;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Loads the platform configuration from a TOML or JSON file
pub struct FileConfigurationProvider {
    path: PathBuf,
}

impl FileConfigurationProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigurationProvider for FileConfigurationProvider {
    async fn get_platform_config(&self) -> Result<PlatformConfig, ConfigError> {
        let text = fs::read_to_string(&self.path)
            .await
            .map_err(|source| ConfigError::Io {
                path: self.path.display().to_string(),
                source,
            })?;

        let extension = self
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let config = match extension.as_str() {
            "toml" => PlatformConfig::from_toml_str(&text)?,
            "json" => PlatformConfig::from_json_str(&text)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };

        info!("Loaded platform configuration from {}", self.path.display());
        Ok(config)
    }
}

/// Serves a configuration supplied by the host
pub struct StaticConfigurationProvider {
    config: PlatformConfig,
}

impl StaticConfigurationProvider {
    pub fn new(config: PlatformConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConfigurationProvider for StaticConfigurationProvider {
    async fn get_platform_config(&self) -> Result<PlatformConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config.clone())
    }
}
