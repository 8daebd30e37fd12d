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

//! Out-of-band channel: management-controller sensor listing

use crate::domain::{
    find_sensor, parse_discrete_state, parse_sensor_list, resolve_pattern, RawReading,
    SensorRecord, SystemError, Unit,
};
use crate::ports::{CommandExecutor, RawStatusSource, SystemCommand};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::fs;
use tokio::sync::OnceCell;

/// `ipmitool sensor list` output cached to a file on first use
///
/// One cache is shared by every out-of-band source of a process, so the
/// listing runs at most once however many unit classes read concurrently.
/// An existing cache file is reused as is.
pub struct SensorListCache {
    command_executor: Arc<dyn CommandExecutor>,
    path: PathBuf,
    ready: OnceCell<()>,
}

impl SensorListCache {
    pub fn new(command_executor: Arc<dyn CommandExecutor>, path: impl Into<PathBuf>) -> Self {
        Self {
            command_executor,
            path: path.into(),
            ready: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parsed rows of the cached listing, fetching it first if needed
    pub async fn records(&self) -> Result<Vec<SensorRecord>, SystemError> {
        // a failed attempt leaves the cell empty and is retried on the next read
        self.ready.get_or_try_init(|| self.populate()).await?;
        let listing = fs::read_to_string(&self.path).await?;
        Ok(parse_sensor_list(&listing))
    }

    async fn populate(&self) -> Result<(), SystemError> {
        if fs::try_exists(&self.path).await.unwrap_or(false) {
            debug!("Reusing sensor list cache {}", self.path.display());
            return Ok(());
        }

        let command = SystemCommand::new("ipmitool").args(&["sensor", "list"]);
        let output = self
            .command_executor
            .execute(&command)
            .await
            .map_err(|e| SystemError::CommandFailed {
                command: command.display(),
                exit_code: None,
                stderr: e.to_string(),
            })?;
        if !output.success {
            return Err(SystemError::CommandFailed {
                command: command.display(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, output.stdout.as_bytes()))
            .await
            .map_err(|e| SystemError::IoError(format!("cache writer panicked: {e}")))??;

        info!("Cached sensor list to {}", self.path.display());
        Ok(())
    }
}

/// Write to a uniquely named file next to `path`, then move it into place
fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), SystemError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut staging = NamedTempFile::new_in(dir)?;
    staging.write_all(contents)?;
    staging.persist(path).map_err(|e| SystemError::from(e.error))?;
    Ok(())
}

/// Looks up a per-unit discrete sensor in the shared sensor listing
pub struct OutOfBandSource {
    cache: Arc<SensorListCache>,
    /// Sensor name pattern containing `{index}`
    sensor_pattern: String,
}

impl OutOfBandSource {
    pub fn new(cache: Arc<SensorListCache>, sensor_pattern: impl Into<String>) -> Self {
        Self {
            cache,
            sensor_pattern: sensor_pattern.into(),
        }
    }

    pub fn cache_path(&self) -> &Path {
        self.cache.path()
    }

    async fn read_sensor_state(&self, unit: &Unit) -> Result<u64, SystemError> {
        let records = self.cache.records().await?;
        let sensor = resolve_pattern(&self.sensor_pattern, unit.index());
        let record = find_sensor(&records, &sensor)
            .ok_or_else(|| SystemError::ParseError(format!("Sensor '{sensor}' not listed")))?;
        if !record.is_discrete() {
            return Err(SystemError::ParseError(format!(
                "Sensor '{sensor}' is not discrete ({})",
                record.unit
            )));
        }

        parse_discrete_state(&record.state).map_err(SystemError::ParseError)
    }
}

#[async_trait]
impl RawStatusSource for OutOfBandSource {
    fn name(&self) -> &'static str {
        "out-of-band"
    }

    async fn read(&self, unit: &Unit) -> RawReading {
        match self.read_sensor_state(unit).await {
            Ok(bits) => {
                debug!("{unit}: sensor state {bits:#06x}");
                RawReading::bits(bits)
            }
            Err(e) => {
                warn!("{unit}: out-of-band read failed: {e}");
                RawReading::failure()
            }
        }
    }
}
