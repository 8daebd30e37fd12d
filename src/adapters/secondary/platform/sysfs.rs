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

//! sysfs-backed platform attributes

use crate::domain::{
    parse_fan_direction, parse_rpm, resolve_pattern, FanDirection, SysfsPaths, SystemError, Unit,
    UnitClass,
};
use crate::ports::PlatformProvider;
use async_trait::async_trait;
use log::debug;
use std::path::PathBuf;
use tokio::fs;

/// Reads airflow and speed attributes exported by the platform drivers
pub struct SysfsPlatformProvider {
    paths: SysfsPaths,
}

impl SysfsPlatformProvider {
    pub fn new(paths: SysfsPaths) -> Self {
        Self { paths }
    }

    fn speed_path(&self, unit: &Unit) -> PathBuf {
        let pattern = match unit.class() {
            UnitClass::Fan => &self.paths.fan_speed_rpm,
            UnitClass::Psu => &self.paths.psu_fan_speed_rpm,
        };
        PathBuf::from(resolve_pattern(pattern, unit.index()))
    }

    fn direction_path(&self, unit: &Unit) -> PathBuf {
        let pattern = match unit.class() {
            UnitClass::Fan => &self.paths.fan_direction,
            UnitClass::Psu => &self.paths.psu_fan_direction,
        };
        PathBuf::from(resolve_pattern(pattern, unit.index()))
    }

    async fn read_attribute(path: PathBuf) -> Result<String, SystemError> {
        let value = fs::read_to_string(&path)
            .await
            .map_err(|e| SystemError::IoError(format!("{}: {e}", path.display())))?;
        debug!("{} = {}", path.display(), value.trim());
        Ok(value)
    }
}

#[async_trait]
impl PlatformProvider for SysfsPlatformProvider {
    async fn get_airflow(&self, unit: &Unit) -> Result<FanDirection, SystemError> {
        let value = Self::read_attribute(self.direction_path(unit)).await?;
        if value.trim().is_empty() {
            return Err(SystemError::ParseError(format!(
                "{unit}: empty airflow attribute"
            )));
        }
        Ok(parse_fan_direction(&value))
    }

    async fn get_speed_rpm(&self, unit: &Unit) -> Result<u32, SystemError> {
        let value = Self::read_attribute(self.speed_path(unit)).await?;
        parse_rpm(&value).map_err(SystemError::ParseError)
    }
}
