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

use crate::domain::{FanDirection, SystemError, Unit};
use async_trait::async_trait;

/// Secondary port - platform attributes outside the status channels
///
/// Supplies the per-unit readings the host platform layer already exposes
/// (airflow and rotor speed), typically from sysfs.
#[async_trait]
pub trait PlatformProvider: Send + Sync {
    /// Airflow reported for the unit's fan
    ///
    /// # Returns
    /// * `Ok(FanDirection)` - reported airflow (may be `Unknown` if unrecognised)
    /// * `Err(SystemError)` - attribute could not be read
    async fn get_airflow(&self, unit: &Unit) -> Result<FanDirection, SystemError>;

    /// Current rotor speed in RPM
    ///
    /// # Returns
    /// * `Ok(u32)` - speed in RPM
    /// * `Err(SystemError)` - attribute could not be read or parsed
    async fn get_speed_rpm(&self, unit: &Unit) -> Result<u32, SystemError>;
}
