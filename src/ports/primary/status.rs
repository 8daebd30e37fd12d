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

use crate::domain::{DeviceStatus, FanDirection, Unit};
use async_trait::async_trait;

/// Primary port - the accessor contract a fan or PSU exposes to the host
///
/// Every accessor is infallible: hardware failures degrade the reading of the
/// affected unit to a fail-safe value instead of surfacing an error, so a
/// faulty sensor can never abort a monitoring loop.
#[async_trait]
pub trait DeviceStatusService: Send + Sync {
    /// The unit this service reports on
    fn unit(&self) -> &Unit;

    /// Unit name, e.g. `PSU1` or `Fantray3_2`
    fn get_name(&self) -> &str {
        self.unit().name()
    }

    /// Whether the unit is inserted AND healthy
    ///
    /// # Returns
    /// * `true` - present and reporting good status
    /// * `false` - absent, faulty, or unreadable
    async fn get_presence(&self) -> bool;

    /// Whether the unit reports good health (power-good for PSUs)
    async fn get_status(&self) -> bool;

    /// Reported airflow; `Unknown` whenever the unit is not present
    ///
    /// Costs two reads for a present unit: the status channel, then the
    /// airflow attribute. An absent unit costs only the status read.
    async fn get_direction(&self) -> FanDirection;

    /// Current rotor speed, 0 when unreadable
    async fn get_speed_rpm(&self) -> u32;

    /// Speed as percent of the rated maximum
    ///
    /// Fans cost two reads, the speed and then the airflow attribute, since
    /// the maximum depends on airflow. PSUs read only the speed.
    ///
    /// # Returns
    /// * `0..=100` - percent of maximum (fans are clamped to 100)
    /// * raw RPM - PSU fans running above their configured maximum
    /// * `0` - speed or airflow unreadable, or no maximum configured
    async fn get_speed_percentage(&self) -> u32;

    /// Collect every accessor into one snapshot
    async fn snapshot(&self) -> DeviceStatus;
}
