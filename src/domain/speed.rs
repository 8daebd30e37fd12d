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

//! Conversion of raw rotor speed into percent of rated maximum

use crate::domain::{
    AirflowDirection, FanDirection, FanSettings, PlatformConfig, StatusError, Unit, UnitClass,
};
use log::warn;

/// Rated maximum speeds, loaded once from configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedLimits {
    /// Class-wide maximum for PSU fans
    pub psu_max_rpm: u32,
    /// Fan maxima keyed by reported airflow, then rotor position
    pub fan: FanSettings,
}

impl SpeedLimits {
    pub fn from_config(config: &PlatformConfig) -> Self {
        Self {
            psu_max_rpm: config.psu.fan_max_rpm,
            fan: config.fan.clone(),
        }
    }

    /// Maximum speed for a unit; `airflow` is ignored for PSUs
    pub fn max_rpm(&self, unit: &Unit, airflow: FanDirection) -> Result<u32, StatusError> {
        let max = match unit.class() {
            UnitClass::Psu => Some(self.psu_max_rpm),
            UnitClass::Fan => self
                .fan
                .for_direction(airflow)
                .and_then(|limits| match unit.airflow() {
                    AirflowDirection::Front => Some(limits.front),
                    AirflowDirection::Rear => Some(limits.rear),
                    AirflowDirection::Unknown => None,
                }),
        };

        max.filter(|rpm| *rpm > 0).ok_or_else(|| {
            StatusError::ConfigLookup(format!(
                "{} {:?} rotor with {airflow} airflow",
                unit.class(),
                unit.airflow()
            ))
        })
    }
}

/// Normalises raw speed against [`SpeedLimits`]
///
/// Above 100% a fan is clamped to 100 and a PSU reports its raw RPM.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedNormalizer {
    limits: SpeedLimits,
}

impl SpeedNormalizer {
    pub fn new(limits: SpeedLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &SpeedLimits {
        &self.limits
    }

    /// Percent of maximum for `raw_rpm`, or 0 when no maximum is known
    pub fn normalize(&self, raw_rpm: u32, unit: &Unit, airflow: FanDirection) -> u32 {
        match self.limits.max_rpm(unit, airflow) {
            Ok(max_rpm) => Self::apply(raw_rpm, max_rpm, unit.class()),
            Err(e) => {
                warn!("{unit}: reporting speed 0, {e}");
                0
            }
        }
    }

    fn apply(raw_rpm: u32, max_rpm: u32, class: UnitClass) -> u32 {
        let pct = (f64::from(raw_rpm) / f64::from(max_rpm) * 100.0).round_ties_even() as u32;
        if pct <= 100 {
            return pct;
        }
        match class {
            UnitClass::Psu => raw_rpm,
            UnitClass::Fan => 100,
        }
    }
}
