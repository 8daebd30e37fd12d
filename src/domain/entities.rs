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

//! Domain entities for fan and PSU status reporting

use serde::{Deserialize, Serialize};
use std::fmt;

/// Class of a physical unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitClass {
    Fan,
    Psu,
}

impl fmt::Display for UnitClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitClass::Fan => write!(f, "FAN"),
            UnitClass::Psu => write!(f, "PSU"),
        }
    }
}

/// Rotor sub-position of a fan inside its tray
///
/// Dual-rotor trays rate the front and rear rotor for different maximum speeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AirflowDirection {
    Front,
    Rear,
    Unknown,
}

impl AirflowDirection {
    /// Rotor 1 of a tray is the front rotor; every other rotor is rear
    pub fn from_fan_in_tray(fan_in_tray: u32) -> Self {
        match fan_in_tray {
            0 => AirflowDirection::Unknown,
            1 => AirflowDirection::Front,
            _ => AirflowDirection::Rear,
        }
    }
}

/// Airflow reported by the hardware, as exposed to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanDirection {
    Intake,
    Exhaust,
    Unknown,
}

impl fmt::Display for FanDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FanDirection::Intake => write!(f, "intake"),
            FanDirection::Exhaust => write!(f, "exhaust"),
            FanDirection::Unknown => write!(f, "N/A"),
        }
    }
}

/// A physical fan rotor or PSU slot. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unit {
    index: u32,
    class: UnitClass,
    airflow: AirflowDirection,
    name: String,
}

impl Unit {
    /// PSU slot, 1-based
    pub fn psu(index: u32) -> Self {
        Self {
            index,
            class: UnitClass::Psu,
            airflow: AirflowDirection::Unknown,
            name: format!("PSU{index}"),
        }
    }

    /// Fan rotor addressed by 1-based tray and 1-based rotor within the tray
    pub fn fan(tray: u32, fan_in_tray: u32, fans_per_tray: u32) -> Self {
        let index = tray.saturating_sub(1) * fans_per_tray + fan_in_tray;
        Self {
            index,
            class: UnitClass::Fan,
            airflow: AirflowDirection::from_fan_in_tray(fan_in_tray),
            name: format!("Fantray{tray}_{fan_in_tray}"),
        }
    }

    /// 1-based unit index (global across trays for fans)
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn class(&self) -> UnitClass {
        self.class
    }

    pub fn airflow(&self) -> AirflowDirection {
        self.airflow
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} #{})", self.name, self.class, self.index)
    }
}

/// Payload of a raw hardware reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawPayload {
    /// No payload (failed read)
    Empty,
    /// Already-decoded bit pattern
    Bits(u64),
    /// Raw text as returned by the channel, e.g. `0x0a`
    Text(String),
}

/// Result of one hardware channel query. Produced fresh per call, never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReading {
    pub success: bool,
    pub payload: RawPayload,
}

impl RawReading {
    pub fn failure() -> Self {
        Self {
            success: false,
            payload: RawPayload::Empty,
        }
    }

    pub fn bits(bits: u64) -> Self {
        Self {
            success: true,
            payload: RawPayload::Bits(bits),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            success: true,
            payload: RawPayload::Text(text.into()),
        }
    }
}

/// Which data path feeds presence and power-good.
///
/// Decided once when adapters are built and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagementPath {
    /// A management controller is reachable; query it
    OutOfBand,
    /// No management controller; read the status register directly
    DirectChannel,
}

impl fmt::Display for ManagementPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagementPath::OutOfBand => write!(f, "out-of-band"),
            ManagementPath::DirectChannel => write!(f, "direct-channel"),
        }
    }
}

/// Point-in-time view of one unit, as reported to the host
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceStatus {
    pub name: String,
    pub class: UnitClass,
    pub index: u32,
    pub present: bool,
    pub status: bool,
    pub direction: FanDirection,
    pub speed_rpm: u32,
    pub speed_percentage: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_unit_indexing() {
        let unit = Unit::fan(3, 2, 2);
        assert_eq!(unit.index(), 6);
        assert_eq!(unit.name(), "Fantray3_2");
        assert_eq!(unit.class(), UnitClass::Fan);
        assert_eq!(unit.airflow(), AirflowDirection::Rear);

        let front = Unit::fan(1, 1, 2);
        assert_eq!(front.index(), 1);
        assert_eq!(front.airflow(), AirflowDirection::Front);
    }

    #[test]
    fn test_psu_unit() {
        let unit = Unit::psu(2);
        assert_eq!(unit.index(), 2);
        assert_eq!(unit.name(), "PSU2");
        assert_eq!(unit.airflow(), AirflowDirection::Unknown);
        assert_eq!(unit.to_string(), "PSU2 (PSU #2)");
    }

    #[test]
    fn test_failed_reading_has_no_payload() {
        let reading = RawReading::failure();
        assert!(!reading.success);
        assert_eq!(reading.payload, RawPayload::Empty);
    }

    #[test]
    fn test_device_status_serializes() {
        let status = DeviceStatus {
            name: "PSU1".to_string(),
            class: UnitClass::Psu,
            index: 1,
            present: true,
            status: true,
            direction: FanDirection::Exhaust,
            speed_rpm: 9000,
            speed_percentage: 45,
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"class\":\"psu\""));
        assert!(json.contains("\"direction\":\"exhaust\""));
    }
}
