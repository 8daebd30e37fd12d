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

//! Typed platform configuration
//!
//! All numeric limits are plain integers parsed once at load time. Every
//! section has defaults, so an empty document is a valid configuration.

use crate::domain::{ConfigError, FanDirection, ManagementPath, UnitClass};
use serde::{Deserialize, Serialize};

/// Placeholder substituted with the 1-based unit index in path and sensor patterns
pub const INDEX_PLACEHOLDER: &str = "{index}";

/// Substitute the unit index into a pattern such as `PSU{index}_Status`
pub fn resolve_pattern(pattern: &str, index: u32) -> String {
    pattern.replace(INDEX_PLACEHOLDER, &index.to_string())
}

/// Complete platform configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub platform: PlatformLayout,
    pub command: CommandSettings,
    pub sysfs: SysfsPaths,
    pub psu: PsuSettings,
    pub fan: FanSettings,
    pub status: StatusChannels,
    pub ipmi: IpmiSettings,
}

impl PlatformConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: PlatformConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: PlatformConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would make every reading meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.platform.fan_tray_count > 0 && self.platform.fans_per_tray == 0 {
            return Err(ConfigError::Invalid(
                "fans_per_tray must be non-zero when fan trays are present".to_string(),
            ));
        }
        if self.command.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "command timeout must be non-zero".to_string(),
            ));
        }
        if self.psu.fan_max_rpm == 0 {
            return Err(ConfigError::Invalid(
                "psu.fan_max_rpm must be non-zero".to_string(),
            ));
        }
        for (airflow, limits) in [
            ("exhaust", &self.fan.exhaust),
            ("intake", &self.fan.intake),
        ] {
            if let Some(limits) = limits {
                if limits.front == 0 || limits.rear == 0 {
                    return Err(ConfigError::Invalid(format!(
                        "fan.{airflow} maximum speeds must be non-zero"
                    )));
                }
            }
        }

        let patterns = [
            ("sysfs.fan_speed_rpm", &self.sysfs.fan_speed_rpm),
            ("sysfs.fan_direction", &self.sysfs.fan_direction),
            ("sysfs.psu_fan_speed_rpm", &self.sysfs.psu_fan_speed_rpm),
            ("sysfs.psu_fan_direction", &self.sysfs.psu_fan_direction),
            ("status.psu.out_of_band.sensor", &self.status.psu.out_of_band.sensor),
            ("status.fan.out_of_band.sensor", &self.status.fan.out_of_band.sensor),
        ];
        for (key, pattern) in patterns {
            if !pattern.contains(INDEX_PLACEHOLDER) {
                return Err(ConfigError::Invalid(format!(
                    "{key} must contain the {INDEX_PLACEHOLDER} placeholder"
                )));
            }
        }

        for class in [UnitClass::Psu, UnitClass::Fan] {
            if let Some(direct) = &self.channels(class).direct {
                check_register_layout(class, &direct.layout, self.unit_count(class))?;
            }
        }
        if self.platform.management_path == ManagementPathSetting::Direct {
            for class in [UnitClass::Psu, UnitClass::Fan] {
                self.direct_channel(class)?;
            }
        }
        Ok(())
    }

    /// Number of units of a class on the board
    pub fn unit_count(&self, class: UnitClass) -> u32 {
        match class {
            UnitClass::Psu => self.platform.psu_count,
            UnitClass::Fan => self
                .platform
                .fan_tray_count
                .saturating_mul(self.platform.fans_per_tray),
        }
    }

    /// Direct register for a class, required whenever that class has units
    ///
    /// Returns `Ok(None)` for a class with no units on the board.
    pub fn direct_channel(
        &self,
        class: UnitClass,
    ) -> Result<Option<&DirectChannelConfig>, ConfigError> {
        if self.unit_count(class) == 0 {
            return Ok(None);
        }
        match &self.channels(class).direct {
            Some(direct) => Ok(Some(direct)),
            None => Err(ConfigError::Invalid(format!(
                "status.{}.direct must be configured for the direct-channel path",
                class.to_string().to_ascii_lowercase()
            ))),
        }
    }

    /// Status channel settings for a unit class
    pub fn channels(&self, class: UnitClass) -> &ClassChannels {
        match class {
            UnitClass::Psu => &self.status.psu,
            UnitClass::Fan => &self.status.fan,
        }
    }
}

/// Every unit's presence and power-good bit must lie inside the register
fn check_register_layout(
    class: UnitClass,
    layout: &BitLayout,
    unit_count: u32,
) -> Result<(), ConfigError> {
    let Some(last_slot) = unit_count.checked_sub(1) else {
        return Ok(());
    };
    let key = class.to_string().to_ascii_lowercase();
    for (signal, base) in [
        ("presence", layout.presence_base),
        ("power_good", layout.power_good_base),
    ] {
        let last_bit = layout
            .unit_stride
            .checked_mul(last_slot)
            .and_then(|span| span.checked_add(base));
        match last_bit {
            Some(bit) if bit < DIRECT_REGISTER_BITS => {}
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "status.{key}.direct {signal} bits for {unit_count} units do not fit \
                     the {DIRECT_REGISTER_BITS}-bit register"
                )))
            }
        }
    }
    Ok(())
}

/// How the management path is chosen at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagementPathSetting {
    /// Probe for a management controller once at startup
    #[default]
    Auto,
    OutOfBand,
    Direct,
}

impl ManagementPathSetting {
    /// The fixed path, or `None` when it has to be detected
    pub fn explicit(self) -> Option<ManagementPath> {
        match self {
            ManagementPathSetting::Auto => None,
            ManagementPathSetting::OutOfBand => Some(ManagementPath::OutOfBand),
            ManagementPathSetting::Direct => Some(ManagementPath::DirectChannel),
        }
    }
}

/// Number and arrangement of units on the board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformLayout {
    pub psu_count: u32,
    pub fan_tray_count: u32,
    pub fans_per_tray: u32,
    pub management_path: ManagementPathSetting,
}

impl Default for PlatformLayout {
    fn default() -> Self {
        Self {
            psu_count: 2,
            fan_tray_count: 7,
            fans_per_tray: 2,
            management_path: ManagementPathSetting::Auto,
        }
    }
}

/// External command execution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandSettings {
    pub timeout_secs: u64,
    pub retry_count: u32,
    pub verbose: bool,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            retry_count: 0,
            verbose: false,
        }
    }
}

/// sysfs attribute path patterns, each containing `{index}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SysfsPaths {
    pub fan_speed_rpm: String,
    pub fan_direction: String,
    pub psu_fan_speed_rpm: String,
    pub psu_fan_direction: String,
}

impl Default for SysfsPaths {
    fn default() -> Self {
        Self {
            fan_speed_rpm: "/sys/kernel/pddf/devices/fantray/fan{index}_input".to_string(),
            fan_direction: "/sys/kernel/pddf/devices/fantray/fan{index}_direction".to_string(),
            psu_fan_speed_rpm: "/sys/kernel/pddf/devices/psu/psu{index}/psu_fan1_speed_rpm"
                .to_string(),
            psu_fan_direction: "/sys/kernel/pddf/devices/psu/psu{index}/psu_fan_dir".to_string(),
        }
    }
}

/// PSU ratings and fan limit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PsuSettings {
    pub capacity_watts: u32,
    pub psu_type: String,
    /// Class-wide maximum PSU fan speed
    pub fan_max_rpm: u32,
}

impl Default for PsuSettings {
    fn default() -> Self {
        Self {
            capacity_watts: 550,
            psu_type: "AC".to_string(),
            fan_max_rpm: 18000,
        }
    }
}

/// Maximum speed of the front and rear rotor of a tray
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotorLimits {
    pub front: u32,
    pub rear: u32,
}

/// Fan maximum speeds keyed by reported airflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanSettings {
    pub exhaust: Option<RotorLimits>,
    pub intake: Option<RotorLimits>,
}

impl Default for FanSettings {
    fn default() -> Self {
        Self {
            exhaust: Some(RotorLimits {
                front: 29000,
                rear: 25500,
            }),
            intake: Some(RotorLimits {
                front: 27000,
                rear: 23500,
            }),
        }
    }
}

impl FanSettings {
    pub fn for_direction(&self, direction: FanDirection) -> Option<RotorLimits> {
        match direction {
            FanDirection::Exhaust => self.exhaust,
            FanDirection::Intake => self.intake,
            FanDirection::Unknown => None,
        }
    }
}

/// Maps one status bit to a boolean
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitMapping {
    /// Value when the bit is 1
    pub set: bool,
    /// Value when the bit is 0
    pub clear: bool,
}

impl BitMapping {
    pub const ACTIVE_HIGH: BitMapping = BitMapping {
        set: true,
        clear: false,
    };
    pub const ACTIVE_LOW: BitMapping = BitMapping {
        set: false,
        clear: true,
    };

    pub fn lookup(&self, bit: bool) -> bool {
        if bit {
            self.set
        } else {
            self.clear
        }
    }
}

/// Bit-to-boolean lookup for presence and power-good
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTable {
    pub presence: BitMapping,
    pub power_good: BitMapping,
}

/// Where a unit's status bits live inside a channel payload
///
/// The bit for unit `n` sits at `base + unit_stride * (n - 1)`. Packed
/// registers use a stride of 1; per-unit sensors use a stride of 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitLayout {
    pub presence_base: u32,
    pub power_good_base: u32,
    pub unit_stride: u32,
}

/// Width of a direct-channel register; `i2cget` reads one byte
pub const DIRECT_REGISTER_BITS: u32 = 8;

/// Register read over the direct bus channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectChannelConfig {
    pub bus: u8,
    pub device: u8,
    pub register: u8,
    pub layout: BitLayout,
    pub table: StatusTable,
}

/// Sensor queried through the management controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutOfBandConfig {
    /// Sensor name pattern, e.g. `PSU{index}_Status`
    pub sensor: String,
    pub layout: BitLayout,
    pub table: StatusTable,
}

/// Both status channels for one unit class
///
/// The direct register is board specific and has no default for fans; it
/// must be configured before the direct-channel path can serve that class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassChannels {
    #[serde(default)]
    pub direct: Option<DirectChannelConfig>,
    pub out_of_band: OutOfBandConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusChannels {
    pub psu: ClassChannels,
    pub fan: ClassChannels,
}

impl Default for StatusChannels {
    fn default() -> Self {
        // IPMI discrete states: offset 0 = presence detected, offset 1 = failure
        let sensor_table = StatusTable {
            presence: BitMapping::ACTIVE_HIGH,
            power_good: BitMapping::ACTIVE_LOW,
        };
        let sensor_layout = BitLayout {
            presence_base: 0,
            power_good_base: 1,
            unit_stride: 0,
        };
        // CPLD presence lines are active-low, power-good lines active-high
        let register_table = StatusTable {
            presence: BitMapping::ACTIVE_LOW,
            power_good: BitMapping::ACTIVE_HIGH,
        };

        Self {
            psu: ClassChannels {
                direct: Some(DirectChannelConfig {
                    bus: 0,
                    device: 0x0d,
                    register: 0x60,
                    layout: BitLayout {
                        presence_base: 2,
                        power_good_base: 0,
                        unit_stride: 1,
                    },
                    table: register_table,
                }),
                out_of_band: OutOfBandConfig {
                    sensor: "PSU{index}_Status".to_string(),
                    layout: sensor_layout,
                    table: sensor_table,
                },
            },
            fan: ClassChannels {
                direct: None,
                out_of_band: OutOfBandConfig {
                    sensor: "Fan{index}_Status".to_string(),
                    layout: sensor_layout,
                    table: sensor_table,
                },
            },
        }
    }
}

/// Management-controller tooling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpmiSettings {
    /// File the sensor listing is cached in on first use
    pub cache_path: String,
}

impl Default for IpmiSettings {
    fn default() -> Self {
        Self {
            cache_path: "/tmp/sensor_info.log".to_string(),
        }
    }
}
