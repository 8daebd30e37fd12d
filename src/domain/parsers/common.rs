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

//! Common parsing utilities for raw hardware text

use crate::domain::FanDirection;

/// Parse a register value as printed by bus tools or sysfs
///
/// Accepts `0x`-prefixed hex (`0x0a`) or plain decimal (`10`).
///
/// # Arguments
/// * `text` - Raw value, surrounding whitespace ignored
///
/// # Returns
/// * `Ok(u64)` - Parsed value
/// * `Err(String)` - Parse error description
pub fn parse_register_value(text: &str) -> Result<u64, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err("Empty register value".to_string());
    }

    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse::<u64>(),
    };

    parsed.map_err(|e| format!("Invalid register value '{trimmed}': {e}"))
}

/// Parse a fan speed attribute in RPM
///
/// Some drivers report fractional values; those are truncated.
pub fn parse_rpm(text: &str) -> Result<u32, String> {
    let trimmed = text.trim();
    if let Ok(rpm) = trimmed.parse::<u32>() {
        return Ok(rpm);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v as u32)
        .ok_or_else(|| format!("Invalid fan speed '{trimmed}'"))
}

/// Parse a reported airflow attribute
///
/// Front-to-back airflow exhausts at the port side; back-to-front takes in.
pub fn parse_fan_direction(text: &str) -> FanDirection {
    match text.trim().to_ascii_uppercase().as_str() {
        "F2B" | "EXHAUST" | "1" => FanDirection::Exhaust,
        "B2F" | "INTAKE" | "0" => FanDirection::Intake,
        _ => FanDirection::Unknown,
    }
}
