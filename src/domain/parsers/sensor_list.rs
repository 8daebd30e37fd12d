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

//! Parser for management-controller sensor listings (`ipmitool sensor list`)

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    pub static ref DISCRETE_STATE_RE: Regex =
        Regex::new(r"^0x([0-9a-fA-F]{2})([0-9a-fA-F]{2})$").unwrap();
}

/// One row of a sensor listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorRecord {
    pub name: String,
    pub value: String,
    pub unit: String,
    pub state: String,
}

impl SensorRecord {
    pub fn is_discrete(&self) -> bool {
        self.unit.eq_ignore_ascii_case("discrete")
    }
}

/// Parse `name | value | unit | state | thresholds...` rows
///
/// Rows with fewer than four columns are skipped.
pub fn parse_sensor_list(output: &str) -> Vec<SensorRecord> {
    output
        .lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('|').map(str::trim).collect();
            if cols.len() < 4 || cols[0].is_empty() {
                return None;
            }
            Some(SensorRecord {
                name: cols[0].to_string(),
                value: cols[1].to_string(),
                unit: cols[2].to_string(),
                state: cols[3].to_string(),
            })
        })
        .collect()
}

/// Find a sensor row by exact name
pub fn find_sensor<'a>(records: &'a [SensorRecord], name: &str) -> Option<&'a SensorRecord> {
    records.iter().find(|record| record.name == name)
}

/// Decode the state column of a discrete sensor into its state bits
///
/// `0xAABB`: `AA` carries states 0-7 and `BB` states 8-14.
pub fn parse_discrete_state(state: &str) -> Result<u64, String> {
    let captures = DISCRETE_STATE_RE
        .captures(state.trim())
        .ok_or_else(|| format!("Not a discrete sensor state: '{}'", state.trim()))?;

    let low = u64::from_str_radix(&captures[1], 16)
        .map_err(|e| format!("Invalid state byte '{}': {e}", &captures[1]))?;
    let high = u64::from_str_radix(&captures[2], 16)
        .map_err(|e| format!("Invalid state byte '{}': {e}", &captures[2]))?;

    Ok(low | (high << 8))
}
