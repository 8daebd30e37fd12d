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

//! Decoding of packed status bits into presence and power-good

use crate::domain::{
    parse_register_value, BitLayout, BitMapping, RawPayload, RawReading, StatusTable, Unit,
};
use log::debug;

/// Maps a raw channel reading to per-unit presence and power-good flags
///
/// A failed or undecodable reading always decodes to `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusDecoder {
    layout: BitLayout,
    table: StatusTable,
}

impl StatusDecoder {
    pub fn new(layout: BitLayout, table: StatusTable) -> Self {
        Self { layout, table }
    }

    pub fn decode_presence(&self, raw: &RawReading, unit: &Unit) -> bool {
        self.decode(raw, unit, self.layout.presence_base, self.table.presence)
    }

    pub fn decode_power_good(&self, raw: &RawReading, unit: &Unit) -> bool {
        self.decode(raw, unit, self.layout.power_good_base, self.table.power_good)
    }

    fn decode(&self, raw: &RawReading, unit: &Unit, base: u32, mapping: BitMapping) -> bool {
        if !raw.success {
            return false;
        }
        let Some(bits) = payload_bits(&raw.payload) else {
            debug!("{unit}: undecodable payload {:?}", raw.payload);
            return false;
        };
        let Some(offset) = self.bit_offset(base, unit) else {
            debug!("{unit}: status bit outside the {}-bit payload", u64::BITS);
            return false;
        };
        mapping.lookup((bits >> offset) & 1 == 1)
    }

    /// `base + stride * (index - 1)`, or `None` if it does not fit the payload
    fn bit_offset(&self, base: u32, unit: &Unit) -> Option<u32> {
        let slot = unit.index().checked_sub(1)?;
        let offset = self
            .layout
            .unit_stride
            .checked_mul(slot)?
            .checked_add(base)?;
        (offset < u64::BITS).then_some(offset)
    }
}

fn payload_bits(payload: &RawPayload) -> Option<u64> {
    match payload {
        RawPayload::Bits(bits) => Some(*bits),
        RawPayload::Text(text) => parse_register_value(text).ok(),
        RawPayload::Empty => None,
    }
}
