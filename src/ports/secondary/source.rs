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

use crate::domain::{RawReading, Unit};
use async_trait::async_trait;

/// Secondary port - one hardware channel carrying presence and health bits
///
/// Implementations perform exactly one external I/O per call, never retry,
/// and report any error or timeout as a failed [`RawReading`]. They hold no
/// shared mutable state, so different units may be read concurrently.
#[async_trait]
pub trait RawStatusSource: Send + Sync {
    /// Short label used in log messages
    fn name(&self) -> &'static str;

    /// Query the channel for `unit`
    async fn read(&self, unit: &Unit) -> RawReading;
}
