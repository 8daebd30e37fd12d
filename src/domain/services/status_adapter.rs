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

use crate::domain::{
    ConfigError, DeviceStatus, FanDirection, ManagementPath, SpeedNormalizer, StatusDecoder,
    StatusError, Unit, UnitClass,
};
use crate::ports::{DeviceStatusService, PlatformProvider, RawStatusSource};
use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;

/// A status source together with the decoder for its payload layout
#[derive(Clone)]
pub struct StatusChannel {
    pub source: Arc<dyn RawStatusSource>,
    pub decoder: StatusDecoder,
}

/// Both status channels available for a unit class
#[derive(Clone)]
pub struct StatusChannelSet {
    /// `None` when the board has no direct register configured for the class
    pub direct: Option<StatusChannel>,
    pub out_of_band: StatusChannel,
}

impl StatusChannelSet {
    /// Keep the channel for `path` and drop the other
    pub fn select(self, path: ManagementPath) -> Option<StatusChannel> {
        match path {
            ManagementPath::OutOfBand => Some(self.out_of_band),
            ManagementPath::DirectChannel => self.direct,
        }
    }
}

/// Static PSU ratings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsuRatings {
    pub capacity_watts: u32,
    pub psu_type: String,
}

/// Presence, airflow, speed and health of one fan or PSU
///
/// The status channel is chosen once, at construction, from the management
/// path: out-of-band when a management controller is reachable, the direct
/// register otherwise. It never changes for the adapter's lifetime, so one
/// observation never mixes readings from both sources.
pub struct DeviceStatusAdapter {
    unit: Unit,
    path: ManagementPath,
    channel: StatusChannel,
    platform: Arc<dyn PlatformProvider>,
    normalizer: Arc<SpeedNormalizer>,
    ratings: Option<PsuRatings>,
}

impl DeviceStatusAdapter {
    /// Create an adapter for `unit`
    ///
    /// # Arguments
    /// * `unit` - The unit to report on
    /// * `path` - Management path, fixed for the adapter's lifetime
    /// * `channels` - Both candidate status channels; only the selected one is kept
    /// * `platform` - Source of airflow and speed attributes
    /// * `normalizer` - Shared speed limits
    ///
    /// # Errors
    /// `ConfigError::Invalid` when `path` has no channel configured for the unit
    pub fn new(
        unit: Unit,
        path: ManagementPath,
        channels: StatusChannelSet,
        platform: Arc<dyn PlatformProvider>,
        normalizer: Arc<SpeedNormalizer>,
    ) -> Result<Self, ConfigError> {
        let channel = channels.select(path).ok_or_else(|| {
            ConfigError::Invalid(format!("{unit}: no {path} status channel configured"))
        })?;
        debug!("{unit}: status from {} channel", channel.source.name());
        Ok(Self {
            unit,
            path,
            channel,
            platform,
            normalizer,
            ratings: None,
        })
    }

    /// Attach PSU ratings; ignored for fan units
    pub fn with_psu_ratings(mut self, ratings: PsuRatings) -> Self {
        if self.unit.class() == UnitClass::Psu {
            self.ratings = Some(ratings);
        }
        self
    }

    pub fn management_path(&self) -> ManagementPath {
        self.path
    }

    /// Name of the status channel in use
    pub fn status_source(&self) -> &'static str {
        self.channel.source.name()
    }

    /// Rated output power in watts (PSU units only)
    pub fn capacity(&self) -> Option<u32> {
        self.ratings.as_ref().map(|r| r.capacity_watts)
    }

    /// Supply type, e.g. `AC` (PSU units only)
    pub fn psu_type(&self) -> Option<&str> {
        self.ratings.as_ref().map(|r| r.psu_type.as_str())
    }

    /// Presence line alone, without the health check
    pub async fn get_presence_raw(&self) -> bool {
        self.read_status().await.0
    }

    /// One channel read decoded into `(presence line, health)`
    async fn read_status(&self) -> (bool, bool) {
        let reading = self.channel.source.read(&self.unit).await;
        if !reading.success {
            warn!(
                "{}: {} read failed, reporting absent",
                self.unit,
                self.channel.source.name()
            );
        }
        let decoder = &self.channel.decoder;
        (
            decoder.decode_presence(&reading, &self.unit),
            decoder.decode_power_good(&reading, &self.unit),
        )
    }

    async fn read_airflow(&self) -> Result<FanDirection, StatusError> {
        Ok(self.platform.get_airflow(&self.unit).await?)
    }

    async fn read_speed_rpm(&self) -> Result<u32, StatusError> {
        Ok(self.platform.get_speed_rpm(&self.unit).await?)
    }

    /// Percentage for an already-read speed; fans need their airflow for the limit
    async fn percentage_of(&self, rpm: u32) -> Result<u32, StatusError> {
        let airflow = match self.unit.class() {
            UnitClass::Psu => FanDirection::Unknown,
            // read the attribute directly: get_direction() would add a presence read
            UnitClass::Fan => self.read_airflow().await?,
        };
        Ok(self.normalizer.normalize(rpm, &self.unit, airflow))
    }

    fn speed_or_zero(&self, speed: Result<u32, StatusError>) -> u32 {
        speed.unwrap_or_else(|e| {
            warn!("{}: reporting speed 0, {e}", self.unit);
            0
        })
    }

    fn direction_or_unknown(&self, airflow: Result<FanDirection, StatusError>) -> FanDirection {
        airflow.unwrap_or_else(|e| {
            warn!("{}: airflow unreadable, {e}", self.unit);
            FanDirection::Unknown
        })
    }
}

#[async_trait]
impl DeviceStatusService for DeviceStatusAdapter {
    fn unit(&self) -> &Unit {
        &self.unit
    }

    async fn get_presence(&self) -> bool {
        let (present, healthy) = self.read_status().await;
        if present && !healthy {
            debug!("{}: inserted but unhealthy, reporting absent", self.unit);
        }
        present && healthy
    }

    async fn get_status(&self) -> bool {
        self.read_status().await.1
    }

    async fn get_direction(&self) -> FanDirection {
        if !self.get_presence().await {
            return FanDirection::Unknown;
        }
        let airflow = self.read_airflow().await;
        self.direction_or_unknown(airflow)
    }

    async fn get_speed_rpm(&self) -> u32 {
        self.read_speed_rpm().await.unwrap_or_else(|e| {
            warn!("{}: speed unreadable, {e}", self.unit);
            0
        })
    }

    async fn get_speed_percentage(&self) -> u32 {
        let result = match self.read_speed_rpm().await {
            Ok(rpm) => self.percentage_of(rpm).await,
            Err(e) => Err(e),
        };
        self.speed_or_zero(result)
    }

    async fn snapshot(&self) -> DeviceStatus {
        let (raw_present, status) = self.read_status().await;
        let present = raw_present && status;

        let direction = if present {
            let airflow = self.read_airflow().await;
            self.direction_or_unknown(airflow)
        } else {
            FanDirection::Unknown
        };

        let (speed_rpm, speed_percentage) = match self.read_speed_rpm().await {
            Ok(rpm) => (rpm, self.speed_or_zero(self.percentage_of(rpm).await)),
            Err(e) => (0, self.speed_or_zero(Err(e))),
        };

        DeviceStatus {
            name: self.unit.name().to_string(),
            class: self.unit.class(),
            index: self.unit.index(),
            present,
            status,
            direction,
            speed_rpm,
            speed_percentage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        BitLayout, BitMapping, FanSettings, RawReading, RotorLimits, SpeedLimits, StatusTable,
        SystemError,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSource {
        label: &'static str,
        reading: RawReading,
        reads: AtomicUsize,
    }

    impl FakeSource {
        fn new(label: &'static str, reading: RawReading) -> Arc<Self> {
            Arc::new(Self {
                label,
                reading,
                reads: AtomicUsize::new(0),
            })
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RawStatusSource for FakeSource {
        fn name(&self) -> &'static str {
            self.label
        }

        async fn read(&self, _unit: &Unit) -> RawReading {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.reading.clone()
        }
    }

    struct FakePlatform {
        rpm: Result<u32, SystemError>,
        airflow: Result<FanDirection, SystemError>,
        airflow_reads: AtomicUsize,
    }

    impl FakePlatform {
        fn new(
            rpm: Result<u32, SystemError>,
            airflow: Result<FanDirection, SystemError>,
        ) -> Arc<Self> {
            Arc::new(Self {
                rpm,
                airflow,
                airflow_reads: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PlatformProvider for FakePlatform {
        async fn get_airflow(&self, _unit: &Unit) -> Result<FanDirection, SystemError> {
            self.airflow_reads.fetch_add(1, Ordering::SeqCst);
            self.airflow.clone()
        }

        async fn get_speed_rpm(&self, _unit: &Unit) -> Result<u32, SystemError> {
            self.rpm.clone()
        }
    }

    fn register_decoder() -> StatusDecoder {
        StatusDecoder::new(
            BitLayout {
                presence_base: 2,
                power_good_base: 0,
                unit_stride: 1,
            },
            StatusTable {
                presence: BitMapping::ACTIVE_LOW,
                power_good: BitMapping::ACTIVE_HIGH,
            },
        )
    }

    fn sensor_decoder() -> StatusDecoder {
        StatusDecoder::new(
            BitLayout {
                presence_base: 0,
                power_good_base: 1,
                unit_stride: 0,
            },
            StatusTable {
                presence: BitMapping::ACTIVE_HIGH,
                power_good: BitMapping::ACTIVE_LOW,
            },
        )
    }

    fn normalizer() -> Arc<SpeedNormalizer> {
        Arc::new(SpeedNormalizer::new(SpeedLimits {
            psu_max_rpm: 6000,
            fan: FanSettings {
                exhaust: Some(RotorLimits {
                    front: 6000,
                    rear: 6000,
                }),
                intake: None,
            },
        }))
    }

    fn channels(direct: Arc<FakeSource>, out_of_band: Arc<FakeSource>) -> StatusChannelSet {
        StatusChannelSet {
            direct: Some(StatusChannel {
                source: direct,
                decoder: register_decoder(),
            }),
            out_of_band: StatusChannel {
                source: out_of_band,
                decoder: sensor_decoder(),
            },
        }
    }

    fn direct_adapter(
        unit: Unit,
        reading: RawReading,
        platform: Arc<FakePlatform>,
    ) -> DeviceStatusAdapter {
        DeviceStatusAdapter::new(
            unit,
            ManagementPath::DirectChannel,
            channels(
                FakeSource::new("direct", reading),
                FakeSource::new("oob", RawReading::failure()),
            ),
            platform,
            normalizer(),
        )
        .unwrap()
    }

    fn healthy_platform() -> Arc<FakePlatform> {
        FakePlatform::new(Ok(3000), Ok(FanDirection::Exhaust))
    }

    #[tokio::test]
    async fn test_present_but_unhealthy_reads_absent() {
        let adapter = direct_adapter(Unit::psu(1), RawReading::bits(0b1010), healthy_platform());

        assert!(!adapter.get_status().await);
        assert!(adapter.get_presence_raw().await);
        assert!(!adapter.get_presence().await);
    }

    #[tokio::test]
    async fn test_healthy_unit_is_present() {
        let adapter = direct_adapter(Unit::psu(1), RawReading::bits(0b0001), healthy_platform());

        assert!(adapter.get_status().await);
        assert!(adapter.get_presence().await);
        assert_eq!(adapter.get_direction().await, FanDirection::Exhaust);
    }

    #[tokio::test]
    async fn test_failed_read_reports_absent_without_error() {
        let platform = healthy_platform();
        let adapter = direct_adapter(Unit::psu(1), RawReading::failure(), platform.clone());

        assert!(!adapter.get_presence().await);
        assert!(!adapter.get_status().await);
        assert_eq!(adapter.get_direction().await, FanDirection::Unknown);
        // direction must not touch the hardware for an absent unit
        assert_eq!(platform.airflow_reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_direction_unreadable_is_unknown() {
        let platform = FakePlatform::new(Ok(3000), Err(SystemError::IoError("gone".to_string())));
        let adapter = direct_adapter(Unit::psu(2), RawReading::bits(0b0010), platform);

        assert!(adapter.get_presence().await);
        assert_eq!(adapter.get_direction().await, FanDirection::Unknown);
    }

    #[tokio::test]
    async fn test_fan_over_max_clamps_psu_passes_through() {
        let platform = FakePlatform::new(Ok(9000), Ok(FanDirection::Exhaust));
        let fan = direct_adapter(Unit::fan(1, 1, 2), RawReading::bits(0), platform.clone());
        let psu = direct_adapter(Unit::psu(1), RawReading::bits(0), platform);

        assert_eq!(fan.get_speed_percentage().await, 100);
        assert_eq!(psu.get_speed_percentage().await, 9000);
    }

    #[tokio::test]
    async fn test_psu_speed_ignores_airflow() {
        let platform = FakePlatform::new(Ok(3000), Err(SystemError::IoError("gone".to_string())));
        let psu = direct_adapter(Unit::psu(1), RawReading::bits(0), platform.clone());

        assert_eq!(psu.get_speed_percentage().await, 50);
        assert_eq!(platform.airflow_reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fan_speed_zero_when_airflow_unknown() {
        let unreadable =
            FakePlatform::new(Ok(3000), Err(SystemError::IoError("gone".to_string())));
        let fan = direct_adapter(Unit::fan(1, 2, 2), RawReading::bits(0), unreadable);
        assert_eq!(fan.get_speed_percentage().await, 0);
        assert_eq!(fan.get_speed_rpm().await, 3000);

        let unrecognised = FakePlatform::new(Ok(3000), Ok(FanDirection::Unknown));
        let fan = direct_adapter(Unit::fan(1, 2, 2), RawReading::bits(0), unrecognised);
        assert_eq!(fan.get_speed_percentage().await, 0);
    }

    #[tokio::test]
    async fn test_speed_unreadable_is_zero() {
        let platform = FakePlatform::new(
            Err(SystemError::ParseError("N/A".to_string())),
            Ok(FanDirection::Exhaust),
        );
        let fan = direct_adapter(Unit::fan(1, 1, 2), RawReading::bits(0), platform);

        assert_eq!(fan.get_speed_rpm().await, 0);
        assert_eq!(fan.get_speed_percentage().await, 0);
    }

    #[tokio::test]
    async fn test_out_of_band_selection_is_fixed() {
        let direct = FakeSource::new("direct", RawReading::bits(0b0001));
        let out_of_band = FakeSource::new("oob", RawReading::bits(0x01));
        let adapter = DeviceStatusAdapter::new(
            Unit::psu(1),
            ManagementPath::OutOfBand,
            channels(direct.clone(), out_of_band.clone()),
            healthy_platform(),
            normalizer(),
        )
        .unwrap();

        for _ in 0..5 {
            assert!(adapter.get_presence().await);
            assert!(adapter.get_status().await);
        }
        assert_eq!(adapter.status_source(), "oob");
        assert_eq!(adapter.management_path(), ManagementPath::OutOfBand);
        assert_eq!(direct.reads(), 0);
        assert_eq!(out_of_band.reads(), 10);
    }

    #[tokio::test]
    async fn test_direct_selection_is_fixed() {
        let direct = FakeSource::new("direct", RawReading::bits(0b0001));
        let out_of_band = FakeSource::new("oob", RawReading::bits(0x01));
        let adapter = DeviceStatusAdapter::new(
            Unit::psu(1),
            ManagementPath::DirectChannel,
            channels(direct.clone(), out_of_band.clone()),
            healthy_platform(),
            normalizer(),
        )
        .unwrap();

        for _ in 0..3 {
            adapter.get_presence().await;
            adapter.get_direction().await;
        }
        assert_eq!(out_of_band.reads(), 0);
        assert_eq!(direct.reads(), 6);
    }

    #[tokio::test]
    async fn test_direct_path_without_register_is_rejected() {
        let unconfigured = || StatusChannelSet {
            direct: None,
            out_of_band: StatusChannel {
                source: FakeSource::new("oob", RawReading::bits(0x01)),
                decoder: sensor_decoder(),
            },
        };

        let result = DeviceStatusAdapter::new(
            Unit::fan(1, 1, 2),
            ManagementPath::DirectChannel,
            unconfigured(),
            healthy_platform(),
            normalizer(),
        );
        assert!(matches!(result, Err(ConfigError::Invalid(msg)) if msg.contains("Fantray1_1")));

        let adapter = DeviceStatusAdapter::new(
            Unit::fan(1, 1, 2),
            ManagementPath::OutOfBand,
            unconfigured(),
            healthy_platform(),
            normalizer(),
        )
        .unwrap();
        assert!(adapter.get_presence().await);
    }

    #[tokio::test]
    async fn test_direction_and_fan_percentage_read_twice() {
        let direct = FakeSource::new("direct", RawReading::bits(0b0001));
        let platform = healthy_platform();
        let adapter = DeviceStatusAdapter::new(
            Unit::fan(1, 1, 2),
            ManagementPath::DirectChannel,
            channels(direct.clone(), FakeSource::new("oob", RawReading::failure())),
            platform.clone(),
            normalizer(),
        )
        .unwrap();

        // presence read, then the airflow attribute
        adapter.get_direction().await;
        assert_eq!(direct.reads(), 1);
        assert_eq!(platform.airflow_reads.load(Ordering::SeqCst), 1);

        // speed attribute, then the airflow attribute; no status read
        assert_eq!(adapter.get_speed_percentage().await, 50);
        assert_eq!(direct.reads(), 1);
        assert_eq!(platform.airflow_reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_one_channel_read_per_presence_query() {
        let direct = FakeSource::new("direct", RawReading::bits(0b0001));
        let adapter = DeviceStatusAdapter::new(
            Unit::psu(1),
            ManagementPath::DirectChannel,
            channels(direct.clone(), FakeSource::new("oob", RawReading::failure())),
            healthy_platform(),
            normalizer(),
        )
        .unwrap();

        adapter.get_presence().await;
        assert_eq!(direct.reads(), 1);
    }

    #[tokio::test]
    async fn test_snapshot() {
        let adapter = direct_adapter(Unit::psu(2), RawReading::bits(0b0010), healthy_platform());

        let snapshot = adapter.snapshot().await;
        assert_eq!(
            snapshot,
            DeviceStatus {
                name: "PSU2".to_string(),
                class: UnitClass::Psu,
                index: 2,
                present: true,
                status: true,
                direction: FanDirection::Exhaust,
                speed_rpm: 3000,
                speed_percentage: 50,
            }
        );
    }

    #[tokio::test]
    async fn test_snapshot_of_absent_unit() {
        let adapter = direct_adapter(Unit::psu(2), RawReading::failure(), healthy_platform());

        let snapshot = adapter.snapshot().await;
        assert!(!snapshot.present);
        assert!(!snapshot.status);
        assert_eq!(snapshot.direction, FanDirection::Unknown);
    }

    #[test]
    fn test_psu_ratings_only_for_psus() {
        let ratings = PsuRatings {
            capacity_watts: 550,
            psu_type: "AC".to_string(),
        };
        let psu = direct_adapter(Unit::psu(1), RawReading::failure(), healthy_platform())
            .with_psu_ratings(ratings.clone());
        assert_eq!(psu.capacity(), Some(550));
        assert_eq!(psu.psu_type(), Some("AC"));
        assert_eq!(psu.get_name(), "PSU1");

        let fan = direct_adapter(Unit::fan(1, 1, 2), RawReading::failure(), healthy_platform())
            .with_psu_ratings(ratings);
        assert_eq!(fan.capacity(), None);
        assert_eq!(fan.psu_type(), None);
    }
}
