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

//! Dependency injection container for status adapters

use crate::adapters::{
    DirectChannelSource, OutOfBandSource, SensorListCache, SysfsPlatformProvider,
    UnixCommandExecutor,
};
use crate::domain::{
    ConfigError, DeviceStatusAdapter, ManagementPath, PlatformConfig, PsuRatings, SpeedLimits,
    SpeedNormalizer, StatusChannel, StatusChannelSet, StatusDecoder, Unit, UnitClass,
};
use crate::ports::{
    CommandExecutor, ConfigurationProvider, DeviceStatusService, PlatformProvider,
    RawStatusSource, SystemCommand,
};
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the dependency injection container
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerConfig {
    /// Command execution timeout
    pub command_timeout: Duration,
    /// Command retry count
    pub retry_count: u32,
    /// Enable verbose logging
    pub verbose: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(5),
            retry_count: 0,
            verbose: false,
        }
    }
}

impl From<&PlatformConfig> for ContainerConfig {
    fn from(config: &PlatformConfig) -> Self {
        Self {
            command_timeout: Duration::from_secs(config.command.timeout_secs),
            retry_count: config.command.retry_count,
            verbose: config.command.verbose,
        }
    }
}

/// Dependency injection container
///
/// Builds every adapter from one [`PlatformConfig`] and one command executor.
/// Sources are shared between the units of a class.
pub struct ServiceContainer {
    platform: PlatformConfig,
    config: ContainerConfig,
    command_executor: Arc<dyn CommandExecutor>,
}

impl ServiceContainer {
    /// Create a container that runs commands on the local host
    pub fn new(platform: PlatformConfig) -> Self {
        let config = ContainerConfig::from(&platform);
        let command_executor: Arc<dyn CommandExecutor> = Arc::new(UnixCommandExecutor::new(
            config.command_timeout,
            config.retry_count,
            config.verbose,
        ));
        Self {
            platform,
            config,
            command_executor,
        }
    }

    /// Load configuration from `provider` and create a container
    pub async fn from_provider(
        provider: &dyn ConfigurationProvider,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(provider.get_platform_config().await?))
    }

    /// Apply executor settings that differ from the platform configuration
    pub fn with_container_config(mut self, config: ContainerConfig) -> Self {
        self.command_executor = Arc::new(UnixCommandExecutor::new(
            config.command_timeout,
            config.retry_count,
            config.verbose,
        ));
        self.config = config;
        self
    }

    /// Replace the command executor (e.g. for a remote shell or tests)
    pub fn with_command_executor(mut self, command_executor: Arc<dyn CommandExecutor>) -> Self {
        self.command_executor = command_executor;
        self
    }

    pub fn container_config(&self) -> &ContainerConfig {
        &self.config
    }

    pub fn platform_config(&self) -> &PlatformConfig {
        &self.platform
    }

    pub fn command_executor(&self) -> Arc<dyn CommandExecutor> {
        self.command_executor.clone()
    }

    /// The configured management path, or a one-time probe when set to `auto`
    pub async fn resolve_management_path(&self) -> ManagementPath {
        if let Some(path) = self.platform.platform.management_path.explicit() {
            info!("Management path configured as {path}");
            return path;
        }
        let path = self.detect_management_path().await;
        info!("Management path detected as {path}");
        path
    }

    /// Out-of-band when `ipmitool` exists and the controller answers `mc info`
    async fn detect_management_path(&self) -> ManagementPath {
        match self.command_executor.is_command_available("ipmitool").await {
            Ok(true) => {}
            Ok(false) => return ManagementPath::DirectChannel,
            Err(e) => {
                warn!("Could not look up ipmitool, assuming no management controller: {e}");
                return ManagementPath::DirectChannel;
            }
        }

        let probe = SystemCommand::new("ipmitool").args(&["mc", "info"]);
        match self.command_executor.execute(&probe).await {
            Ok(output) if output.success => ManagementPath::OutOfBand,
            Ok(output) => {
                warn!(
                    "Management controller did not answer (exit {:?}), using direct channel",
                    output.exit_code
                );
                ManagementPath::DirectChannel
            }
            Err(e) => {
                warn!("Management controller probe failed, using direct channel: {e}");
                ManagementPath::DirectChannel
            }
        }
    }

    /// The sensor-list cache shared by every out-of-band source
    pub fn create_sensor_list_cache(&self) -> Arc<SensorListCache> {
        Arc::new(SensorListCache::new(
            self.command_executor.clone(),
            &self.platform.ipmi.cache_path,
        ))
    }

    /// Status channels for a unit class; the direct one only if its register is configured
    pub fn create_status_channels(
        &self,
        class: UnitClass,
        sensor_cache: &Arc<SensorListCache>,
    ) -> StatusChannelSet {
        let channels = self.platform.channels(class);

        let direct = channels.direct.as_ref().map(|direct| {
            let source: Arc<dyn RawStatusSource> = Arc::new(DirectChannelSource::new(
                self.command_executor.clone(),
                direct.bus,
                direct.device,
                direct.register,
            ));
            StatusChannel {
                source,
                decoder: StatusDecoder::new(direct.layout, direct.table),
            }
        });
        let out_of_band: Arc<dyn RawStatusSource> = Arc::new(OutOfBandSource::new(
            sensor_cache.clone(),
            &channels.out_of_band.sensor,
        ));

        StatusChannelSet {
            direct,
            out_of_band: StatusChannel {
                source: out_of_band,
                decoder: StatusDecoder::new(
                    channels.out_of_band.layout,
                    channels.out_of_band.table,
                ),
            },
        }
    }

    /// Create the sysfs attribute provider
    pub fn create_platform_provider(&self) -> Arc<dyn PlatformProvider> {
        Arc::new(SysfsPlatformProvider::new(self.platform.sysfs.clone()))
    }

    pub fn create_speed_normalizer(&self) -> Arc<SpeedNormalizer> {
        Arc::new(SpeedNormalizer::new(SpeedLimits::from_config(&self.platform)))
    }

    /// Every configured unit: PSUs first, then fans tray by tray
    pub fn units(&self) -> Vec<Unit> {
        let layout = &self.platform.platform;
        let psus = (1..=layout.psu_count).map(Unit::psu);
        let fans = (1..=layout.fan_tray_count).flat_map(|tray| {
            (1..=layout.fans_per_tray).map(move |fan| Unit::fan(tray, fan, layout.fans_per_tray))
        });
        psus.chain(fans).collect()
    }

    /// Build one adapter per unit, all bound to `path`
    ///
    /// Fails when `path` is the direct channel and a class with units has no
    /// register configured.
    pub fn create_adapters_with_path(
        &self,
        path: ManagementPath,
    ) -> Result<Vec<DeviceStatusAdapter>, ConfigError> {
        if path == ManagementPath::DirectChannel {
            for class in [UnitClass::Psu, UnitClass::Fan] {
                self.platform.direct_channel(class)?;
            }
        }

        let platform = self.create_platform_provider();
        let normalizer = self.create_speed_normalizer();
        let sensor_cache = self.create_sensor_list_cache();
        let psu_channels = self.create_status_channels(UnitClass::Psu, &sensor_cache);
        let fan_channels = self.create_status_channels(UnitClass::Fan, &sensor_cache);
        let ratings = PsuRatings {
            capacity_watts: self.platform.psu.capacity_watts,
            psu_type: self.platform.psu.psu_type.clone(),
        };

        self.units()
            .into_iter()
            .map(|unit| {
                let channels = match unit.class() {
                    UnitClass::Psu => psu_channels.clone(),
                    UnitClass::Fan => fan_channels.clone(),
                };
                DeviceStatusAdapter::new(
                    unit,
                    path,
                    channels,
                    platform.clone(),
                    normalizer.clone(),
                )
                .map(|adapter| adapter.with_psu_ratings(ratings.clone()))
            })
            .collect()
    }

    /// Resolve the management path once and build every adapter with it
    pub async fn create_status_services(
        &self,
    ) -> Result<Vec<Arc<dyn DeviceStatusService>>, ConfigError> {
        let path = self.resolve_management_path().await;
        if path == ManagementPath::DirectChannel {
            self.warn_if_unprivileged().await;
        }

        Ok(self
            .create_adapters_with_path(path)?
            .into_iter()
            .map(|adapter| Arc::new(adapter) as Arc<dyn DeviceStatusService>)
            .collect())
    }

    /// Direct bus reads need root; say so once instead of failing every read silently
    async fn warn_if_unprivileged(&self) {
        match self.command_executor.has_elevated_privileges().await {
            Ok(true) => {}
            Ok(false) => warn!("Not running as root: direct-channel reads will likely fail"),
            Err(e) => warn!("Could not check privileges: {e}"),
        }
    }
}

/// Builder pattern for container configuration
pub struct ContainerConfigBuilder {
    config: ContainerConfig,
}

impl ContainerConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            config: ContainerConfig::default(),
        }
    }

    /// Set command timeout
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Set retry count
    pub fn retry_count(mut self, count: u32) -> Self {
        self.config.retry_count = count;
        self
    }

    /// Enable verbose logging
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ContainerConfig {
        self.config
    }
}

impl Default for ContainerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
