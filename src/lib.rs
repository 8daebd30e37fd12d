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

//! Platform Status Library
//!
//! Fan and PSU status for switch platforms. Raw telemetry from two kinds of
//! channel (a status register read directly over the bus, or a management
//! controller queried out of band) is normalised into one status model, with
//! failures degrading only the affected unit's reading.
//!
//! # Architecture
//!
//! - **Domain**: Units, configuration schema, status decoding, speed normalisation
//!   and the [`DeviceStatusAdapter`]
//! - **Ports**: Interfaces for external interactions
//! - **Adapters**: `i2cget`, `ipmitool`, sysfs and config-file implementations
//!
//! # Usage
//!
//! ```rust,no_run
//! use platform_status::{DeviceStatusService, FileConfigurationProvider, ServiceContainer};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     platform_status::init_logging(false);
//!
//!     let provider = FileConfigurationProvider::new("/etc/platform/status.toml");
//!     let container = ServiceContainer::from_provider(&provider).await?;
//!
//!     for unit in container.create_status_services().await? {
//!         let status = unit.snapshot().await;
//!         println!("{}", serde_json::to_string(&status)?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod container;
pub mod domain;
pub mod logging;
pub mod ports;

pub use adapters::{
    DirectChannelSource, FileConfigurationProvider, OutOfBandSource, SensorListCache,
    StaticConfigurationProvider, SysfsPlatformProvider, UnixCommandExecutor,
};
pub use container::{ContainerConfig, ContainerConfigBuilder, ServiceContainer};
pub use domain::{
    AirflowDirection, ConfigError, DeviceStatus, DeviceStatusAdapter, FanDirection,
    ManagementPath, PlatformConfig, RawReading, SpeedLimits, SpeedNormalizer, StatusDecoder,
    StatusError, Unit, UnitClass,
};
pub use logging::init_logging;
pub use ports::{
    CommandExecutor, ConfigurationProvider, DeviceStatusService, PlatformProvider,
    RawStatusSource,
};
