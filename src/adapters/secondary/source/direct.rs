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

//! Direct bus channel: one register read through `i2cget`

use crate::domain::{RawReading, Unit};
use crate::ports::{CommandExecutor, RawStatusSource, SystemCommand};
use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;

/// Reads a fixed device/register pair whose bits pack presence and health
pub struct DirectChannelSource {
    command_executor: Arc<dyn CommandExecutor>,
    bus: u8,
    device: u8,
    register: u8,
}

impl DirectChannelSource {
    pub fn new(
        command_executor: Arc<dyn CommandExecutor>,
        bus: u8,
        device: u8,
        register: u8,
    ) -> Self {
        Self {
            command_executor,
            bus,
            device,
            register,
        }
    }

    fn command(&self) -> SystemCommand {
        let bus = self.bus.to_string();
        let device = format!("{:#04x}", self.device);
        let register = format!("{:#04x}", self.register);
        SystemCommand::new("i2cget").args(&["-f", "-y", &bus, &device, &register])
    }
}

#[async_trait]
impl RawStatusSource for DirectChannelSource {
    fn name(&self) -> &'static str {
        "direct-channel"
    }

    async fn read(&self, unit: &Unit) -> RawReading {
        let command = self.command();
        match self.command_executor.execute(&command).await {
            Ok(output) if output.success => {
                let value = output.stdout.trim();
                debug!("{unit}: '{}' -> {value}", command.display());
                RawReading::text(value)
            }
            Ok(output) => {
                warn!(
                    "{unit}: '{}' exited with {:?}: {}",
                    command.display(),
                    output.exit_code,
                    output.stderr.trim()
                );
                RawReading::failure()
            }
            Err(e) => {
                warn!("{unit}: '{}' failed: {e}", command.display());
                RawReading::failure()
            }
        }
    }
}
