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

//! End-to-end status flow: configuration file, container wiring, channel
//! reads and sysfs attributes, with external commands scripted.

use assert_fs::prelude::*;
use assert_fs::TempDir;
use async_trait::async_trait;
use platform_status::domain::{CommandError, SystemError};
use platform_status::ports::{CommandOutput, SystemCommand};
use platform_status::{
    CommandExecutor, DeviceStatusService, FanDirection, FileConfigurationProvider, ServiceContainer,
    UnitClass,
};
use predicates::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const SENSOR_LIST: &str = "\
PSU1_Status      | 0x0        | discrete   | 0x0100| na        | na        | na
PSU2_Status      | 0x0        | discrete   | 0x0300| na        | na        | na
Fan1_Status      | 0x0        | discrete   | 0x0100| na        | na        | na
Fan2_Status      | 0x0        | discrete   | 0x0000| na        | na        | na
";

/// Fan presence (active-low) in bits 0-1, power-good in bits 4-5 of register 0x66
const FAN_REGISTER: &str = r#"
[status.fan.direct]
bus = 0
device = 0x0d
register = 0x66
layout = { presence_base = 0, power_good_base = 4, unit_stride = 1 }
table = { presence = { set = false, clear = true }, power_good = { set = true, clear = false } }

[status.fan.out_of_band]
sensor = "Fan{index}_Status"
layout = { presence_base = 0, power_good_base = 1, unit_stride = 0 }
table = { presence = { set = true, clear = false }, power_good = { set = false, clear = true } }
"#;

/// Replies to commands by their full command line; anything unscripted fails
struct ScriptedExecutor {
    replies: HashMap<String, Result<String, String>>,
    has_ipmitool: bool,
    seen: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    fn new(has_ipmitool: bool) -> Self {
        Self {
            replies: HashMap::new(),
            has_ipmitool,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn reply(mut self, command: &str, stdout: &str) -> Self {
        self.replies.insert(command.to_string(), Ok(stdout.to_string()));
        self
    }

    fn fail(mut self, command: &str, message: &str) -> Self {
        self.replies.insert(command.to_string(), Err(message.to_string()));
        self
    }

    fn count(&self, command: &str) -> usize {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == command)
            .count()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(&self, command: &SystemCommand) -> Result<CommandOutput, CommandError> {
        let line = command.display();
        self.seen.lock().unwrap().push(line.clone());
        match self.replies.get(&line) {
            Some(Ok(stdout)) => Ok(CommandOutput {
                stdout: stdout.clone(),
                stderr: String::new(),
                exit_code: Some(0),
                success: true,
            }),
            Some(Err(message)) => Err(CommandError::ExecutionFailed(message.clone())),
            None => Err(SystemError::CommandFailed {
                command: line,
                exit_code: Some(1),
                stderr: "unscripted".to_string(),
            }
            .into()),
        }
    }

    async fn is_command_available(&self, _command_name: &str) -> Result<bool, CommandError> {
        Ok(self.has_ipmitool)
    }

    async fn has_elevated_privileges(&self) -> Result<bool, CommandError> {
        Ok(true)
    }
}

fn init_test_logging() {
    let _ = env_logger::Builder::from_default_env()
        .is_test(true)
        .try_init();
}

/// A fake sysfs tree plus a config file pointing into it
fn write_platform(
    root: &TempDir,
    management_path: &str,
    fan_tray_count: u32,
    extra: &str,
) -> FileConfigurationProvider {
    root.child("psu/psu1/psu_fan1_speed_rpm")
        .write_str("9000\n")
        .unwrap();
    root.child("psu/psu1/psu_fan_dir")
        .write_str("F2B\n")
        .unwrap();
    root.child("psu/psu2/psu_fan1_speed_rpm")
        .write_str("20000\n")
        .unwrap();
    root.child("psu/psu2/psu_fan_dir")
        .write_str("F2B\n")
        .unwrap();
    root.child("fantray/fan1_input").write_str("14500\n").unwrap();
    root.child("fantray/fan1_direction")
        .write_str("F2B\n")
        .unwrap();
    root.child("fantray/fan2_input").write_str("30000\n").unwrap();
    root.child("fantray/fan2_direction")
        .write_str("B2F\n")
        .unwrap();

    let base = root.path().display();
    let config = format!(
        r#"
[platform]
psu_count = 2
fan_tray_count = {fan_tray_count}
fans_per_tray = 2
management_path = "{management_path}"

[sysfs]
fan_speed_rpm = "{base}/fantray/fan{{index}}_input"
fan_direction = "{base}/fantray/fan{{index}}_direction"
psu_fan_speed_rpm = "{base}/psu/psu{{index}}/psu_fan1_speed_rpm"
psu_fan_direction = "{base}/psu/psu{{index}}/psu_fan_dir"

[ipmi]
cache_path = "{base}/sensor_info.log"
{extra}"#
    );
    let file = root.child("platform.toml");
    file.write_str(&config).unwrap();
    FileConfigurationProvider::new(file.path())
}

#[tokio::test]
async fn test_out_of_band_flow_caches_sensor_list() {
    init_test_logging();
    let root = TempDir::new().unwrap();
    let provider = write_platform(&root, "auto", 1, "");
    let executor = Arc::new(
        ScriptedExecutor::new(true)
            .reply("ipmitool mc info", "Device ID : 32\n")
            .reply("ipmitool sensor list", SENSOR_LIST),
    );

    let container = ServiceContainer::from_provider(&provider)
        .await
        .unwrap()
        .with_command_executor(executor.clone());
    let services = container.create_status_services().await.unwrap();
    assert_eq!(services.len(), 4);

    root.child("sensor_info.log").assert(predicate::path::missing());

    let psu1 = services[0].snapshot().await;
    assert_eq!(psu1.name, "PSU1");
    assert_eq!(psu1.class, UnitClass::Psu);
    assert!(psu1.present);
    assert!(psu1.status);
    assert_eq!(psu1.direction, FanDirection::Exhaust);
    assert_eq!(psu1.speed_rpm, 9000);
    assert_eq!(psu1.speed_percentage, 50);

    root.child("sensor_info.log")
        .assert(predicate::str::contains("PSU2_Status"));

    // inserted but failed: reported absent, airflow hidden, speed still read
    let psu2 = services[1].snapshot().await;
    assert!(!psu2.present);
    assert!(!psu2.status);
    assert_eq!(psu2.direction, FanDirection::Unknown);
    assert_eq!(psu2.speed_rpm, 20000);
    assert_eq!(psu2.speed_percentage, 20000);

    let front = services[2].snapshot().await;
    assert_eq!(front.name, "Fantray1_1");
    assert!(front.present);
    assert_eq!(front.speed_percentage, 50);

    // present line clear: absent, but the rotor speed is still reported clamped
    let rear = services[3].snapshot().await;
    assert_eq!(rear.name, "Fantray1_2");
    assert!(!rear.present);
    assert_eq!(rear.direction, FanDirection::Unknown);
    assert_eq!(rear.speed_rpm, 30000);
    assert_eq!(rear.speed_percentage, 100);

    assert_eq!(executor.count("ipmitool mc info"), 1);
    assert_eq!(executor.count("ipmitool sensor list"), 1);
    assert!(executor
        .seen
        .lock()
        .unwrap()
        .iter()
        .all(|c| !c.starts_with("i2cget")));
}

#[tokio::test]
async fn test_direct_channel_flow_reads_status_register() {
    init_test_logging();
    let root = TempDir::new().unwrap();
    let provider = write_platform(&root, "direct", 0, "");
    // power-good lines high for PSU1 only, presence (active-low) asserted for PSU1 only
    let executor =
        Arc::new(ScriptedExecutor::new(true).reply("i2cget -f -y 0 0x0d 0x60", "0x09\n"));

    let container = ServiceContainer::from_provider(&provider)
        .await
        .unwrap()
        .with_command_executor(executor.clone());
    let services = container.create_status_services().await.unwrap();
    assert_eq!(services.len(), 2);

    assert!(services[0].get_presence().await);
    assert!(services[0].get_status().await);
    assert_eq!(services[0].get_direction().await, FanDirection::Exhaust);

    assert!(!services[1].get_presence().await);
    assert!(!services[1].get_status().await);
    assert_eq!(services[1].get_direction().await, FanDirection::Unknown);

    assert_eq!(executor.count("ipmitool mc info"), 0);
    assert_eq!(executor.count("ipmitool sensor list"), 0);
    root.child("sensor_info.log").assert(predicate::path::missing());
}

#[tokio::test]
async fn test_direct_channel_flow_reads_fan_register() {
    init_test_logging();
    let root = TempDir::new().unwrap();
    let provider = write_platform(&root, "direct", 1, FAN_REGISTER);
    // both rotors inserted, power-good only for rotor 1
    let executor = Arc::new(
        ScriptedExecutor::new(true)
            .reply("i2cget -f -y 0 0x0d 0x60", "0x03\n")
            .reply("i2cget -f -y 0 0x0d 0x66", "0x10\n"),
    );

    let container = ServiceContainer::from_provider(&provider)
        .await
        .unwrap()
        .with_command_executor(executor.clone());
    let services = container.create_status_services().await.unwrap();
    assert_eq!(services.len(), 4);

    let front = services[2].snapshot().await;
    assert_eq!(front.name, "Fantray1_1");
    assert!(front.present);
    assert!(front.status);
    assert_eq!(front.direction, FanDirection::Exhaust);
    assert_eq!(front.speed_percentage, 50);

    let rear = services[3].snapshot().await;
    assert_eq!(rear.name, "Fantray1_2");
    assert!(!rear.present);
    assert!(!rear.status);
    assert_eq!(rear.direction, FanDirection::Unknown);

    assert!(executor.count("i2cget -f -y 0 0x0d 0x66") >= 2);
    assert_eq!(executor.count("ipmitool sensor list"), 0);
}

#[tokio::test]
async fn test_direct_channel_without_fan_register_is_rejected() {
    let root = TempDir::new().unwrap();
    let provider = write_platform(&root, "direct", 1, "");

    let err = ServiceContainer::from_provider(&provider)
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("status.fan.direct"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_reads_share_one_sensor_listing() {
    init_test_logging();
    let root = TempDir::new().unwrap();
    let provider = write_platform(&root, "out_of_band", 1, "");
    let executor =
        Arc::new(ScriptedExecutor::new(true).reply("ipmitool sensor list", SENSOR_LIST));

    let container = ServiceContainer::from_provider(&provider)
        .await
        .unwrap()
        .with_command_executor(executor.clone());
    let services = container.create_status_services().await.unwrap();

    let (psu, fan) = tokio::join!(services[0].get_presence(), services[2].get_presence());
    assert!(psu);
    assert!(fan);
    assert_eq!(executor.count("ipmitool sensor list"), 1);
    root.child("sensor_info.log")
        .assert(predicate::str::contains("Fan1_Status"));
}

#[tokio::test]
async fn test_bus_failure_degrades_only_status() {
    init_test_logging();
    let root = TempDir::new().unwrap();
    let provider = write_platform(&root, "direct", 0, "");
    let executor = Arc::new(
        ScriptedExecutor::new(false)
            .fail("i2cget -f -y 0 0x0d 0x60", "Command 'i2cget' timed out after 5s"),
    );

    let container = ServiceContainer::from_provider(&provider)
        .await
        .unwrap()
        .with_command_executor(executor);

    for service in container.create_status_services().await.unwrap() {
        let status = service.snapshot().await;
        assert!(!status.present);
        assert!(!status.status);
        assert_eq!(status.direction, FanDirection::Unknown);
    }
}

#[tokio::test]
async fn test_missing_sysfs_attributes_report_zero_speed() {
    init_test_logging();
    let root = TempDir::new().unwrap();
    let provider = write_platform(&root, "out_of_band", 1, "");
    root.child("fantray/fan1_input").assert(predicate::path::exists());
    std::fs::remove_file(root.child("fantray/fan1_input").path()).unwrap();
    std::fs::remove_file(root.child("fantray/fan1_direction").path()).unwrap();

    let executor =
        Arc::new(ScriptedExecutor::new(true).reply("ipmitool sensor list", SENSOR_LIST));
    let container = ServiceContainer::from_provider(&provider)
        .await
        .unwrap()
        .with_command_executor(executor);
    let services = container.create_status_services().await.unwrap();

    let front = &services[2];
    assert!(front.get_presence().await);
    assert_eq!(front.get_direction().await, FanDirection::Unknown);
    assert_eq!(front.get_speed_rpm().await, 0);
    assert_eq!(front.get_speed_percentage().await, 0);
}

#[tokio::test]
async fn test_invalid_config_file_is_rejected() {
    let root = TempDir::new().unwrap();
    let file = root.child("platform.toml");
    file.write_str("[command]\ntimeout_secs = 0\n").unwrap();

    let provider = FileConfigurationProvider::new(file.path());
    let result = ServiceContainer::from_provider(&provider).await;
    assert!(result.is_err());
}
