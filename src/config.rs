//! Application settings.
//!
//! Settings come from a JSON file shaped like the meter bridge's
//! `appsettings.json`, overlaid with environment variables prefixed `EMI_`.
//! Nested keys are separated by `__` and keep the file's spelling, e.g.
//! `EMI_EmiConfig__MqttConfiguration__Password`.

use std::{collections::HashSet, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Json},
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    acquisition::LoopTiming,
    error::{Error, Result},
    register::{MAX_OCTET_STRING_LEN, parse_address},
    scheduler::MAX_POLLING_INTERVAL,
    types::{DataLoadDescriptor, DataLoadType},
};

pub const DEFAULT_CONFIG_PATH: &str = "appsettings.json";
pub const ENV_PREFIX: &str = "EMI_";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AppConfig {
    #[serde(rename = "ModBusConfiguration")]
    pub modbus: ModbusConfiguration,
    #[serde(default)]
    pub emi_config: EmiConfig,
    #[serde(default)]
    pub acquisition: AcquisitionConfiguration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

/// Serial line and Modbus settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModbusConfiguration {
    /// Serial device path, e.g. `/dev/ttyUSB0`.
    pub device: String,
    pub baud_rate: u32,
    #[serde(default)]
    pub parity: Parity,
    pub data_bits: u8,
    pub stop_bits: u8,
    /// Unless changed, most EMI meters use slave ID 1.
    pub slave_id: u8,
    /// Trace every Modbus frame.
    #[serde(default)]
    pub debug: bool,
    /// Response timeout in milliseconds. `0` selects the default of one second.
    #[serde(default)]
    pub response_timeout: u64,
}

impl ModbusConfiguration {
    pub fn response_timeout_ms(&self) -> u64 {
        if self.response_timeout == 0 {
            1000
        } else {
            self.response_timeout
        }
    }

    fn validate(&self) -> Result<()> {
        if self.device.is_empty() || self.device.len() > 255 {
            return Err(Error::config("device path must be 1 to 255 characters"));
        }
        if !(300..=115_200).contains(&self.baud_rate) {
            return Err(Error::config("baud rate must be between 300 and 115200"));
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(Error::config("data bits must be between 5 and 8"));
        }
        if !(1..=2).contains(&self.stop_bits) {
            return Err(Error::config("stop bits must be either 1 or 2"));
        }
        if !(1..=247).contains(&self.slave_id) {
            return Err(Error::config("slave ID must be between 1 and 247"));
        }
        if self.response_timeout > 60_000 {
            return Err(Error::config("response timeout must not exceed 60000 ms"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EmiConfig {
    pub data_loads: Vec<DataLoadConfig>,
    pub mqtt_configuration: MqttConfiguration,
}

/// One data load as written in the settings file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataLoadConfig {
    pub name: String,
    /// Register address as a hex literal, optionally prefixed with `0x`.
    pub address: String,
    #[serde(rename = "Type", default)]
    pub data_type: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub scaler: i32,
    /// Bytes to read for string loads.
    #[serde(default)]
    pub string_length: u32,
    #[serde(rename = "MQTTTopic")]
    pub mqtt_topic: String,
    /// Seconds between polls.
    #[serde(default = "default_polling_interval")]
    pub polling_interval: i64,
}

fn default_polling_interval() -> i64 {
    1
}

impl DataLoadConfig {
    /// Resolve and check this entry.
    pub fn to_descriptor(&self) -> Result<DataLoadDescriptor> {
        let fail = |msg: &str| Error::config(format!("data load {:?}: {msg}", self.name));

        if self.name.trim().is_empty() {
            return Err(Error::config("data load name must not be empty"));
        }
        let address = parse_address(&self.address).map_err(|e| fail(&e.to_string()))?;

        let data_type = DataLoadType::from_config_name(&self.data_type);
        if data_type == DataLoadType::Unset {
            warn!(data_load = %self.name, data_type = %self.data_type, "Unknown data type, this load will never decode");
        }
        if data_type.is_numeric() && self.unit.trim().is_empty() {
            return Err(fail("a unit is required for numeric data loads"));
        }
        if i8::try_from(self.scaler).is_err() {
            warn!(data_load = %self.name, scaler = self.scaler, "Scaler outside [-128, 127], decoding will fail");
        }

        let string_length = u16::try_from(self.string_length).unwrap_or(u16::MAX);
        if data_type == DataLoadType::String
            && !(1..=MAX_OCTET_STRING_LEN).contains(&string_length)
        {
            return Err(fail(&format!(
                "string length must be between 1 and {MAX_OCTET_STRING_LEN}"
            )));
        }
        if self.mqtt_topic.trim().is_empty() {
            return Err(fail("an MQTT topic is required"));
        }
        let max_secs = MAX_POLLING_INTERVAL.as_secs();
        let interval = u64::try_from(self.polling_interval)
            .ok()
            .filter(|secs| (1..=max_secs).contains(secs))
            .ok_or_else(|| {
                fail(&format!("polling interval must be between 1 and {max_secs} seconds"))
            })?;

        Ok(DataLoadDescriptor {
            name: self.name.clone(),
            address,
            data_type,
            unit: self.unit.clone(),
            scaler: self.scaler,
            string_length,
            topic: self.mqtt_topic.clone(),
            polling_interval: Duration::from_secs(interval),
        })
    }
}

/// Broker connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MqttConfiguration {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub client_id: String,
    /// Keep alive in seconds.
    pub keep_alive: u64,
    /// Upper bound for connect, publish and disconnect, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for MqttConfiguration {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: String::new(),
            password: String::new(),
            client_id: env!("CARGO_PKG_NAME").to_string(),
            keep_alive: 30,
            timeout_ms: 5000,
        }
    }
}

impl MqttConfiguration {
    fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::config("MQTT host must not be empty"));
        }
        if self.port == 0 {
            return Err(Error::config("MQTT port must not be 0"));
        }
        if self.client_id.is_empty() {
            return Err(Error::config("MQTT client ID must not be empty"));
        }
        if self.keep_alive < 5 {
            return Err(Error::config("MQTT keep alive must be at least 5 seconds"));
        }
        if self.timeout_ms == 0 {
            return Err(Error::config("MQTT timeout must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AcquisitionConfiguration {
    pub idle_interval_ms: u64,
    pub connect_backoff_max_ms: u64,
}

impl Default for AcquisitionConfiguration {
    fn default() -> Self {
        let timing = LoopTiming::default();
        Self {
            idle_interval_ms: timing.idle_interval.as_millis() as u64,
            connect_backoff_max_ms: timing.connect_backoff_max.as_millis() as u64,
        }
    }
}

impl AcquisitionConfiguration {
    pub fn timing(&self) -> LoopTiming {
        let idle_interval = Duration::from_millis(self.idle_interval_ms.max(1));
        LoopTiming {
            idle_interval,
            connect_backoff_max: Duration::from_millis(self.connect_backoff_max_ms)
                .max(idle_interval),
        }
    }
}

impl AppConfig {
    /// The layered providers: settings file, then environment.
    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::new()
            .merge(Json::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__").lowercase(false))
    }

    /// Load and validate the settings.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: AppConfig = Self::figment(path).extract().map_err(|e| {
            Error::config(format!(
                "failed to load configuration from {}: {e}",
                path.display()
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.modbus.validate()?;
        self.emi_config.mqtt_configuration.validate()?;
        self.descriptors().map(|_| ())
    }

    /// Resolve every data load, in file order.
    pub fn descriptors(&self) -> Result<Vec<DataLoadDescriptor>> {
        if self.emi_config.data_loads.is_empty() {
            return Err(Error::config("no data loads configured"));
        }
        let mut names = HashSet::new();
        self.emi_config
            .data_loads
            .iter()
            .map(|load| {
                let descriptor = load.to_descriptor()?;
                if !names.insert(descriptor.name.clone()) {
                    return Err(Error::config(format!(
                        "data load name {:?} is used more than once",
                        descriptor.name
                    )));
                }
                Ok(descriptor)
            })
            .collect()
    }
}
