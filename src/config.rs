use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::device::command::MAX_COMMAND_BYTES;
use crate::device::DeviceIdentity;
use crate::mqtt::config::MqttConfig;
use crate::network::ReconnectPolicy;

const CONFIG_DIR: &str = "roomnode";
const CONFIG_FILE: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    pub device: DeviceConfig,
    pub wifi: WifiConfig,
    pub mqtt: MqttConfig,
    pub timing: TimingConfig,
    pub pins: PinConfig,
    pub sensor: SensorConfig,
    pub simulation: SimulationConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct DeviceConfig {
    pub id: String,
    pub firmware_version: String,
    /// Prefix for every topic the device uses
    pub namespace: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: "roomnode_001".to_string(),
            firmware_version: format!("roomnode-{}", env!("CARGO_PKG_VERSION")),
            namespace: "roomnode/room1".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct WifiConfig {
    pub interface: String,
    pub ssid: String,
    pub password: Option<String>,
    pub connect_attempts: u32,
    pub attempt_backoff_ms: u64,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            interface: "wlan0".to_string(),
            ssid: String::new(),
            password: None,
            connect_attempts: 40,
            attempt_backoff_ms: 250,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    pub sensor_publish_ms: u64,
    pub heartbeat_ms: u64,
    pub wifi_recheck_ms: u64,
    pub broker_recheck_ms: u64,
    pub idle_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            sensor_publish_ms: 5000,
            heartbeat_ms: 15000,
            wifi_recheck_ms: 5000,
            broker_recheck_ms: 5000,
            idle_delay_ms: 10,
        }
    }
}

impl TimingConfig {
    pub fn sensor_publish(&self) -> Duration {
        Duration::from_millis(self.sensor_publish_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn wifi_recheck(&self) -> Duration {
        Duration::from_millis(self.wifi_recheck_ms)
    }

    pub fn broker_recheck(&self) -> Duration {
        Duration::from_millis(self.broker_recheck_ms)
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }
}

/// BCM pin numbers
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PinConfig {
    pub indicator: u8,
    pub indicator_active_high: bool,
    pub motor_enable: u8,
    pub motor_in1: u8,
    pub motor_in2: u8,
    pub pwm_frequency_hz: f64,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            indicator: 2,
            indicator_active_high: true,
            motor_enable: 10,
            motor_in1: 11,
            motor_in2: 12,
            pwm_frequency_hz: 1000.0,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct SensorConfig {
    /// sysfs directory of the IIO device bound to the DHT22
    pub iio_device: PathBuf,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            iio_device: PathBuf::from("/sys/bus/iio/devices/iio:device0"),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    pub enabled: bool,
    /// Probability in [0, 1] that a simulated sensor read fails
    pub sensor_failure_rate: f64,
}

impl AgentConfig {
    /// `dirs::config_dir()/roomnode/config.toml`, or a relative path when the
    /// platform has no config directory
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        });
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    /// Loads and validates the config. An explicit `path` must exist; the
    /// default location may be absent, in which case defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::read_file(path)?,
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::read_file(&path)?
                } else {
                    warn!(
                        "Config file {} does not exist, using defaults",
                        path.display()
                    );
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading config from {}", path.display());
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded config: {:?}", config);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let namespace = self.device.namespace.trim_end_matches('/');
        if namespace.is_empty() {
            return Err(ConfigError::Invalid("device.namespace is empty".into()));
        }
        if namespace.contains(['+', '#']) {
            return Err(ConfigError::Invalid(format!(
                "device.namespace must not contain MQTT wildcards: {}",
                namespace
            )));
        }
        if self.device.id.is_empty() {
            return Err(ConfigError::Invalid("device.id is empty".into()));
        }

        let intervals = [
            ("timing.sensor_publish_ms", self.timing.sensor_publish_ms),
            ("timing.heartbeat_ms", self.timing.heartbeat_ms),
            ("timing.wifi_recheck_ms", self.timing.wifi_recheck_ms),
            ("timing.broker_recheck_ms", self.timing.broker_recheck_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{} must be positive", name)));
        }

        if self.wifi.connect_attempts == 0 {
            return Err(ConfigError::Invalid(
                "wifi.connect_attempts must be positive".into(),
            ));
        }
        if self.mqtt.keep_alive_secs == 0 {
            return Err(ConfigError::Invalid(
                "mqtt.keep_alive_secs must be positive".into(),
            ));
        }
        if self.mqtt.max_incoming_packet_size <= MAX_COMMAND_BYTES {
            return Err(ConfigError::Invalid(format!(
                "mqtt.max_incoming_packet_size must exceed the {} byte command limit",
                MAX_COMMAND_BYTES
            )));
        }
        if !(0.0..=1.0).contains(&self.simulation.sensor_failure_rate) {
            return Err(ConfigError::Invalid(format!(
                "simulation.sensor_failure_rate must be within [0, 1], got {}",
                self.simulation.sensor_failure_rate
            )));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            device_id: self.device.id.clone(),
            firmware_version: self.device.firmware_version.clone(),
            namespace: self.device.namespace.clone(),
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            attempts: self.wifi.connect_attempts,
            backoff: Duration::from_millis(self.wifi.attempt_backoff_ms),
        }
    }

    /// The broker session identity, the device id unless overridden
    pub fn client_id(&self) -> String {
        self.mqtt
            .client_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| self.device.id.clone())
    }
}
