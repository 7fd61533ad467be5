//! Configuration loading — TOML file with environment variable overrides
//! (§6). Looks for `mijiableht.toml` in the working directory. Every field
//! has a sensible default so the file is optional; environment variables
//! take precedence over file values.

use std::str::FromStr;

use serde::Deserialize;

use mijiableht_adapter_ble::BleConfig;
use mijiableht_adapter_mqtt::MqttConfig;
use mijiableht_domain::mac::MacAddress;

/// Top-level configuration (§6).
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// BLE scanner settings, deserialized straight into the adapter's own
    /// config type.
    pub bluetooth: BleConfig,
    /// MQTT publisher settings, plus the cache's periodic publish interval.
    pub mqtt: MqttSection,
    /// Change-threshold policy for the sensor cache.
    pub thresholds: ThresholdsConfig,
    /// Known devices with a configured friendly name.
    pub devices: DevicesConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// IANA timezone used to format `last_seen` (e.g. `Europe/Prague`).
    pub timezone: String,
}

/// MQTT settings plus the cache's periodic heartbeat period (§6 groups
/// `mqtt.publish_interval` with the rest of the MQTT table even though it
/// governs the cache's emit decision, not the broker connection).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttSection {
    pub broker_host: String,
    pub broker_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    pub base_topic: String,
    pub discovery_prefix: String,
    /// Periodic heartbeat period `P`, in seconds (§6: default 300).
    #[serde(rename = "publish_interval")]
    pub publish_interval_secs: u64,
    pub keep_alive_secs: u16,
    pub connect_timeout_secs: u64,
    pub publish_timeout_secs: u64,
    pub qos: u8,
    pub retain: bool,
    pub include_statistics: bool,
    pub tls: bool,
    pub cleanup_discovery_on_shutdown: bool,
}

impl Default for MqttSection {
    fn default() -> Self {
        let adapter = MqttConfig::default();
        Self {
            broker_host: adapter.broker_host,
            broker_port: adapter.broker_port,
            username: adapter.username,
            password: adapter.password,
            client_id: adapter.client_id,
            base_topic: adapter.base_topic,
            discovery_prefix: adapter.discovery_prefix,
            publish_interval_secs: 300,
            keep_alive_secs: adapter.keep_alive_secs,
            connect_timeout_secs: adapter.connect_timeout_secs,
            publish_timeout_secs: adapter.publish_timeout_secs,
            qos: adapter.qos,
            retain: adapter.retain,
            include_statistics: adapter.include_statistics,
            tls: adapter.tls,
            cleanup_discovery_on_shutdown: adapter.cleanup_discovery_on_shutdown,
        }
    }
}

impl MqttSection {
    /// Project onto the MQTT adapter's own config type, dropping
    /// `publish_interval_secs` (consumed separately by the cache).
    #[must_use]
    pub fn to_adapter_config(&self) -> MqttConfig {
        MqttConfig {
            broker_host: self.broker_host.clone(),
            broker_port: self.broker_port,
            username: self.username.clone(),
            password: self.password.clone(),
            client_id: self.client_id.clone(),
            base_topic: self.base_topic.clone(),
            discovery_prefix: self.discovery_prefix.clone(),
            keep_alive_secs: self.keep_alive_secs,
            connect_timeout_secs: self.connect_timeout_secs,
            publish_timeout_secs: self.publish_timeout_secs,
            qos: self.qos,
            retain: self.retain,
            include_statistics: self.include_statistics,
            tls: self.tls,
            cleanup_discovery_on_shutdown: self.cleanup_discovery_on_shutdown,
        }
    }
}

/// Change-threshold and periodic-interval policy (§4.4, §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    /// ΔT in °C (default 0.2).
    pub temperature: f64,
    /// ΔH in % (default 1.0).
    pub humidity: f64,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            humidity: 1.0,
        }
    }
}

/// One entry of `devices.static_devices[]` (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct StaticDeviceConfig {
    pub mac: String,
    pub friendly_name: Option<String>,
}

/// Optional list of known devices to label with a friendly name.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    pub static_devices: Vec<StaticDeviceConfig>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "mijiablehtd=info,mijiableht_app=info,mijiableht_adapter_ble=info,mijiableht_adapter_mqtt=info".to_owned(),
        }
    }
}

impl Config {
    /// Load configuration from `mijiableht.toml` (if present), then apply
    /// environment-variable overrides, then validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// merged configuration fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("mijiableht.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MIJIABLEHT_BLUETOOTH_ADAPTER") {
            if let Ok(adapter) = val.parse() {
                self.bluetooth.adapter = adapter;
            }
        }
        if let Ok(val) = std::env::var("MIJIABLEHT_MQTT_BROKER_HOST") {
            self.mqtt.broker_host = val;
        }
        if let Ok(val) = std::env::var("MIJIABLEHT_MQTT_BROKER_PORT") {
            if let Ok(port) = val.parse() {
                self.mqtt.broker_port = port;
            }
        }
        if let Ok(val) = std::env::var("MIJIABLEHT_MQTT_USERNAME") {
            self.mqtt.username = Some(val);
        }
        if let Ok(val) = std::env::var("MIJIABLEHT_MQTT_PASSWORD") {
            self.mqtt.password = Some(val);
        }
        if let Ok(val) = std::env::var("MIJIABLEHT_MQTT_CLIENT_ID") {
            self.mqtt.client_id = val;
        }
        if let Ok(val) = std::env::var("MIJIABLEHT_THRESHOLDS_TEMPERATURE") {
            if let Ok(delta) = val.parse() {
                self.thresholds.temperature = delta;
            }
        }
        if let Ok(val) = std::env::var("MIJIABLEHT_THRESHOLDS_HUMIDITY") {
            if let Ok(delta) = val.parse() {
                self.thresholds.humidity = delta;
            }
        }
        if let Ok(val) = std::env::var("MIJIABLEHT_TIMEZONE") {
            self.timezone = val;
        }
        if let Ok(val) = std::env::var("MIJIABLEHT_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.broker_host.trim().is_empty() {
            return Err(ConfigError::Validation("mqtt.broker_host must not be empty".to_owned()));
        }
        if self.mqtt.qos > 2 {
            return Err(ConfigError::Validation("mqtt.qos must be 0, 1, or 2".to_owned()));
        }
        if self.thresholds.temperature <= 0.0 {
            return Err(ConfigError::Validation("thresholds.temperature must be positive".to_owned()));
        }
        if self.thresholds.humidity <= 0.0 {
            return Err(ConfigError::Validation("thresholds.humidity must be positive".to_owned()));
        }
        if self.mqtt.publish_interval_secs == 0 {
            return Err(ConfigError::Validation("mqtt.publish_interval must be positive".to_owned()));
        }
        self.timezone_tz()
            .map_err(|()| ConfigError::Validation(format!("unrecognized timezone {:?}", self.timezone)))?;
        for device in &self.devices.static_devices {
            device
                .mac
                .parse::<MacAddress>()
                .map_err(|_| ConfigError::Validation(format!("invalid MAC address {:?}", device.mac)))?;
        }
        Ok(())
    }

    /// Parse `timezone` into a [`chrono_tz::Tz`] (validated up front by
    /// [`Config::validate`], so this only fails on a config bug).
    ///
    /// # Errors
    ///
    /// Returns `Err(())` if `timezone` is not a recognized IANA zone name.
    pub fn timezone_tz(&self) -> Result<chrono_tz::Tz, ()> {
        chrono_tz::Tz::from_str(&self.timezone).map_err(|_| ())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bluetooth: BleConfig::default(),
            mqtt: MqttSection::default(),
            thresholds: ThresholdsConfig::default(),
            devices: DevicesConfig::default(),
            logging: LoggingConfig::default(),
            timezone: "UTC".to_owned(),
        }
    }
}

/// Configuration errors. Surfaced by the Orchestrator as exit code 2 (§6).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
