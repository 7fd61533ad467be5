//! MQTT publisher configuration (§6).

use serde::Deserialize;

/// Configuration for the MQTT publisher adapter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// MQTT broker hostname or IP address.
    pub broker_host: String,
    /// MQTT broker port.
    pub broker_port: u16,
    /// Optional username for broker authentication.
    pub username: Option<String>,
    /// Optional password for broker authentication.
    pub password: Option<String>,
    /// MQTT client identifier.
    pub client_id: String,
    /// Prefix for state topics (`{base_topic}/{device_id}/state`).
    pub base_topic: String,
    /// Prefix for Home Assistant discovery topics.
    pub discovery_prefix: String,
    /// Keep-alive interval in seconds (§4.5: 60s).
    pub keep_alive_secs: u16,
    /// Deadline for the initial broker connection, in seconds (§5: 15s).
    pub connect_timeout_secs: u64,
    /// Deadline for a single publish, in seconds (§5: 5s).
    pub publish_timeout_secs: u64,
    /// QoS level for state and discovery publishes (§4.5: 1).
    pub qos: u8,
    /// Retain flag for state and discovery publishes (§4.5: true).
    pub retain: bool,
    /// Whether state and discovery payloads include the aux
    /// count/min/max/avg statistics sensors (§4.5 "if statistics enabled").
    pub include_statistics: bool,
    /// Whether to connect over TLS.
    pub tls: bool,
    /// Best-effort publish of empty discovery payloads on shutdown, to
    /// remove entities from Home Assistant (§4.5, §9 open question (c)).
    /// Off by default to avoid churn across routine restarts.
    pub cleanup_discovery_on_shutdown: bool,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_owned(),
            broker_port: 1883,
            username: None,
            password: None,
            client_id: "mijiableht-daemon".to_owned(),
            base_topic: "mijiableht".to_owned(),
            discovery_prefix: "homeassistant".to_owned(),
            keep_alive_secs: 60,
            connect_timeout_secs: 15,
            publish_timeout_secs: 5,
            qos: 1,
            retain: true,
            include_statistics: true,
            tls: false,
            cleanup_discovery_on_shutdown: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_have_sensible_defaults() {
        let config = MqttConfig::default();
        assert_eq!(config.broker_host, "localhost");
        assert_eq!(config.broker_port, 1883);
        assert_eq!(config.client_id, "mijiableht-daemon");
        assert_eq!(config.base_topic, "mijiableht");
        assert_eq!(config.discovery_prefix, "homeassistant");
        assert_eq!(config.keep_alive_secs, 60);
        assert_eq!(config.qos, 1);
        assert!(config.retain);
        assert!(config.include_statistics);
        assert!(!config.tls);
        assert!(!config.cleanup_discovery_on_shutdown);
    }

    #[test]
    fn should_deserialize_from_toml() {
        let toml = r#"
            broker_host = "mqtt.example.com"
            broker_port = 8883
            username = "sensor-bridge"
            password = "hunter2"
            client_id = "my-daemon"
            base_topic = "home/sensors"
            discovery_prefix = "ha"
            keep_alive_secs = 30
            qos = 1
            retain = true
        "#;
        let config: MqttConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.broker_host, "mqtt.example.com");
        assert_eq!(config.broker_port, 8883);
        assert_eq!(config.username.as_deref(), Some("sensor-bridge"));
        assert_eq!(config.password.as_deref(), Some("hunter2"));
        assert_eq!(config.client_id, "my-daemon");
        assert_eq!(config.base_topic, "home/sensors");
        assert_eq!(config.discovery_prefix, "ha");
    }

    #[test]
    fn should_use_defaults_for_missing_fields() {
        let config: MqttConfig = toml::from_str(r#"broker_host = "192.168.1.100""#).unwrap();
        assert_eq!(config.broker_host, "192.168.1.100");
        assert_eq!(config.broker_port, 1883);
        assert_eq!(config.client_id, "mijiableht-daemon");
        assert!(config.username.is_none());
    }
}
