//! # mijiableht-adapter-mqtt
//!
//! MQTT publisher adapter (§4.5) — owns the broker connection, announces
//! each device to Home Assistant via MQTT discovery exactly once per run,
//! and republishes every [`CompleteReading`] the cache emits as a retained
//! state message.
//!
//! ## Topic conventions
//!
//! | Topic pattern | Purpose |
//! |---|---|
//! | `{base_topic}/{device_id}/state` | Retained JSON state for one device |
//! | `{discovery_prefix}/sensor/mijiableht_{device_id}_{sensor}/config` | Home Assistant discovery, one per sensor |
//! | `{base_topic}/status` | Birth/LWT availability (`online`/`offline`) |
//!
//! ## Dependency rule
//!
//! Depends on `mijiableht-app` (for the backoff helper) and
//! `mijiableht-domain`; never decides *whether* to publish — that is the
//! cache's job. This adapter only encodes and ships what it is handed.

mod config;
mod error;

pub use config::MqttConfig;
pub use error::PublisherError;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::SecondsFormat;
use chrono_tz::Tz;
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Packet, QoS};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use mijiableht_app::backoff::Backoff;
use mijiableht_domain::mac::MacAddress;
use mijiableht_domain::{CompleteReading, StatsSnapshot};

use crate::error::classify_connection_error;

/// Owns the broker connection and every outbound publish (§4.5).
///
/// `connect()`/`disconnect()` mirror the scanner's lifecycle: a background
/// task drives the `EventLoop` until aborted, reconnecting with the same
/// backoff policy used for the BLE adapter.
pub struct MqttPublisher {
    config: MqttConfig,
    timezone: Tz,
    client: Option<AsyncClient>,
    eventloop_handle: Option<JoinHandle<()>>,
    discovered: Arc<Mutex<HashSet<MacAddress>>>,
    connected: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

impl MqttPublisher {
    #[must_use]
    pub fn new(config: MqttConfig, timezone: Tz) -> Self {
        Self {
            config,
            timezone,
            client: None,
            eventloop_handle: None,
            discovered: Arc::new(Mutex::new(HashSet::new())),
            connected: Arc::new(AtomicBool::new(false)),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of `CompleteReading`s dropped while disconnected (§4.5:
    /// "dropped with a counter increment").
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn mqtt_options(&self) -> MqttOptions {
        let mut opts = MqttOptions::new(&self.config.client_id, &self.config.broker_host, self.config.broker_port);
        opts.set_keep_alive(Duration::from_secs(u64::from(self.config.keep_alive_secs)));
        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            opts.set_credentials(username, password);
        }
        opts.set_last_will(LastWill::new(availability_topic(&self.config.base_topic), "offline", QoS::AtLeastOnce, true));
        if self.config.tls {
            opts.set_transport(rumqttc::Transport::tls_with_default_config());
        }
        opts
    }

    /// Connect to the broker and wait, up to `mqtt.connect_timeout_secs`
    /// (§5: 15 s), for the first `ConnAck`.
    ///
    /// On success returns a receiver that resolves with a [`PublisherError`]
    /// only if the connection later fails fatally (bad credentials) — the
    /// Orchestrator races this to decide on the MQTT fatal exit code (§6).
    pub async fn connect(&mut self) -> Result<oneshot::Receiver<PublisherError>, PublisherError> {
        let opts = self.mqtt_options();
        let (client, eventloop) = AsyncClient::new(opts, 64);
        self.client = Some(client.clone());
        self.connected.store(false, Ordering::SeqCst);

        let (ready_tx, ready_rx) = oneshot::channel();
        let (fatal_tx, fatal_rx) = oneshot::channel();
        let connected = Arc::clone(&self.connected);
        let availability = availability_topic(&self.config.base_topic);

        let handle = tokio::spawn(drive_eventloop(eventloop, client, connected, availability, ready_tx, fatal_tx));
        self.eventloop_handle = Some(handle);

        let deadline = Duration::from_secs(self.config.connect_timeout_secs);
        match tokio::time::timeout(deadline, ready_rx).await {
            Ok(Ok(Ok(()))) => {
                tracing::info!(broker = %self.config.broker_host, "MQTT publisher connected");
                Ok(fatal_rx)
            }
            Ok(Ok(Err(err))) => Err(err),
            Ok(Err(_)) => Err(PublisherError::NotConnected),
            Err(_) => Err(PublisherError::ConnectTimeout),
        }
    }

    /// Publish a `CompleteReading` (§4.4/§4.5): discovery once per mac, then
    /// retained state. While disconnected, drops the reading and increments
    /// [`MqttPublisher::dropped_count`] instead of erroring — the next
    /// emission for this mac will carry the same information forward.
    pub async fn publish(&self, reading: &CompleteReading) -> Result<(), PublisherError> {
        let client = self.client.as_ref().ok_or(PublisherError::NotConnected)?;
        if !self.is_connected() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(mac = %reading.mac, "dropping reading, MQTT disconnected");
            return Ok(());
        }

        let device_id = reading.mac.device_id();
        let qos = qos_from(self.config.qos);

        let is_first_for_mac = {
            let mut discovered = self.discovered.lock().unwrap_or_else(PoisonError::into_inner);
            discovered.insert(reading.mac)
        };
        if is_first_for_mac {
            self.publish_discovery(client, &device_id, reading, qos).await?;
        }

        let topic = state_topic(&self.config.base_topic, &device_id);
        let payload = state_payload(reading, self.timezone, self.config.include_statistics).to_string();
        self.publish_with_timeout(client, &topic, qos, self.config.retain, payload).await
    }

    async fn publish_discovery(&self, client: &AsyncClient, device_id: &str, reading: &CompleteReading, qos: QoS) -> Result<(), PublisherError> {
        for sensor in sensor_kinds(self.config.include_statistics) {
            let topic = discovery_topic(&self.config.discovery_prefix, device_id, sensor);
            let payload = discovery_payload(&self.config, reading, device_id, sensor).to_string();
            self.publish_with_timeout(client, &topic, qos, true, payload).await?;
        }
        tracing::info!(mac = %reading.mac, "published Home Assistant discovery");
        Ok(())
    }

    async fn publish_with_timeout(&self, client: &AsyncClient, topic: &str, qos: QoS, retain: bool, payload: String) -> Result<(), PublisherError> {
        let deadline = Duration::from_secs(self.config.publish_timeout_secs);
        for attempt in 0..2 {
            match tokio::time::timeout(deadline, client.publish(topic, qos, retain, payload.clone())).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(err)) => return Err(PublisherError::Client(err)),
                Err(_) if attempt == 0 => {
                    tracing::warn!(topic, "MQTT publish timed out, retrying once");
                }
                Err(_) => return Err(PublisherError::PublishTimeout),
            }
        }
        unreachable!("loop either returns or falls through to the final Err arm")
    }

    /// Stop the eventloop and release the broker connection. If
    /// `mqtt.cleanup_discovery_on_shutdown` is set, best-effort publish
    /// empty payloads to every discovery topic seen this run first (§4.5).
    pub async fn disconnect(&mut self) {
        if self.config.cleanup_discovery_on_shutdown {
            self.cleanup_discovery().await;
        }
        if let Some(client) = self.client.take() {
            let _ = client.disconnect().await;
        }
        if let Some(handle) = self.eventloop_handle.take() {
            handle.abort();
        }
        self.connected.store(false, Ordering::SeqCst);
        tracing::info!("MQTT publisher disconnected");
    }

    async fn cleanup_discovery(&self) {
        let Some(client) = self.client.as_ref() else {
            return;
        };
        let macs: Vec<MacAddress> = {
            let discovered = self.discovered.lock().unwrap_or_else(PoisonError::into_inner);
            discovered.iter().copied().collect()
        };
        for mac in macs {
            let device_id = mac.device_id();
            for sensor in sensor_kinds(self.config.include_statistics) {
                let topic = discovery_topic(&self.config.discovery_prefix, &device_id, sensor);
                let _ = client.publish(topic, QoS::AtLeastOnce, true, Vec::<u8>::new()).await;
            }
        }
    }
}

/// Drives the `EventLoop` until aborted from outside, or until a fatal
/// error ends it voluntarily. Mirrors the BLE scanner's run loop: a single
/// [`Backoff`] spans the whole task, reset on every successful `ConnAck`.
async fn drive_eventloop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    availability_topic: String,
    ready_tx: oneshot::Sender<Result<(), PublisherError>>,
    fatal_tx: oneshot::Sender<PublisherError>,
) {
    let mut backoff = Backoff::default();
    let mut ready_tx = Some(ready_tx);

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                connected.store(true, Ordering::SeqCst);
                backoff.reset();
                tracing::info!("MQTT broker connection acknowledged");

                let client = client.clone();
                let topic = availability_topic.clone();
                tokio::spawn(async move {
                    let _ = client.publish(topic, QoS::AtLeastOnce, true, "online").await;
                });

                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(Ok(()));
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                connected.store(false, Ordering::SeqCst);
                tracing::warn!("MQTT broker sent disconnect");
            }
            Ok(_) => {}
            Err(err) => {
                connected.store(false, Ordering::SeqCst);
                let classified = classify_connection_error(err);
                if classified.is_fatal() {
                    tracing::error!(error = %classified, "MQTT publisher failed fatally");
                    if let Some(tx) = ready_tx.take() {
                        let _ = tx.send(Err(PublisherError::AuthFailed));
                    }
                    let _ = fatal_tx.send(classified);
                    return;
                }

                let delay = backoff.next_delay();
                tracing::warn!(error = %classified, delay_ms = delay.as_millis() as u64, "MQTT connection error, reconnecting");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

fn qos_from(value: u8) -> QoS {
    match value {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

fn availability_topic(base_topic: &str) -> String {
    format!("{base_topic}/status")
}

fn state_topic(base_topic: &str, device_id: &str) -> String {
    format!("{base_topic}/{device_id}/state")
}

fn discovery_topic(discovery_prefix: &str, device_id: &str, sensor: SensorKind) -> String {
    format!("{discovery_prefix}/sensor/mijiableht_{device_id}_{}/config", sensor.key())
}

/// One Home Assistant sensor entity published under a device (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SensorKind {
    Temperature,
    Humidity,
    Battery,
    TemperatureMin,
    TemperatureMax,
    TemperatureAvg,
    TemperatureCount,
    HumidityMin,
    HumidityMax,
    HumidityAvg,
    HumidityCount,
}

impl SensorKind {
    fn key(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Battery => "battery",
            Self::TemperatureMin => "temperature_min",
            Self::TemperatureMax => "temperature_max",
            Self::TemperatureAvg => "temperature_avg",
            Self::TemperatureCount => "temperature_count",
            Self::HumidityMin => "humidity_min",
            Self::HumidityMax => "humidity_max",
            Self::HumidityAvg => "humidity_avg",
            Self::HumidityCount => "humidity_count",
        }
    }

    fn display_name(self) -> &'static str {
        match self {
            Self::Temperature => "Temperature",
            Self::Humidity => "Humidity",
            Self::Battery => "Battery",
            Self::TemperatureMin => "Temperature Min",
            Self::TemperatureMax => "Temperature Max",
            Self::TemperatureAvg => "Temperature Avg",
            Self::TemperatureCount => "Temperature Sample Count",
            Self::HumidityMin => "Humidity Min",
            Self::HumidityMax => "Humidity Max",
            Self::HumidityAvg => "Humidity Avg",
            Self::HumidityCount => "Humidity Sample Count",
        }
    }

    /// `None` for the count/min/max/avg auxiliary sensors (§4.5).
    fn device_class(self) -> Option<&'static str> {
        match self {
            Self::Temperature | Self::TemperatureMin | Self::TemperatureMax | Self::TemperatureAvg => Some("temperature"),
            Self::Humidity | Self::HumidityMin | Self::HumidityMax | Self::HumidityAvg => Some("humidity"),
            Self::Battery => Some("battery"),
            Self::TemperatureCount | Self::HumidityCount => None,
        }
    }

    fn unit(self) -> Option<&'static str> {
        match self {
            Self::Temperature | Self::TemperatureMin | Self::TemperatureMax | Self::TemperatureAvg => Some("°C"),
            Self::Humidity | Self::HumidityMin | Self::HumidityMax | Self::HumidityAvg | Self::Battery => Some("%"),
            Self::TemperatureCount | Self::HumidityCount => None,
        }
    }

    fn state_class(self) -> Option<&'static str> {
        match self {
            Self::Temperature | Self::Humidity | Self::Battery => Some("measurement"),
            _ => None,
        }
    }

    fn core() -> [Self; 3] {
        [Self::Temperature, Self::Humidity, Self::Battery]
    }

    fn auxiliary() -> [Self; 8] {
        [
            Self::TemperatureMin,
            Self::TemperatureMax,
            Self::TemperatureAvg,
            Self::TemperatureCount,
            Self::HumidityMin,
            Self::HumidityMax,
            Self::HumidityAvg,
            Self::HumidityCount,
        ]
    }
}

fn sensor_kinds(include_statistics: bool) -> Vec<SensorKind> {
    let mut kinds = SensorKind::core().to_vec();
    if include_statistics {
        kinds.extend(SensorKind::auxiliary());
    }
    kinds
}

fn discovery_payload(config: &MqttConfig, reading: &CompleteReading, device_id: &str, sensor: SensorKind) -> serde_json::Value {
    let device_name = reading.friendly_name.clone().unwrap_or_else(|| device_id.to_owned());
    let mut payload = serde_json::json!({
        "name": sensor.display_name(),
        "unique_id": format!("mijiableht_{device_id}_{}", sensor.key()),
        "state_topic": state_topic(&config.base_topic, device_id),
        "availability_topic": availability_topic(&config.base_topic),
        "value_template": format!("{{{{ value_json.{} }}}}", sensor.key()),
        "expire_after": 900,
        "device": {
            "identifiers": [device_id],
            "name": device_name,
            "model": reading.device_model.as_str(),
            "manufacturer": "Xiaomi",
        },
    });
    if let Some(unit) = sensor.unit() {
        payload["unit_of_measurement"] = serde_json::json!(unit);
    }
    if let Some(device_class) = sensor.device_class() {
        payload["device_class"] = serde_json::json!(device_class);
    }
    if let Some(state_class) = sensor.state_class() {
        payload["state_class"] = serde_json::json!(state_class);
    }
    payload
}

fn state_payload(reading: &CompleteReading, timezone: Tz, include_statistics: bool) -> serde_json::Value {
    let mut payload = serde_json::json!({
        "temperature": round2(reading.temperature),
        "humidity": round2(reading.humidity),
        "battery": reading.battery,
        "last_seen": reading.last_seen.with_timezone(&timezone).to_rfc3339_opts(SecondsFormat::Millis, true),
        "signal": reading.signal.as_str(),
        "message_type": reading.message_type.as_str(),
    });
    if let Some(voltage_mv) = reading.voltage_mv {
        payload["voltage"] = serde_json::json!(round2(f64::from(voltage_mv) / 1000.0));
    }
    if let Some(rssi) = reading.rssi {
        payload["rssi"] = serde_json::json!(rssi);
    }
    if let Some(name) = &reading.friendly_name {
        payload["friendly_name"] = serde_json::json!(name);
    }
    if include_statistics {
        insert_stats(&mut payload, "temperature", reading.temperature_stats);
        insert_stats(&mut payload, "humidity", reading.humidity_stats);
        insert_stats(&mut payload, "battery", reading.battery_stats);
        insert_stats(&mut payload, "rssi", reading.rssi_stats);
    }
    payload
}

fn insert_stats(payload: &mut serde_json::Value, prefix: &str, stats: StatsSnapshot) {
    payload[format!("{prefix}_count")] = serde_json::json!(stats.count);
    if let Some(min) = stats.min {
        payload[format!("{prefix}_min")] = serde_json::json!(round2(min));
    }
    if let Some(max) = stats.max {
        payload[format!("{prefix}_max")] = serde_json::json!(round2(max));
    }
    if let Some(avg) = stats.avg {
        payload[format!("{prefix}_avg")] = serde_json::json!(round2(avg));
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
