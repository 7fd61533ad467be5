//! # mijiablehtd — mijiableht daemon
//!
//! Composition root: wires the BLE scanner, sensor cache, and MQTT
//! publisher together (§4.6) and drives the daemon until a shutdown signal
//! or a fatal error ends it.
//!
//! ## Responsibilities
//! - Load configuration from `mijiableht.toml` plus environment overrides
//! - Initialize tracing
//! - Start the MQTT publisher and wait for the initial broker connection
//! - Start the BLE scanner
//! - Pump scanner events through the cache to the publisher, and pump the
//!   cache's periodic-heartbeat timer
//! - Drain SIGINT/SIGTERM: stop the scanner, disconnect the publisher
//!   cleanly, and exit with the matching code (§6)
//!
//! ## Dependency rule
//! This is the only crate that depends on both adapter crates. It contains
//! no ingestion/publication logic of its own — only wiring.

mod config;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use mijiableht_adapter_ble::BleScanner;
use mijiableht_adapter_mqtt::{MqttPublisher, PublisherError};
use mijiableht_app::event_queue::EventQueue;
use mijiableht_app::SensorCache;
use mijiableht_domain::CompleteReading;

use config::Config;

/// Cache tick period — how often periodic heartbeats are checked for
/// independent of new advertisements arriving (§4.6, §5: 5 s).
const TICK_PERIOD: Duration = Duration::from_secs(5);

/// Bounded wait for in-flight work to settle during shutdown (§4.6: ≤ 5 s).
const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::from(2);
        }
    };

    init_tracing(&config.logging.filter);

    run(config).await
}

fn init_tracing(filter: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_new(filter).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

/// Start Publisher, wait for its initial connection, then start Scanner;
/// pump events until shutdown or a fatal error; tear down cleanly (§4.6).
async fn run(config: Config) -> ExitCode {
    let timezone = config.timezone_tz().expect("validated by Config::load");

    let mut publisher = MqttPublisher::new(config.mqtt.to_adapter_config(), timezone);
    let mut mqtt_fatal = match publisher.connect().await {
        Ok(fatal_rx) => fatal_rx,
        Err(err) => {
            tracing::error!(error = %err, "failed to connect to MQTT broker");
            return exit_code_for_mqtt_error(&err);
        }
    };

    let queue = Arc::new(EventQueue::new(config.bluetooth.channel_capacity));
    let mut scanner = BleScanner::new(config.bluetooth.clone(), Arc::clone(&queue));
    let mut ble_fatal = scanner.start().expect("scanner has not been started yet");

    let publish_interval = chrono::Duration::seconds(i64::try_from(config.mqtt.publish_interval_secs).unwrap_or(300));
    let mut cache = SensorCache::new(config.thresholds.temperature, config.thresholds.humidity, publish_interval);
    for device in &config.devices.static_devices {
        let Ok(mac) = device.mac.parse() else {
            continue;
        };
        if let Some(friendly_name) = device.friendly_name.clone() {
            cache.configure_friendly_name(mac, friendly_name);
        }
    }

    tracing::info!("mijiableht daemon started");

    let mut tick = tokio::time::interval(TICK_PERIOD);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let exit_code = loop {
        tokio::select! {
            event = queue.recv() => {
                let reading = cache.ingest(event.mac, event.rssi, &event.service_data, event.received_at);
                if let Some(reading) = reading {
                    publish_one(&publisher, reading).await;
                }
            }
            _ = tick.tick() => {
                for reading in cache.tick(mijiableht_domain::time::now()) {
                    publish_one(&publisher, reading).await;
                }
            }
            result = &mut ble_fatal => {
                if let Ok(err) = result {
                    tracing::error!(error = %err, "BLE scanner failed fatally");
                }
                break ExitCode::from(3);
            }
            result = &mut mqtt_fatal => {
                let code = match result {
                    Ok(err) => {
                        let code = exit_code_for_mqtt_error(&err);
                        tracing::error!(error = %err, "MQTT publisher failed fatally");
                        code
                    }
                    Err(_) => ExitCode::from(1),
                };
                break code;
            }
            () = shutdown_signal() => {
                tracing::info!("shutdown signal received, stopping");
                break ExitCode::SUCCESS;
            }
        }
    };

    scanner.stop();
    // Every reading is published synchronously inside the select loop, so
    // there is no outbox to drain; this only catches a heartbeat that came
    // due in the instant between the last tick and the shutdown signal.
    let _ = tokio::time::timeout(SHUTDOWN_FLUSH_TIMEOUT, async {
        for reading in cache.tick(mijiableht_domain::time::now()) {
            publish_one(&publisher, reading).await;
        }
    })
    .await;
    publisher.disconnect().await;

    exit_code
}

async fn publish_one(publisher: &MqttPublisher, reading: CompleteReading) {
    if let Err(err) = publisher.publish(&reading).await {
        tracing::warn!(mac = %reading.mac, error = %err, "failed to publish reading");
    }
}

fn exit_code_for_mqtt_error(err: &PublisherError) -> ExitCode {
    if err.is_fatal() {
        ExitCode::from(4)
    } else {
        ExitCode::from(1)
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
