//! # mijiableht-adapter-ble
//!
//! Passive BLE scanner adapter (§4.3) — owns the host Bluetooth adapter and
//! posts every MiBeacon advertisement it observes onto the shared
//! [`EventQueue`](mijiableht_app::event_queue::EventQueue) for the cache to
//! ingest. Never pairs, never writes a GATT characteristic in steady state.
//!
//! ## Dependency rule
//!
//! Depends on `mijiableht-app` (for the event queue and backoff helper) and
//! `mijiableht-domain`; never decodes MiBeacon itself — that is
//! `mijiableht-codec`'s job, run downstream by the cache.

mod config;
mod error;
mod scanner;

pub use config::BleConfig;
pub use error::ScannerError;

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use mijiableht_app::event_queue::EventQueue;

/// Handle to the scanner's background scan task (§4.3 state machine).
///
/// `start()`/`stop()` are both idempotent; `stop()` releases the adapter by
/// aborting the task outright, mirroring how the rest of the workspace tears
/// down its background adapters.
pub struct BleScanner {
    config: BleConfig,
    queue: Arc<EventQueue>,
    handle: Option<JoinHandle<()>>,
}

impl BleScanner {
    #[must_use]
    pub fn new(config: BleConfig, queue: Arc<EventQueue>) -> Self {
        Self {
            config,
            queue,
            handle: None,
        }
    }

    /// Start the scan loop. A no-op if already running.
    ///
    /// Returns a one-shot receiver that resolves with a [`ScannerError`] only
    /// if the scan loop ever gives up for good (adapter missing, permission
    /// denied, …) — the Orchestrator races this against shutdown to decide
    /// whether to exit with the BLE fatal-error code (§6). Returns `None`
    /// when already running, since the receiver tied to the in-flight task
    /// was already handed to an earlier caller and can't be handed out
    /// twice.
    pub fn start(&mut self) -> Option<oneshot::Receiver<ScannerError>> {
        if self.is_running() {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        let config = self.config.clone();
        let queue = Arc::clone(&self.queue);
        self.handle = Some(tokio::spawn(scanner::run(config, queue, tx)));
        Some(rx)
    }

    /// Stop the scan loop and release the adapter. A no-op if not running.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::debug!("BLE scanner task aborted");
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_not_be_running_before_start() {
        let scanner = BleScanner::new(BleConfig::default(), Arc::new(EventQueue::new(16)));
        assert!(!scanner.is_running());
    }

    #[test]
    fn should_be_a_no_op_to_stop_before_starting() {
        let mut scanner = BleScanner::new(BleConfig::default(), Arc::new(EventQueue::new(16)));
        scanner.stop();
        assert!(!scanner.is_running());
    }

    #[tokio::test]
    async fn should_return_a_receiver_on_first_start() {
        let mut scanner = BleScanner::new(BleConfig::default(), Arc::new(EventQueue::new(16)));
        assert!(scanner.start().is_some());
        scanner.stop();
    }

    #[tokio::test]
    async fn should_return_none_when_already_running_instead_of_a_spurious_receiver() {
        let mut scanner = BleScanner::new(BleConfig::default(), Arc::new(EventQueue::new(16)));
        let first = scanner.start();
        assert!(first.is_some());
        assert!(scanner.start().is_none(), "a second start() while running must not hand out a dropped-on-arrival receiver");
        scanner.stop();
    }
}
