//! BLE scanner error types (§4.3 Failure modes).

/// Errors surfaced by the scanner's `start()`/scan-loop operations.
#[derive(Debug, thiserror::Error)]
pub enum ScannerError {
    /// No adapter exists at the configured index.
    #[error("no BLE adapter available at index {0}")]
    AdapterUnavailable(usize),

    /// The host denied access to the Bluetooth adapter.
    #[error("permission denied accessing BLE adapter")]
    PermissionDenied,

    /// The adapter is already in use by another process/scan.
    #[error("BLE adapter busy")]
    AdapterBusy,

    /// A transient error (D-Bus reset, broken-pipe write, …) — triggers
    /// `Reconnecting`, not a fatal exit.
    #[error("transient BLE adapter error")]
    Transient(#[source] btleplug::Error),

    /// The adapter does not exist or scanning can never succeed — bubbles
    /// up as fatal.
    #[error("fatal BLE adapter error: {0}")]
    Fatal(String),
}

impl ScannerError {
    /// Whether this error should end the scanner's `Reconnecting` loop and
    /// transition it to `Failed` (§4.3 state machine).
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AdapterUnavailable(_) | Self::PermissionDenied | Self::Fatal(_))
    }
}

impl From<btleplug::Error> for ScannerError {
    fn from(err: btleplug::Error) -> Self {
        match err {
            btleplug::Error::DeviceNotFound => Self::Fatal(err.to_string()),
            btleplug::Error::PermissionDenied => Self::PermissionDenied,
            btleplug::Error::RuntimeError(ref msg) if is_busy_message(msg) => Self::AdapterBusy,
            other => Self::Transient(other),
        }
    }
}

/// BlueZ reports an adapter already owned by another scan (or mid-discovery)
/// as a D-Bus `org.bluez.Error.InProgress`/"Busy" message wrapped in
/// `btleplug::Error::RuntimeError`, not as a distinct variant.
fn is_busy_message(msg: &str) -> bool {
    let msg = msg.to_ascii_lowercase();
    msg.contains("busy") || msg.contains("inprogress") || msg.contains("in progress")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_adapter_unavailable() {
        let err = ScannerError::AdapterUnavailable(1);
        assert_eq!(err.to_string(), "no BLE adapter available at index 1");
    }

    #[test]
    fn should_treat_permission_denied_as_fatal() {
        assert!(ScannerError::PermissionDenied.is_fatal());
    }

    #[test]
    fn should_treat_adapter_busy_as_non_fatal() {
        assert!(!ScannerError::AdapterBusy.is_fatal());
    }

    #[test]
    fn should_treat_transient_errors_as_non_fatal() {
        let err = ScannerError::from(btleplug::Error::RuntimeError("reset".to_owned()));
        assert!(!err.is_fatal());
    }

    #[test]
    fn should_map_device_not_found_to_fatal() {
        let err = ScannerError::from(btleplug::Error::DeviceNotFound);
        assert!(err.is_fatal());
    }

    #[test]
    fn should_map_bluez_busy_runtime_error_to_adapter_busy() {
        let err = ScannerError::from(btleplug::Error::RuntimeError("org.bluez.Error.InProgress: Busy".to_owned()));
        assert!(matches!(err, ScannerError::AdapterBusy));
    }

    #[test]
    fn should_map_unrelated_runtime_error_to_transient() {
        let err = ScannerError::from(btleplug::Error::RuntimeError("D-Bus connection reset".to_owned()));
        assert!(matches!(err, ScannerError::Transient(_)));
    }
}
