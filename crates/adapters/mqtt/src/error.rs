//! MQTT publisher error types (§4.5, §7 failure modes).

/// Errors surfaced by the publisher's connect/publish operations.
#[derive(Debug, thiserror::Error)]
pub enum PublisherError {
    /// The broker could not be reached; the eventloop retries with backoff.
    #[error("MQTT broker unreachable")]
    BrokerUnreachable(#[source] rumqttc::ConnectionError),

    /// A publish did not complete within its deadline; retried once.
    #[error("MQTT publish timed out")]
    PublishTimeout,

    /// No `ConnAck` arrived within `mqtt.connect_timeout_secs` (§5: 15 s).
    #[error("MQTT connect timed out")]
    ConnectTimeout,

    /// The broker rejected our credentials. Fatal; surfaced to the
    /// Orchestrator as exit code 4.
    #[error("MQTT authentication failed")]
    AuthFailed,

    /// `publish` was called before the client connected at least once.
    #[error("MQTT client not connected")]
    NotConnected,

    /// The rumqttc client rejected the publish call itself.
    #[error("MQTT client error")]
    Client(#[source] rumqttc::ClientError),
}

impl PublisherError {
    /// Whether this error should end reconnect attempts and surface to the
    /// Orchestrator instead of retrying (§7 "Fatal").
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthFailed)
    }
}

/// Inspects a [`rumqttc::ConnectionError`] from the eventloop and classifies
/// it as fatal (bad credentials) or transient (everything else).
pub(crate) fn classify_connection_error(err: rumqttc::ConnectionError) -> PublisherError {
    if let rumqttc::ConnectionError::ConnectionRefused(code) = &err {
        if matches!(
            code,
            rumqttc::ConnectReturnCode::BadUserNamePassword | rumqttc::ConnectReturnCode::NotAuthorized
        ) {
            return PublisherError::AuthFailed;
        }
    }
    PublisherError::BrokerUnreachable(err)
}
