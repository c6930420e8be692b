//! MQTT adapter error types.

use std::time::Duration;

use smartish_domain::error::SmartishError;

/// Errors specific to the MQTT adapter.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// The rumqttc client returned an error.
    #[error("MQTT client error")]
    Client(#[source] rumqttc::ClientError),

    /// The event loop failed before the broker acknowledged the connection.
    #[error("MQTT connection failed")]
    Connection(#[source] rumqttc::ConnectionError),

    /// The broker did not acknowledge the connection in time.
    #[error("MQTT connection timed out after {0:?}")]
    Timeout(Duration),
}

impl MqttError {
    /// Convert into a [`SmartishError::Bus`] for propagation across port
    /// boundaries.
    pub fn into_domain(self) -> SmartishError {
        SmartishError::Bus(Box::new(self))
    }
}

impl From<MqttError> for SmartishError {
    fn from(err: MqttError) -> Self {
        err.into_domain()
    }
}
