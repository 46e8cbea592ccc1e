//! Transport error types

use thiserror::Error;

/// Errors that can occur during transport operations
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("no Bluetooth adapter available")]
    NoAdapter,

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("characteristic {0} missing on device")]
    CharacteristicMissing(uuid::Uuid),

    #[error("notification subscription failed: {0}")]
    SubscriptionFailed(String),

    #[error("device disconnected")]
    Disconnected,

    #[error("BLE error: {0}")]
    Ble(String),
}

impl From<btleplug::Error> for TransportError {
    fn from(e: btleplug::Error) -> Self {
        TransportError::Ble(e.to_string())
    }
}
