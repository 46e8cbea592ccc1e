//! Session error types

use sperax_transport::{SpeedRangeError, TransportError};
use thiserror::Error;

/// Errors surfaced while opening a session.
///
/// Never auto-retried here; retry and backoff policy belongs to the
/// caller.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("notification subscription failed: {0}")]
    SubscriptionFailed(String),

    #[error("transport error: {0}")]
    Transport(TransportError),
}

impl From<TransportError> for ConnectError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::DeviceNotFound(name) => ConnectError::DeviceNotFound(name),
            TransportError::SubscriptionFailed(msg) => ConnectError::SubscriptionFailed(msg),
            other => ConnectError::Transport(other),
        }
    }
}

/// Errors surfaced by control commands.
///
/// A failed command never reports false success: state is unchanged
/// except where a variant says otherwise (timeouts fault the session,
/// connection loss disconnects it).
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("invalid speed: {0} tenths of km/h (valid 5-60)")]
    InvalidSpeed(u8),

    #[error("command not acknowledged in time")]
    CommandTimeout,

    #[error("connection lost")]
    ConnectionLost,

    #[error("cancelled by teardown")]
    Cancelled,

    #[error("belt is not running")]
    NotRunning,

    #[error("session is not ready")]
    NotReady,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl From<SpeedRangeError> for CommandError {
    fn from(e: SpeedRangeError) -> Self {
        CommandError::InvalidSpeed(e.0)
    }
}
