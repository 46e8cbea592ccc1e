//! Session state machine states

use std::fmt;

/// Connection and run state of one physical pad session.
///
/// Owned exclusively by the session; mutated only through its
/// transition path, never externally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Ready,
    /// Belt moving at the acknowledged speed, tenths of km/h.
    Running(u8),
    /// Stop sent; waiting for the device to settle before the session
    /// becomes Ready (or the transport may be released).
    Stopping,
    /// A command timed out or the protocol was violated. Only teardown
    /// leaves this state.
    Faulted,
}

impl SessionState {
    pub fn is_running(&self) -> bool {
        matches!(self, SessionState::Running(_))
    }

    /// Acknowledged speed while running, tenths of km/h.
    pub fn speed_tenths(&self) -> Option<u8> {
        match self {
            SessionState::Running(speed) => Some(*speed),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => f.write_str("disconnected"),
            SessionState::Ready => f.write_str("ready"),
            SessionState::Running(speed) => {
                write!(f, "running at {}.{} km/h", speed / 10, speed % 10)
            }
            SessionState::Stopping => f.write_str("stopping"),
            SessionState::Faulted => f.write_str("faulted"),
        }
    }
}
