//! Status notification decoding
//!
//! The pad pushes a fixed-size status payload on the notify
//! characteristic. Only two offsets are established: the status byte
//! and the current speed. Everything after them is preserved verbatim
//! as opaque bytes so nothing is lost when the remaining offsets get
//! reverse-engineered later.

use thiserror::Error;

/// Fixed length of a status notification payload.
pub const TELEMETRY_LEN: usize = 8;

/// Offset of the connection/belt status byte (byte 0 is the status
/// identifier, see [`crate::protocol::cmd::STATUS_REPORT`]).
const STATUS_OFFSET: usize = 1;
/// Offset of the current speed byte, tenths of km/h.
const SPEED_OFFSET: usize = 2;
/// First reserved byte.
const RESERVED_OFFSET: usize = 3;

/// Trailing bytes with unknown meaning.
pub const RESERVED_LEN: usize = TELEMETRY_LEN - RESERVED_OFFSET;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("unexpected telemetry payload length: {0} bytes")]
    UnexpectedLength(usize),
}

/// Decoded status snapshot. Replaced wholesale on every notification;
/// never merged field by field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    /// Status byte as reported by the device.
    pub status: u8,
    /// Current belt speed in tenths of km/h.
    pub speed_tenths: u8,
    /// Not yet reverse-engineered; preserved verbatim.
    pub reserved: [u8; RESERVED_LEN],
}

impl TelemetrySnapshot {
    /// Decode a status payload.
    ///
    /// The only failure is a wrong payload size. Correctly-sized content
    /// never fails, however unfamiliar: unknown bytes are carried, not
    /// rejected.
    pub fn decode(payload: &[u8]) -> Result<Self, TelemetryError> {
        if payload.len() != TELEMETRY_LEN {
            return Err(TelemetryError::UnexpectedLength(payload.len()));
        }
        let mut reserved = [0u8; RESERVED_LEN];
        reserved.copy_from_slice(&payload[RESERVED_OFFSET..]);
        Ok(Self {
            status: payload[STATUS_OFFSET],
            speed_tenths: payload[SPEED_OFFSET],
            reserved,
        })
    }

    /// Current speed in km/h.
    pub fn speed_kmh(&self) -> f64 {
        f64::from(self.speed_tenths) / 10.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_offsets_and_keeps_the_rest() {
        let payload = [0xA2, 0x01, 0x14, 0xDE, 0xAD, 0xBE, 0xEF, 0x7F];
        let snap = TelemetrySnapshot::decode(&payload).unwrap();
        assert_eq!(snap.status, 0x01);
        assert_eq!(snap.speed_tenths, 0x14);
        assert_eq!(snap.reserved, [0xDE, 0xAD, 0xBE, 0xEF, 0x7F]);
        assert_eq!(snap.speed_kmh(), 2.0);
    }

    #[test]
    fn wrong_size_is_the_only_failure() {
        assert_eq!(
            TelemetrySnapshot::decode(&[0xA2, 0x01, 0x14]),
            Err(TelemetryError::UnexpectedLength(3))
        );
        assert_eq!(
            TelemetrySnapshot::decode(&[0u8; 9]),
            Err(TelemetryError::UnexpectedLength(9))
        );
        // unfamiliar but correctly sized content decodes
        assert!(TelemetrySnapshot::decode(&[0xFF; TELEMETRY_LEN]).is_ok());
    }
}
