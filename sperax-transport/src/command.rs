//! Typed run-control command builders
//!
//! The pad exposes two semantically similar command families. Only the
//! `0x15` family moves the belt; the `0x02` family is acknowledged by
//! the firmware and then silently ignored, so code built on it "works"
//! while doing nothing. The two families are therefore disjoint types:
//! [`ControlPayload`] can only be produced by the builders here, and
//! [`ProbePayload`] has no route into any send path that drives the
//! belt.

use std::fmt;

use crate::frame::Frame;
use crate::protocol::{cmd, probe};

/// Minimum accepted speed, tenths of km/h (0.5 km/h).
pub const MIN_SPEED_TENTHS: u8 = 5;
/// Maximum accepted speed, tenths of km/h (6.0 km/h).
pub const MAX_SPEED_TENTHS: u8 = 60;

/// Run-control payloads are always four bytes:
/// `[identifier, run_flag, speed_tenths, 0x00]`.
const RUN_CONTROL_LEN: usize = 4;

/// Minimum acknowledgment payload length: status identifier, command
/// echo, run-flag echo.
pub const ACK_MIN_LEN: usize = 3;

/// Requested speed outside the 0.5–6.0 km/h range the firmware accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedRangeError(pub u8);

impl fmt::Display for SpeedRangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "speed {}.{} km/h out of range (0.5-6.0)",
            self.0 / 10,
            self.0 % 10
        )
    }
}

impl std::error::Error for SpeedRangeError {}

/// Payload of an Active-family command. Only the builders in this
/// module construct one, so every value that reaches the transport is a
/// command the hardware actually honors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPayload {
    bytes: [u8; RUN_CONTROL_LEN],
}

impl ControlPayload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Wrap the payload in a wire frame.
    pub fn to_frame(&self) -> Frame {
        // A four-byte payload always fits one frame.
        Frame::encode(&self.bytes).expect("run-control payload fits one frame")
    }
}

/// Decoy-family payload, for diagnostic probing only. Deliberately not
/// accepted by the session send path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbePayload {
    bytes: [u8; RUN_CONTROL_LEN],
}

impl ProbePayload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// A validated run-control command: start, stop, or speed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunControl {
    run_flag: u8,
    speed_tenths: u8,
}

impl RunControl {
    /// Start the belt at `speed_tenths` (tenths of km/h, 5–60).
    pub fn start(speed_tenths: u8) -> Result<Self, SpeedRangeError> {
        check_speed(speed_tenths)?;
        Ok(Self {
            run_flag: 1,
            speed_tenths,
        })
    }

    /// Change speed while running. Identical wire shape to [`start`]:
    /// the device has no separate adjust-speed identifier, re-issuing
    /// the run command is the speed change.
    ///
    /// [`start`]: RunControl::start
    pub fn set_speed(speed_tenths: u8) -> Result<Self, SpeedRangeError> {
        Self::start(speed_tenths)
    }

    /// Stop the belt.
    pub fn stop() -> Self {
        Self {
            run_flag: 0,
            speed_tenths: 0,
        }
    }

    pub fn is_stop(&self) -> bool {
        self.run_flag == 0
    }

    pub fn speed_tenths(&self) -> u8 {
        self.speed_tenths
    }

    /// Build the Active-family payload for this command.
    pub fn payload(&self) -> ControlPayload {
        ControlPayload {
            bytes: [cmd::RUN_CONTROL, self.run_flag, self.speed_tenths, 0x00],
        }
    }

    /// True when `payload` is the status notification acknowledging this
    /// command: `[STATUS_REPORT, echoed identifier, echoed run flag, ..]`.
    /// The protocol has no request IDs; ordering plus this echo is the
    /// only correlation mechanism.
    pub fn matches_ack(&self, payload: &[u8]) -> bool {
        payload.len() >= ACK_MIN_LEN
            && payload[0] == cmd::STATUS_REPORT
            && payload[1] == cmd::RUN_CONTROL
            && payload[2] == self.run_flag
    }
}

/// Build a decoy-family run-control probe.
///
/// The result is acknowledged by the firmware but never moves the belt.
/// Useful only to check whether a unit still carries the legacy handler.
pub fn probe_run_control(run: bool, speed_tenths: u8) -> ProbePayload {
    ProbePayload {
        bytes: [probe::RUN_CONTROL, run as u8, speed_tenths, 0x00],
    }
}

fn check_speed(speed_tenths: u8) -> Result<(), SpeedRangeError> {
    if (MIN_SPEED_TENTHS..=MAX_SPEED_TENTHS).contains(&speed_tenths) {
        Ok(())
    } else {
        Err(SpeedRangeError(speed_tenths))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_payload_bytes() {
        // 2.0 km/h
        let cmd = RunControl::start(20).unwrap();
        assert_eq!(cmd.payload().as_bytes(), &[0x15, 0x01, 0x14, 0x00]);
    }

    #[test]
    fn stop_payload_bytes() {
        assert_eq!(
            RunControl::stop().payload().as_bytes(),
            &[0x15, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn set_speed_shares_the_start_shape() {
        let start = RunControl::start(35).unwrap();
        let pace = RunControl::set_speed(35).unwrap();
        assert_eq!(start.payload(), pace.payload());
    }

    #[test]
    fn speed_bounds() {
        assert_eq!(RunControl::start(3), Err(SpeedRangeError(3)));
        assert_eq!(RunControl::start(4), Err(SpeedRangeError(4)));
        assert_eq!(RunControl::start(61), Err(SpeedRangeError(61)));
        assert!(RunControl::start(5).is_ok());
        assert!(RunControl::start(60).is_ok());
    }

    #[test]
    fn start_frame_checksum_is_deterministic() {
        let frame = RunControl::start(20).unwrap().payload().to_frame();
        let again = RunControl::start(20).unwrap().payload().to_frame();
        assert_eq!(frame, again);
        // header, total length 10, reserved, payload, crc, trailer
        let bytes = frame.as_bytes();
        assert_eq!(bytes[0], 0xF5);
        assert_eq!(bytes[1], 0x0A);
        assert_eq!(bytes[9], 0xFA);
    }

    #[test]
    fn ack_matching_echoes_identifier_and_flag() {
        let start = RunControl::start(20).unwrap();
        assert!(start.matches_ack(&[0xA2, 0x15, 0x01]));
        assert!(start.matches_ack(&[0xA2, 0x15, 0x01, 0x00]));
        // stop echo does not acknowledge a start
        assert!(!start.matches_ack(&[0xA2, 0x15, 0x00]));
        // wrong leading identifier
        assert!(!start.matches_ack(&[0x15, 0x15, 0x01]));
        assert!(!start.matches_ack(&[0xA2, 0x15]));

        let stop = RunControl::stop();
        assert!(stop.matches_ack(&[0xA2, 0x15, 0x00]));
        assert!(!stop.matches_ack(&[0xA2, 0x15, 0x01]));
    }

    #[test]
    fn probe_family_uses_the_decoy_identifier() {
        let probe = probe_run_control(true, 20);
        assert_eq!(probe.as_bytes(), &[0x02, 0x01, 0x14, 0x00]);
        // and never the live identifier
        assert_ne!(probe.as_bytes()[0], 0x15);
    }
}
