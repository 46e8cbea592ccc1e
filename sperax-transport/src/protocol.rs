//! Protocol constants for Sperax RM01 walking pad communication
//!
//! The wire format was recovered from BLE captures of the vendor app:
//!
//! ```text
//! [0xF5] [LEN] [0x00] [payload...] [CRC_lo] [CRC_hi] [0xFA]
//! ```
//!
//! `LEN` counts the whole frame, not just the payload. The CRC covers
//! header, length, reserved byte and payload (see [`crate::checksum`]).

/// Frame start marker.
pub const FRAME_HEADER: u8 = 0xF5;
/// Frame end marker.
pub const FRAME_TRAILER: u8 = 0xFA;
/// Reserved byte between length and payload. Always zero in captures.
pub const FRAME_RESERVED: u8 = 0x00;
/// Framing bytes around the payload: header, length, reserved, two
/// checksum bytes, trailer.
pub const FRAME_OVERHEAD: usize = 6;
/// Largest payload one frame can carry; the length byte counts the
/// whole frame and must fit in a u8.
pub const MAX_PAYLOAD: usize = u8::MAX as usize - FRAME_OVERHEAD;

/// Command identifiers confirmed against real hardware
pub mod cmd {
    /// Run control: `[0x15, run_flag(0|1), speed_tenths, 0x00]`.
    /// The only command family that physically moves the belt.
    pub const RUN_CONTROL: u8 = 0x15;

    /// Leading byte of every status notification and acknowledgment
    /// payload sent by the pad.
    pub const STATUS_REPORT: u8 = 0xA2;

    /// Get human-readable name for a command byte
    pub fn name(cmd: u8) -> &'static str {
        match cmd {
            RUN_CONTROL => "RUN_CONTROL",
            STATUS_REPORT => "STATUS_REPORT",
            super::probe::RUN_CONTROL => "PROBE_RUN_CONTROL",
            _ => "UNKNOWN",
        }
    }
}

/// Decoy command family
///
/// The firmware acknowledges these identifiers but they have no physical
/// effect on the belt. Kept only for compatibility probing; nothing in
/// the control path may emit them (see [`crate::command::ProbePayload`]).
pub mod probe {
    /// Inert run-control identifier, same payload shape as the real one.
    pub const RUN_CONTROL: u8 = 0x02;
}

/// Command/response timing
///
/// The pad acknowledges run-control writes within tens of milliseconds
/// when healthy; the timeouts below are generous multiples of that.
pub mod timing {
    /// How long to wait for a command acknowledgment (ms).
    pub const ACK_TIMEOUT_MS: u64 = 800;
    /// Automatic resends after an acknowledgment timeout. More than one
    /// resend masks real hardware faults.
    pub const COMMAND_RESENDS: u32 = 1;
    /// Settling window after a stop command when tearing down (ms).
    /// Closing the link immediately after a stop write can leave the
    /// belt running.
    pub const STOP_GRACE_MS: u64 = 700;
    /// Scan window for discovery by advertised name (ms).
    pub const SCAN_WINDOW_MS: u64 = 5_000;
    /// Capacity of the notification broadcast channel.
    pub const NOTIFY_CHANNEL_CAPACITY: usize = 32;
}

/// GATT layout of the pad's control service
pub mod ble {
    use uuid::Uuid;

    /// Control service advertised by the pad.
    pub const SERVICE: Uuid = Uuid::from_u128(0x0000fe00_0000_1000_8000_00805f9b34fb);
    /// Command characteristic (write).
    pub const CONTROL_CHAR: Uuid = Uuid::from_u128(0x0000fe01_0000_1000_8000_00805f9b34fb);
    /// Status characteristic (notify).
    pub const STATUS_CHAR: Uuid = Uuid::from_u128(0x0000fe02_0000_1000_8000_00805f9b34fb);

    /// Default advertised name fragment used for discovery.
    pub const DEFAULT_NAME: &str = "RM01";
}
