//! Transport and protocol layer for the Sperax RM01 walking pad
//!
//! The RM01 speaks a small proprietary protocol over BLE GATT,
//! reverse-engineered from captures of the vendor app. This crate owns
//! everything below the session state machine:
//!
//! - frame codec with the device's CRC-16 variant
//! - typed run-control command builders (with the decoy command family
//!   structurally fenced off)
//! - status notification decoding
//! - the [`Transport`] trait plus a btleplug backend and an in-memory
//!   mock for tests

pub mod checksum;
pub mod command;
pub mod error;
pub mod frame;
pub mod mock;
pub mod protocol;
pub mod telemetry;

mod bluetooth;

pub use bluetooth::BleTransport;
pub use command::{
    probe_run_control, ControlPayload, ProbePayload, RunControl, SpeedRangeError,
    MAX_SPEED_TENTHS, MIN_SPEED_TENTHS,
};
pub use error::TransportError;
pub use frame::{Frame, FrameError};
pub use mock::{MockOp, MockTransport};
pub use telemetry::{TelemetryError, TelemetrySnapshot, TELEMETRY_LEN};

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Identity of the connected peripheral.
#[derive(Debug, Clone)]
pub struct TransportDeviceInfo {
    pub name: String,
    pub address: String,
}

/// The transport boundary the session drives.
///
/// One implementation owns one physical connection. The session layer
/// is correct against anything satisfying this contract; backends never
/// interpret frames.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write one encoded frame to the control characteristic.
    async fn write_frame(&self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Subscribe to raw notification frames from the status
    /// characteristic. Every subscriber sees every notification; the
    /// channel closes when the link is gone.
    fn subscribe(&self) -> broadcast::Receiver<Vec<u8>>;

    /// Identity of the connected peripheral.
    fn device_info(&self) -> &TransportDeviceInfo;

    /// Whether the link is still up.
    async fn is_connected(&self) -> bool;

    /// Release the connection. Idempotent.
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Type alias for a shared transport handle.
pub type BoxedTransport = Arc<dyn Transport>;
