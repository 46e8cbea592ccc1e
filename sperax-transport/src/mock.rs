//! In-memory transport double for session tests
//!
//! Records every operation in order (so tests can assert that a stop
//! write precedes the disconnect) and lets tests inject notifications
//! or sever the link. With auto-ack enabled it answers valid
//! run-control frames the way the real firmware does.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::error::TransportError;
use crate::frame::Frame;
use crate::protocol::{cmd, timing};
use crate::{Transport, TransportDeviceInfo};

/// Operations observed by the mock, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOp {
    Write(Vec<u8>),
    Disconnect,
}

pub struct MockTransport {
    ops: Mutex<Vec<MockOp>>,
    notify_tx: Mutex<Option<broadcast::Sender<Vec<u8>>>>,
    connected: AtomicBool,
    auto_ack: AtomicBool,
    info: TransportDeviceInfo,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(timing::NOTIFY_CHANNEL_CAPACITY);
        Arc::new(Self {
            ops: Mutex::new(Vec::new()),
            notify_tx: Mutex::new(Some(tx)),
            connected: AtomicBool::new(true),
            auto_ack: AtomicBool::new(false),
            info: TransportDeviceInfo {
                name: "RM01-mock".to_string(),
                address: "00:00:00:00:00:00".to_string(),
            },
        })
    }

    /// A mock that acknowledges every valid run-control frame
    /// immediately, like a healthy pad.
    pub fn with_auto_ack() -> Arc<Self> {
        let mock = Self::new();
        mock.auto_ack.store(true, Ordering::SeqCst);
        mock
    }

    /// Everything the session did, in order.
    pub fn ops(&self) -> Vec<MockOp> {
        self.ops.lock().clone()
    }

    /// Only the frames written to the control path.
    pub fn written_frames(&self) -> Vec<Vec<u8>> {
        self.ops
            .lock()
            .iter()
            .filter_map(|op| match op {
                MockOp::Write(bytes) => Some(bytes.clone()),
                MockOp::Disconnect => None,
            })
            .collect()
    }

    /// Inject raw notification bytes as if the device had sent them.
    pub fn push_notification(&self, raw: Vec<u8>) {
        if let Some(tx) = self.notify_tx.lock().as_ref() {
            let _ = tx.send(raw);
        }
    }

    /// Inject a properly framed status notification carrying `payload`.
    pub fn push_status(&self, payload: &[u8]) {
        let frame = Frame::encode(payload).expect("test payload fits one frame");
        self.push_notification(frame.into_bytes());
    }

    /// Sever the link: further writes fail and every subscriber's
    /// channel closes.
    pub fn drop_link(&self) {
        self.connected.store(false, Ordering::SeqCst);
        *self.notify_tx.lock() = None;
    }

    fn maybe_auto_ack(&self, written: &[u8]) {
        if !self.auto_ack.load(Ordering::SeqCst) {
            return;
        }
        if let Ok(payload) = Frame::decode(written) {
            if payload.len() == 4 && payload[0] == cmd::RUN_CONTROL {
                self.push_status(&[cmd::STATUS_REPORT, payload[0], payload[1]]);
            }
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn write_frame(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        self.ops.lock().push(MockOp::Write(bytes.to_vec()));
        self.maybe_auto_ack(bytes);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<u8>> {
        match self.notify_tx.lock().as_ref() {
            Some(tx) => tx.subscribe(),
            None => {
                // link already severed: hand out a closed receiver
                let (tx, rx) = broadcast::channel(1);
                drop(tx);
                rx
            }
        }
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.ops.lock().push(MockOp::Disconnect);
        self.connected.store(false, Ordering::SeqCst);
        *self.notify_tx.lock() = None;
        Ok(())
    }
}
