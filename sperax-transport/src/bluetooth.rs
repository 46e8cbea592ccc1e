//! btleplug-backed transport for the pad's GATT control service
//!
//! Discovery is by advertised name only; smarter matching heuristics
//! belong to callers. One `BleTransport` owns one peripheral connection
//! and fans GATT notifications out through a broadcast channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::protocol::{ble, timing};
use crate::{Transport, TransportDeviceInfo};

pub struct BleTransport {
    peripheral: Peripheral,
    control_char: Characteristic,
    notify_tx: broadcast::Sender<Vec<u8>>,
    connected: Arc<AtomicBool>,
    info: TransportDeviceInfo,
}

impl BleTransport {
    /// Scan for a peripheral whose advertised name contains `name`,
    /// connect to it and subscribe to the status characteristic.
    pub async fn discover_by_name(name: &str) -> Result<Self, TransportError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(TransportError::NoAdapter)?;

        adapter.start_scan(ScanFilter::default()).await?;
        tokio::time::sleep(Duration::from_millis(timing::SCAN_WINDOW_MS)).await;
        let peripherals = adapter.peripherals().await?;
        adapter.stop_scan().await?;

        let mut found = None;
        for peripheral in peripherals {
            if let Some(props) = peripheral.properties().await? {
                let local_name = props.local_name.unwrap_or_default();
                if local_name.contains(name) {
                    found = Some((peripheral, local_name));
                    break;
                }
            }
        }
        let (peripheral, local_name) =
            found.ok_or_else(|| TransportError::DeviceNotFound(name.to_string()))?;

        debug!(name = %local_name, "connecting");
        peripheral.connect().await?;
        peripheral.discover_services().await?;

        let characteristics = peripheral.characteristics();
        let control_char = characteristics
            .iter()
            .find(|c| c.uuid == ble::CONTROL_CHAR)
            .cloned()
            .ok_or(TransportError::CharacteristicMissing(ble::CONTROL_CHAR))?;
        let status_char = characteristics
            .iter()
            .find(|c| c.uuid == ble::STATUS_CHAR)
            .cloned()
            .ok_or(TransportError::CharacteristicMissing(ble::STATUS_CHAR))?;

        peripheral
            .subscribe(&status_char)
            .await
            .map_err(|e| TransportError::SubscriptionFailed(e.to_string()))?;
        let mut notifications = peripheral
            .notifications()
            .await
            .map_err(|e| TransportError::SubscriptionFailed(e.to_string()))?;

        let (notify_tx, _) = broadcast::channel(timing::NOTIFY_CHANNEL_CAPACITY);
        let connected = Arc::new(AtomicBool::new(true));

        // Pump GATT notifications into the broadcast channel. The task
        // ends when the stream does (peripheral gone).
        let pump_tx = notify_tx.clone();
        let pump_connected = Arc::clone(&connected);
        tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != ble::STATUS_CHAR {
                    continue;
                }
                // send only fails while nobody is subscribed; keep pumping
                let _ = pump_tx.send(notification.value);
            }
            pump_connected.store(false, Ordering::SeqCst);
            warn!("notification stream ended");
        });

        let info = TransportDeviceInfo {
            name: local_name,
            address: peripheral.address().to_string(),
        };

        Ok(Self {
            peripheral,
            control_char,
            notify_tx,
            connected,
            info,
        })
    }
}

#[async_trait]
impl Transport for BleTransport {
    async fn write_frame(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        self.peripheral
            .write(&self.control_char, bytes, WriteType::WithResponse)
            .await?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<u8>> {
        self.notify_tx.subscribe()
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
            && self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        self.peripheral.disconnect().await?;
        Ok(())
    }
}
