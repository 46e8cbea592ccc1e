//! High-level session interface for the Sperax RM01 walking pad
//!
//! Sits on top of any [`Transport`] and owns the session state machine:
//! acknowledged start/stop/speed commands with a single resend, a
//! stop-settles-before-teardown gate, and a background task that keeps
//! the latest status notification around for polling.

pub mod error;
pub mod state;

pub use error::{CommandError, ConnectError};
pub use state::SessionState;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use sperax_transport::protocol::{ble, timing};
use sperax_transport::{
    BleTransport, Frame, RunControl, TelemetrySnapshot, Transport, TELEMETRY_LEN,
};

struct Inner {
    transport: Arc<dyn Transport>,
    state: parking_lot::Mutex<SessionState>,
    snapshot: parking_lot::Mutex<Option<TelemetrySnapshot>>,
    /// Serializes commands: at most one unacknowledged run-control
    /// frame is in flight at any time.
    command_lock: tokio::sync::Mutex<()>,
    shutdown: watch::Sender<bool>,
}

/// One session against one physical pad.
///
/// Cheap to clone; all clones drive the same connection. Commands are
/// serialized internally, so handing clones to concurrent tasks is
/// safe.
#[derive(Clone)]
pub struct PadSession {
    inner: Arc<Inner>,
}

impl PadSession {
    /// Wrap an already-open transport in a session.
    ///
    /// Spawns the notification pump; the session is Ready immediately.
    pub fn attach(transport: Arc<dyn Transport>) -> Self {
        let (shutdown, _) = watch::channel(false);
        let inner = Arc::new(Inner {
            transport,
            state: parking_lot::Mutex::new(SessionState::Ready),
            snapshot: parking_lot::Mutex::new(None),
            command_lock: tokio::sync::Mutex::new(()),
            shutdown,
        });
        let session = PadSession { inner };
        session.spawn_pump();
        session
    }

    /// Discover the pad over BLE by advertised name and open a session.
    pub async fn connect(name: &str) -> Result<Self, ConnectError> {
        info!(name, "connecting to walking pad");
        let transport = BleTransport::discover_by_name(name).await?;
        Ok(Self::attach(Arc::new(transport)))
    }

    /// Same as [`connect`](Self::connect) with the default advertised
    /// name.
    pub async fn connect_default() -> Result<Self, ConnectError> {
        Self::connect(ble::DEFAULT_NAME).await
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// Most recent decoded status notification, if any arrived yet.
    pub fn last_telemetry(&self) -> Option<TelemetrySnapshot> {
        self.inner.snapshot.lock().clone()
    }

    /// Start the belt at `speed_tenths` tenths of km/h.
    ///
    /// Allowed while Ready or Running (re-issuing while running is how
    /// the vendor app nudges a sluggish belt). The state commits to
    /// Running only once the device acknowledges.
    pub async fn start(&self, speed_tenths: u8) -> Result<(), CommandError> {
        let command = RunControl::start(speed_tenths)?;
        match self.state() {
            SessionState::Ready | SessionState::Running(_) => {}
            SessionState::Disconnected => return Err(CommandError::ConnectionLost),
            other => {
                debug!(state = %other, "start refused");
                return Err(CommandError::NotReady);
            }
        }
        self.send_acked(&command).await?;
        *self.inner.state.lock() = SessionState::Running(speed_tenths);
        info!(speed_tenths, "belt started");
        Ok(())
    }

    /// Change the belt speed. Only valid while Running.
    pub async fn set_pace(&self, speed_tenths: u8) -> Result<(), CommandError> {
        // Validate before the state check so an out-of-range request is
        // reported as such regardless of session state.
        let command = RunControl::set_speed(speed_tenths)?;
        match self.state() {
            SessionState::Running(_) => {}
            SessionState::Disconnected => return Err(CommandError::ConnectionLost),
            _ => return Err(CommandError::NotRunning),
        }
        self.send_acked(&command).await?;
        *self.inner.state.lock() = SessionState::Running(speed_tenths);
        info!(speed_tenths, "pace changed");
        Ok(())
    }

    /// Stop the belt. Only valid while Running.
    pub async fn stop(&self) -> Result<(), CommandError> {
        match self.state() {
            SessionState::Running(_) => {}
            SessionState::Disconnected => return Err(CommandError::ConnectionLost),
            _ => return Err(CommandError::NotRunning),
        }
        *self.inner.state.lock() = SessionState::Stopping;
        match self.send_acked(&RunControl::stop()).await {
            Ok(()) => {
                *self.inner.state.lock() = SessionState::Ready;
                info!("belt stopped");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Orderly shutdown: cancel pending commands, stop the belt if it
    /// is running, then release the transport.
    ///
    /// The stop is given [`timing::STOP_GRACE_MS`] to be acknowledged
    /// before the link is dropped anyway; a walking belt must never be
    /// left moving with nobody connected.
    pub async fn teardown(&self) {
        let _ = self.inner.shutdown.send(true);
        // Drain the command queue before touching the belt: in-flight
        // and queued commands see the raised flag and resolve Cancelled.
        // Holding the lock through disconnect means nothing can write a
        // run command between our stop and the link release.
        let _guard = self.inner.command_lock.lock().await;
        let was_running = self.state().is_running();
        if was_running {
            *self.inner.state.lock() = SessionState::Stopping;
            self.settle_stop().await;
        }
        if let Err(e) = self.inner.transport.disconnect().await {
            warn!(error = %e, "disconnect during teardown failed");
        }
        *self.inner.state.lock() = SessionState::Disconnected;
        info!("session torn down");
    }

    /// Best-effort stop with a bounded wait for the ack. Runs after
    /// the shutdown flag is raised, so it cannot use `send_acked`.
    async fn settle_stop(&self) {
        let command = RunControl::stop();
        let mut rx = self.inner.transport.subscribe();
        if let Err(e) = self
            .inner
            .transport
            .write_frame(command.payload().to_frame().as_bytes())
            .await
        {
            warn!(error = %e, "stop write during teardown failed");
            return;
        }
        let deadline = Instant::now() + Duration::from_millis(timing::STOP_GRACE_MS);
        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Ok(raw) => {
                        if Self::is_ack(&command, &raw) {
                            debug!("stop settled before teardown");
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "notification channel lagged during teardown");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                },
                _ = sleep_until(deadline) => {
                    warn!("stop not acknowledged within grace period, releasing link");
                    return;
                }
            }
        }
    }

    /// Write a run-control frame and wait for its acknowledgement,
    /// resending once on timeout. A second timeout faults the session.
    async fn send_acked(&self, command: &RunControl) -> Result<(), CommandError> {
        if *self.inner.shutdown.borrow() {
            return Err(CommandError::Cancelled);
        }
        let _guard = self.inner.command_lock.lock().await;
        // Teardown may have raised the flag while this command sat in
        // the queue; it must not reach the wire.
        if *self.inner.shutdown.borrow() {
            return Err(CommandError::Cancelled);
        }

        let frame = command.payload().to_frame();
        let mut attempt = 0;
        loop {
            // Subscribe before writing so the ack cannot slip past.
            let rx = self.inner.transport.subscribe();
            if let Err(e) = self.inner.transport.write_frame(frame.as_bytes()).await {
                if matches!(e, sperax_transport::TransportError::Disconnected) {
                    *self.inner.state.lock() = SessionState::Disconnected;
                    return Err(CommandError::ConnectionLost);
                }
                return Err(e.into());
            }
            match self.await_ack(command, rx).await {
                Ok(()) => return Ok(()),
                Err(CommandError::CommandTimeout) if attempt < timing::COMMAND_RESENDS => {
                    attempt += 1;
                    warn!(attempt, "command unacknowledged, resending");
                }
                Err(CommandError::CommandTimeout) => {
                    *self.inner.state.lock() = SessionState::Faulted;
                    warn!("command unacknowledged after resend, session faulted");
                    return Err(CommandError::CommandTimeout);
                }
                Err(other) => return Err(other),
            }
        }
    }

    async fn await_ack(
        &self,
        command: &RunControl,
        mut rx: broadcast::Receiver<Vec<u8>>,
    ) -> Result<(), CommandError> {
        let deadline = Instant::now() + Duration::from_millis(timing::ACK_TIMEOUT_MS);
        // A receiver subscribed after the flag flipped never sees a
        // change; check the current value first.
        let mut shutdown = self.inner.shutdown.subscribe();
        if *shutdown.borrow() {
            return Err(CommandError::Cancelled);
        }
        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Ok(raw) => {
                        if Self::is_ack(command, &raw) {
                            return Ok(());
                        }
                        // Telemetry and unrelated acks keep flowing
                        // while we wait; ignore them here, the pump
                        // sees them too.
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "notification channel lagged while awaiting ack");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        *self.inner.state.lock() = SessionState::Disconnected;
                        return Err(CommandError::ConnectionLost);
                    }
                },
                _ = shutdown.changed() => {
                    return Err(CommandError::Cancelled);
                }
                _ = sleep_until(deadline) => {
                    return Err(CommandError::CommandTimeout);
                }
            }
        }
    }

    fn is_ack(command: &RunControl, raw: &[u8]) -> bool {
        match Frame::decode(raw) {
            Ok(payload) => command.matches_ack(&payload),
            Err(_) => false,
        }
    }

    /// Background task: decodes status notifications into the shared
    /// snapshot, drops anything malformed.
    fn spawn_pump(&self) {
        // Weak so the pump never keeps the session alive on its own;
        // dropping the last handle closes the shutdown channel and the
        // select below wakes up.
        let inner = Arc::downgrade(&self.inner);
        let mut rx = self.inner.transport.subscribe();
        let mut shutdown = self.inner.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = rx.recv() => match received {
                        Ok(raw) => {
                            let Some(inner) = inner.upgrade() else { return };
                            Self::handle_notification(&inner, &raw);
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "notification pump lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("notification channel closed, pump exiting");
                            return;
                        }
                    },
                    _ = shutdown.changed() => {
                        debug!("pump shutting down");
                        return;
                    }
                }
            }
        });
    }

    fn handle_notification(inner: &Inner, raw: &[u8]) {
        let payload = match Frame::decode(raw) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(error = %e, len = raw.len(), "dropping malformed notification");
                return;
            }
        };
        if payload.len() == TELEMETRY_LEN {
            match TelemetrySnapshot::decode(&payload) {
                Ok(snapshot) => {
                    debug!(
                        status = snapshot.status,
                        speed_tenths = snapshot.speed_tenths,
                        "telemetry"
                    );
                    *inner.snapshot.lock() = Some(snapshot);
                }
                Err(e) => debug!(error = %e, "telemetry decode failed"),
            }
        } else {
            debug!(len = payload.len(), "non-telemetry notification");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Stops the pump if teardown was never called. The transport
        // drops with us and closes the link.
        let _ = self.shutdown.send(true);
    }
}
