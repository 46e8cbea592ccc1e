//! Walking daemon: holds the BLE connection and responds to heartbeats.
//!
//! Heartbeat model:
//! - hooks POST to `/heartbeat` on editor activity
//! - each request resets a timer
//! - no heartbeat for [`SLOW_AFTER`] seconds slows the belt to minimum
//! - no heartbeat for [`STOP_AFTER`] seconds stops it
//!
//! The daemon is the only process talking to the pad; the CLI
//! subcommands and the hook handler go through its HTTP surface.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::BodyExt;
use hyper::body::Bytes;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{error, info, warn};

use sperax_pad::PadSession;

/// 7463 spells WALK-ish on a phone keypad.
pub const DEFAULT_PORT: u16 = 7463;

const SLOW_AFTER: Duration = Duration::from_secs(30);
const STOP_AFTER: Duration = Duration::from_secs(60);
const WATCHDOG_PERIOD: Duration = Duration::from_secs(5);

/// km/h the watchdog slows to before stopping.
const SLOW_SPEED_TENTHS: u8 = 10;
const DEFAULT_SPEED_TENTHS: u8 = 20;

type HttpResponse = hyper::Response<http_body_util::Full<Bytes>>;
type HttpResult = Result<HttpResponse, hyper::Error>;

/// Clamp a km/h request into the speed range the firmware accepts and
/// convert to tenths.
pub fn clamp_speed_tenths(kmh: f64) -> u8 {
    let clamped = kmh.clamp(0.5, 6.0);
    (clamped * 10.0).round() as u8
}

#[derive(Deserialize, Default)]
struct BeatRequest {
    session: Option<String>,
    speed: Option<f64>,
}

impl BeatRequest {
    fn parse(bytes: &[u8]) -> Self {
        serde_json::from_slice(bytes).unwrap_or_default()
    }

    fn session_id(&self) -> String {
        self.session.clone().unwrap_or_else(|| "default".into())
    }
}

#[derive(Serialize)]
struct StateReport {
    ok: bool,
    connected: bool,
    running: bool,
    speed: f64,
    target_speed: f64,
    sessions: usize,
    last_heartbeat_ago: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

struct Daemon {
    device: String,
    /// Held across command awaits so HTTP handlers cannot interleave
    /// connect/start/stop sequences.
    pad: tokio::sync::Mutex<Option<PadSession>>,
    last_heartbeat: parking_lot::Mutex<Option<Instant>>,
    target_tenths: parking_lot::Mutex<u8>,
    sessions: parking_lot::Mutex<HashSet<String>>,
}

impl Daemon {
    fn new(device: String) -> Arc<Self> {
        Arc::new(Self {
            device,
            pad: tokio::sync::Mutex::new(None),
            last_heartbeat: parking_lot::Mutex::new(None),
            target_tenths: parking_lot::Mutex::new(DEFAULT_SPEED_TENTHS),
            sessions: parking_lot::Mutex::new(HashSet::new()),
        })
    }

    fn beat(&self) {
        *self.last_heartbeat.lock() = Some(Instant::now());
    }

    fn target(&self) -> u8 {
        *self.target_tenths.lock()
    }

    fn set_target(&self, tenths: u8) {
        *self.target_tenths.lock() = tenths;
    }

    async fn state_report(&self, error: Option<String>) -> StateReport {
        let pad = self.pad.lock().await;
        self.report_locked(&pad, error)
    }

    /// Connect if there is no usable session yet. A faulted or
    /// disconnected session is discarded and replaced.
    async fn ensure_pad(
        &self,
        pad: &mut Option<PadSession>,
    ) -> Result<(), sperax_pad::ConnectError> {
        if let Some(existing) = pad.as_ref() {
            match existing.state() {
                sperax_pad::SessionState::Disconnected | sperax_pad::SessionState::Faulted => {
                    existing.teardown().await;
                    *pad = None;
                }
                _ => return Ok(()),
            }
        }
        let session = PadSession::connect(&self.device).await?;
        info!(device = %self.device, "BLE connected");
        *pad = Some(session);
        Ok(())
    }

    async fn handle_heartbeat(&self, body: BeatRequest) -> StateReport {
        self.beat();
        self.sessions.lock().insert(body.session_id());
        if let Some(kmh) = body.speed {
            self.set_target(clamp_speed_tenths(kmh));
        }

        let mut pad = self.pad.lock().await;
        if let Err(e) = self.ensure_pad(&mut pad).await {
            return self.report_locked(&pad, Some(format!("connect failed: {e}")));
        }
        let session = pad.as_ref().unwrap();

        let result = if !session.state().is_running() {
            let target = self.target();
            session.start(target).await.map(|()| {
                info!(target_tenths = target, "started on heartbeat");
            })
        } else if body.speed.is_some() {
            session.set_pace(self.target()).await
        } else {
            Ok(())
        };

        match result {
            Ok(()) => self.report_locked(&pad, None),
            Err(e) => self.report_locked(&pad, Some(e.to_string())),
        }
    }

    async fn handle_start(&self, body: BeatRequest) -> StateReport {
        self.beat();
        if let Some(kmh) = body.speed {
            self.set_target(clamp_speed_tenths(kmh));
        }

        let mut pad = self.pad.lock().await;
        if let Err(e) = self.ensure_pad(&mut pad).await {
            return self.report_locked(&pad, Some(format!("connect failed: {e}")));
        }
        let session = pad.as_ref().unwrap();
        match session.start(self.target()).await {
            Ok(()) => {
                info!(target_tenths = self.target(), "started");
                self.report_locked(&pad, None)
            }
            Err(e) => self.report_locked(&pad, Some(e.to_string())),
        }
    }

    /// Stop unconditionally when no session id is given; otherwise
    /// remove that session and stop only when it was the last one.
    async fn handle_stop(&self, body: BeatRequest) -> StateReport {
        let explicit = body.session.is_none();
        if let Some(id) = &body.session {
            self.sessions.lock().remove(id);
        }
        if explicit || self.sessions.lock().is_empty() {
            let pad = self.pad.lock().await;
            let error = self.stop_if_running(&pad).await;
            *self.last_heartbeat.lock() = None;
            self.sessions.lock().clear();
            return self.report_locked(&pad, error);
        }
        self.state_report(None).await
    }

    async fn handle_speed(&self, body: BeatRequest) -> StateReport {
        self.beat();
        let tenths = clamp_speed_tenths(body.speed.unwrap_or(2.0));
        self.set_target(tenths);

        let pad = self.pad.lock().await;
        if let Some(session) = pad.as_ref() {
            if session.state().is_running() {
                if let Err(e) = session.set_pace(tenths).await {
                    return self.report_locked(&pad, Some(e.to_string()));
                }
                info!(target_tenths = tenths, "pace changed");
            }
        }
        self.report_locked(&pad, None)
    }

    async fn handle_session_end(&self, body: BeatRequest) -> StateReport {
        let id = body.session_id();
        let remaining = {
            let mut sessions = self.sessions.lock();
            sessions.remove(&id);
            sessions.len()
        };
        info!(session = %id, remaining, "session ended");

        if remaining == 0 {
            let pad = self.pad.lock().await;
            let error = self.stop_if_running(&pad).await;
            if error.is_none() {
                info!("all sessions ended, belt stopped");
            }
            return self.report_locked(&pad, error);
        }
        self.state_report(None).await
    }

    async fn stop_if_running(&self, pad: &Option<PadSession>) -> Option<String> {
        if let Some(session) = pad.as_ref() {
            if session.state().is_running() {
                if let Err(e) = session.stop().await {
                    return Some(e.to_string());
                }
            }
        }
        None
    }

    /// Like [`state_report`](Self::state_report) but with the pad lock
    /// already held by the caller.
    fn report_locked(&self, pad: &Option<PadSession>, error: Option<String>) -> StateReport {
        let state = pad
            .as_ref()
            .map(|p| p.state())
            .unwrap_or(sperax_pad::SessionState::Disconnected);
        StateReport {
            ok: error.is_none(),
            connected: state != sperax_pad::SessionState::Disconnected,
            running: state.is_running(),
            speed: state.speed_tenths().unwrap_or(0) as f64 / 10.0,
            target_speed: self.target() as f64 / 10.0,
            sessions: self.sessions.lock().len(),
            last_heartbeat_ago: self
                .last_heartbeat
                .lock()
                .map(|t| (t.elapsed().as_secs_f64() * 10.0).round() / 10.0),
            error,
        }
    }

    /// Background task: slow down and stop when heartbeats stop coming.
    async fn watchdog(self: Arc<Self>) {
        let mut slowed = false;
        let mut ticker = tokio::time::interval(WATCHDOG_PERIOD);
        loop {
            ticker.tick().await;

            let elapsed = match *self.last_heartbeat.lock() {
                Some(t) => t.elapsed(),
                None => {
                    slowed = false;
                    continue;
                }
            };

            let pad = self.pad.lock().await;
            let running = pad
                .as_ref()
                .map(|p| p.state().is_running())
                .unwrap_or(false);
            if !running {
                slowed = false;
                continue;
            }

            if elapsed > STOP_AFTER {
                if let Some(e) = self.stop_if_running(&pad).await {
                    warn!(error = %e, "watchdog stop failed");
                } else {
                    info!(timeout_s = STOP_AFTER.as_secs(), "no heartbeat, stopped");
                }
                self.sessions.lock().clear();
                *self.last_heartbeat.lock() = None;
                slowed = false;
            } else if elapsed > SLOW_AFTER {
                if !slowed {
                    let session = pad.as_ref().unwrap();
                    match session.set_pace(SLOW_SPEED_TENTHS).await {
                        Ok(()) => {
                            info!(timeout_s = SLOW_AFTER.as_secs(), "no heartbeat, slowed down")
                        }
                        Err(e) => warn!(error = %e, "watchdog slow-down failed"),
                    }
                    slowed = true;
                }
            } else {
                slowed = false;
            }
        }
    }

    /// Stop the belt and release the connection on daemon shutdown.
    async fn shutdown(&self) {
        info!("shutting down, stopping walking pad");
        let mut pad = self.pad.lock().await;
        if let Some(session) = pad.take() {
            session.teardown().await;
        }
    }
}

async fn handle_request(
    daemon: Arc<Daemon>,
    req: hyper::Request<hyper::body::Incoming>,
) -> HttpResult {
    let path = req.uri().path().to_string();
    let bytes = req.into_body().collect().await?.to_bytes();
    let body = BeatRequest::parse(&bytes);

    let report = match path.as_str() {
        "/heartbeat" => daemon.handle_heartbeat(body).await,
        "/start" => daemon.handle_start(body).await,
        "/stop" => daemon.handle_stop(body).await,
        "/speed" => daemon.handle_speed(body).await,
        "/status" => daemon.state_report(None).await,
        "/session/end" => daemon.handle_session_end(body).await,
        other => return Ok(plain(hyper::StatusCode::NOT_FOUND, format!("not found: {other}"))),
    };

    let status = if report.ok {
        hyper::StatusCode::OK
    } else {
        hyper::StatusCode::SERVICE_UNAVAILABLE
    };
    Ok(json(status, &report))
}

fn json<T: Serialize>(status: hyper::StatusCode, value: &T) -> HttpResponse {
    let bytes = serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec());
    let mut resp = hyper::Response::new(http_body_util::Full::new(Bytes::from(bytes)));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    resp
}

fn plain(status: hyper::StatusCode, message: String) -> HttpResponse {
    let mut resp = hyper::Response::new(http_body_util::Full::new(Bytes::from(message)));
    *resp.status_mut() = status;
    resp
}

/// Run the daemon until ctrl-c.
pub async fn run(device: String, port: u16) -> anyhow::Result<()> {
    let addr = format!("127.0.0.1:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, device, "walking daemon listening");

    let daemon = Daemon::new(device);
    tokio::spawn(Arc::clone(&daemon).watchdog());

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!(error = %e, "accept failed");
                        continue;
                    }
                };
                let daemon = Arc::clone(&daemon);
                tokio::spawn(async move {
                    let io = hyper_util::rt::TokioIo::new(stream);
                    let service = hyper::service::service_fn(move |req| {
                        handle_request(Arc::clone(&daemon), req)
                    });
                    if let Err(e) = hyper::server::conn::http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        warn!(error = %e, "connection error");
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                daemon.shutdown().await;
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn watchdog_slows_then_stops_without_heartbeats() {
        use sperax_transport::{Frame, MockTransport};

        let mock = MockTransport::with_auto_ack();
        let daemon = Daemon::new("RM01".into());
        *daemon.pad.lock().await = Some(PadSession::attach(mock.clone()));

        let report = daemon.handle_start(BeatRequest::default()).await;
        assert!(report.ok);
        assert!(report.running);
        assert_eq!(mock.written_frames().len(), 1);

        tokio::spawn(Arc::clone(&daemon).watchdog());

        // Past the slow threshold: belt drops to minimum speed.
        tokio::time::sleep(Duration::from_secs(45)).await;
        let frames = mock.written_frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(
            Frame::decode(&frames[1]).unwrap(),
            vec![0x15, 0x01, SLOW_SPEED_TENTHS, 0x00]
        );

        // Past the stop threshold: belt stops and state resets.
        tokio::time::sleep(Duration::from_secs(30)).await;
        let frames = mock.written_frames();
        assert_eq!(frames.len(), 3);
        assert_eq!(Frame::decode(&frames[2]).unwrap(), vec![0x15, 0x00, 0x00, 0x00]);

        let report = daemon.state_report(None).await;
        assert!(!report.running);
        assert_eq!(report.last_heartbeat_ago, None);
    }

    #[tokio::test]
    async fn heartbeat_tracks_sessions_and_target_speed() {
        use sperax_transport::MockTransport;

        let mock = MockTransport::with_auto_ack();
        let daemon = Daemon::new("RM01".into());
        *daemon.pad.lock().await = Some(PadSession::attach(mock.clone()));

        let beat = BeatRequest::parse(br#"{"session":"s1","speed":3.0}"#);
        let report = daemon.handle_heartbeat(beat).await;
        assert!(report.ok);
        assert!(report.running);
        assert_eq!(report.target_speed, 3.0);
        assert_eq!(report.sessions, 1);

        // Last session ending stops the belt.
        let end = BeatRequest::parse(br#"{"session":"s1"}"#);
        let report = daemon.handle_session_end(end).await;
        assert!(report.ok);
        assert!(!report.running);
        assert_eq!(report.sessions, 0);
    }

    #[test]
    fn speed_clamp_covers_the_firmware_range() {
        assert_eq!(clamp_speed_tenths(2.0), 20);
        assert_eq!(clamp_speed_tenths(0.0), 5);
        assert_eq!(clamp_speed_tenths(0.5), 5);
        assert_eq!(clamp_speed_tenths(9.9), 60);
        assert_eq!(clamp_speed_tenths(2.55), 26);
    }

    #[test]
    fn beat_request_tolerates_garbage() {
        let beat = BeatRequest::parse(b"not json");
        assert!(beat.session.is_none());
        assert_eq!(beat.session_id(), "default");

        let beat = BeatRequest::parse(br#"{"session":"abc","speed":3.5}"#);
        assert_eq!(beat.session_id(), "abc");
        assert_eq!(beat.speed, Some(3.5));
    }
}
