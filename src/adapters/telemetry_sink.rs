//! Remote dose-log adapter.
//!
//! Implements [`TelemetrySink`] against a realtime-database REST endpoint:
//! password sign-in yields an ID token, and each [`LogEntry`] is `PUT` as
//! JSON to `<database_url><path>.json?auth=<token>`.
//!
//! The HTTPS exchanges block for up to [`HTTP_TIMEOUT`], so they never run
//! on the tick loop.  [`HttpLogSink`] is the tick-loop side: it hands
//! requests to a worker thread over an embassy-sync [`Channel`] and picks
//! up the results on later calls.  One request is in flight at a time.
//!
//! ```text
//!  tick loop                              "log-sink" thread
//!  ┌─────────────┐  SinkRequest   ┌──────────────────────────────┐
//!  │ HttpLogSink │───────────────▶│ worker: LogTransport         │
//!  │ (no I/O)    │◀───────────────│ sign_in / put (blocking I/O) │
//!  └─────────────┘   SinkReply    └──────────────────────────────┘
//! ```
//!
//! ## cfg gating
//!
//! - **`feature = "espidf"`**: [`EspHttpTransport`] over
//!   `EspHttpConnection` with the IDF certificate bundle.
//! - **host**: [`SimUpstream`], an in-memory service that records what
//!   was delivered and can be slowed down or taken offline.

use core::time::Duration;
use std::sync::Arc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{debug, info, warn};

use crate::app::ports::{SinkError, TelemetrySink};
use crate::telemetry::LogEntry;

#[cfg(feature = "espidf")]
use esp_idf_svc::http::Method;
#[cfg(feature = "espidf")]
use esp_idf_svc::http::client::{Configuration, EspHttpConnection};
#[cfg(feature = "espidf")]
use serde::Deserialize;

#[cfg(not(feature = "espidf"))]
use core::cell::RefCell;
#[cfg(not(feature = "espidf"))]
use embassy_sync::blocking_mutex::Mutex;

/// Upper bound on a single HTTP exchange.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Worker stack: TLS handshakes need the headroom.
const WORKER_STACK_SIZE: usize = 12 * 1024;

/// Account and endpoint for the remote log.
#[derive(Debug, Clone, Copy)]
pub struct SinkCredentials {
    pub database_url: &'static str,
    pub api_key: &'static str,
    pub email: &'static str,
    pub password: &'static str,
}

impl SinkCredentials {
    /// Whether enough is configured to attempt a sign-in.
    pub fn is_configured(&self) -> bool {
        !self.database_url.is_empty() && !self.api_key.is_empty() && !self.email.is_empty()
    }
}

/// Blocking request/response client run on the worker thread.
pub trait LogTransport: Send + 'static {
    /// Exchange the account credentials for an ID token.
    fn sign_in(&mut self, credentials: &SinkCredentials) -> Result<String, SinkError>;

    /// Write one entry.  A rejected token maps to `NotReady`.
    fn put(
        &mut self,
        credentials: &SinkCredentials,
        token: &str,
        entry: &LogEntry,
    ) -> Result<(), SinkError>;
}

// ── Worker link ───────────────────────────────────────────────

enum SinkRequest {
    SignIn,
    Put { token: String, entry: LogEntry },
    Shutdown,
}

enum SinkReply {
    SignedIn(Result<String, SinkError>),
    Put {
        path: String,
        result: Result<(), SinkError>,
    },
}

struct SinkLink {
    requests: Channel<CriticalSectionRawMutex, SinkRequest, 2>,
    replies: Channel<CriticalSectionRawMutex, SinkReply, 2>,
}

fn run_worker<T: LogTransport>(
    link: Arc<SinkLink>,
    credentials: SinkCredentials,
    mut transport: T,
) {
    info!("LogSink: worker started");
    loop {
        let reply = match futures_lite::future::block_on(link.requests.receive()) {
            SinkRequest::SignIn => SinkReply::SignedIn(transport.sign_in(&credentials)),
            SinkRequest::Put { token, entry } => SinkReply::Put {
                result: transport.put(&credentials, &token, &entry),
                path: entry.path,
            },
            SinkRequest::Shutdown => break,
        };
        if link.replies.try_send(reply).is_err() {
            warn!("LogSink: reply channel full, result dropped");
        }
    }
    info!("LogSink: worker stopped");
}

// ── Tick-loop side ────────────────────────────────────────────

pub struct HttpLogSink {
    credentials: SinkCredentials,
    link: Arc<SinkLink>,
    token: Option<String>,
    started: bool,
    in_flight: bool,
    /// Outcome of the last PUT, held until `send` asks for that entry.
    outcome: Option<(String, Result<(), SinkError>)>,
}

impl HttpLogSink {
    /// Start the worker thread that owns `transport`.
    pub fn spawn<T: LogTransport>(
        credentials: SinkCredentials,
        transport: T,
    ) -> std::io::Result<Self> {
        let link = Arc::new(SinkLink {
            requests: Channel::new(),
            replies: Channel::new(),
        });
        let worker_link = Arc::clone(&link);
        std::thread::Builder::new()
            .name("log-sink".into())
            .stack_size(WORKER_STACK_SIZE)
            .spawn(move || run_worker(worker_link, credentials, transport))?;
        Ok(Self {
            credentials,
            link,
            token: None,
            started: false,
            in_flight: false,
            outcome: None,
        })
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// A sign-in or PUT is with the worker.
    pub fn is_busy(&self) -> bool {
        self.in_flight
    }

    fn collect_replies(&mut self) {
        while let Ok(reply) = self.link.replies.try_receive() {
            self.in_flight = false;
            match reply {
                SinkReply::SignedIn(Ok(token)) => {
                    info!("LogSink: signed in");
                    self.token = Some(token);
                }
                SinkReply::SignedIn(Err(e)) => {
                    warn!("LogSink: sign-in failed: {}", e);
                    self.token = None;
                }
                SinkReply::Put { path, result } => {
                    if result == Err(SinkError::NotReady) {
                        self.token = None;
                    }
                    self.outcome = Some((path, result));
                }
            }
        }
    }

    fn dispatch(&mut self, request: SinkRequest) -> bool {
        if self.link.requests.try_send(request).is_err() {
            warn!("LogSink: request channel full");
            return false;
        }
        self.in_flight = true;
        true
    }

    fn authenticate(&mut self) {
        if !self.credentials.is_configured() {
            warn!("LogSink: no credentials configured");
            return;
        }
        if self.in_flight {
            debug!("LogSink: busy, sign-in deferred");
            return;
        }
        self.dispatch(SinkRequest::SignIn);
    }
}

impl Drop for HttpLogSink {
    fn drop(&mut self) {
        let _ = self.link.requests.try_send(SinkRequest::Shutdown);
    }
}

impl TelemetrySink for HttpLogSink {
    fn is_ready(&self) -> bool {
        self.token.is_some()
    }

    fn poll(&mut self) {
        self.collect_replies();
    }

    fn begin(&mut self) {
        self.started = true;
        info!("LogSink: starting");
        self.authenticate();
    }

    fn send(&mut self, entry: &LogEntry) -> Result<(), SinkError> {
        self.collect_replies();
        if let Some((path, result)) = self.outcome.take() {
            if path == entry.path {
                return result;
            }
        }
        if self.in_flight {
            return Err(SinkError::Pending);
        }
        let Some(token) = self.token.clone() else {
            return Err(SinkError::NotReady);
        };
        if !self.dispatch(SinkRequest::Put {
            token,
            entry: entry.clone(),
        }) {
            return Err(SinkError::Transport);
        }
        Err(SinkError::Pending)
    }

    fn refresh_auth(&mut self) {
        if self.started {
            self.authenticate();
        }
    }
}

// ── Device transport ──────────────────────────────────────────

#[cfg(feature = "espidf")]
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
}

/// HTTPS client for the sign-in and database endpoints.
#[cfg(feature = "espidf")]
pub struct EspHttpTransport;

#[cfg(feature = "espidf")]
impl EspHttpTransport {
    fn connection() -> Result<EspHttpConnection, SinkError> {
        EspHttpConnection::new(&Configuration {
            timeout: Some(HTTP_TIMEOUT),
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        })
        .map_err(|_| SinkError::Transport)
    }

    /// One request/response exchange.  Returns the status and up to
    /// `body.len()` bytes of the response.
    fn exchange(
        method: Method,
        uri: &str,
        payload: &[u8],
        body: &mut [u8],
    ) -> Result<(u16, usize), SinkError> {
        let mut conn = Self::connection()?;
        let len = payload.len().to_string();
        let headers = [
            ("Content-Type", "application/json"),
            ("Content-Length", len.as_str()),
        ];
        conn.initiate_request(method, uri, &headers)
            .map_err(|_| SinkError::Transport)?;
        let mut written = 0;
        while written < payload.len() {
            written += conn
                .write(&payload[written..])
                .map_err(|_| SinkError::Transport)?;
        }
        conn.initiate_response().map_err(|_| SinkError::Transport)?;
        let status = conn.status();
        let mut read = 0;
        while read < body.len() {
            match conn.read(&mut body[read..]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(_) => return Err(SinkError::Transport),
            }
        }
        Ok((status, read))
    }
}

#[cfg(feature = "espidf")]
impl LogTransport for EspHttpTransport {
    fn sign_in(&mut self, credentials: &SinkCredentials) -> Result<String, SinkError> {
        let uri = format!(
            "https://identitytoolkit.googleapis.com/v1/accounts:signInWithPassword?key={}",
            credentials.api_key
        );
        let payload = serde_json::json!({
            "email": credentials.email,
            "password": credentials.password,
            "returnSecureToken": true,
        })
        .to_string();
        let mut body = vec![0u8; 4096];
        let (status, n) = Self::exchange(Method::Post, &uri, payload.as_bytes(), &mut body)?;
        if status != 200 {
            return Err(SinkError::Rejected);
        }
        let parsed: SignInResponse =
            serde_json::from_slice(&body[..n]).map_err(|_| SinkError::Rejected)?;
        Ok(parsed.id_token)
    }

    fn put(
        &mut self,
        credentials: &SinkCredentials,
        token: &str,
        entry: &LogEntry,
    ) -> Result<(), SinkError> {
        let uri = format!(
            "{}{}.json?auth={}",
            credentials.database_url.trim_end_matches('/'),
            entry.path,
            token
        );
        let payload = serde_json::to_vec(entry).map_err(|_| SinkError::Rejected)?;
        let mut body = [0u8; 256];
        let (status, _) = Self::exchange(Method::Put, &uri, &payload, &mut body)?;
        match status {
            200..=299 => Ok(()),
            401 | 403 => Err(SinkError::NotReady),
            _ => Err(SinkError::Rejected),
        }
    }
}

// ── Host transport ────────────────────────────────────────────

#[cfg(not(feature = "espidf"))]
#[derive(Default)]
struct SimState {
    online: bool,
    latency: Duration,
    valid_token: Option<String>,
    sign_ins: u32,
    delivered: Vec<LogEntry>,
}

/// Simulated upstream service.  Clones share state, so a test keeps one
/// handle while the worker thread owns another.
#[cfg(not(feature = "espidf"))]
#[derive(Clone)]
pub struct SimUpstream(Arc<Mutex<CriticalSectionRawMutex, RefCell<SimState>>>);

#[cfg(not(feature = "espidf"))]
impl Default for SimUpstream {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(feature = "espidf"))]
impl SimUpstream {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(RefCell::new(SimState {
            online: true,
            ..SimState::default()
        }))))
    }

    /// Take the service down or bring it back.  Going down revokes the
    /// current token.
    pub fn set_online(&self, online: bool) {
        self.0.lock(|s| {
            let mut s = s.borrow_mut();
            s.online = online;
            if !online {
                s.valid_token = None;
            }
        });
    }

    /// Delay applied to every request before it is answered.
    pub fn set_latency(&self, latency: Duration) {
        self.0.lock(|s| s.borrow_mut().latency = latency);
    }

    pub fn delivered(&self) -> Vec<LogEntry> {
        self.0.lock(|s| s.borrow().delivered.clone())
    }

    pub fn sign_in_count(&self) -> u32 {
        self.0.lock(|s| s.borrow().sign_ins)
    }

    fn wait(&self) {
        let latency = self.0.lock(|s| s.borrow().latency);
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
    }
}

#[cfg(not(feature = "espidf"))]
impl LogTransport for SimUpstream {
    fn sign_in(&mut self, _: &SinkCredentials) -> Result<String, SinkError> {
        self.wait();
        self.0.lock(|s| {
            let mut s = s.borrow_mut();
            s.sign_ins += 1;
            if !s.online {
                return Err(SinkError::Transport);
            }
            let token = format!("sim-token-{}", s.sign_ins);
            s.valid_token = Some(token.clone());
            Ok(token)
        })
    }

    fn put(&mut self, _: &SinkCredentials, token: &str, entry: &LogEntry) -> Result<(), SinkError> {
        self.wait();
        self.0.lock(|s| {
            let mut s = s.borrow_mut();
            if !s.online {
                return Err(SinkError::Transport);
            }
            if s.valid_token.as_deref() != Some(token) {
                return Err(SinkError::NotReady);
            }
            s.delivered.push(entry.clone());
            Ok(())
        })
    }
}
