//! Port traits: the hexagonal boundary between the dosing core and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ DoserService (domain)
//! ```
//!
//! Driven adapters (clock, pump outputs, NVS, WiFi, telemetry sink, status
//! LED) implement these traits.  The [`DoserService`](super::service::DoserService)
//! consumes them via generics, so the domain core never touches hardware
//! directly.
//!
//! Every call made from the tick loop must return promptly: long-running
//! I/O belongs to the adapter and is started fire-and-forget or polled.

use core::fmt;
use core::net::Ipv4Addr;

use chrono::NaiveDateTime;

use crate::indicator::Rgb;
use crate::telemetry::LogEntry;

// ───────────────────────────────────────────────────────────────
// Clock port (RTC + monotonic timer)
// ───────────────────────────────────────────────────────────────

/// Wall-clock and monotonic time source.
///
/// The wall clock may be adjusted externally (operator sets the time);
/// the core tolerates jumps in both directions.
pub trait ClockPort {
    /// Whether the RTC initialised and holds a usable time.
    fn is_ready(&self) -> bool;

    /// Current local wall-clock time, second resolution.  `None` when the
    /// clock is not ready.
    fn wall_time(&self) -> Option<NaiveDateTime>;

    /// Milliseconds since boot.  Monotonically non-decreasing.
    fn uptime_ms(&self) -> u64;

    /// Set the wall clock.
    fn adjust(&mut self, at: NaiveDateTime) -> Result<(), ClockError>;

    /// Start or stop network time sync.  Follows the station role; clocks
    /// without a network source ignore it.
    fn set_network_sync(&mut self, _enabled: bool) {}
}

// ───────────────────────────────────────────────────────────────
// Pump output port (domain → relay / MOSFET outputs)
// ───────────────────────────────────────────────────────────────

/// One digital output per pump.  Synchronous, no failure mode exposed.
pub trait PumpOutputPort {
    fn set_output(&mut self, pump: usize, on: bool);
}

// ───────────────────────────────────────────────────────────────
// Indicator port (domain → addressable RGB LED)
// ───────────────────────────────────────────────────────────────

pub trait IndicatorPort {
    fn set_color(&mut self, rgb: Rgb);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (domain → logging / observability)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Storage port (domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage.
///
/// Writes MUST be atomic, no partial blobs on power loss.  The ESP-IDF
/// NVS API guarantees this natively per `nvs_commit()`.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Telemetry sink port (domain → remote dose log)
// ───────────────────────────────────────────────────────────────

/// Remote service that durably records completed-dose history.
///
/// Adapters that talk to a real service do the I/O in the background:
/// `send` hands the entry off and answers [`SinkError::Pending`] until the
/// outcome is known, then reports that outcome on a later `send` of the
/// same entry.
pub trait TelemetrySink {
    /// Whether the sink is authenticated and able to accept writes.
    fn is_ready(&self) -> bool;

    /// Collect results of background work.  Called once per tick.
    fn poll(&mut self) {}

    /// One-time initialisation once the station link is up.
    fn begin(&mut self);

    /// Attempt to deliver one entry.  Returns promptly.
    fn send(&mut self, entry: &LogEntry) -> Result<(), SinkError>;

    /// Kick off a token refresh / re-authentication.
    fn refresh_auth(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Network port (domain → WiFi station role)
// ───────────────────────────────────────────────────────────────

/// Station (cloud-facing) role controller.  The local access point is
/// always up; only the station role is arbitrated.
pub trait NetworkPort {
    /// Begin (or restart) a non-blocking station association.
    fn connect_station(&mut self);

    /// Drop the station association and stop retrying.
    fn disconnect_station(&mut self);

    fn station_status(&self) -> StationStatus;

    /// Signal strength while associated.
    fn rssi(&self) -> Option<i8>;

    /// Station IP address while associated.
    fn station_ip(&self) -> Option<Ipv4Addr>;

    /// SSID of the local access point.
    fn ap_ssid(&self) -> &str;

    /// Address of the local access point.
    fn ap_ip(&self) -> Ipv4Addr;
}

/// Station link state as reported by the WiFi stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationStatus {
    Idle,
    NoSsid,
    ScanCompleted,
    Connected,
    ConnectFailed,
    ConnectionLost,
    Disconnected,
}

impl StationStatus {
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::NoSsid => "no ssid",
            Self::ScanCompleted => "scan completed",
            Self::Connected => "connected",
            Self::ConnectFailed => "connect failed",
            Self::ConnectionLost => "connection lost",
            Self::Disconnected => "disconnected",
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from loading, validating, or persisting configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// A field failed range validation.
    ValidationFailed(&'static str),
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
    /// The store never initialised.
    Unavailable,
}

/// Errors from [`ClockPort::adjust`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    WriteFailed,
}

/// Errors from [`TelemetrySink::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkError {
    NotReady,
    /// Delivery handed off; the outcome is not known yet.
    Pending,
    Rejected,
    Transport,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
            Self::Unavailable => write!(f, "storage unavailable"),
        }
    }
}

impl fmt::Display for ClockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WriteFailed => write!(f, "clock write failed"),
        }
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(f, "sink not ready"),
            Self::Pending => write!(f, "sink delivery in flight"),
            Self::Rejected => write!(f, "sink rejected entry"),
            Self::Transport => write!(f, "sink transport error"),
        }
    }
}

impl From<StorageError> for ConfigError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound => Self::NotFound,
            StorageError::Full => Self::StorageFull,
            StorageError::IoError | StorageError::Unavailable => Self::IoError,
        }
    }
}

impl From<ClockError> for crate::error::Error {
    fn from(_: ClockError) -> Self {
        Self::PeripheralUnready("clock")
    }
}

impl From<SinkError> for crate::error::Error {
    fn from(e: SinkError) -> Self {
        use crate::error::NetworkFailure;
        Self::TransientNetwork(match e {
            SinkError::NotReady => NetworkFailure::SinkNotReady,
            SinkError::Pending => NetworkFailure::SendPending,
            SinkError::Rejected | SinkError::Transport => NetworkFailure::SendFailed,
        })
    }
}
