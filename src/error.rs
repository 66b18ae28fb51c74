//! Unified error types for the dosing core.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! tick loop's error handling uniform.  All variants are `Copy` so they can
//! be handed back to the API collaborator without allocation.
//!
//! Nothing here is fatal: every failure degrades functionality (no dosing
//! log, no remote telemetry, stale configuration) while controlled,
//! time-bounded actuation keeps running.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Out-of-range pump index, non-positive dose, malformed JSON or
    /// timestamp.  Rejected synchronously, no state change.
    InvalidArgument(&'static str),
    /// A bounded queue is at capacity.  The oldest entries are preserved.
    QueueFull,
    /// The clock or the persistent store failed to initialise.
    PeripheralUnready(&'static str),
    /// Connectivity, auth, or remote-send failure.  Retried on fixed
    /// intervals, never escalated.
    TransientNetwork(NetworkFailure),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::QueueFull => write!(f, "queue full"),
            Self::PeripheralUnready(what) => write!(f, "peripheral unready: {what}"),
            Self::TransientNetwork(e) => write!(f, "network: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Network failures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkFailure {
    SinkNotReady,
    SendPending,
    SendFailed,
}

impl fmt::Display for NetworkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SinkNotReady => write!(f, "telemetry sink not ready"),
            Self::SendPending => write!(f, "telemetry send in flight"),
            Self::SendFailed => write!(f, "telemetry send failed"),
        }
    }
}

impl From<NetworkFailure> for Error {
    fn from(e: NetworkFailure) -> Self {
        Self::TransientNetwork(e)
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_detail() {
        let e = Error::InvalidArgument("dose must be positive");
        assert_eq!(e.to_string(), "invalid argument: dose must be positive");
        let e: Error = NetworkFailure::SendFailed.into();
        assert_eq!(e.to_string(), "network: telemetry send failed");
    }
}
