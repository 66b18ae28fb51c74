//! Telemetry delivery queue.
//!
//! Completed doses wait here until the remote log accepts them.  One
//! record is in flight at a time: the head is peeked, sent, and removed
//! only when the sink acknowledges it, so delivery is ordered and
//! at-least-once.  A sink doing its I/O in the background answers
//! `Pending` while the head is in flight; the head stays put until a
//! later attempt reports the outcome.  When the queue is full new records are rejected and the
//! older ones kept.
//!
//! Re-authentication runs on its own long cadence whenever the sink
//! reports not-ready, whether or not anything is waiting to be sent.

use chrono::NaiveDateTime;
use heapless::Deque;
use log::{debug, info};
use serde::Serialize;

use crate::app::ports::{SinkError, TelemetrySink};
use crate::config::ControllerConfig;
use crate::dosing::DoseOrigin;
use crate::error::Error;
use crate::store::{PUMP_COUNT, PumpName};

/// Completed-dose records held while the sink is unreachable.
pub const TELEMETRY_QUEUE_CAPACITY: usize = 10;

/// Display format for timestamps in log entries and the health readout.
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M";

/// A dose that finished actuating.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoseRecord {
    pub pump: usize,
    pub dose: f32,
    pub origin: DoseOrigin,
    pub completed_at: NaiveDateTime,
}

/// Remote log entry, written under [`LogEntry::path`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    #[serde(skip)]
    pub path: String,
    pub timestamp: String,
    pub bomba: String,
    pub dosagem: f32,
    pub origem: &'static str,
}

impl LogEntry {
    pub fn from_record(record: &DoseRecord, pump_name: &str) -> Self {
        Self {
            path: format!("/logs/{}", record.completed_at.and_utc().timestamp()),
            timestamp: record.completed_at.format(TIMESTAMP_FORMAT).to_string(),
            bomba: pump_name.into(),
            dosagem: record.dose,
            origem: record.origin.label(),
        }
    }
}

/// Result of one [`TelemetryQueue::drain`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The head record was acknowledged and removed.
    Delivered,
    /// Records are waiting but nothing was removed this call.
    Deferred,
    Empty,
}

pub struct TelemetryQueue {
    pending: Deque<DoseRecord, TELEMETRY_QUEUE_CAPACITY>,
    send_interval_ms: u64,
    refresh_interval_ms: u64,
    last_attempt_ms: Option<u64>,
    last_refresh_ms: u64,
}

impl TelemetryQueue {
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            pending: Deque::new(),
            send_interval_ms: config.telemetry_interval_ms.into(),
            refresh_interval_ms: config.sink_refresh_interval_ms.into(),
            last_attempt_ms: None,
            last_refresh_ms: 0,
        }
    }

    /// Append a record.  Fails with `QueueFull` and leaves the queue
    /// untouched when at capacity.
    pub fn push(&mut self, record: DoseRecord) -> Result<(), Error> {
        self.pending.push_back(record).map_err(|_| Error::QueueFull)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn front(&self) -> Option<&DoseRecord> {
        self.pending.front()
    }

    /// Run one delivery step.
    pub fn drain(
        &mut self,
        now_ms: u64,
        sink: &mut impl TelemetrySink,
        names: &[PumpName; PUMP_COUNT],
    ) -> DrainOutcome {
        if !sink.is_ready()
            && now_ms.saturating_sub(self.last_refresh_ms) >= self.refresh_interval_ms
        {
            self.last_refresh_ms = now_ms;
            info!("Telemetry: sink not ready, refreshing auth");
            sink.refresh_auth();
        }

        let Some(record) = self.pending.front() else {
            return DrainOutcome::Empty;
        };
        if let Some(last) = self.last_attempt_ms {
            if now_ms.saturating_sub(last) < self.send_interval_ms {
                return DrainOutcome::Deferred;
            }
        }
        self.last_attempt_ms = Some(now_ms);

        if !sink.is_ready() {
            return DrainOutcome::Deferred;
        }

        let name = names.get(record.pump).map_or("", PumpName::as_str);
        let entry = LogEntry::from_record(record, name);
        match sink.send(&entry) {
            Ok(()) => {
                self.pending.pop_front();
                debug!("Telemetry: delivered {} ({} pending)", entry.path, self.pending.len());
                DrainOutcome::Delivered
            }
            Err(SinkError::Pending) => DrainOutcome::Deferred,
            Err(e) => {
                debug!("Telemetry: send of {} failed: {}", entry.path, Error::from(e));
                DrainOutcome::Deferred
            }
        }
    }
}
