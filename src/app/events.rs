//! Outbound application events.
//!
//! The [`DoserService`](super::service::DoserService) emits these through
//! the [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log to serial, count them in tests.

use crate::dosing::DoseOrigin;
use crate::indicator::IndicatorMode;
use crate::network::StationRole;

/// Structured events emitted by the dosing core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The service finished start-up.
    Started { clock_ready: bool, storage_ready: bool },

    /// A pump output was switched on.
    DoseStarted {
        pump: usize,
        dose: f32,
        origin: DoseOrigin,
        duration_ms: u64,
    },

    /// A pump output was switched off after its full duration.
    DoseCompleted {
        pump: usize,
        dose: f32,
        origin: DoseOrigin,
        stock_remaining: f32,
    },

    /// A completed dose could not be queued for telemetry.
    RecordDropped { pump: usize },

    /// The schedule engine queued `count` requests this minute.
    SchedulesFired { count: usize },

    StationRoleChanged(StationRole),

    IndicatorModeChanged { from: IndicatorMode, to: IndicatorMode },

    /// Pump configuration written to flash.
    ConfigPersisted,
}
