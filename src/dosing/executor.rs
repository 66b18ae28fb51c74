//! Single-job dose executor.
//!
//! ```text
//!          take() from queue
//!   Idle ────────────────────▶ Running(job)
//!    ▲                             │ elapsed >= duration
//!    └──── output OFF, stock, ─────┘
//!          persist, telemetry
//! ```
//!
//! At most one pump output is ON system-wide.  A running job cannot be
//! cancelled; it always runs to its computed duration.
//!
//! Completion side effects happen in a fixed order: output OFF, stock
//! decrement, persistence, telemetry enqueue.  A persistence failure does
//! not undo the dose and telemetry is still recorded.

use chrono::NaiveDateTime;
use log::{info, warn};

use super::{DoseOrigin, DoseQueue};
use crate::app::ports::{PumpOutputPort, StoragePort};
use crate::store::ConfigStore;
use crate::telemetry::{DoseRecord, TelemetryQueue};

/// The dose currently being dispensed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveJob {
    pub pump: usize,
    pub dose: f32,
    pub origin: DoseOrigin,
    pub duration_ms: u64,
    pub started_at_ms: u64,
    pub requested_at_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExecutorState {
    Idle,
    Running(ActiveJob),
}

/// What a tick did, for the event log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExecutorEvent {
    Started(ActiveJob),
    Completed {
        job: ActiveJob,
        stock_remaining: f32,
        persisted: bool,
        record_dropped: bool,
    },
}

pub struct Executor {
    state: ExecutorState,
    per_unit_time_ms: u32,
}

impl Executor {
    pub fn new(per_unit_time_ms: u32) -> Self {
        Self {
            state: ExecutorState::Idle,
            per_unit_time_ms,
        }
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.state, ExecutorState::Running(_))
    }

    /// Advance the state machine by one step.
    ///
    /// `wall` stamps the completion record; an unset clock records the
    /// Unix epoch.
    #[allow(clippy::too_many_arguments)]
    pub fn tick(
        &mut self,
        now_ms: u64,
        wall: Option<NaiveDateTime>,
        queue: &DoseQueue,
        store: &ConfigStore,
        storage: &mut impl StoragePort,
        outputs: &mut impl PumpOutputPort,
        telemetry: &mut TelemetryQueue,
    ) -> Option<ExecutorEvent> {
        match self.state {
            ExecutorState::Idle => {
                let req = queue.take()?;
                let pump = store.pump(req.pump)?;
                let job = ActiveJob {
                    pump: req.pump,
                    dose: req.dose,
                    origin: req.origin,
                    duration_ms: pump.actuation_ms(req.dose, self.per_unit_time_ms),
                    started_at_ms: now_ms,
                    requested_at_ms: req.requested_at_ms,
                };
                outputs.set_output(job.pump, true);
                self.state = ExecutorState::Running(job);
                info!(
                    "Executor: pump {} ON for {} ms ({} units, {})",
                    job.pump + 1,
                    job.duration_ms,
                    job.dose,
                    job.origin.label()
                );
                Some(ExecutorEvent::Started(job))
            }
            ExecutorState::Running(job) => {
                if now_ms.saturating_sub(job.started_at_ms) < job.duration_ms {
                    return None;
                }
                outputs.set_output(job.pump, false);
                self.state = ExecutorState::Idle;

                let stock_remaining = store.record_dose(job.pump, job.dose).unwrap_or(0.0);
                let persisted = match store.persist(storage) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("Executor: config persist failed: {}", e);
                        false
                    }
                };

                let record = DoseRecord {
                    pump: job.pump,
                    dose: job.dose,
                    origin: job.origin,
                    completed_at: wall.unwrap_or_default(),
                };
                let record_dropped = telemetry.push(record).is_err();
                if record_dropped {
                    warn!("Executor: telemetry queue full, dose record dropped");
                }

                info!(
                    "Executor: pump {} OFF, stock {:.1}",
                    job.pump + 1,
                    stock_remaining
                );
                Some(ExecutorEvent::Completed {
                    job,
                    stock_remaining,
                    persisted,
                    record_dropped,
                })
            }
        }
    }
}
