//! Dose requests and their execution.
//!
//! [`queue::DoseQueue`] is the only cross-context handoff: the HTTP task
//! and the schedule engine submit into it, the [`executor::Executor`]
//! drains it from the tick loop, one pump at a time.

pub mod executor;
pub mod queue;

pub use executor::{ActiveJob, Executor, ExecutorEvent, ExecutorState};
pub use queue::{DOSE_QUEUE_CAPACITY, DoseQueue};

/// Who asked for a dose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoseOrigin {
    Scheduled,
    Manual,
    Api,
}

impl DoseOrigin {
    /// Label stored in the remote dose log.
    pub fn label(self) -> &'static str {
        match self {
            Self::Scheduled => "Programado",
            Self::Manual => "Manual",
            Self::Api => "Teste",
        }
    }
}

/// A queued request to dispense `dose` units from one pump.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoseRequest {
    /// 0-based pump index.
    pub pump: usize,
    pub dose: f32,
    pub origin: DoseOrigin,
    /// Uptime at submission (milliseconds).
    pub requested_at_ms: u64,
}
