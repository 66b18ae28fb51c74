//! Bounded FIFO of pending dose requests.
//!
//! Backed by an embassy-sync [`Channel`] under a critical-section mutex,
//! so `submit` is safe from the HTTP callback context while the tick loop
//! takes from the other end.  Nothing blocks: a full queue rejects the new
//! request and keeps everything already accepted.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;

use super::{DoseOrigin, DoseRequest};
use crate::error::Error;
use crate::store::PUMP_COUNT;

/// Requests accepted before `submit` starts returning `QueueFull`.
pub const DOSE_QUEUE_CAPACITY: usize = 10;

pub struct DoseQueue {
    channel: Channel<CriticalSectionRawMutex, DoseRequest, DOSE_QUEUE_CAPACITY>,
}

impl DoseQueue {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    /// Validate and enqueue a request.
    ///
    /// `pump` is 0-based.  The dose must be finite and positive.
    pub fn submit(
        &self,
        pump: usize,
        dose: f32,
        origin: DoseOrigin,
        requested_at_ms: u64,
    ) -> Result<(), Error> {
        if pump >= PUMP_COUNT {
            return Err(Error::InvalidArgument("pump index out of range"));
        }
        if !dose.is_finite() || dose <= 0.0 {
            return Err(Error::InvalidArgument("dose must be positive"));
        }
        self.channel
            .try_send(DoseRequest {
                pump,
                dose,
                origin,
                requested_at_ms,
            })
            .map_err(|_| {
                warn!("DoseQueue: full, rejecting pump {} dose {}", pump + 1, dose);
                Error::QueueFull
            })
    }

    /// Oldest pending request, if any.
    pub fn take(&self) -> Option<DoseRequest> {
        self.channel.try_receive().ok()
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.channel.is_full()
    }
}

impl Default for DoseQueue {
    fn default() -> Self {
        Self::new()
    }
}
