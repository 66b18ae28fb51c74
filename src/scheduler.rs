//! Schedule engine.
//!
//! Turns wall-clock time into dose requests.  Every enabled slot whose
//! (hour, minute) and weekday match the current local time produces one
//! [`DoseOrigin::Scheduled`] request.
//!
//! ```text
//!   ClockPort::wall_time ──▶ minute key (epoch s / 60)
//!                                  │  new minute?
//!                                  ▼
//!          ConfigStore::stamp_due_slots ──▶ DoseQueue::submit
//! ```
//!
//! A slot fires at most once per absolute minute.  The stamp is written
//! before submission and never rolled back, so a full queue drops that
//! firing rather than retrying it later in the same minute.  Clock jumps
//! in either direction are tolerated: only minute identity matters.

use chrono::{Datelike, NaiveDateTime, Timelike};
use log::{info, warn};

use crate::dosing::{DoseOrigin, DoseQueue};
use crate::store::ConfigStore;

/// Absolute minute number of a wall-clock time.
pub fn minute_key(wall: NaiveDateTime) -> i64 {
    wall.and_utc().timestamp().div_euclid(60)
}

pub struct ScheduleEngine {
    check_interval_ms: u64,
    last_check_ms: Option<u64>,
    last_minute_key: Option<i64>,
}

impl ScheduleEngine {
    pub fn new(check_interval_ms: u32) -> Self {
        Self {
            check_interval_ms: check_interval_ms.into(),
            last_check_ms: None,
            last_minute_key: None,
        }
    }

    /// Evaluate every slot against `wall`.  Returns the number of
    /// requests handed to the queue.
    ///
    /// Skipped entirely when `wall` is `None` (clock not ready), when
    /// called again within the check interval, or when this minute has
    /// already been evaluated.
    pub fn evaluate(
        &mut self,
        now_ms: u64,
        wall: Option<NaiveDateTime>,
        store: &ConfigStore,
        queue: &DoseQueue,
    ) -> usize {
        let Some(wall) = wall else {
            return 0;
        };
        if let Some(last) = self.last_check_ms {
            if now_ms.saturating_sub(last) < self.check_interval_ms {
                return 0;
            }
        }
        self.last_check_ms = Some(now_ms);

        let key = minute_key(wall);
        if self.last_minute_key == Some(key) {
            return 0;
        }
        self.last_minute_key = Some(key);

        let due = store.stamp_due_slots(
            key,
            wall.weekday(),
            wall.hour() as u8,
            wall.minute() as u8,
        );

        let mut fired = 0;
        for slot in due {
            match queue.submit(slot.pump, slot.dose, DoseOrigin::Scheduled, now_ms) {
                Ok(()) => {
                    fired += 1;
                    info!(
                        "Scheduler: pump {} slot {} fired ({} units)",
                        slot.pump + 1,
                        slot.slot + 1,
                        slot.dose
                    );
                }
                Err(e) => warn!(
                    "Scheduler: pump {} slot {} not queued: {}",
                    slot.pump + 1,
                    slot.slot + 1,
                    e
                ),
            }
        }
        fired
    }
}
