//! ESP32 clock adapter.
//!
//! Implements [`ClockPort`]:
//!
//! - **`feature = "espidf"`**: monotonic uptime from
//!   `esp_timer_get_time()`, wall clock from the IDF system time
//!   (`gettimeofday` / `settimeofday`).  System time is volatile: it is
//!   lost on reset and comes back either from SNTP, which runs while the
//!   station role is active, or from an operator time-set.  System time
//!   holds UTC; the configured offset turns it into local civil time.
//! - **host** : `std::time::Instant` for uptime and a wall clock that
//!   starts unset and advances from the last `adjust()`.

use chrono::{NaiveDateTime, TimeDelta};
use log::info;

use crate::app::ports::{ClockError, ClockPort};

#[cfg(feature = "espidf")]
use esp_idf_svc::sntp::EspSntp;
#[cfg(feature = "espidf")]
use log::warn;

/// Wall-clock readings before this are treated as "never set".
#[cfg(feature = "espidf")]
const EPOCH_2020: i64 = 1_577_836_800;

pub struct SystemClock {
    /// Local civil time minus UTC.
    utc_offset: TimeDelta,
    #[cfg(feature = "espidf")]
    sntp: Option<EspSntp<'static>>,
    #[cfg(not(feature = "espidf"))]
    start: std::time::Instant,
    /// Wall time at `set_at` (host only).
    #[cfg(not(feature = "espidf"))]
    wall: Option<(NaiveDateTime, std::time::Instant)>,
    #[cfg(not(feature = "espidf"))]
    network_sync: bool,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            utc_offset: TimeDelta::zero(),
            #[cfg(feature = "espidf")]
            sntp: None,
            #[cfg(not(feature = "espidf"))]
            start: std::time::Instant::now(),
            #[cfg(not(feature = "espidf"))]
            wall: None,
            #[cfg(not(feature = "espidf"))]
            network_sync: false,
        }
    }

    pub fn with_utc_offset(mut self, minutes: i16) -> Self {
        self.utc_offset = TimeDelta::minutes(i64::from(minutes));
        self
    }

    pub fn utc_offset(&self) -> TimeDelta {
        self.utc_offset
    }

    /// Whether network time sync is currently running.
    pub fn is_network_synced(&self) -> bool {
        #[cfg(feature = "espidf")]
        {
            self.sntp.is_some()
        }
        #[cfg(not(feature = "espidf"))]
        {
            self.network_sync
        }
    }

    #[cfg(feature = "espidf")]
    fn epoch_secs() -> Option<i64> {
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        // SAFETY: `tv` is a valid out-pointer; a null timezone is allowed.
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return None;
        }
        let secs = i64::from(tv.tv_sec);
        (secs >= EPOCH_2020).then_some(secs)
    }
}

impl ClockPort for SystemClock {
    fn is_ready(&self) -> bool {
        #[cfg(feature = "espidf")]
        {
            Self::epoch_secs().is_some()
        }
        #[cfg(not(feature = "espidf"))]
        {
            self.wall.is_some()
        }
    }

    fn wall_time(&self) -> Option<NaiveDateTime> {
        #[cfg(feature = "espidf")]
        {
            Self::epoch_secs()
                .and_then(|s| chrono::DateTime::from_timestamp(s, 0))
                .map(|t| t.naive_utc() + self.utc_offset)
        }
        #[cfg(not(feature = "espidf"))]
        {
            self.wall.map(|(at, set)| {
                let elapsed = TimeDelta::from_std(set.elapsed()).unwrap_or(TimeDelta::zero());
                at + elapsed
            })
        }
    }

    fn uptime_ms(&self) -> u64 {
        #[cfg(feature = "espidf")]
        {
            // SAFETY: esp_timer_get_time has no preconditions.
            (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1000
        }
        #[cfg(not(feature = "espidf"))]
        {
            self.start.elapsed().as_millis() as u64
        }
    }

    fn adjust(&mut self, at: NaiveDateTime) -> Result<(), ClockError> {
        #[cfg(feature = "espidf")]
        {
            let utc = at - self.utc_offset;
            let tv = esp_idf_svc::sys::timeval {
                tv_sec: utc.and_utc().timestamp() as _,
                tv_usec: 0,
            };
            // SAFETY: `tv` is valid for the call; null timezone is allowed.
            if unsafe { esp_idf_svc::sys::settimeofday(&tv, core::ptr::null()) } != 0 {
                return Err(ClockError::WriteFailed);
            }
            Ok(())
        }
        #[cfg(not(feature = "espidf"))]
        {
            self.wall = Some((at, std::time::Instant::now()));
            Ok(())
        }
    }

    fn set_network_sync(&mut self, enabled: bool) {
        #[cfg(feature = "espidf")]
        {
            if enabled && self.sntp.is_none() {
                match EspSntp::new_default() {
                    Ok(sntp) => {
                        info!("Clock: SNTP started");
                        self.sntp = Some(sntp);
                    }
                    Err(e) => warn!("Clock: SNTP start failed: {}", e),
                }
            } else if !enabled && self.sntp.take().is_some() {
                info!("Clock: SNTP stopped");
            }
        }
        #[cfg(not(feature = "espidf"))]
        {
            if self.network_sync != enabled {
                info!("Clock(sim): network sync {}", if enabled { "on" } else { "off" });
            }
            self.network_sync = enabled;
        }
    }
}
