//! Controller tuning parameters
//!
//! Timing constants and policy flags for the dosing core.  Pump data
//! (names, calibration, stock, schedules) lives in the
//! [`ConfigStore`](crate::store::ConfigStore); this struct holds only the
//! knobs that shape how the tick loop behaves.

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

/// Core controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    // --- Dosing ---
    /// Actuation time per unit volume at calibration coefficient 1.0 (ms)
    pub per_unit_time_ms: u32,

    // --- Timing ---
    /// Driver tick period (milliseconds)
    pub tick_interval_ms: u32,
    /// Minimum spacing between schedule evaluations (milliseconds)
    pub schedule_check_interval_ms: u32,
    /// Minimum spacing between telemetry delivery attempts (milliseconds)
    pub telemetry_interval_ms: u32,
    /// Minimum spacing between telemetry-sink auth refreshes (milliseconds)
    pub sink_refresh_interval_ms: u32,
    /// Backoff between station reconnect attempts (milliseconds)
    pub station_retry_interval_ms: u32,

    // --- Network ---
    /// Serve local clients only; never bring up the station role.
    pub ap_only: bool,

    // --- Clock ---
    /// Local civil time minus UTC, applied to network-synced time (minutes)
    pub utc_offset_minutes: i16,

    // --- Status LED ---
    /// Booting blink half-period (milliseconds)
    pub boot_blink_ms: u32,
    /// Dosing blink half-period (milliseconds)
    pub dosing_blink_ms: u32,
    /// Interval between "no network" heartbeat blanks (milliseconds)
    pub no_net_pulse_interval_ms: u32,
    /// Length of a "no network" heartbeat blank (milliseconds)
    pub no_net_pulse_ms: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            // Dosing
            per_unit_time_ms: 700,

            // Timing
            tick_interval_ms: 50,
            schedule_check_interval_ms: 1000,
            telemetry_interval_ms: 500,
            sink_refresh_interval_ms: 600_000, // 10 min
            station_retry_interval_ms: 15_000,

            // Network
            ap_only: false,

            // Clock
            utc_offset_minutes: 0,

            // Status LED
            boot_blink_ms: 500,
            dosing_blink_ms: 300,
            no_net_pulse_interval_ms: 5000,
            no_net_pulse_ms: 150,
        }
    }
}

impl ControllerConfig {
    /// Range-check every field.  Invalid values are rejected, not clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=60_000).contains(&self.per_unit_time_ms) {
            return Err(ConfigError::ValidationFailed(
                "per_unit_time_ms must be 1–60000",
            ));
        }
        if !(10..=1000).contains(&self.tick_interval_ms) {
            return Err(ConfigError::ValidationFailed(
                "tick_interval_ms must be 10–1000",
            ));
        }
        if self.schedule_check_interval_ms < self.tick_interval_ms
            || self.schedule_check_interval_ms > 30_000
        {
            return Err(ConfigError::ValidationFailed(
                "schedule_check_interval_ms must be tick_interval_ms–30000",
            ));
        }
        if self.telemetry_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "telemetry_interval_ms must be > 0",
            ));
        }
        if self.sink_refresh_interval_ms < self.telemetry_interval_ms {
            return Err(ConfigError::ValidationFailed(
                "sink_refresh_interval_ms must be >= telemetry_interval_ms",
            ));
        }
        if self.station_retry_interval_ms < 1000 {
            return Err(ConfigError::ValidationFailed(
                "station_retry_interval_ms must be >= 1000",
            ));
        }
        if !(-720..=840).contains(&self.utc_offset_minutes) {
            return Err(ConfigError::ValidationFailed(
                "utc_offset_minutes must be -720–840",
            ));
        }
        if self.boot_blink_ms == 0 || self.dosing_blink_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "blink periods must be > 0",
            ));
        }
        if self.no_net_pulse_ms == 0 || self.no_net_pulse_ms >= self.no_net_pulse_interval_ms {
            return Err(ConfigError::ValidationFailed(
                "no_net_pulse_ms must be > 0 and < no_net_pulse_interval_ms",
            ));
        }
        Ok(())
    }
}
