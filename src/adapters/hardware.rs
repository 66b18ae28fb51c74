//! Hardware adapter: bridges real peripherals to domain port traits.
//!
//! Owns the pump bank, the status LED and the clock, exposing them through
//! [`PumpOutputPort`], [`IndicatorPort`] and [`ClockPort`].  This is the
//! only module in the system that touches actual hardware.  On host
//! targets the underlying drivers track state in memory.

use chrono::NaiveDateTime;
use embedded_hal::digital::OutputPin;

use crate::adapters::time::SystemClock;
use crate::app::ports::{ClockError, ClockPort, IndicatorPort, PumpOutputPort};
use crate::drivers::pump::PumpBank;
use crate::drivers::status_led::StatusLed;
use crate::indicator::Rgb;

/// Concrete adapter that combines all local hardware behind port traits.
pub struct HardwareAdapter<P: OutputPin> {
    pumps: PumpBank<P>,
    led: StatusLed,
    clock: SystemClock,
}

impl<P: OutputPin> HardwareAdapter<P> {
    pub fn new(pumps: PumpBank<P>, led: StatusLed, clock: SystemClock) -> Self {
        Self { pumps, led, clock }
    }

    pub fn pumps(&self) -> &PumpBank<P> {
        &self.pumps
    }

    pub fn led_colour(&self) -> Rgb {
        self.led.current_colour()
    }

    pub fn clock(&self) -> &SystemClock {
        &self.clock
    }
}

// ── PumpOutputPort ────────────────────────────────────────────

impl<P: OutputPin> PumpOutputPort for HardwareAdapter<P> {
    fn set_output(&mut self, pump: usize, on: bool) {
        self.pumps.set(pump, on);
    }
}

// ── IndicatorPort ─────────────────────────────────────────────

impl<P: OutputPin> IndicatorPort for HardwareAdapter<P> {
    fn set_color(&mut self, rgb: Rgb) {
        self.led.set_colour(rgb);
    }
}

// ── ClockPort ─────────────────────────────────────────────────

impl<P: OutputPin> ClockPort for HardwareAdapter<P> {
    fn is_ready(&self) -> bool {
        self.clock.is_ready()
    }

    fn wall_time(&self) -> Option<NaiveDateTime> {
        self.clock.wall_time()
    }

    fn uptime_ms(&self) -> u64 {
        self.clock.uptime_ms()
    }

    fn adjust(&mut self, at: NaiveDateTime) -> Result<(), ClockError> {
        self.clock.adjust(at)
    }

    fn set_network_sync(&mut self, enabled: bool) {
        self.clock.set_network_sync(enabled);
    }
}
