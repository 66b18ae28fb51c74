//! Pump output bank.
//!
//! One digital output per pump channel, driving a MOSFET or relay.  The
//! bank is a dumb actuator: the executor guarantees at most one channel is
//! ON, this driver only tracks and applies the requested levels.
//!
//! Generic over [`embedded_hal::digital::OutputPin`], so the same code runs
//! on ESP-IDF `PinDriver`s and on host-side fakes.

use embedded_hal::digital::OutputPin;
use log::warn;

use crate::store::PUMP_COUNT;

pub struct PumpBank<P: OutputPin> {
    pins: [P; PUMP_COUNT],
    on: [bool; PUMP_COUNT],
}

impl<P: OutputPin> PumpBank<P> {
    /// Take ownership of the pins and drive them all LOW.
    pub fn new(pins: [P; PUMP_COUNT]) -> Self {
        let mut bank = Self {
            pins,
            on: [false; PUMP_COUNT],
        };
        bank.all_off();
        bank
    }

    pub fn set(&mut self, pump: usize, on: bool) {
        let Some(pin) = self.pins.get_mut(pump) else {
            warn!("PumpBank: no channel {}", pump);
            return;
        };
        let res = if on { pin.set_high() } else { pin.set_low() };
        if res.is_err() {
            warn!("PumpBank: GPIO write failed on channel {}", pump + 1);
        }
        self.on[pump] = on;
    }

    pub fn all_off(&mut self) {
        for pump in 0..PUMP_COUNT {
            self.set(pump, false);
        }
    }

    pub fn is_on(&self, pump: usize) -> bool {
        self.on.get(pump).copied().unwrap_or(false)
    }

    pub fn active_count(&self) -> usize {
        self.on.iter().filter(|&&on| on).count()
    }
}
