//! WS2812 status LED driver.
//!
//! A single addressable RGB LED on GPIO 48, driven through the RMT
//! peripheral.  Colours are scaled by a global brightness before being
//! clocked out in GRB order.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: encodes each bit as an RMT high/low pulse pair.
//! On host/test: tracks state in-memory only.

use crate::indicator::Rgb;

#[cfg(feature = "espidf")]
use esp_idf_hal::rmt::{FixedLengthSignal, PinState, Pulse, TxRmtDriver};

/// Scale one channel by `brightness` / 255.
pub fn scale(value: u8, brightness: u8) -> u8 {
    ((u16::from(value) * u16::from(brightness)) / 255) as u8
}

pub struct StatusLed {
    #[cfg(feature = "espidf")]
    tx: TxRmtDriver<'static>,
    brightness: u8,
    current: Rgb,
}

impl StatusLed {
    #[cfg(feature = "espidf")]
    pub fn new(tx: TxRmtDriver<'static>, brightness: u8) -> Self {
        Self {
            tx,
            brightness,
            current: (0, 0, 0),
        }
    }

    #[cfg(not(feature = "espidf"))]
    pub fn new(brightness: u8) -> Self {
        Self {
            brightness,
            current: (0, 0, 0),
        }
    }

    pub fn set_colour(&mut self, rgb: Rgb) {
        let (r, g, b) = rgb;
        let scaled = (
            scale(r, self.brightness),
            scale(g, self.brightness),
            scale(b, self.brightness),
        );
        #[cfg(feature = "espidf")]
        if let Err(e) = self.write_grb(scaled) {
            log::warn!("StatusLed: RMT write failed: {:?}", e);
        }
        #[cfg(not(feature = "espidf"))]
        let _ = scaled;
        self.current = rgb;
    }

    pub fn off(&mut self) {
        self.set_colour((0, 0, 0));
    }

    pub fn current_colour(&self) -> Rgb {
        self.current
    }

    /// Clock out 24 bits, GRB, MSB first.  Timings per the WS2812B
    /// datasheet: T0H 350 ns, T0L 800 ns, T1H 700 ns, T1L 600 ns.
    #[cfg(feature = "espidf")]
    fn write_grb(&mut self, (r, g, b): Rgb) -> Result<(), esp_idf_hal::sys::EspError> {
        use core::time::Duration;

        let ticks_hz = self.tx.counter_clock()?;
        let pulse = |state, ns| Pulse::new_with_duration(ticks_hz, state, &Duration::from_nanos(ns));
        let t0 = (pulse(PinState::High, 350)?, pulse(PinState::Low, 800)?);
        let t1 = (pulse(PinState::High, 700)?, pulse(PinState::Low, 600)?);

        let word = (u32::from(g) << 16) | (u32::from(r) << 8) | u32::from(b);
        let mut signal = FixedLengthSignal::<24>::new();
        for i in (0..24).rev() {
            let (hi, lo) = if (word >> i) & 1 == 1 { t1 } else { t0 };
            signal.set(23 - i as usize, &(hi, lo))?;
        }
        self.tx.start_blocking(&signal)
    }
}
