//! Status indicator state machine.
//!
//! Folds {executor busy, system initialised, cloud link ready} into a
//! single visual mode on the RGB status LED, plus the blink sub-state
//! of that mode.
//!
//! ## Priority (highest first)
//!
//! 1. **Dosing**    : blue blink, 300 ms half-period
//! 2. **Booting**   : red blink, 500 ms half-period
//! 3. **NoNetwork** : steady green, blanked 150 ms every 5 s
//! 4. **Ready**     : steady green
//!
//! A mode change resets the blink phase and paints the new mode's colour
//! in the same update.  Writes to the LED are deduplicated so an unchanged
//! colour costs nothing on the bus.

use crate::app::ports::IndicatorPort;
use crate::config::ControllerConfig;

/// Colour as (R, G, B) tuple, each 0–255.
pub type Rgb = (u8, u8, u8);

pub const COLOUR_BOOTING: Rgb = (255, 0, 0);
pub const COLOUR_DOSING: Rgb = (0, 0, 255);
pub const COLOUR_READY: Rgb = (0, 255, 0);
pub const COLOUR_OFF: Rgb = (0, 0, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorMode {
    Booting,
    Ready,
    NoNetwork,
    Dosing,
}

impl IndicatorMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Booting => "booting",
            Self::Ready => "ready",
            Self::NoNetwork => "no-network",
            Self::Dosing => "dosing",
        }
    }

    fn base_colour(self) -> Rgb {
        match self {
            Self::Booting => COLOUR_BOOTING,
            Self::Dosing => COLOUR_DOSING,
            Self::Ready | Self::NoNetwork => COLOUR_READY,
        }
    }
}

/// Snapshot of the signals the indicator depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorInputs {
    pub busy: bool,
    pub initialized: bool,
    pub online: bool,
}

pub fn derive_mode(busy: bool, initialized: bool, online: bool) -> IndicatorMode {
    if busy {
        IndicatorMode::Dosing
    } else if !initialized {
        IndicatorMode::Booting
    } else if !online {
        IndicatorMode::NoNetwork
    } else {
        IndicatorMode::Ready
    }
}

/// Blink timing for each mode.
#[derive(Debug, Clone, Copy)]
pub struct BlinkTiming {
    pub boot_half_period_ms: u64,
    pub dosing_half_period_ms: u64,
    pub pulse_interval_ms: u64,
    pub pulse_ms: u64,
}

impl From<&ControllerConfig> for BlinkTiming {
    fn from(c: &ControllerConfig) -> Self {
        Self {
            boot_half_period_ms: c.boot_blink_ms.into(),
            dosing_half_period_ms: c.dosing_blink_ms.into(),
            pulse_interval_ms: c.no_net_pulse_interval_ms.into(),
            pulse_ms: c.no_net_pulse_ms.into(),
        }
    }
}

impl Default for BlinkTiming {
    fn default() -> Self {
        Self::from(&ControllerConfig::default())
    }
}

pub struct StatusIndicator {
    timing: BlinkTiming,
    mode: IndicatorMode,
    lit: bool,
    last_toggle_ms: u64,
    blanking: bool,
    pulse_started_ms: u64,
    last_pulse_ms: u64,
    written: Option<Rgb>,
}

impl StatusIndicator {
    pub fn new(timing: BlinkTiming) -> Self {
        Self {
            timing,
            mode: IndicatorMode::Booting,
            lit: true,
            last_toggle_ms: 0,
            blanking: false,
            pulse_started_ms: 0,
            last_pulse_ms: 0,
            written: None,
        }
    }

    pub fn mode(&self) -> IndicatorMode {
        self.mode
    }

    /// Advance the state machine.  Returns the new mode when it changed.
    pub fn update(
        &mut self,
        now_ms: u64,
        inputs: IndicatorInputs,
        led: &mut impl IndicatorPort,
    ) -> Option<IndicatorMode> {
        let next = derive_mode(inputs.busy, inputs.initialized, inputs.online);
        let changed = next != self.mode;
        if changed {
            self.enter(next, now_ms);
            self.write(led, next.base_colour());
        } else if self.written.is_none() {
            self.write(led, self.mode.base_colour());
        }

        match self.mode {
            IndicatorMode::Booting => self.blink(now_ms, self.timing.boot_half_period_ms, led),
            IndicatorMode::Dosing => self.blink(now_ms, self.timing.dosing_half_period_ms, led),
            IndicatorMode::NoNetwork => self.pulse(now_ms, led),
            IndicatorMode::Ready => self.write(led, COLOUR_READY),
        }

        changed.then_some(next)
    }

    fn enter(&mut self, mode: IndicatorMode, now_ms: u64) {
        self.mode = mode;
        self.last_toggle_ms = now_ms;
        self.lit = matches!(mode, IndicatorMode::Booting | IndicatorMode::Dosing);
        self.blanking = false;
        self.pulse_started_ms = now_ms;
        self.last_pulse_ms = now_ms;
    }

    fn blink(&mut self, now_ms: u64, half_period_ms: u64, led: &mut impl IndicatorPort) {
        if now_ms.saturating_sub(self.last_toggle_ms) < half_period_ms {
            return;
        }
        self.last_toggle_ms = now_ms;
        self.lit = !self.lit;
        let colour = if self.lit {
            self.mode.base_colour()
        } else {
            COLOUR_OFF
        };
        self.write(led, colour);
    }

    /// Steady green with a short blank every `pulse_interval_ms`.
    fn pulse(&mut self, now_ms: u64, led: &mut impl IndicatorPort) {
        if self.blanking {
            if now_ms.saturating_sub(self.pulse_started_ms) >= self.timing.pulse_ms {
                self.blanking = false;
                self.last_pulse_ms = now_ms;
                self.write(led, COLOUR_READY);
            }
        } else if now_ms.saturating_sub(self.last_pulse_ms) >= self.timing.pulse_interval_ms {
            self.blanking = true;
            self.pulse_started_ms = now_ms;
            self.write(led, COLOUR_OFF);
        }
    }

    fn write(&mut self, led: &mut impl IndicatorPort, colour: Rgb) {
        if self.written != Some(colour) {
            led.set_color(colour);
            self.written = Some(colour);
        }
    }
}
