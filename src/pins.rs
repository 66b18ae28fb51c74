//! GPIO / peripheral pin assignments for the AquaBalance Pro board.
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// Pump outputs (logic-level MOSFET / relay, active HIGH)
// ---------------------------------------------------------------------------

pub const PUMP1_GPIO: i32 = 4;
pub const PUMP2_GPIO: i32 = 5;
pub const PUMP3_GPIO: i32 = 6;

pub const PUMP_GPIOS: [i32; crate::store::PUMP_COUNT] = [PUMP1_GPIO, PUMP2_GPIO, PUMP3_GPIO];

// ---------------------------------------------------------------------------
// Status LED (single WS2812B on the S3 DevKit)
// ---------------------------------------------------------------------------

pub const STATUS_LED_GPIO: i32 = 48;
/// Global brightness applied to every colour (0–255).
pub const STATUS_LED_BRIGHTNESS: u8 = 30;
