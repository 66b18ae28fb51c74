//! Actuator drivers: pump outputs and the status LED.

pub mod pump;
pub mod status_led;
