//! Inbound commands to the application service.
//!
//! These represent actions requested by the outside world (the local
//! HTTP API, a serial console) that the
//! [`DoserService`](super::service::DoserService) validates and acts upon.

use crate::dosing::DoseOrigin;

/// Commands that external adapters can send into the dosing core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    /// Dispense `dose` units from `pump` (1-based, as on the wire).
    Dose {
        pump: u8,
        dose: f32,
        origin: DoseOrigin,
    },

    /// Replace pump configuration from a JSON document.
    ApplyConfig(String),

    /// Set the wall clock from `DD/MM/YYYY HH:MM[:SS]`.
    SetTime(String),

    /// Write pump configuration to flash on the next tick.
    SaveConfig,
}
