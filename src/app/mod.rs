//! Application core: dosing orchestration, zero I/O.
//!
//! Owns the tick-loop components (arbiter, schedule engine, executor,
//! telemetry queue, status indicator) and the shared handles the HTTP
//! collaborator uses.  All interaction with hardware happens through
//! **port traits** defined in [`ports`], keeping this layer fully testable
//! without real peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
