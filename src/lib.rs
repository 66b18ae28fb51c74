//! AquaDoser firmware library.
//!
//! Exposes the dosing core and its adapters for integration testing and
//! for the device binary.  All ESP-IDF-specific code is guarded by
//! `#[cfg(feature = "espidf")]` within each module; without the feature
//! the adapters fall back to in-memory simulations.

#![deny(unused_must_use)]

pub mod app;
pub mod clock;
pub mod config;
pub mod dosing;
pub mod error;
pub mod indicator;
pub mod network;
pub mod pins;
pub mod scheduler;
pub mod store;
pub mod telemetry;

pub mod adapters;
pub mod drivers;
