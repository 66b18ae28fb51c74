//! WiFi adapter: local access point plus cloud-facing station.
//!
//! Implements [`NetworkPort`].  The access point is brought up once at
//! boot and never torn down; the station role is connected and dropped on
//! request of the [`NetworkArbiter`](crate::network::NetworkArbiter).
//!
//! ## cfg gating
//!
//! - **`feature = "espidf"`**: `esp_idf_svc::wifi::EspWifi` in mixed
//!   AP+STA mode.  `connect()` only kicks off association; progress is
//!   polled through `station_status()`, which falls back to the last
//!   disconnect reason recorded in [`StationLink`] from the WiFi event
//!   loop.
//! - **host**: a simulated radio whose station link comes up on connect
//!   when the configured network is "reachable".

use core::fmt;
use core::net::Ipv4Addr;
use core::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use log::info;

use crate::app::ports::{NetworkPort, StationStatus};

#[cfg(feature = "espidf")]
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi,
};
#[cfg(feature = "espidf")]
use log::warn;

/// Default access-point address.
pub const AP_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);

// ───────────────────────────────────────────────────────────────
// Credentials
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    InvalidSsid,
    InvalidPassword,
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)")
            }
        }
    }
}

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<(), CredentialError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(CredentialError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), CredentialError> {
    if !password.is_empty() && !(8..=64).contains(&password.len()) {
        return Err(CredentialError::InvalidPassword);
    }
    Ok(())
}

/// SSID/password pair for one radio role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub ssid: heapless::String<32>,
    pub password: heapless::String<64>,
}

impl Credentials {
    pub fn new(ssid: &str, password: &str) -> Result<Self, CredentialError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        let mut c = Self {
            ssid: heapless::String::new(),
            password: heapless::String::new(),
        };
        c.ssid
            .push_str(ssid)
            .map_err(|_| CredentialError::InvalidSsid)?;
        c.password
            .push_str(password)
            .map_err(|_| CredentialError::InvalidPassword)?;
        Ok(c)
    }
}

// ───────────────────────────────────────────────────────────────
// Station link events
// ───────────────────────────────────────────────────────────────

// ESP-IDF `wifi_err_reason_t` values.
const REASON_AUTH_EXPIRE: u16 = 2;
const REASON_ASSOC_LEAVE: u16 = 8;
const REASON_4WAY_HANDSHAKE_TIMEOUT: u16 = 15;
const REASON_NO_AP_FOUND: u16 = 201;
const REASON_AUTH_FAIL: u16 = 202;
const REASON_ASSOC_FAIL: u16 = 203;
const REASON_HANDSHAKE_TIMEOUT: u16 = 204;
const REASON_CONNECTION_FAIL: u16 = 205;

/// Station status implied by a disconnect event.  `was_connected` tells
/// a lost link apart from an association that never came up.
pub fn status_for_disconnect(reason: u16, was_connected: bool) -> StationStatus {
    match reason {
        REASON_ASSOC_LEAVE => StationStatus::Disconnected,
        REASON_NO_AP_FOUND => StationStatus::NoSsid,
        _ if was_connected => StationStatus::ConnectionLost,
        REASON_AUTH_EXPIRE
        | REASON_4WAY_HANDSHAKE_TIMEOUT
        | REASON_AUTH_FAIL
        | REASON_ASSOC_FAIL
        | REASON_HANDSHAKE_TIMEOUT
        | REASON_CONNECTION_FAIL => StationStatus::ConnectFailed,
        _ => StationStatus::Disconnected,
    }
}

const LINK_STATES: [StationStatus; 7] = [
    StationStatus::Idle,
    StationStatus::NoSsid,
    StationStatus::ScanCompleted,
    StationStatus::Connected,
    StationStatus::ConnectFailed,
    StationStatus::ConnectionLost,
    StationStatus::Disconnected,
];

fn link_code(status: StationStatus) -> u8 {
    LINK_STATES
        .iter()
        .position(|s| *s == status)
        .map_or(0, |i| i as u8)
}

/// Station state as reported by WiFi events.  Written from the event
/// loop task, read by the tick loop.
#[derive(Debug, Default)]
pub struct StationLink(AtomicU8);

impl StationLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> StationStatus {
        LINK_STATES
            .get(usize::from(self.0.load(Ordering::Acquire)))
            .copied()
            .unwrap_or(StationStatus::Idle)
    }

    pub fn on_connected(&self) {
        self.set(StationStatus::Connected);
    }

    pub fn on_disconnected(&self, reason: u16) {
        let was_connected = self.status().is_connected();
        let status = status_for_disconnect(reason, was_connected);
        info!("WiFi: station event: {} (reason {})", status.as_str(), reason);
        self.set(status);
    }

    fn set(&self, status: StationStatus) {
        self.0.store(link_code(status), Ordering::Release);
    }
}

// ───────────────────────────────────────────────────────────────
// Adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    ap: Credentials,
    link: Arc<StationLink>,
    #[cfg(feature = "espidf")]
    wifi: EspWifi<'static>,
    #[cfg(not(feature = "espidf"))]
    sim: SimRadio,
}

#[cfg(not(feature = "espidf"))]
#[derive(Debug, Default)]
struct SimRadio {
    reachable: bool,
    status: Option<StationStatus>,
    connects: u32,
}

impl WifiAdapter {
    /// Configure mixed AP+STA mode and start the access point.  The
    /// station is configured but not connected.
    #[cfg(feature = "espidf")]
    pub fn new(
        mut wifi: EspWifi<'static>,
        ap: Credentials,
        sta: &Credentials,
    ) -> Result<Self, esp_idf_svc::sys::EspError> {
        let auth = |pw: &str| {
            if pw.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            }
        };
        wifi.set_configuration(&Configuration::Mixed(
            ClientConfiguration {
                ssid: sta.ssid.clone(),
                password: sta.password.clone(),
                auth_method: auth(&sta.password),
                ..Default::default()
            },
            AccessPointConfiguration {
                ssid: ap.ssid.clone(),
                password: ap.password.clone(),
                auth_method: auth(&ap.password),
                ..Default::default()
            },
        ))?;
        wifi.start()?;
        info!("WiFi: AP started: {} ({})", ap.ssid, AP_IP);
        Ok(Self {
            ap,
            link: Arc::new(StationLink::new()),
            wifi,
        })
    }

    #[cfg(not(feature = "espidf"))]
    pub fn new(ap: Credentials, reachable: bool) -> Self {
        info!("WiFi(sim): AP started: {} ({})", ap.ssid, AP_IP);
        Self {
            ap,
            link: Arc::new(StationLink::new()),
            sim: SimRadio {
                reachable,
                ..Default::default()
            },
        }
    }

    /// Shared event record; feed it from the WiFi event subscription.
    pub fn link(&self) -> Arc<StationLink> {
        Arc::clone(&self.link)
    }

    /// Simulate the upstream network appearing or disappearing.
    #[cfg(not(feature = "espidf"))]
    pub fn set_reachable(&mut self, reachable: bool) {
        self.sim.reachable = reachable;
        if !reachable && self.sim.status == Some(StationStatus::Connected) {
            self.sim.status = Some(StationStatus::ConnectionLost);
        }
    }

    #[cfg(not(feature = "espidf"))]
    pub fn connect_attempts(&self) -> u32 {
        self.sim.connects
    }
}

impl NetworkPort for WifiAdapter {
    fn connect_station(&mut self) {
        #[cfg(feature = "espidf")]
        {
            // A stale association blocks a fresh connect; drop it first.
            let _ = self.wifi.disconnect();
            self.link.set(StationStatus::Idle);
            match self.wifi.connect() {
                Ok(()) => info!("WiFi: station connecting"),
                Err(e) => warn!("WiFi: station connect failed to start: {}", e),
            }
        }
        #[cfg(not(feature = "espidf"))]
        {
            self.sim.connects += 1;
            self.sim.status = Some(if self.sim.reachable {
                StationStatus::Connected
            } else {
                StationStatus::NoSsid
            });
            info!("WiFi(sim): station connect attempt {}", self.sim.connects);
        }
    }

    fn disconnect_station(&mut self) {
        #[cfg(feature = "espidf")]
        if let Err(e) = self.wifi.disconnect() {
            warn!("WiFi: station disconnect failed: {}", e);
        }
        self.link.set(StationStatus::Disconnected);
        #[cfg(not(feature = "espidf"))]
        {
            self.sim.status = Some(StationStatus::Disconnected);
        }
        info!("WiFi: station disconnected");
    }

    fn station_status(&self) -> StationStatus {
        #[cfg(feature = "espidf")]
        {
            match self.wifi.is_connected() {
                Ok(true) => StationStatus::Connected,
                // Connected per event but not per driver: link just dropped.
                _ => match self.link.status() {
                    StationStatus::Connected => StationStatus::ConnectionLost,
                    other => other,
                },
            }
        }
        #[cfg(not(feature = "espidf"))]
        {
            self.sim.status.unwrap_or(StationStatus::Idle)
        }
    }

    fn rssi(&self) -> Option<i8> {
        if !self.station_status().is_connected() {
            return None;
        }
        #[cfg(feature = "espidf")]
        {
            let mut rssi: core::ffi::c_int = 0;
            // SAFETY: out-pointer valid for the call; station is associated.
            let ret = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_rssi(&mut rssi) };
            (ret == esp_idf_svc::sys::ESP_OK).then_some(rssi as i8)
        }
        #[cfg(not(feature = "espidf"))]
        {
            Some(-60)
        }
    }

    fn station_ip(&self) -> Option<Ipv4Addr> {
        if !self.station_status().is_connected() {
            return None;
        }
        #[cfg(feature = "espidf")]
        {
            self.wifi.sta_netif().get_ip_info().ok().map(|i| i.ip)
        }
        #[cfg(not(feature = "espidf"))]
        {
            Some(Ipv4Addr::new(192, 168, 0, 50))
        }
    }

    fn ap_ssid(&self) -> &str {
        self.ap.ssid.as_str()
    }

    fn ap_ip(&self) -> Ipv4Addr {
        AP_IP
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
