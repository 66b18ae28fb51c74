//! Network mode arbiter.
//!
//! The radio serves two roles: the local access point (always up, used by
//! phones on the same bench) and the station link towards the cloud
//! telemetry sink.  Local service wins: while any client is associated to
//! the access point, or the device runs AP-only, the station role is kept
//! down and no reconnects are attempted.
//!
//! ```text
//!   AP connect / disconnect events ──▶ ClientPresence (atomic)
//!                                            │
//!   tick ──▶ NetworkArbiter::reconcile ◀─────┘
//!               │ Inactive ⇄ Active
//!               ├──▶ NetworkPort::{connect,disconnect}_station
//!               └──▶ TelemetrySink::begin (once the link is up)
//! ```
//!
//! Client events only update the counter; the role follows on the next
//! `reconcile()`.
//!
//! The sink is not started until the station reports connected.  Until it
//! becomes ready for the first time, sign-in is retried on the station
//! backoff; after that the telemetry queue's own refresh cadence applies.

use core::sync::atomic::{AtomicU32, Ordering};

use log::info;

use crate::app::ports::{NetworkPort, StationStatus, TelemetrySink};
use crate::config::ControllerConfig;

// ── Client presence ───────────────────────────────────────────

/// Number of stations associated to the local access point.  Updated
/// from the WiFi event context.
#[derive(Debug, Default)]
pub struct ClientPresence(AtomicU32);

impl ClientPresence {
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Returns the new count.
    pub fn on_client_connect(&self) -> u32 {
        self.0.fetch_add(1, Ordering::AcqRel).saturating_add(1)
    }

    /// Returns the new count.  Never goes below zero.
    pub fn on_client_disconnect(&self) -> u32 {
        let prev = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or(0);
        prev.saturating_sub(1)
    }

    pub fn count(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }
}

// ── Arbiter ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationRole {
    Inactive,
    Active,
}

impl StationRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
        }
    }
}

pub struct NetworkArbiter {
    role: StationRole,
    ap_only: bool,
    retry_interval_ms: u64,
    last_attempt_ms: u64,
    last_sink_attempt_ms: Option<u64>,
    sink_up: bool,
}

impl NetworkArbiter {
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            role: StationRole::Inactive,
            ap_only: config.ap_only,
            retry_interval_ms: config.station_retry_interval_ms.into(),
            last_attempt_ms: 0,
            last_sink_attempt_ms: None,
            sink_up: false,
        }
    }

    pub fn role(&self) -> StationRole {
        self.role
    }

    /// Bring the station role in line with current client presence.
    /// Returns the new role on a transition.
    pub fn reconcile(
        &mut self,
        now_ms: u64,
        clients: u32,
        net: &mut impl NetworkPort,
        sink: &mut impl TelemetrySink,
    ) -> Option<StationRole> {
        let want_active = clients == 0 && !self.ap_only;

        let changed = match (self.role, want_active) {
            (StationRole::Active, false) => {
                net.disconnect_station();
                self.role = StationRole::Inactive;
                info!("Network: {} local client(s), station role off", clients);
                Some(StationRole::Inactive)
            }
            (StationRole::Inactive, true) => {
                net.connect_station();
                self.last_attempt_ms = now_ms;
                self.role = StationRole::Active;
                info!("Network: no local clients, station role on");
                Some(StationRole::Active)
            }
            (StationRole::Active, true) => {
                if !net.station_status().is_connected()
                    && now_ms.saturating_sub(self.last_attempt_ms) >= self.retry_interval_ms
                {
                    self.last_attempt_ms = now_ms;
                    info!("Network: station reconnecting");
                    net.connect_station();
                }
                None
            }
            (StationRole::Inactive, false) => None,
        };

        if self.role == StationRole::Active {
            self.bring_up_sink(now_ms, &*net, sink);
        }
        changed
    }

    /// Start the sink once the station is connected and keep retrying
    /// sign-in on the station backoff until it is ready the first time.
    fn bring_up_sink(
        &mut self,
        now_ms: u64,
        net: &impl NetworkPort,
        sink: &mut impl TelemetrySink,
    ) {
        if self.sink_up || !net.station_status().is_connected() {
            return;
        }
        if sink.is_ready() {
            self.sink_up = true;
            info!("Network: telemetry sink up");
            return;
        }
        match self.last_sink_attempt_ms {
            None => sink.begin(),
            Some(last) if now_ms.saturating_sub(last) >= self.retry_interval_ms => {
                info!("Network: telemetry sink not up yet, retrying sign-in");
                sink.refresh_auth();
            }
            Some(_) => return,
        }
        self.last_sink_attempt_ms = Some(now_ms);
    }
}

// ── Change-only status logging ────────────────────────────────

/// Logs station status and sink readiness only when they change.
#[derive(Debug, Default)]
pub struct StatusChangeLog {
    station: Option<StationStatus>,
    sink_ready: Option<bool>,
}

impl StatusChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if anything changed since the last call.
    pub fn observe(&mut self, station: StationStatus, sink_ready: bool) -> bool {
        let mut changed = false;
        if self.station != Some(station) {
            info!("Network: station status -> {}", station.as_str());
            self.station = Some(station);
            changed = true;
        }
        if self.sink_ready != Some(sink_ready) {
            info!("Network: telemetry sink ready -> {}", sink_ready);
            self.sink_ready = Some(sink_ready);
            changed = true;
        }
        changed
    }
}
