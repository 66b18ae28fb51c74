//! Mock adapters for integration tests.
//!
//! Every port the service touches has a recording fake here, so tests can
//! drive time by hand and assert on the full output history without real
//! GPIO, RTC, NVS or radio.

#![allow(dead_code)]

use core::net::Ipv4Addr;
use std::collections::HashMap;

use aquadoser::app::events::AppEvent;
use aquadoser::app::ports::{
    ClockError, ClockPort, EventSink, IndicatorPort, NetworkPort, PumpOutputPort, SinkError,
    StationStatus, StorageError, StoragePort, TelemetrySink,
};
use aquadoser::indicator::Rgb;
use aquadoser::store::PUMP_COUNT;
use aquadoser::telemetry::LogEntry;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

/// 2024-03-06 is a Wednesday.
pub fn wednesday(h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 6)
        .unwrap()
        .and_hms_opt(h, m, s)
        .unwrap()
}

// ── MockHardware (clock + pumps + LED) ────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputCall {
    pub at_ms: u64,
    pub pump: usize,
    pub on: bool,
}

pub struct MockHardware {
    pub now_ms: u64,
    pub wall: Option<NaiveDateTime>,
    pub outputs: [bool; PUMP_COUNT],
    pub output_calls: Vec<OutputCall>,
    /// Highest number of outputs ever simultaneously ON.
    pub max_concurrent: usize,
    pub colours: Vec<Rgb>,
    pub fail_adjust: bool,
    /// Every network time sync request, in order.
    pub syncs: Vec<bool>,
}

impl MockHardware {
    pub fn new(wall: Option<NaiveDateTime>) -> Self {
        Self {
            now_ms: 0,
            wall,
            outputs: [false; PUMP_COUNT],
            output_calls: Vec::new(),
            max_concurrent: 0,
            colours: Vec::new(),
            fail_adjust: false,
            syncs: Vec::new(),
        }
    }

    /// Advance both the monotonic and the wall clock.
    pub fn advance(&mut self, ms: u64) {
        self.now_ms += ms;
        if let Some(w) = self.wall.as_mut() {
            *w += TimeDelta::milliseconds(ms as i64);
        }
    }

    pub fn on_periods(&self, pump: usize) -> Vec<(u64, u64)> {
        let mut periods = Vec::new();
        let mut start = None;
        for c in self.output_calls.iter().filter(|c| c.pump == pump) {
            match (c.on, start) {
                (true, None) => start = Some(c.at_ms),
                (false, Some(s)) => {
                    periods.push((s, c.at_ms));
                    start = None;
                }
                _ => {}
            }
        }
        periods
    }

    pub fn last_colour(&self) -> Option<Rgb> {
        self.colours.last().copied()
    }
}

impl ClockPort for MockHardware {
    fn is_ready(&self) -> bool {
        self.wall.is_some()
    }

    fn wall_time(&self) -> Option<NaiveDateTime> {
        self.wall
    }

    fn uptime_ms(&self) -> u64 {
        self.now_ms
    }

    fn adjust(&mut self, at: NaiveDateTime) -> Result<(), ClockError> {
        if self.fail_adjust {
            return Err(ClockError::WriteFailed);
        }
        self.wall = Some(at);
        Ok(())
    }

    fn set_network_sync(&mut self, enabled: bool) {
        self.syncs.push(enabled);
    }
}

impl PumpOutputPort for MockHardware {
    fn set_output(&mut self, pump: usize, on: bool) {
        self.outputs[pump] = on;
        self.output_calls.push(OutputCall {
            at_ms: self.now_ms,
            pump,
            on,
        });
        let active = self.outputs.iter().filter(|&&o| o).count();
        self.max_concurrent = self.max_concurrent.max(active);
    }
}

impl IndicatorPort for MockHardware {
    fn set_color(&mut self, rgb: Rgb) {
        self.colours.push(rgb);
    }
}

// ── MockNvs ───────────────────────────────────────────────────

#[derive(Default)]
pub struct MockNvs {
    store: HashMap<String, Vec<u8>>,
    pub writes: usize,
    pub fail_writes: bool,
}

impl MockNvs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(namespace: &str, key: &str, data: &[u8]) -> Self {
        let mut nvs = Self::new();
        nvs.store
            .insert(format!("{}::{}", namespace, key), data.to_vec());
        nvs
    }

    pub fn blob(&self, namespace: &str, key: &str) -> Option<&[u8]> {
        self.store
            .get(&format!("{}::{}", namespace, key))
            .map(Vec::as_slice)
    }
}

impl StoragePort for MockNvs {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        match self.store.get(&format!("{}::{}", namespace, key)) {
            Some(v) => {
                let n = v.len().min(buf.len());
                buf[..n].copy_from_slice(&v[..n]);
                Ok(n)
            }
            None => Err(StorageError::NotFound),
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::IoError);
        }
        self.writes += 1;
        self.store
            .insert(format!("{}::{}", namespace, key), data.to_vec());
        Ok(())
    }
}

// ── MockNetwork ───────────────────────────────────────────────

pub struct MockNetwork {
    pub status: StationStatus,
    pub reachable: bool,
    pub connects: usize,
    pub disconnects: usize,
}

impl MockNetwork {
    pub fn new(reachable: bool) -> Self {
        Self {
            status: StationStatus::Idle,
            reachable,
            connects: 0,
            disconnects: 0,
        }
    }

    pub fn drop_link(&mut self) {
        self.reachable = false;
        self.status = StationStatus::ConnectionLost;
    }
}

impl NetworkPort for MockNetwork {
    fn connect_station(&mut self) {
        self.connects += 1;
        self.status = if self.reachable {
            StationStatus::Connected
        } else {
            StationStatus::NoSsid
        };
    }

    fn disconnect_station(&mut self) {
        self.disconnects += 1;
        self.status = StationStatus::Disconnected;
    }

    fn station_status(&self) -> StationStatus {
        self.status
    }

    fn rssi(&self) -> Option<i8> {
        self.status.is_connected().then_some(-55)
    }

    fn station_ip(&self) -> Option<Ipv4Addr> {
        self.status
            .is_connected()
            .then_some(Ipv4Addr::new(192, 168, 1, 77))
    }

    fn ap_ssid(&self) -> &str {
        "AquaBalancePro"
    }

    fn ap_ip(&self) -> Ipv4Addr {
        Ipv4Addr::new(192, 168, 4, 1)
    }
}

// ── MockSink ──────────────────────────────────────────────────

#[derive(Default)]
pub struct MockSink {
    pub ready: bool,
    /// Readiness granted by the next `begin` / `refresh_auth`.
    pub auth_ok: bool,
    pub begins: usize,
    pub refreshes: usize,
    pub attempts: usize,
    /// Fail this many upcoming sends with a transport error.
    pub fail_next: usize,
    pub sent: Vec<LogEntry>,
}

impl MockSink {
    pub fn new(auth_ok: bool) -> Self {
        Self {
            auth_ok,
            ..Self::default()
        }
    }
}

impl TelemetrySink for MockSink {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn begin(&mut self) {
        self.begins += 1;
        self.ready = self.auth_ok;
    }

    fn send(&mut self, entry: &LogEntry) -> Result<(), SinkError> {
        self.attempts += 1;
        if !self.ready {
            return Err(SinkError::NotReady);
        }
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(SinkError::Transport);
        }
        self.sent.push(entry.clone());
        Ok(())
    }

    fn refresh_auth(&mut self) {
        self.refreshes += 1;
        self.ready = self.auth_ok;
    }
}

// ── RecordingEvents ───────────────────────────────────────────

#[derive(Default)]
pub struct RecordingEvents {
    pub events: Vec<AppEvent>,
}

impl RecordingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingEvents {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Rig ───────────────────────────────────────────────────────

/// Every mock wired together, ticked as the device loop would.
pub struct Rig {
    pub hw: MockHardware,
    pub nvs: MockNvs,
    pub net: MockNetwork,
    pub sink: MockSink,
    pub events: RecordingEvents,
}

impl Rig {
    pub fn new(wall: Option<NaiveDateTime>) -> Self {
        Self {
            hw: MockHardware::new(wall),
            nvs: MockNvs::new(),
            net: MockNetwork::new(true),
            sink: MockSink::new(true),
            events: RecordingEvents::new(),
        }
    }

    pub fn tick(&mut self, service: &mut aquadoser::app::service::DoserService) {
        service.tick(
            &mut self.hw,
            &mut self.nvs,
            &mut self.net,
            &mut self.sink,
            &mut self.events,
        );
    }

    /// Tick `count` times, advancing `step_ms` before each tick.
    pub fn run(
        &mut self,
        service: &mut aquadoser::app::service::DoserService,
        step_ms: u64,
        count: usize,
    ) {
        for _ in 0..count {
            self.hw.advance(step_ms);
            self.tick(service);
        }
    }
}
