//! Application service: the hexagonal core.
//!
//! [`DoserService`] owns every tick-loop component and runs them in a
//! fixed order.  All I/O flows through port traits injected at call
//! sites, making the entire service testable with mock adapters.
//!
//! ```text
//!  ClockPort ─────┐   ┌──────────────────────────────┐ ──▶ EventSink
//!  NetworkPort ───┼──▶│         DoserService          │ ──▶ PumpOutputPort
//!  TelemetrySink ─┘   │ arbiter · schedule · executor │ ──▶ IndicatorPort
//!                     │ telemetry · indicator · flush │ ──▶ StoragePort
//!                     └──────────────────────────────┘
//!                          ▲ Arc<DoseQueue>, Arc<ConfigStore>,
//!                          │ Arc<ClientPresence>
//!                     DoserHandle (HTTP / WiFi event context)
//! ```
//!
//! Tick order: network → schedule → executor → telemetry → indicator →
//! deferred config flush.  None of the steps block: remote-log I/O runs
//! in the sink adapter's background worker, and the telemetry step is
//! skipped altogether while a pump is running.

use std::sync::Arc;

use log::info;
use serde::Serialize;

use crate::clock;
use crate::config::ControllerConfig;
use crate::dosing::{DoseOrigin, DoseQueue, Executor, ExecutorEvent, ExecutorState};
use crate::error::Error;
use crate::indicator::{BlinkTiming, IndicatorInputs, IndicatorMode, StatusIndicator};
use crate::network::{ClientPresence, NetworkArbiter, StationRole, StatusChangeLog};
use crate::scheduler::ScheduleEngine;
use crate::store::ConfigStore;
use crate::telemetry::{TIMESTAMP_FORMAT, TelemetryQueue};

use super::commands::AppCommand;
use super::events::AppEvent;
use super::ports::{
    ClockPort, EventSink, IndicatorPort, NetworkPort, PumpOutputPort, StoragePort, TelemetrySink,
};

// ───────────────────────────────────────────────────────────────
// Shared handle
// ───────────────────────────────────────────────────────────────

/// Cloneable view of the shared state, for contexts other than the tick
/// loop (HTTP handlers, WiFi event callbacks).
#[derive(Clone)]
pub struct DoserHandle {
    store: Arc<ConfigStore>,
    queue: Arc<DoseQueue>,
    clients: Arc<ClientPresence>,
}

impl DoserHandle {
    /// Queue a dose.  `pump` is 1-based as on the wire.
    pub fn submit_dose(
        &self,
        pump: u8,
        dose: f32,
        origin: DoseOrigin,
        now_ms: u64,
    ) -> Result<(), Error> {
        let index = usize::from(pump)
            .checked_sub(1)
            .ok_or(Error::InvalidArgument("pump index out of range"))?;
        self.queue.submit(index, dose, origin, now_ms)
    }

    pub fn config_json(&self) -> String {
        self.store.to_json()
    }

    /// Replace configuration.  Written to flash on the next tick.
    pub fn apply_config_json(&self, json: &str) -> Result<(), Error> {
        self.store.apply_json(json)
    }

    pub fn on_client_connect(&self) {
        let n = self.clients.on_client_connect();
        info!("Network: local client joined ({} connected)", n);
    }

    pub fn on_client_disconnect(&self) {
        let n = self.clients.on_client_disconnect();
        info!("Network: local client left ({} connected)", n);
    }
}

// ───────────────────────────────────────────────────────────────
// Health snapshot
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    /// `DD/MM/YYYY HH:MM`, empty when the clock is not ready.
    pub time: String,
    pub clock_ready: bool,
    pub wifi: StationHealth,
    pub ap: AccessPointHealth,
    pub telemetry: TelemetryHealth,
    pub executor: ExecutorHealth,
    pub queue_depth: usize,
    pub local_clients: u32,
    pub station_role: &'static str,
    pub indicator: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationHealth {
    pub connected: bool,
    pub status: &'static str,
    pub rssi: i8,
    pub ip: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessPointHealth {
    pub ssid: String,
    pub ip: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryHealth {
    pub ready: bool,
    pub pending: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutorHealth {
    pub busy: bool,
    /// 1-based pump currently dosing.
    pub pump: Option<usize>,
    pub remaining_ms: u64,
}

// ───────────────────────────────────────────────────────────────
// DoserService
// ───────────────────────────────────────────────────────────────

pub struct DoserService {
    config: ControllerConfig,
    store: Arc<ConfigStore>,
    queue: Arc<DoseQueue>,
    clients: Arc<ClientPresence>,
    storage_ready: bool,
    arbiter: NetworkArbiter,
    status_log: StatusChangeLog,
    engine: ScheduleEngine,
    executor: Executor,
    telemetry: TelemetryQueue,
    indicator: StatusIndicator,
    tick_count: u64,
}

impl DoserService {
    /// `storage_ready` is `false` when NVS failed to open; the service
    /// then runs on in-memory state and the indicator stays in Booting.
    pub fn new(config: ControllerConfig, store: ConfigStore, storage_ready: bool) -> Self {
        Self {
            arbiter: NetworkArbiter::new(&config),
            status_log: StatusChangeLog::new(),
            engine: ScheduleEngine::new(config.schedule_check_interval_ms),
            executor: Executor::new(config.per_unit_time_ms),
            telemetry: TelemetryQueue::new(&config),
            indicator: StatusIndicator::new(BlinkTiming::from(&config)),
            store: Arc::new(store),
            queue: Arc::new(DoseQueue::new()),
            clients: Arc::new(ClientPresence::new()),
            storage_ready,
            config,
            tick_count: 0,
        }
    }

    pub fn handle(&self) -> DoserHandle {
        DoserHandle {
            store: Arc::clone(&self.store),
            queue: Arc::clone(&self.queue),
            clients: Arc::clone(&self.clients),
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    pub fn start(&mut self, clock: &impl ClockPort, events: &mut impl EventSink) {
        let clock_ready = clock.is_ready();
        events.emit(&AppEvent::Started {
            clock_ready,
            storage_ready: self.storage_ready,
        });
        info!(
            "DoserService started (clock {}, storage {})",
            if clock_ready { "ok" } else { "unready" },
            if self.storage_ready { "ok" } else { "unready" }
        );
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one non-blocking cycle of every subsystem.
    ///
    /// `hw` satisfies the clock, pump-output and indicator ports at once,
    /// mirroring how a single hardware adapter owns those peripherals.
    pub fn tick(
        &mut self,
        hw: &mut (impl ClockPort + PumpOutputPort + IndicatorPort),
        storage: &mut impl StoragePort,
        net: &mut impl NetworkPort,
        sink: &mut impl TelemetrySink,
        events: &mut impl EventSink,
    ) {
        self.tick_count += 1;
        let now = hw.uptime_ms();
        let wall = if hw.is_ready() { hw.wall_time() } else { None };

        // 1. Network arbitration
        sink.poll();
        if let Some(role) = self.arbiter.reconcile(now, self.clients.count(), net, sink) {
            hw.set_network_sync(role == StationRole::Active);
            events.emit(&AppEvent::StationRoleChanged(role));
        }
        self.status_log.observe(net.station_status(), sink.is_ready());

        // 2. Schedules
        let fired = self.engine.evaluate(now, wall, &self.store, &self.queue);
        if fired > 0 {
            events.emit(&AppEvent::SchedulesFired { count: fired });
        }

        // 3. Executor
        let step = self.executor.tick(
            now,
            wall,
            &self.queue,
            &self.store,
            storage,
            hw,
            &mut self.telemetry,
        );
        match step {
            Some(ExecutorEvent::Started(job)) => events.emit(&AppEvent::DoseStarted {
                pump: job.pump,
                dose: job.dose,
                origin: job.origin,
                duration_ms: job.duration_ms,
            }),
            Some(ExecutorEvent::Completed {
                job,
                stock_remaining,
                persisted,
                record_dropped,
            }) => {
                events.emit(&AppEvent::DoseCompleted {
                    pump: job.pump,
                    dose: job.dose,
                    origin: job.origin,
                    stock_remaining,
                });
                if persisted {
                    events.emit(&AppEvent::ConfigPersisted);
                }
                if record_dropped {
                    events.emit(&AppEvent::RecordDropped { pump: job.pump });
                }
            }
            None => {}
        }

        // 4. Telemetry (station role only, never while a pump is on)
        if self.arbiter.role() == StationRole::Active && !self.executor.is_busy() {
            let names = self.store.names();
            self.telemetry.drain(now, sink, &names);
        }

        // 5. Status indicator
        let from = self.indicator.mode();
        let inputs = IndicatorInputs {
            busy: self.executor.is_busy(),
            initialized: hw.is_ready() && self.storage_ready,
            online: net.station_status().is_connected() && sink.is_ready(),
        };
        if let Some(to) = self.indicator.update(now, inputs, hw) {
            events.emit(&AppEvent::IndicatorModeChanged { from, to });
        }

        // 6. Deferred configuration flush
        if self.storage_ready && self.store.flush_if_dirty(storage) {
            events.emit(&AppEvent::ConfigPersisted);
        }
    }

    // ── Command handling ──────────────────────────────────────

    /// Process an external command.  Invalid input is rejected without
    /// any state change.
    pub fn handle_command(
        &mut self,
        cmd: AppCommand,
        clock: &mut impl ClockPort,
    ) -> Result<(), Error> {
        match cmd {
            AppCommand::Dose { pump, dose, origin } => {
                self.handle()
                    .submit_dose(pump, dose, origin, clock.uptime_ms())
            }
            AppCommand::ApplyConfig(json) => self.store.apply_json(&json),
            AppCommand::SetTime(input) => self.set_time(clock, &input),
            AppCommand::SaveConfig => {
                self.store.mark_dirty();
                info!("Explicit config save requested (will flush on next tick)");
                Ok(())
            }
        }
    }

    pub fn set_time(&mut self, clock: &mut impl ClockPort, input: &str) -> Result<(), Error> {
        clock::set_time(clock, input).map(|_| ())
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn health(
        &self,
        clock: &impl ClockPort,
        net: &impl NetworkPort,
        sink: &impl TelemetrySink,
    ) -> HealthSnapshot {
        let clock_ready = clock.is_ready();
        let now = clock.uptime_ms();
        let time = clock
            .wall_time()
            .filter(|_| clock_ready)
            .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
            .unwrap_or_default();

        let status = net.station_status();
        let connected = status.is_connected();

        let executor = match self.executor.state() {
            ExecutorState::Idle => ExecutorHealth {
                busy: false,
                pump: None,
                remaining_ms: 0,
            },
            ExecutorState::Running(job) => ExecutorHealth {
                busy: true,
                pump: Some(job.pump + 1),
                remaining_ms: job
                    .duration_ms
                    .saturating_sub(now.saturating_sub(job.started_at_ms)),
            },
        };

        HealthSnapshot {
            time,
            clock_ready,
            wifi: StationHealth {
                connected,
                status: status.as_str(),
                rssi: net.rssi().filter(|_| connected).unwrap_or(0),
                ip: net
                    .station_ip()
                    .filter(|_| connected)
                    .map(|ip| ip.to_string())
                    .unwrap_or_default(),
            },
            ap: AccessPointHealth {
                ssid: net.ap_ssid().into(),
                ip: net.ap_ip().to_string(),
            },
            telemetry: TelemetryHealth {
                ready: sink.is_ready(),
                pending: self.telemetry.len(),
            },
            executor,
            queue_depth: self.queue.len(),
            local_clients: self.clients.count(),
            station_role: self.arbiter.role().as_str(),
            indicator: self.indicator.mode().as_str(),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn executor_state(&self) -> ExecutorState {
        self.executor.state()
    }

    pub fn indicator_mode(&self) -> IndicatorMode {
        self.indicator.mode()
    }

    pub fn station_role(&self) -> StationRole {
        self.arbiter.role()
    }

    pub fn pending_requests(&self) -> usize {
        self.queue.len()
    }

    pub fn pending_records(&self) -> usize {
        self.telemetry.len()
    }

    /// Total ticks executed since startup.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }
}
