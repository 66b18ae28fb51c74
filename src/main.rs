//! AquaDoser Firmware: Main Entry Point
//!
//! Hexagonal architecture driven by a single cooperative tick loop.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HardwareAdapter          NvsAdapter     LogEventSink          │
//! │  (Pumps+LED+Clock)        (Storage)      (EventSink)           │
//! │  WifiAdapter              HttpLogSink ──▶ "log-sink" thread    │
//! │  (AP + station)           (Telemetry)     (HTTPS)              │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              DoserService (pure logic)                 │    │
//! │  │  Arbiter · Schedules · Executor · Telemetry · LED      │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  DoserHandle ◀── WiFi AP events (client presence)              │
//! │  StationLink ◀── WiFi station events (disconnect reason)       │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Credentials are baked in at build time from the environment
//! (`AQUADOSER_*` variables); a missing station SSID runs the device in
//! AP-only mode.
#![deny(unused_must_use)]

use anyhow::Result;
use log::{info, warn};

use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{OutputPin, PinDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::rmt::{TxRmtDriver, config::TransmitConfig};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::wifi::{EspWifi, WifiEvent};

use aquadoser::adapters::hardware::HardwareAdapter;
use aquadoser::adapters::log_sink::LogEventSink;
use aquadoser::adapters::nvs::NvsAdapter;
use aquadoser::adapters::telemetry_sink::{EspHttpTransport, HttpLogSink, SinkCredentials};
use aquadoser::adapters::time::SystemClock;
use aquadoser::adapters::wifi::{Credentials, WifiAdapter};
use aquadoser::app::service::DoserService;
use aquadoser::config::ControllerConfig;
use aquadoser::drivers::pump::PumpBank;
use aquadoser::drivers::status_led::StatusLed;
use aquadoser::pins;
use aquadoser::store::ConfigStore;

const AP_SSID: &str = "AquaBalancePro";

/// Log the health snapshot every this many ticks.
const HEALTH_LOG_TICKS: u64 = 1200;

fn env_or_empty(value: Option<&'static str>) -> &'static str {
    value.unwrap_or("")
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  AquaDoser v{}                       ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Persistent store + pump table ──────────────────────
    let (mut nvs, storage_ready) = match NvsAdapter::new() {
        Ok(n) => (n, true),
        Err(e) => {
            warn!("NVS init failed ({}), running with defaults and no persistence", e);
            (NvsAdapter::unavailable(), false)
        }
    };
    let store = ConfigStore::load(&mut nvs);

    // ── 3. Controller config ──────────────────────────────────
    let sta_ssid = env_or_empty(option_env!("AQUADOSER_WIFI_SSID"));
    let sta_password = env_or_empty(option_env!("AQUADOSER_WIFI_PASSWORD"));
    let ap_password = env_or_empty(option_env!("AQUADOSER_AP_PASSWORD"));

    let mut config = ControllerConfig::default();
    config.utc_offset_minutes = option_env!("AQUADOSER_UTC_OFFSET_MINUTES")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let station = match Credentials::new(sta_ssid, sta_password) {
        Ok(c) => Some(c),
        Err(e) => {
            warn!("Station credentials unusable ({}), AP-only mode", e);
            config.ap_only = true;
            None
        }
    };
    if let Err(e) = config.validate() {
        warn!("Controller config invalid ({}), using defaults", e);
        config = ControllerConfig {
            ap_only: config.ap_only,
            utc_offset_minutes: 0,
            ..ControllerConfig::default()
        };
    }

    // ── 4. Local hardware ─────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;

    let pumps = PumpBank::new([
        PinDriver::output(peripherals.pins.gpio4.downgrade_output())?,
        PinDriver::output(peripherals.pins.gpio5.downgrade_output())?,
        PinDriver::output(peripherals.pins.gpio6.downgrade_output())?,
    ]);
    info!("Pumps on GPIO {:?}", pins::PUMP_GPIOS);

    let rmt = TxRmtDriver::new(
        peripherals.rmt.channel0,
        peripherals.pins.gpio48,
        &TransmitConfig::new().clock_divider(1),
    )?;
    let led = StatusLed::new(rmt, pins::STATUS_LED_BRIGHTNESS);
    info!("Status LED on GPIO {}", pins::STATUS_LED_GPIO);

    let clock = SystemClock::new().with_utc_offset(config.utc_offset_minutes);
    let mut hw = HardwareAdapter::new(pumps, led, clock);

    // ── 5. Network ────────────────────────────────────────────
    let ap = Credentials::new(AP_SSID, ap_password)
        .map_err(|e| anyhow::anyhow!("AP credentials: {}", e))?;
    let sta = station.unwrap_or_else(|| ap.clone());
    let esp_wifi = EspWifi::new(peripherals.modem, sysloop.clone(), None)?;
    let mut wifi = WifiAdapter::new(esp_wifi, ap, &sta)?;

    let mut sink = HttpLogSink::spawn(
        SinkCredentials {
            database_url: env_or_empty(option_env!("AQUADOSER_DB_URL")),
            api_key: env_or_empty(option_env!("AQUADOSER_API_KEY")),
            email: env_or_empty(option_env!("AQUADOSER_USER_EMAIL")),
            password: env_or_empty(option_env!("AQUADOSER_USER_PASSWORD")),
        },
        EspHttpTransport,
    )?;

    // ── 6. Service ────────────────────────────────────────────
    let tick_ms = config.tick_interval_ms;
    let mut service = DoserService::new(config, store, storage_ready);
    let mut events = LogEventSink::new();

    let handle = service.handle();
    let link = wifi.link();
    let _wifi_events = sysloop.subscribe::<WifiEvent, _>(move |event| match event {
        WifiEvent::ApStaConnected(..) => handle.on_client_connect(),
        WifiEvent::ApStaDisconnected(..) => handle.on_client_disconnect(),
        WifiEvent::StaConnected(..) => link.on_connected(),
        WifiEvent::StaDisconnected(d) => link.on_disconnected(u16::from(d.reason())),
        _ => {}
    })?;

    service.start(&hw, &mut events);
    info!("System ready. Entering tick loop.");

    // ── 7. Tick loop ──────────────────────────────────────────
    loop {
        service.tick(&mut hw, &mut nvs, &mut wifi, &mut sink, &mut events);

        if service.tick_count() % HEALTH_LOG_TICKS == 0 {
            let health = service.health(&hw, &wifi, &sink);
            match serde_json::to_string(&health) {
                Ok(json) => info!("HEALTH | {}", json),
                Err(e) => warn!("HEALTH | serialise failed: {}", e),
            }
        }

        FreeRtos::delay_ms(tick_ms);
    }
}
