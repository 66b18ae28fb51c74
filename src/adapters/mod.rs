//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter          | Implements       | Connects to                    |
//! |------------------|------------------|--------------------------------|
//! | `hardware`       | PumpOutputPort   | Pump GPIOs                     |
//! |                  | IndicatorPort    | WS2812 status LED (RMT)        |
//! |                  | ClockPort        | via `time`                     |
//! | `log_sink`       | EventSink        | Serial log output              |
//! | `nvs`            | StoragePort      | NVS / in-memory store          |
//! | `telemetry_sink` | TelemetrySink    | HTTPS dose log (worker thread) |
//! | `time`           | ClockPort        | System time, SNTP, esp_timer   |
//! | `wifi`           | NetworkPort      | ESP-IDF WiFi AP+STA            |

pub mod hardware;
pub mod log_sink;
pub mod nvs;
pub mod telemetry_sink;
pub mod time;
pub mod wifi;
