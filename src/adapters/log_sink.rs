//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (UART / USB-CDC in production).

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started {
                clock_ready,
                storage_ready,
            } => {
                info!("START | clock={} storage={}", clock_ready, storage_ready);
            }
            AppEvent::DoseStarted {
                pump,
                dose,
                origin,
                duration_ms,
            } => {
                info!(
                    "DOSE  | pump {} ON | {:.2} units | {} ms | {}",
                    pump + 1,
                    dose,
                    duration_ms,
                    origin.label()
                );
            }
            AppEvent::DoseCompleted {
                pump,
                dose,
                origin,
                stock_remaining,
            } => {
                info!(
                    "DOSE  | pump {} OFF | {:.2} units | stock {:.1} | {}",
                    pump + 1,
                    dose,
                    stock_remaining,
                    origin.label()
                );
            }
            AppEvent::RecordDropped { pump } => {
                warn!("TELEM | record for pump {} dropped, queue full", pump + 1);
            }
            AppEvent::SchedulesFired { count } => {
                info!("SCHED | {} request(s) queued", count);
            }
            AppEvent::StationRoleChanged(role) => {
                info!("NET   | station role {}", role.as_str());
            }
            AppEvent::IndicatorModeChanged { from, to } => {
                info!("LED   | {} -> {}", from.as_str(), to.as_str());
            }
            AppEvent::ConfigPersisted => {
                info!("CFG   | pump table saved");
            }
        }
    }
}
