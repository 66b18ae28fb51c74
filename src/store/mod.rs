//! Configuration store: authoritative pump state.
//!
//! Holds the three [`PumpUnit`]s (name, calibration, stock, schedule
//! slots) behind a critical-section mutex so the HTTP collaborator can
//! replace configuration while the tick loop reads calibration and stock.
//!
//! ```text
//!  HTTP task ── apply_json ──┐            ┌── calibration / record_dose ── Executor
//!                            ▼            ▼
//!                     ┌────────────────────────┐
//!                     │  Mutex<RefCell<table>> │──▶ flush_if_dirty ──▶ NVS
//!                     └────────────────────────┘
//!                            ▲
//!  ScheduleEngine ── stamp_due_slots
//! ```
//!
//! Critical sections only copy or replace the table; JSON parsing and
//! encoding happen outside the lock, so a configuration replace is a
//! single atomic unit and every read is a consistent snapshot.

pub mod codec;

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use chrono::Weekday;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{info, warn};

use crate::app::ports::{ConfigError, StorageError, StoragePort};
use crate::error::Error;

/// Number of pump channels on the board.
pub const PUMP_COUNT: usize = 3;
/// Schedule slots per pump.
pub const SLOTS_PER_PUMP: usize = 3;
/// Maximum display-name length in bytes.
pub const NAME_CAPACITY: usize = 32;

/// NVS namespace and key holding the serialized pump table.
pub const STORE_NAMESPACE: &str = "bomb-config";
pub const STORE_KEY: &str = "bombas";

/// Largest blob accepted back from NVS.
const MAX_BLOB_SIZE: usize = 4000;

/// Stock level assigned to every pump on first boot.
const FACTORY_STOCK: f32 = 1000.0;

pub type PumpName = heapless::String<NAME_CAPACITY>;
pub type PumpTable = [PumpUnit; PUMP_COUNT];

// ═══════════════════════════════════════════════════════════════
//  Domain types
// ═══════════════════════════════════════════════════════════════

/// Seven independent day flags, Sunday first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeekdayMask(pub [bool; 7]);

impl WeekdayMask {
    pub const NONE: Self = Self([false; 7]);
    pub const ALL: Self = Self([true; 7]);

    pub fn contains(&self, day: Weekday) -> bool {
        self.0[day.num_days_from_sunday() as usize]
    }
}

/// A time-of-day dosing slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Schedule {
    pub hour: u8,
    pub minute: u8,
    pub dose: f32,
    pub enabled: bool,
    pub weekdays: WeekdayMask,
    /// Absolute minute key (epoch seconds / 60) of the last firing,
    /// `-1` if never fired.
    pub last_fired_minute: i64,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            hour: 0,
            minute: 0,
            dose: 0.0,
            enabled: false,
            weekdays: WeekdayMask::NONE,
            last_fired_minute: -1,
        }
    }
}

/// One pump channel.
#[derive(Debug, Clone, PartialEq)]
pub struct PumpUnit {
    pub name: PumpName,
    /// Multiplier applied to the per-unit actuation time.
    pub calibration: f32,
    /// Remaining stock volume, never negative.
    pub stock: f32,
    pub schedules: [Schedule; SLOTS_PER_PUMP],
}

impl PumpUnit {
    /// Empty channel with only the display name set.
    pub fn named(index: usize) -> Self {
        Self {
            name: default_name(index),
            calibration: 1.0,
            stock: 0.0,
            schedules: [Schedule::default(); SLOTS_PER_PUMP],
        }
    }

    /// First-boot defaults.
    pub fn factory(index: usize) -> Self {
        Self {
            stock: FACTORY_STOCK,
            ..Self::named(index)
        }
    }

    /// Relay on-time for `dose` at `per_unit_ms` milliseconds per unit.
    pub fn actuation_ms(&self, dose: f32, per_unit_ms: u32) -> u64 {
        let ms = dose * per_unit_ms as f32 * self.calibration;
        if ms.is_finite() && ms > 0.0 { ms as u64 } else { 0 }
    }

    /// Deduct a completed dose from stock, flooring at zero.
    pub fn consume(&mut self, dose: f32) {
        if self.stock > 0.0 {
            self.stock = (self.stock - dose).max(0.0);
        }
    }
}

/// `"Bomba N"` (1-based).
pub fn default_name(index: usize) -> PumpName {
    let mut name = PumpName::new();
    let _ = core::fmt::Write::write_fmt(&mut name, format_args!("Bomba {}", index + 1));
    name
}

pub fn factory_table() -> PumpTable {
    core::array::from_fn(PumpUnit::factory)
}

/// A due schedule slot collected under the lock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DueSlot {
    pub pump: usize,
    pub slot: usize,
    pub dose: f32,
}

// ═══════════════════════════════════════════════════════════════
//  Store
// ═══════════════════════════════════════════════════════════════

/// Shared, persistence-backed pump table.
pub struct ConfigStore {
    table: Mutex<CriticalSectionRawMutex, RefCell<PumpTable>>,
    dirty: AtomicBool,
}

impl ConfigStore {
    pub fn new(table: PumpTable) -> Self {
        Self {
            table: Mutex::new(RefCell::new(table)),
            dirty: AtomicBool::new(false),
        }
    }

    /// Load the pump table from NVS.
    ///
    /// * Nothing stored → factory defaults, persisted immediately.
    /// * Unreadable or corrupted blob → factory defaults in memory only;
    ///   the next mutation overwrites the blob.
    pub fn load(storage: &mut impl StoragePort) -> Self {
        let mut buf = vec![0u8; MAX_BLOB_SIZE];
        match storage.read(STORE_NAMESPACE, STORE_KEY, &mut buf) {
            Ok(len) => match codec::decode_config(&buf[..len]) {
                Ok(patch) => {
                    let mut table = core::array::from_fn(PumpUnit::named);
                    codec::apply_patch(&mut table, patch);
                    info!("ConfigStore: loaded pump table ({} bytes)", len);
                    Self::new(table)
                }
                Err(e) => {
                    warn!("ConfigStore: stored config unreadable ({}), using defaults", e);
                    Self::new(factory_table())
                }
            },
            Err(StorageError::NotFound) => {
                let store = Self::new(factory_table());
                match store.persist(storage) {
                    Ok(()) => info!("ConfigStore: factory defaults initialised"),
                    Err(e) => warn!("ConfigStore: could not persist defaults: {}", e),
                }
                store
            }
            Err(e) => {
                warn!("ConfigStore: NVS read failed ({}), using defaults", e);
                Self::new(factory_table())
            }
        }
    }

    // ── Reads ─────────────────────────────────────────────────

    /// Consistent copy of the whole table.
    pub fn snapshot(&self) -> PumpTable {
        self.table.lock(|t| t.borrow().clone())
    }

    pub fn pump(&self, index: usize) -> Option<PumpUnit> {
        self.table.lock(|t| t.borrow().get(index).cloned())
    }

    /// Display names of every pump (for telemetry payloads).
    pub fn names(&self) -> [PumpName; PUMP_COUNT] {
        self.table.lock(|t| {
            let t = t.borrow();
            core::array::from_fn(|i| t[i].name.clone())
        })
    }

    /// Canonical JSON of the current table.
    pub fn to_json(&self) -> String {
        codec::encode_config(&self.snapshot())
    }

    // ── Mutations ─────────────────────────────────────────────

    /// Validate and apply an incoming configuration document.
    ///
    /// Parsing happens before the lock is taken; on any error the stored
    /// state is untouched.  Pumps absent from the document keep their
    /// current configuration.
    pub fn apply_json(&self, json: &str) -> Result<(), Error> {
        let patch = codec::decode_config(json.as_bytes())?;
        self.table
            .lock(|t| codec::apply_patch(&mut t.borrow_mut(), patch));
        self.mark_dirty();
        info!("ConfigStore: configuration replaced");
        Ok(())
    }

    /// Deduct a completed dose from a pump's stock.  Returns the new level.
    pub fn record_dose(&self, index: usize, dose: f32) -> Option<f32> {
        let remaining = self.table.lock(|t| {
            let mut t = t.borrow_mut();
            let pump = t.get_mut(index)?;
            pump.consume(dose);
            Some(pump.stock)
        })?;
        self.mark_dirty();
        Some(remaining)
    }

    /// Collect every slot that should fire now and stamp it with
    /// `minute_key` in the same critical section.
    ///
    /// The stamp is never rolled back: a slot whose request cannot be
    /// queued is not retried within the same minute.
    pub fn stamp_due_slots(
        &self,
        minute_key: i64,
        weekday: Weekday,
        hour: u8,
        minute: u8,
    ) -> heapless::Vec<DueSlot, { PUMP_COUNT * SLOTS_PER_PUMP }> {
        self.table.lock(|t| {
            let mut t = t.borrow_mut();
            let mut due = heapless::Vec::new();
            for (pump, unit) in t.iter_mut().enumerate() {
                for (slot, s) in unit.schedules.iter_mut().enumerate() {
                    if !s.enabled
                        || s.last_fired_minute == minute_key
                        || !s.weekdays.contains(weekday)
                    {
                        continue;
                    }
                    if s.hour == hour && s.minute == minute {
                        s.last_fired_minute = minute_key;
                        // Capacity is PUMP_COUNT * SLOTS_PER_PUMP.
                        let _ = due.push(DueSlot {
                            pump,
                            slot,
                            dose: s.dose,
                        });
                    }
                }
            }
            due
        })
    }

    // ── Persistence ───────────────────────────────────────────

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Write the whole table to NVS now.
    pub fn persist(&self, storage: &mut impl StoragePort) -> Result<(), ConfigError> {
        self.dirty.store(false, Ordering::Release);
        let json = self.to_json();
        storage.write(STORE_NAMESPACE, STORE_KEY, json.as_bytes())?;
        Ok(())
    }

    /// Persist if a mutation happened since the last write.  Failures are
    /// logged, not retried; the next mutation rewrites the full blob.
    /// Returns `true` if a write succeeded.
    pub fn flush_if_dirty(&self, storage: &mut impl StoragePort) -> bool {
        if !self.is_dirty() {
            return false;
        }
        match self.persist(storage) {
            Ok(()) => true,
            Err(e) => {
                warn!("ConfigStore: persist failed: {}", e);
                false
            }
        }
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(factory_table())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemStore {
        map: HashMap<String, Vec<u8>>,
        fail_writes: bool,
    }

    impl StoragePort for MemStore {
        fn read(&self, ns: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
            match self.map.get(&format!("{ns}::{key}")) {
                Some(v) => {
                    let n = v.len().min(buf.len());
                    buf[..n].copy_from_slice(&v[..n]);
                    Ok(n)
                }
                None => Err(StorageError::NotFound),
            }
        }

        fn write(&mut self, ns: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
            if self.fail_writes {
                return Err(StorageError::IoError);
            }
            self.map.insert(format!("{ns}::{key}"), data.to_vec());
            Ok(())
        }
    }

    #[test]
    fn first_boot_persists_factory_defaults() {
        let mut nvs = MemStore::default();
        let store = ConfigStore::load(&mut nvs);
        let p = store.pump(1).unwrap();
        assert_eq!(p.name.as_str(), "Bomba 2");
        assert_eq!(p.stock, 1000.0);
        assert!(nvs.map.contains_key("bomb-config::bombas"));
        assert!(!store.is_dirty());
    }

    #[test]
    fn reload_returns_persisted_table() {
        let mut nvs = MemStore::default();
        let store = ConfigStore::load(&mut nvs);
        store
            .apply_json(r#"{"bomb3":{"name":"Calcio","calibrCoef":1.5,"quantidadeEstoque":250}}"#)
            .unwrap();
        assert!(store.flush_if_dirty(&mut nvs));

        let reloaded = ConfigStore::load(&mut nvs);
        let p = reloaded.pump(2).unwrap();
        assert_eq!(p.name.as_str(), "Calcio");
        assert_eq!(p.calibration, 1.5);
        assert_eq!(p.stock, 250.0);
    }

    #[test]
    fn corrupted_blob_falls_back_without_overwriting() {
        let mut nvs = MemStore::default();
        nvs.write(STORE_NAMESPACE, STORE_KEY, b"{not json").unwrap();
        let store = ConfigStore::load(&mut nvs);
        assert_eq!(store.pump(0).unwrap().name.as_str(), "Bomba 1");
        assert_eq!(
            nvs.map.get("bomb-config::bombas").unwrap().as_slice(),
            b"{not json"
        );
    }

    #[test]
    fn invalid_json_leaves_state_untouched() {
        let store = ConfigStore::default();
        let before = store.snapshot();
        assert!(matches!(
            store.apply_json("{\"bomb1\": "),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(store.snapshot(), before);
        assert!(!store.is_dirty());
    }

    #[test]
    fn stock_floors_at_zero() {
        let store = ConfigStore::default();
        store
            .apply_json(r#"{"bomb1":{"quantidadeEstoque":10}}"#)
            .unwrap();
        assert_eq!(store.record_dose(0, 12.0), Some(0.0));
        assert_eq!(store.record_dose(0, 1.0), Some(0.0));
        assert_eq!(store.record_dose(7, 1.0), None);
    }

    #[test]
    fn actuation_time_scales_with_calibration() {
        let mut p = PumpUnit::factory(0);
        assert_eq!(p.actuation_ms(2.0, 700), 1400);
        p.calibration = 1.5;
        assert_eq!(p.actuation_ms(2.0, 700), 2100);
    }

    #[test]
    fn stamp_due_slots_is_once_per_minute_key() {
        let store = ConfigStore::default();
        store
            .apply_json(
                r#"{"bomb2":{"schedules":[{"time":{"hour":8,"minute":0},"dosagem":3,"status":true,
                    "diasSemanaSelecionados":[false,false,false,true,false,false,false]}]}}"#,
            )
            .unwrap();
        let due = store.stamp_due_slots(1000, Weekday::Wed, 8, 0);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0], DueSlot { pump: 1, slot: 0, dose: 3.0 });
        assert!(store.stamp_due_slots(1000, Weekday::Wed, 8, 0).is_empty());
        assert!(store.stamp_due_slots(2000, Weekday::Thu, 8, 0).is_empty());
        assert_eq!(store.stamp_due_slots(3000, Weekday::Wed, 8, 0).len(), 1);
    }

    #[test]
    fn failed_persist_is_not_retried_until_next_mutation() {
        let mut nvs = MemStore {
            fail_writes: true,
            ..Default::default()
        };
        let store = ConfigStore::default();
        store.mark_dirty();
        assert!(!store.flush_if_dirty(&mut nvs));
        assert!(!store.is_dirty());
    }
}
