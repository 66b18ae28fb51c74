//! Pump-table JSON codec.
//!
//! Wire format, keyed by `"bomb1"`..`"bomb3"`:
//!
//! ```json
//! { "bomb1": { "name": "Bomba 1", "calibrCoef": 1.0, "quantidadeEstoque": 1000.0,
//!              "schedules": [ { "id": 0, "time": { "hour": 8, "minute": 0 },
//!                               "dosagem": 2.5, "status": true,
//!                               "diasSemanaSelecionados": [false, true, ...] } ] } }
//! ```
//!
//! Older firmware stored a single slot flat on the pump object (`time`,
//! `dosagem`, `status`, `diasSemanaSelecionados` with no `schedules` array);
//! [`decode_legacy`] upgrades that into slot 0.
//!
//! Decoding is two-phase: parse and validate everything into a
//! [`ConfigPatch`], then [`apply_patch`] swaps whole pumps in.  A failure
//! in phase one never touches stored state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    NAME_CAPACITY, PUMP_COUNT, PumpName, PumpTable, PumpUnit, SLOTS_PER_PUMP, Schedule,
    WeekdayMask, default_name,
};
use crate::error::Error;

/// Decoded replacement for each pump; `None` leaves that pump unchanged.
pub type ConfigPatch = [Option<PumpUnit>; PUMP_COUNT];

/// Which layout a pump object uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpFormat {
    Versioned,
    Legacy,
}

// ── Wire types ────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct WireTime {
    #[serde(default)]
    hour: Option<u8>,
    #[serde(default)]
    minute: Option<u8>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSchedule {
    time: Option<WireTime>,
    dosagem: Option<f32>,
    status: Option<bool>,
    dias_semana_selecionados: Option<Vec<bool>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePump {
    name: Option<String>,
    calibr_coef: Option<f32>,
    quantidade_estoque: Option<f32>,
    schedules: Option<Vec<Option<WireSchedule>>>,
    // Legacy single-slot fields.
    time: Option<WireTime>,
    dosagem: Option<f32>,
    status: Option<bool>,
    dias_semana_selecionados: Option<Vec<bool>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutSchedule {
    id: usize,
    time: OutTime,
    dosagem: f32,
    status: bool,
    dias_semana_selecionados: [bool; 7],
}

#[derive(Serialize)]
struct OutTime {
    hour: u8,
    minute: u8,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutPump<'a> {
    name: &'a str,
    calibr_coef: f32,
    quantidade_estoque: f32,
    schedules: Vec<OutSchedule>,
}

// ── Encode ────────────────────────────────────────────────────

/// Canonical JSON for the whole table.  `last_fired_minute` is runtime
/// state and never serialized.
pub fn encode_config(table: &PumpTable) -> String {
    let mut root = Map::new();
    for (i, pump) in table.iter().enumerate() {
        let out = OutPump {
            name: pump.name.as_str(),
            calibr_coef: pump.calibration,
            quantidade_estoque: pump.stock,
            schedules: pump
                .schedules
                .iter()
                .enumerate()
                .map(|(id, s)| OutSchedule {
                    id,
                    time: OutTime {
                        hour: s.hour,
                        minute: s.minute,
                    },
                    dosagem: s.dose,
                    status: s.enabled,
                    dias_semana_selecionados: s.weekdays.0,
                })
                .collect(),
        };
        // Serializing plain structs into a Value cannot fail.
        let value = serde_json::to_value(out).unwrap_or(Value::Null);
        root.insert(pump_key(i), value);
    }
    Value::Object(root).to_string()
}

// ── Decode ────────────────────────────────────────────────────

/// Parse and validate a configuration document.
pub fn decode_config(bytes: &[u8]) -> Result<ConfigPatch, Error> {
    let root: Value =
        serde_json::from_slice(bytes).map_err(|_| Error::InvalidArgument("malformed JSON"))?;
    let Value::Object(root) = root else {
        return Err(Error::InvalidArgument("config must be a JSON object"));
    };

    let mut patch: ConfigPatch = Default::default();
    for (i, slot) in patch.iter_mut().enumerate() {
        match root.get(&pump_key(i)) {
            None | Some(Value::Null) => {}
            Some(value) => *slot = Some(decode_pump(i, value)?),
        }
    }
    Ok(patch)
}

/// Decode one pump object, detecting its layout.
pub fn decode_pump(index: usize, value: &Value) -> Result<PumpUnit, Error> {
    if !value.is_object() {
        return Err(Error::InvalidArgument("pump entry must be an object"));
    }
    let wire = WirePump::deserialize(value)
        .map_err(|_| Error::InvalidArgument("pump entry has wrong field types"))?;

    let calibration = wire.calibr_coef.unwrap_or(1.0);
    if !calibration.is_finite() || calibration <= 0.0 {
        return Err(Error::InvalidArgument("calibrCoef must be positive"));
    }
    let stock = wire.quantidade_estoque.unwrap_or(0.0);
    if !stock.is_finite() || stock < 0.0 {
        return Err(Error::InvalidArgument("quantidadeEstoque must be >= 0"));
    }

    let schedules = match pump_format(value) {
        PumpFormat::Versioned => decode_versioned(wire.schedules.as_deref().unwrap_or_default())?,
        PumpFormat::Legacy => decode_legacy(&wire)?,
    };

    Ok(PumpUnit {
        name: wire
            .name
            .as_deref()
            .map_or_else(|| default_name(index), truncate_name),
        calibration,
        stock,
        schedules,
    })
}

/// Layout of a raw pump object.  An absent or `null` `schedules` field
/// marks the flat single-slot layout.
pub fn pump_format(value: &Value) -> PumpFormat {
    match value.get("schedules") {
        None | Some(Value::Null) => PumpFormat::Legacy,
        Some(_) => PumpFormat::Versioned,
    }
}

fn decode_versioned(
    list: &[Option<WireSchedule>],
) -> Result<[Schedule; SLOTS_PER_PUMP], Error> {
    if list.len() > SLOTS_PER_PUMP {
        return Err(Error::InvalidArgument("at most 3 schedules per pump"));
    }
    let mut out = [Schedule::default(); SLOTS_PER_PUMP];
    for (slot, wire) in out.iter_mut().zip(list) {
        if let Some(w) = wire {
            *slot = decode_slot(
                w.time.as_ref(),
                w.dosagem,
                w.status,
                w.dias_semana_selecionados.as_deref(),
            )?;
        }
    }
    Ok(out)
}

/// Upgrade a flat single-slot pump object: its fields become slot 0,
/// the remaining slots take defaults.
fn decode_legacy(wire: &WirePump) -> Result<[Schedule; SLOTS_PER_PUMP], Error> {
    let mut out = [Schedule::default(); SLOTS_PER_PUMP];
    out[0] = decode_slot(
        wire.time.as_ref(),
        wire.dosagem,
        wire.status,
        wire.dias_semana_selecionados.as_deref(),
    )?;
    Ok(out)
}

fn decode_slot(
    time: Option<&WireTime>,
    dose: Option<f32>,
    enabled: Option<bool>,
    days: Option<&[bool]>,
) -> Result<Schedule, Error> {
    let hour = time.and_then(|t| t.hour).unwrap_or(0);
    let minute = time.and_then(|t| t.minute).unwrap_or(0);
    if hour > 23 {
        return Err(Error::InvalidArgument("hour must be 0-23"));
    }
    if minute > 59 {
        return Err(Error::InvalidArgument("minute must be 0-59"));
    }
    let dose = dose.unwrap_or(0.0);
    if !dose.is_finite() || dose < 0.0 {
        return Err(Error::InvalidArgument("dosagem must be >= 0"));
    }

    let mut weekdays = WeekdayMask::NONE;
    if let Some(days) = days {
        if days.len() > 7 {
            return Err(Error::InvalidArgument("at most 7 weekday flags"));
        }
        weekdays.0[..days.len()].copy_from_slice(days);
    }

    Ok(Schedule {
        hour,
        minute,
        dose,
        enabled: enabled.unwrap_or(false),
        weekdays,
        last_fired_minute: -1,
    })
}

/// Replace every pump present in `patch`.
pub fn apply_patch(table: &mut PumpTable, patch: ConfigPatch) {
    for (pump, replacement) in table.iter_mut().zip(patch) {
        if let Some(p) = replacement {
            *pump = p;
        }
    }
}

fn pump_key(index: usize) -> String {
    format!("bomb{}", index + 1)
}

fn truncate_name(raw: &str) -> PumpName {
    let mut end = raw.len().min(NAME_CAPACITY);
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    let mut name = PumpName::new();
    let _ = name.push_str(&raw[..end]);
    name
}
