//! Fuzz target: pump-table JSON decoder
//!
//! Feeds arbitrary bytes to `decode_config` and verifies:
//! - No panics under arbitrary input
//! - Any accepted document, once applied and re-encoded, decodes to the
//!   same table (the canonical encoding is a fixed point)
//! - Every decoded value is inside its validated range
//!
//! cargo fuzz run fuzz_config_decoder

#![no_main]

use aquadoser::store::codec::{apply_patch, decode_config, encode_config};
use aquadoser::store::factory_table;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(patch) = decode_config(data) else {
        return;
    };

    let mut table = factory_table();
    apply_patch(&mut table, patch);

    for pump in &table {
        assert!(pump.calibration.is_finite() && pump.calibration > 0.0);
        assert!(pump.stock.is_finite() && pump.stock >= 0.0);
        for slot in &pump.schedules {
            assert!(slot.hour <= 23 && slot.minute <= 59);
            assert!(slot.dose.is_finite() && slot.dose >= 0.0);
            assert_eq!(slot.last_fired_minute, -1);
        }
    }

    let json = encode_config(&table);
    let again = decode_config(json.as_bytes()).expect("canonical encoding must decode");
    let mut round = factory_table();
    apply_patch(&mut round, again);
    assert_eq!(round, table);
});
