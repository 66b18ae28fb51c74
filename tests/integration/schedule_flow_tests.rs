//! Schedule engine → dose queue → executor, driven through the service.

use aquadoser::app::commands::AppCommand;
use aquadoser::app::events::AppEvent;
use aquadoser::app::service::DoserService;
use aquadoser::config::ControllerConfig;
use aquadoser::store::{ConfigStore, STORE_KEY, STORE_NAMESPACE};

use crate::mock_hw::{MockNvs, Rig, wednesday};

/// Pump 1, slot 0: 08:00 on Wednesdays, 1.5 units.
const WEDNESDAY_0800: &str = r#"{
    "bomb1": {
        "name": "Alcalinidade",
        "calibrCoef": 1.0,
        "quantidadeEstoque": 500,
        "schedules": [
            { "id": 0, "time": { "hour": 8, "minute": 0 }, "dosagem": 1.5, "status": true,
              "diasSemanaSelecionados": [false, false, false, true, false, false, false] }
        ]
    }
}"#;

fn configured(rig: &mut Rig, json: &str) -> DoserService {
    let store = ConfigStore::load(&mut rig.nvs);
    let svc = DoserService::new(ControllerConfig::default(), store, true);
    svc.handle().apply_config_json(json).unwrap();
    svc
}

fn fired(rig: &Rig) -> usize {
    rig.events
        .events
        .iter()
        .map(|e| match e {
            AppEvent::SchedulesFired { count } => *count,
            _ => 0,
        })
        .sum()
}

#[test]
fn slot_fires_once_per_matching_minute() {
    let mut rig = Rig::new(Some(wednesday(7, 59, 50)));
    let mut svc = configured(&mut rig, WEDNESDAY_0800);

    // One evaluation per second, well past the whole 08:00 minute.
    rig.run(&mut svc, 1000, 80);

    assert_eq!(fired(&rig), 1);
    assert_eq!(rig.hw.on_periods(0).len(), 1);
    assert_eq!(svc.store().pump(0).unwrap().stock, 498.5);
    assert_eq!(rig.sink.sent.len(), 1);
    assert_eq!(rig.sink.sent[0].origem, "Programado");
    assert_eq!(rig.sink.sent[0].bomba, "Alcalinidade");
    assert_eq!(rig.sink.sent[0].timestamp, "06/03/2024 08:00");
}

#[test]
fn slot_fires_again_the_following_week() {
    let mut rig = Rig::new(Some(wednesday(7, 59, 50)));
    let mut svc = configured(&mut rig, WEDNESDAY_0800);
    rig.run(&mut svc, 1000, 80);
    assert_eq!(fired(&rig), 1);

    svc.handle_command(AppCommand::SetTime("13/03/2024 07:59:50".into()), &mut rig.hw)
        .unwrap();
    rig.run(&mut svc, 1000, 80);

    assert_eq!(fired(&rig), 2);
    assert_eq!(rig.hw.on_periods(0).len(), 2);
}

#[test]
fn other_weekdays_do_not_fire() {
    let mut rig = Rig::new(Some(wednesday(7, 59, 50)));
    let mut svc = configured(&mut rig, WEDNESDAY_0800);
    svc.set_time(&mut rig.hw, "07/03/2024 07:59:50").unwrap();

    rig.run(&mut svc, 1000, 80);
    assert_eq!(fired(&rig), 0);
    assert!(rig.hw.output_calls.is_empty());
}

#[test]
fn rewinding_into_a_fired_minute_does_not_double_dose() {
    let mut rig = Rig::new(Some(wednesday(7, 59, 50)));
    let mut svc = configured(&mut rig, WEDNESDAY_0800);
    rig.run(&mut svc, 1000, 20);
    assert_eq!(fired(&rig), 1);

    svc.set_time(&mut rig.hw, "06/03/2024 07:59:55").unwrap();
    rig.run(&mut svc, 1000, 30);
    assert_eq!(fired(&rig), 1);
    assert_eq!(rig.hw.on_periods(0).len(), 1);
}

#[test]
fn unset_clock_never_fires() {
    let mut rig = Rig::new(None);
    let mut svc = configured(&mut rig, WEDNESDAY_0800);
    rig.run(&mut svc, 1000, 120);

    assert_eq!(fired(&rig), 0);
    assert_eq!(svc.pending_requests(), 0);
}

#[test]
fn disabled_slot_is_ignored() {
    let mut rig = Rig::new(Some(wednesday(7, 59, 50)));
    let json = WEDNESDAY_0800.replace("\"status\": true", "\"status\": false");
    let mut svc = configured(&mut rig, &json);
    rig.run(&mut svc, 1000, 80);
    assert_eq!(fired(&rig), 0);
}

#[test]
fn legacy_blob_is_upgraded_and_scheduled() {
    let legacy = br#"{"bomb2":{"name":"Calcio","calibrCoef":2.0,"quantidadeEstoque":100,
        "time":{"hour":8,"minute":0},"dosagem":1.0,"status":true,
        "diasSemanaSelecionados":[true,true,true,true,true,true,true]}}"#;
    let mut rig = Rig::new(Some(wednesday(7, 59, 50)));
    rig.nvs = MockNvs::with_blob(STORE_NAMESPACE, STORE_KEY, legacy);

    let store = ConfigStore::load(&mut rig.nvs);
    let pump = store.pump(1).unwrap();
    assert_eq!(pump.name.as_str(), "Calcio");
    assert!(pump.schedules[0].enabled);
    assert!(!pump.schedules[1].enabled && !pump.schedules[2].enabled);
    // Absent pumps come back with default names and no stock.
    assert_eq!(store.pump(0).unwrap().name.as_str(), "Bomba 1");

    let mut svc = DoserService::new(ControllerConfig::default(), store, true);
    rig.run(&mut svc, 1000, 80);

    let periods = rig.hw.on_periods(1);
    assert_eq!(periods.len(), 1);
    // 1.0 units at coefficient 2.0 is 1400 ms, rounded up to the tick.
    assert_eq!(periods[0].1 - periods[0].0, 2000);
    assert_eq!(svc.store().pump(1).unwrap().stock, 99.0);
}
