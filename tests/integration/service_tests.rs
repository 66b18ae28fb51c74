//! DoserService end-to-end tests against the mock rig.

use aquadoser::app::commands::AppCommand;
use aquadoser::app::events::AppEvent;
use aquadoser::app::service::DoserService;
use aquadoser::config::ControllerConfig;
use aquadoser::dosing::{DoseOrigin, ExecutorState};
use aquadoser::error::Error;
use aquadoser::indicator::{COLOUR_DOSING, COLOUR_READY, IndicatorMode};
use aquadoser::network::StationRole;
use aquadoser::store::{ConfigStore, STORE_KEY, STORE_NAMESPACE};

use crate::mock_hw::{Rig, wednesday};

fn service(rig: &mut Rig) -> DoserService {
    let store = ConfigStore::load(&mut rig.nvs);
    let mut svc = DoserService::new(ControllerConfig::default(), store, true);
    svc.start(&rig.hw, &mut rig.events);
    svc
}

#[test]
fn manual_dose_runs_for_calibrated_time_and_is_logged() {
    let mut rig = Rig::new(Some(wednesday(10, 0, 0)));
    let mut svc = service(&mut rig);
    let handle = svc.handle();

    handle
        .submit_dose(2, 2.0, DoseOrigin::Manual, rig.hw.now_ms)
        .unwrap();
    rig.run(&mut svc, 50, 60);

    let periods = rig.hw.on_periods(1);
    assert_eq!(periods.len(), 1);
    let (on, off) = periods[0];
    assert_eq!(off - on, 1400);

    let pump = svc.store().pump(1).unwrap();
    assert_eq!(pump.stock, 998.0);
    assert!(rig.nvs.blob(STORE_NAMESPACE, STORE_KEY).is_some());

    assert_eq!(rig.sink.sent.len(), 1);
    let entry = &rig.sink.sent[0];
    assert_eq!(entry.bomba, "Bomba 2");
    assert_eq!(entry.origem, "Manual");
    assert_eq!(entry.dosagem, 2.0);
    assert_eq!(svc.pending_records(), 0);
}

#[test]
fn doses_never_overlap() {
    let mut rig = Rig::new(Some(wednesday(10, 0, 0)));
    let mut svc = service(&mut rig);
    let handle = svc.handle();

    for pump in 1..=3 {
        handle
            .submit_dose(pump, 1.0, DoseOrigin::Api, rig.hw.now_ms)
            .unwrap();
    }
    rig.run(&mut svc, 50, 100);

    assert_eq!(rig.hw.max_concurrent, 1);
    let starts: Vec<u64> = (0..3).map(|p| rig.hw.on_periods(p)[0].0).collect();
    assert!(starts[0] < starts[1] && starts[1] < starts[2]);
    assert_eq!(
        rig.events
            .count(|e| matches!(e, AppEvent::DoseCompleted { .. })),
        3
    );
}

#[test]
fn dose_queue_rejects_beyond_capacity() {
    let mut rig = Rig::new(Some(wednesday(10, 0, 0)));
    let svc = service(&mut rig);
    let handle = svc.handle();

    for _ in 0..10 {
        handle.submit_dose(1, 0.5, DoseOrigin::Api, 0).unwrap();
    }
    assert_eq!(
        handle.submit_dose(1, 0.5, DoseOrigin::Api, 0),
        Err(Error::QueueFull)
    );
    assert_eq!(svc.pending_requests(), 10);
}

#[test]
fn invalid_dose_requests_change_nothing() {
    let mut rig = Rig::new(Some(wednesday(10, 0, 0)));
    let mut svc = service(&mut rig);

    for (pump, dose) in [(0u8, 1.0f32), (4, 1.0), (1, 0.0), (1, -2.0), (1, f32::NAN)] {
        let res = svc.handle_command(
            AppCommand::Dose {
                pump,
                dose,
                origin: DoseOrigin::Api,
            },
            &mut rig.hw,
        );
        assert!(matches!(res, Err(Error::InvalidArgument(_))), "{pump} {dose}");
    }
    assert_eq!(svc.pending_requests(), 0);
}

#[test]
fn local_client_suspends_station_and_telemetry() {
    let mut rig = Rig::new(Some(wednesday(10, 0, 0)));
    let mut svc = service(&mut rig);
    let handle = svc.handle();

    rig.run(&mut svc, 50, 2);
    assert_eq!(svc.station_role(), StationRole::Active);
    assert_eq!(rig.sink.begins, 1);

    handle.on_client_connect();
    rig.run(&mut svc, 50, 1);
    assert_eq!(svc.station_role(), StationRole::Inactive);
    assert_eq!(rig.net.disconnects, 1);

    handle
        .submit_dose(1, 1.0, DoseOrigin::Manual, rig.hw.now_ms)
        .unwrap();
    rig.run(&mut svc, 50, 40);
    assert_eq!(svc.pending_records(), 1);
    assert!(rig.sink.sent.is_empty());

    handle.on_client_disconnect();
    rig.run(&mut svc, 50, 20);
    assert_eq!(svc.station_role(), StationRole::Active);
    assert_eq!(rig.net.connects, 2);
    assert_eq!(rig.sink.begins, 1);
    assert_eq!(rig.sink.sent.len(), 1);
    assert_eq!(svc.pending_records(), 0);
}

#[test]
fn telemetry_retries_until_delivered_once() {
    let mut rig = Rig::new(Some(wednesday(10, 0, 0)));
    rig.sink.fail_next = 3;
    let mut svc = service(&mut rig);

    svc.handle()
        .submit_dose(3, 1.0, DoseOrigin::Api, rig.hw.now_ms)
        .unwrap();
    rig.run(&mut svc, 50, 100);

    assert_eq!(rig.sink.sent.len(), 1);
    assert_eq!(rig.sink.attempts, 4);
    assert_eq!(rig.sink.sent[0].origem, "Teste");
    assert_eq!(svc.pending_records(), 0);
}

#[test]
fn remote_log_waits_while_a_pump_runs() {
    let mut rig = Rig::new(Some(wednesday(10, 0, 0)));
    rig.sink.fail_next = 2;
    let mut svc = service(&mut rig);
    let handle = svc.handle();

    handle
        .submit_dose(1, 1.0, DoseOrigin::Manual, rig.hw.now_ms)
        .unwrap();
    handle
        .submit_dose(2, 2.0, DoseOrigin::Manual, rig.hw.now_ms)
        .unwrap();

    let mut attempts = rig.sink.attempts;
    for _ in 0..200 {
        rig.hw.advance(50);
        rig.tick(&mut svc);
        if rig.sink.attempts > attempts {
            attempts = rig.sink.attempts;
            assert!(
                rig.hw.outputs.iter().all(|on| !on),
                "send attempted with a pump on at {} ms",
                rig.hw.now_ms
            );
        }
    }

    let lengths: Vec<u64> = (0..2)
        .map(|p| {
            let periods = rig.hw.on_periods(p);
            assert_eq!(periods.len(), 1);
            periods[0].1 - periods[0].0
        })
        .collect();
    assert_eq!(lengths, vec![700, 1400]);
    assert_eq!(rig.sink.sent.len(), 2);
    assert_eq!(svc.pending_records(), 0);
}

#[test]
fn network_time_sync_follows_station_role() {
    let mut rig = Rig::new(Some(wednesday(10, 0, 0)));
    let mut svc = service(&mut rig);
    let handle = svc.handle();

    rig.run(&mut svc, 50, 2);
    assert_eq!(rig.hw.syncs, vec![true]);

    handle.on_client_connect();
    rig.run(&mut svc, 50, 2);
    assert_eq!(rig.hw.syncs, vec![true, false]);

    handle.on_client_disconnect();
    rig.run(&mut svc, 50, 2);
    assert_eq!(rig.hw.syncs, vec![true, false, true]);
}

#[test]
fn ap_only_never_syncs_network_time() {
    let mut rig = Rig::new(None);
    let store = ConfigStore::load(&mut rig.nvs);
    let config = ControllerConfig {
        ap_only: true,
        ..ControllerConfig::default()
    };
    let mut svc = DoserService::new(config, store, true);
    svc.start(&rig.hw, &mut rig.events);

    rig.run(&mut svc, 50, 20);
    assert_eq!(svc.station_role(), StationRole::Inactive);
    assert!(!rig.hw.syncs.contains(&true));
    assert_eq!(rig.net.connects, 0);
}

#[test]
fn set_time_accepts_valid_and_rejects_garbage() {
    let mut rig = Rig::new(None);
    let mut svc = service(&mut rig);

    svc.handle_command(AppCommand::SetTime("06/03/2024 08:15".into()), &mut rig.hw)
        .unwrap();
    assert_eq!(rig.hw.wall, Some(wednesday(8, 15, 0)));

    for bad in ["2024-03-06 08:15", "32/01/2024 10:00", "06/03/2024", ""] {
        assert!(svc
            .handle_command(AppCommand::SetTime(bad.into()), &mut rig.hw)
            .is_err());
    }
    assert_eq!(rig.hw.wall, Some(wednesday(8, 15, 0)));
}

#[test]
fn indicator_tracks_readiness_and_dosing() {
    let mut rig = Rig::new(None);
    let mut svc = service(&mut rig);

    rig.run(&mut svc, 50, 3);
    assert_eq!(svc.indicator_mode(), IndicatorMode::Booting);

    svc.set_time(&mut rig.hw, "06/03/2024 10:00").unwrap();
    rig.run(&mut svc, 50, 1);
    assert_eq!(svc.indicator_mode(), IndicatorMode::Ready);
    assert_eq!(rig.hw.last_colour(), Some(COLOUR_READY));

    svc.handle()
        .submit_dose(1, 1.0, DoseOrigin::Manual, rig.hw.now_ms)
        .unwrap();
    rig.run(&mut svc, 50, 1);
    assert_eq!(svc.indicator_mode(), IndicatorMode::Dosing);
    assert_eq!(rig.hw.last_colour(), Some(COLOUR_DOSING));

    rig.net.drop_link();
    rig.run(&mut svc, 50, 20);
    assert_eq!(svc.executor_state(), ExecutorState::Idle);
    assert_eq!(svc.indicator_mode(), IndicatorMode::NoNetwork);
}

#[test]
fn applied_config_is_flushed_on_next_tick() {
    let mut rig = Rig::new(Some(wednesday(10, 0, 0)));
    let mut svc = service(&mut rig);
    let writes_before = rig.nvs.writes;

    svc.handle()
        .apply_config_json(r#"{"bomb1":{"name":"Calcio","calibrCoef":1.2,"quantidadeEstoque":250}}"#)
        .unwrap();
    assert_eq!(rig.nvs.writes, writes_before);

    rig.run(&mut svc, 50, 1);
    assert_eq!(rig.nvs.writes, writes_before + 1);
    let blob = rig.nvs.blob(STORE_NAMESPACE, STORE_KEY).unwrap();
    assert!(std::str::from_utf8(blob).unwrap().contains("Calcio"));
    assert!(rig
        .events
        .events
        .contains(&AppEvent::ConfigPersisted));
}

#[test]
fn unready_storage_skips_deferred_flush() {
    let mut rig = Rig::new(Some(wednesday(10, 0, 0)));
    let store = ConfigStore::load(&mut rig.nvs);
    let mut svc = DoserService::new(ControllerConfig::default(), store, false);
    let writes_before = rig.nvs.writes;

    svc.handle()
        .apply_config_json(r#"{"bomb2":{"name":"Magnesio"}}"#)
        .unwrap();
    rig.run(&mut svc, 50, 5);

    assert_eq!(rig.nvs.writes, writes_before);
    assert_eq!(svc.indicator_mode(), IndicatorMode::Booting);
    assert_eq!(svc.store().pump(1).unwrap().name.as_str(), "Magnesio");
}

#[test]
fn malformed_config_is_rejected_without_mutation() {
    let mut rig = Rig::new(Some(wednesday(10, 0, 0)));
    let svc = service(&mut rig);
    let before = svc.handle().config_json();

    for bad in [
        "not json",
        "[1,2,3]",
        r#"{"bomb1":{"calibrCoef":-1}}"#,
        r#"{"bomb1":{"schedules":[{"time":{"hour":25,"minute":0}}]}}"#,
    ] {
        assert!(svc.handle().apply_config_json(bad).is_err(), "{bad}");
    }
    assert_eq!(svc.handle().config_json(), before);
    assert!(!svc.store().is_dirty());
}

#[test]
fn health_snapshot_reports_live_state() {
    let mut rig = Rig::new(Some(wednesday(9, 30, 0)));
    let mut svc = service(&mut rig);
    rig.run(&mut svc, 50, 2);

    svc.handle()
        .submit_dose(2, 1.0, DoseOrigin::Manual, rig.hw.now_ms)
        .unwrap();
    rig.run(&mut svc, 50, 1);

    let health = svc.health(&rig.hw, &rig.net, &rig.sink);
    assert!(health.time.starts_with("06/03/2024 09:30"));
    assert!(health.wifi.connected);
    assert_eq!(health.wifi.rssi, -55);
    assert_eq!(health.ap.ssid, "AquaBalancePro");
    assert!(health.telemetry.ready);
    assert!(health.executor.busy);
    assert_eq!(health.executor.pump, Some(2));
    assert_eq!(health.station_role, "active");

    let json = serde_json::to_value(&health).unwrap();
    assert_eq!(json["ap"]["ip"], "192.168.4.1");
    assert_eq!(json["local_clients"], 0);
}
