use boiler_core::hal_sim::{RecordingBus, RecordingDisplay, ScriptedInput, ScriptedLines};
use boiler_core::{
    decode, ControlConfig, FieldLayout, Heating, MachineState, Monitor, Publisher,
    TelemetryPort, TelemetryRecord, Topics,
};

#[test]
fn decodes_reference_line() {
    let r = decode(b"C1.23,050,140,042,1186,1\r\n", &FieldLayout::STEAM_FIRST);
    assert!(r.valid);
    assert_eq!(r.steam_temp, Some(50));
    assert_eq!(r.temp_target, Some(140));
    assert_eq!(r.boiler_temp, Some(42));
    assert_eq!(r.counter, Some(1186));
    assert_eq!(r.heating, Heating::On);
}

#[test]
fn short_line_is_fully_unknown() {
    let r = decode(b"C1.23,050,140\r\n", &FieldLayout::STEAM_FIRST);
    assert_eq!(r, TelemetryRecord::empty());
}

#[test]
fn partial_validity_keeps_good_fields() {
    let r = decode(b"C1.23,050,XX,042,1186,1\r\n", &FieldLayout::STEAM_FIRST);
    assert!(!r.valid);
    assert_eq!(r.steam_temp, Some(50));
    assert_eq!(r.temp_target, None);
    assert_eq!(r.boiler_temp, Some(42));
    assert_eq!(r.counter, Some(1186));
    assert_eq!(r.heating, Heating::On);
}

#[test]
fn heating_codes() {
    let cases = [
        ("1", Heating::On),
        ("0", Heating::Off),
        ("2", Heating::Unknown),
    ];
    for (code, expected) in cases {
        let line = format!("C1.23,050,140,042,1186,{code}\n");
        let r = decode(line.as_bytes(), &FieldLayout::STEAM_FIRST);
        assert_eq!(r.heating, expected, "code {code}");
        assert!(r.valid, "code {code}");
    }
}

#[test]
fn stale_fallback_reports_every_known_field() {
    let mut state = MachineState::new(0);
    let good = decode(b"C1.23,050,140,042,1186,1\n", &FieldLayout::STEAM_FIRST);
    state.merge(&good, 0, 5_000);

    let changes = state.merge(&TelemetryRecord::empty(), 5_001, 5_000);
    assert_eq!(changes.len(), 5);
    assert!(changes.is_offline());
}

#[test]
fn end_to_end_pump_flip_with_telemetry() {
    let config = ControlConfig {
        hold_ms: 700,
        ..ControlConfig::default()
    };
    let mut monitor = Monitor::new(
        ScriptedInput::new(true),
        TelemetryPort::new(ScriptedLines::new(), FieldLayout::STEAM_FIRST),
        Publisher::new(RecordingBus::new(), Topics::default(), 0),
        RecordingDisplay::new(),
        config,
        0,
    );

    monitor.step(0).unwrap();
    monitor.pump_input_mut().set(false);
    monitor
        .line_source_mut()
        .push_line("C1.23,050,140,042,1186,1");

    // First inactive sample at 10 ms.
    let mut t = 10;
    while t < 710 {
        assert!(monitor.step(t).unwrap().pump_active, "t={t}");
        monitor
            .line_source_mut()
            .push_line("C1.23,050,140,042,1186,1");
        t += 50;
    }
    assert!(!monitor.step(710).unwrap().pump_active);

    let bus = monitor.publisher().bus();
    assert_eq!(bus.published_to("boiler/pump"), vec!["off"]);
    assert_eq!(bus.published_to("boiler/telemetry").len(), 1);
}
