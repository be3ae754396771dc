use boiler_core::hal_sim::ScriptedLines;
use boiler_core::{ControlConfig, FieldLayout, Monitor, Publisher, TelemetryPort, Topics};
use boiler_io::{LogBus, LogDisplay, SysfsInput};
use std::fs;

#[test]
fn reed_switch_file_drives_pump_events() {
    let dir = tempfile::tempdir().unwrap();
    let value = dir.path().join("value");
    fs::write(&value, "1\n").unwrap();

    let config = ControlConfig {
        hold_ms: 700,
        ..ControlConfig::default()
    };
    let mut monitor = Monitor::new(
        SysfsInput::from_path(&value, true),
        TelemetryPort::new(ScriptedLines::new(), FieldLayout::STEAM_FIRST),
        Publisher::new(LogBus::new(), Topics::default(), 0),
        LogDisplay::new(),
        config,
        0,
    );

    assert!(!monitor.step(0).unwrap().pump_active);

    // Switch closes: the line is pulled low.
    fs::write(&value, "0\n").unwrap();
    assert!(monitor.step(200).unwrap().pump_changed);

    fs::write(&value, "1\n").unwrap();
    assert!(monitor.step(400).unwrap().pump_active);
    assert!(monitor.step(1_100).unwrap().pump_changed);

    assert_eq!(monitor.publisher().bus().published(), 2);
    assert_eq!(monitor.stats().pump_transitions, 2);
    assert!(monitor.display().last().is_some());
}

#[test]
fn unreadable_switch_ends_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut monitor = Monitor::new(
        SysfsInput::from_path(dir.path().join("missing"), true),
        TelemetryPort::new(ScriptedLines::new(), FieldLayout::STEAM_FIRST),
        Publisher::new(LogBus::new(), Topics::default(), 0),
        LogDisplay::new(),
        ControlConfig::default(),
        0,
    );
    assert!(matches!(
        monitor.step(0),
        Err(boiler_core::MonitorError::Hal(_))
    ));
}
