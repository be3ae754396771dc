//! Simulated and scripted peripherals.
//!
//! `SimulatedBoiler` and `SimulatedPump` stand in for real hardware when no
//! serial port or GPIO is configured. The scripted types drive tests.

use crate::display::DisplayFrame;
use crate::error::{HalError, TransportError};
use crate::hal::{BusClient, DigitalInput, DisplaySink, LineSource};
use crate::timebase::{Clock, Millis, TimeBase};
use std::cell::Cell;
use std::collections::VecDeque;
use std::time::Duration;

/// Clock that only moves when told to. `sleep` advances it.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Millis>,
    slept: Cell<u64>,
}

impl ManualClock {
    pub fn new(start: Millis) -> Self {
        Self {
            now: Cell::new(start),
            slept: Cell::new(0),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }

    /// Number of `sleep` calls so far.
    pub fn sleeps(&self) -> u64 {
        self.slept.get()
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.slept.set(self.slept.get() + 1);
        self.advance(duration.as_millis() as u64);
    }
}

/// Digital input whose level is set by the test.
#[derive(Debug, Default)]
pub struct ScriptedInput {
    level: bool,
    reads: u64,
}

impl ScriptedInput {
    pub fn new(level: bool) -> Self {
        Self { level, reads: 0 }
    }

    pub fn set(&mut self, level: bool) {
        self.level = level;
    }

    pub fn reads(&self) -> u64 {
        self.reads
    }
}

impl DigitalInput for ScriptedInput {
    fn is_active(&mut self) -> Result<bool, HalError> {
        self.reads += 1;
        Ok(self.level)
    }
}

/// In-memory receive buffer fed by the test.
#[derive(Debug, Default)]
pub struct ScriptedLines {
    buffer: VecDeque<u8>,
    clears: u64,
}

impl ScriptedLines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_line(&mut self, line: &str) {
        self.buffer.extend(line.as_bytes());
        self.buffer.extend(b"\r\n");
    }

    pub fn push_raw(&mut self, bytes: &[u8]) {
        self.buffer.extend(bytes);
    }

    pub fn clears(&self) -> u64 {
        self.clears
    }
}

impl LineSource for ScriptedLines {
    fn bytes_available(&mut self) -> Result<usize, HalError> {
        Ok(self.buffer.len())
    }

    fn clear_input(&mut self) -> Result<(), HalError> {
        self.buffer.clear();
        self.clears += 1;
        Ok(())
    }

    fn read_line(&mut self) -> Result<Option<Vec<u8>>, HalError> {
        Ok(take_line(&mut self.buffer))
    }
}

fn take_line(buffer: &mut VecDeque<u8>) -> Option<Vec<u8>> {
    if buffer.is_empty() {
        return None;
    }
    let end = buffer
        .iter()
        .position(|b| *b == b'\n')
        .map_or(buffer.len(), |i| i + 1);
    Some(buffer.drain(..end).collect())
}

/// Bus that records what would have been sent.
#[derive(Debug, Default)]
pub struct RecordingBus {
    published: Vec<(String, String)>,
    pings: u64,
    polls: u64,
    reconnects: u64,
    failures_pending: u32,
    refuse_reconnect: bool,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` publish/ping/poll calls fail with a broken connection.
    pub fn fail_next(&mut self, count: u32) {
        self.failures_pending = count;
    }

    pub fn refuse_reconnect(&mut self, refuse: bool) {
        self.refuse_reconnect = refuse;
    }

    pub fn published(&self) -> &[(String, String)] {
        &self.published
    }

    pub fn published_to(&self, topic: &str) -> Vec<&str> {
        self.published
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, p)| p.as_str())
            .collect()
    }

    pub fn pings(&self) -> u64 {
        self.pings
    }

    pub fn polls(&self) -> u64 {
        self.polls
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    fn take_failure(&mut self) -> Result<(), TransportError> {
        if self.failures_pending > 0 {
            self.failures_pending -= 1;
            return Err(TransportError::Connection("broken pipe".to_string()));
        }
        Ok(())
    }
}

impl BusClient for RecordingBus {
    fn poll(&mut self) -> Result<(), TransportError> {
        self.polls += 1;
        self.take_failure()
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        self.take_failure()?;
        self.published.push((
            topic.to_string(),
            String::from_utf8_lossy(payload).into_owned(),
        ));
        Ok(())
    }

    fn ping(&mut self) -> Result<(), TransportError> {
        self.take_failure()?;
        self.pings += 1;
        Ok(())
    }

    fn reconnect(&mut self) -> Result<(), TransportError> {
        self.reconnects += 1;
        if self.refuse_reconnect {
            return Err(TransportError::NotConnected);
        }
        Ok(())
    }
}

/// Display that keeps every frame it was shown.
#[derive(Debug, Default)]
pub struct RecordingDisplay {
    frames: Vec<DisplayFrame>,
    blanks: u64,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> &[DisplayFrame] {
        &self.frames
    }

    pub fn last(&self) -> Option<&DisplayFrame> {
        self.frames.last()
    }

    pub fn blanks(&self) -> u64 {
        self.blanks
    }
}

impl DisplaySink for RecordingDisplay {
    fn show(&mut self, frame: &DisplayFrame) {
        self.frames.push(frame.clone());
    }

    fn blank(&mut self) {
        self.blanks += 1;
    }
}

/// Boiler controller with a crude thermal model, emitting one
/// `steam,target,boiler,counter,heating` line per second.
#[derive(Debug, Clone)]
pub struct SimulatedBoiler {
    timebase: TimeBase,
    buffer: VecDeque<u8>,
    next_line_at: Millis,
    line_interval_ms: u64,

    steam_temp_c: f64,
    boiler_temp_c: f64,
    target_c: f64,
    ambient_c: f64,
    heat_rate: f64,
    loss_rate: f64,
    heating: bool,
    counter: i32,
}

impl SimulatedBoiler {
    pub fn new(timebase: TimeBase) -> Self {
        Self {
            timebase,
            buffer: VecDeque::new(),
            next_line_at: 0,
            line_interval_ms: 1_000,
            steam_temp_c: 25.0,
            boiler_temp_c: 25.0,
            target_c: 124.0,
            ambient_c: 25.0,
            heat_rate: 2.5,
            loss_rate: 0.01,
            heating: true,
            counter: 1_200,
        }
    }

    fn step(&mut self, dt_s: f64) {
        let heat_in = if self.heating { self.heat_rate } else { 0.0 };
        let heat_out = self.loss_rate * (self.steam_temp_c - self.ambient_c);
        self.steam_temp_c += (heat_in - heat_out) * dt_s;
        self.boiler_temp_c += (0.75 * self.steam_temp_c - self.boiler_temp_c) * 0.2 * dt_s;

        // Bang-bang with two degrees of hysteresis.
        if self.steam_temp_c >= self.target_c {
            self.heating = false;
        } else if self.steam_temp_c < self.target_c - 2.0 {
            self.heating = true;
        }
        self.counter = (self.counter - dt_s as i32).max(0);
    }

    fn emit_due_lines(&mut self) {
        let now = self.timebase.now_ms();
        while now >= self.next_line_at {
            self.step(self.line_interval_ms as f64 / 1_000.0);
            let line = format!(
                "C1.23,{:03},{:03},{:03},{:04},{}\r\n",
                self.steam_temp_c.round() as i32,
                self.target_c.round() as i32,
                self.boiler_temp_c.round() as i32,
                self.counter,
                u8::from(self.heating)
            );
            self.buffer.extend(line.as_bytes());
            self.next_line_at += self.line_interval_ms;
        }
    }
}

impl LineSource for SimulatedBoiler {
    fn bytes_available(&mut self) -> Result<usize, HalError> {
        self.emit_due_lines();
        Ok(self.buffer.len())
    }

    fn clear_input(&mut self) -> Result<(), HalError> {
        self.buffer.clear();
        Ok(())
    }

    fn read_line(&mut self) -> Result<Option<Vec<u8>>, HalError> {
        self.emit_due_lines();
        Ok(take_line(&mut self.buffer))
    }
}

/// Reed switch that sees a shot every `period_ms`, with the contact
/// dropping out briefly while the pump pulses.
#[derive(Debug, Clone)]
pub struct SimulatedPump {
    timebase: TimeBase,
    period_ms: u64,
    shot_ms: u64,
}

impl SimulatedPump {
    pub fn new(timebase: TimeBase) -> Self {
        Self {
            timebase,
            period_ms: 60_000,
            shot_ms: 25_000,
        }
    }
}

impl DigitalInput for SimulatedPump {
    fn is_active(&mut self) -> Result<bool, HalError> {
        let phase = self.timebase.now_ms() % self.period_ms;
        if phase >= self.shot_ms {
            return Ok(false);
        }
        // Drop out for 250 ms of every second.
        Ok((phase / 250) % 4 != 3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_lines_split_on_newline() {
        let mut lines = ScriptedLines::new();
        lines.push_line("a,b");
        lines.push_raw(b"partial");
        assert_eq!(lines.read_line().unwrap(), Some(b"a,b\r\n".to_vec()));
        assert_eq!(lines.read_line().unwrap(), Some(b"partial".to_vec()));
        assert_eq!(lines.read_line().unwrap(), None);
    }

    #[test]
    fn simulated_boiler_emits_parseable_line() {
        let mut boiler = SimulatedBoiler::new(TimeBase::new());
        assert!(boiler.bytes_available().unwrap() >= 20);
        let line = boiler.read_line().unwrap().unwrap();
        let record =
            crate::telemetry::decode(&line, &crate::telemetry::FieldLayout::STEAM_FIRST);
        assert!(record.valid);
        assert_eq!(record.temp_target, Some(124));
    }

    #[test]
    fn recording_bus_fails_on_request() {
        let mut bus = RecordingBus::new();
        bus.fail_next(1);
        assert!(bus.publish("t", b"x").is_err());
        assert!(bus.publish("t", b"y").is_ok());
        assert_eq!(bus.published_to("t"), vec!["y"]);
    }
}
