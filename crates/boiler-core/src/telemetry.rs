//! Decoder for the controller's serial telemetry line.
//!
//! The controller emits `version,f1,f2,f3,f4,f5` roughly once a second.
//! Decoding is best effort: each field fails on its own, the record keeps
//! whatever parsed, and `valid` tells the aggregator whether to trust it.

use crate::error::HalError;
use crate::hal::LineSource;
use log::{debug, trace, warn};
use std::fmt;
use std::str::FromStr;

/// Fields per line including the leading version.
pub const FIELD_COUNT: usize = 6;
/// Below this many buffered bytes a full line cannot be waiting yet.
pub const MIN_LINE_BYTES: usize = 20;
/// Backlog above which a non-realtime read drops stale input first.
pub const FLUSH_THRESHOLD_BYTES: usize = 32;

/// Boiler heating element state as reported by the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Heating {
    #[default]
    Unknown,
    On,
    Off,
}

impl Heating {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Heating::On,
            0 => Heating::Off,
            _ => Heating::Unknown,
        }
    }

    pub fn is_known(self) -> bool {
        !matches!(self, Heating::Unknown)
    }

    /// `Some(1)` / `Some(0)` for a known state.
    pub fn as_flag(self) -> Option<u8> {
        match self {
            Heating::On => Some(1),
            Heating::Off => Some(0),
            Heating::Unknown => None,
        }
    }
}

/// Semantic meaning of one of the four numeric serial fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericField {
    SteamTemp,
    TempTarget,
    BoilerTemp,
    Counter,
}

impl NumericField {
    pub const ALL: [NumericField; 4] = [
        NumericField::SteamTemp,
        NumericField::TempTarget,
        NumericField::BoilerTemp,
        NumericField::Counter,
    ];

    pub fn name(self) -> &'static str {
        match self {
            NumericField::SteamTemp => "steam_temp",
            NumericField::TempTarget => "temp_target",
            NumericField::BoilerTemp => "boiler_temp",
            NumericField::Counter => "counter",
        }
    }
}

impl FromStr for NumericField {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "steam" | "steam_temp" => Ok(NumericField::SteamTemp),
            "target" | "temp_target" => Ok(NumericField::TempTarget),
            "boiler" | "boiler_temp" => Ok(NumericField::BoilerTemp),
            "counter" => Ok(NumericField::Counter),
            other => Err(LayoutError::UnknownField(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("unknown telemetry field {0:?}")]
    UnknownField(String),
    #[error("field layout needs exactly 4 entries, got {0}")]
    WrongLength(usize),
    #[error("telemetry field {0} appears more than once")]
    Duplicate(&'static str),
}

/// Positional mapping of serial fields f1..f4 onto their meaning.
///
/// Controller firmwares disagree on the order, so this is configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    slots: [NumericField; 4],
}

impl FieldLayout {
    /// `steam,target,boiler,counter`
    pub const STEAM_FIRST: FieldLayout = FieldLayout {
        slots: [
            NumericField::SteamTemp,
            NumericField::TempTarget,
            NumericField::BoilerTemp,
            NumericField::Counter,
        ],
    };

    /// `boiler,target,steam,counter`
    pub const BOILER_FIRST: FieldLayout = FieldLayout {
        slots: [
            NumericField::BoilerTemp,
            NumericField::TempTarget,
            NumericField::SteamTemp,
            NumericField::Counter,
        ],
    };

    pub fn new(slots: [NumericField; 4]) -> Result<Self, LayoutError> {
        for (i, field) in slots.iter().enumerate() {
            if slots[..i].contains(field) {
                return Err(LayoutError::Duplicate(field.name()));
            }
        }
        Ok(Self { slots })
    }

    pub fn slots(&self) -> [NumericField; 4] {
        self.slots
    }
}

impl Default for FieldLayout {
    fn default() -> Self {
        Self::STEAM_FIRST
    }
}

impl FromStr for FieldLayout {
    type Err = LayoutError;

    /// Accepts `steam-first`, `boiler-first`, or four comma separated names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "steam-first" => return Ok(Self::STEAM_FIRST),
            "boiler-first" => return Ok(Self::BOILER_FIRST),
            _ => {}
        }
        let parts = s
            .split(',')
            .map(NumericField::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        let slots: [NumericField; 4] = parts
            .try_into()
            .map_err(|v: Vec<NumericField>| LayoutError::WrongLength(v.len()))?;
        Self::new(slots)
    }
}

impl fmt::Display for FieldLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.slots.iter().map(|s| s.name()).collect();
        write!(f, "{}", names.join(","))
    }
}

/// One decoded line. Consumed once by the aggregator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetryRecord {
    pub steam_temp: Option<i32>,
    pub temp_target: Option<i32>,
    pub boiler_temp: Option<i32>,
    pub counter: Option<i32>,
    pub heating: Heating,
    pub valid: bool,
}

impl TelemetryRecord {
    /// No data: invalid with every field unknown.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, field: NumericField) -> Option<i32> {
        match field {
            NumericField::SteamTemp => self.steam_temp,
            NumericField::TempTarget => self.temp_target,
            NumericField::BoilerTemp => self.boiler_temp,
            NumericField::Counter => self.counter,
        }
    }

    fn set(&mut self, field: NumericField, value: Option<i32>) {
        match field {
            NumericField::SteamTemp => self.steam_temp = value,
            NumericField::TempTarget => self.temp_target = value,
            NumericField::BoilerTemp => self.boiler_temp = value,
            NumericField::Counter => self.counter = value,
        }
    }
}

/// Decodes one raw line. Never fails: problems are logged and reflected in
/// `valid` and the unknown fields.
pub fn decode(line: &[u8], layout: &FieldLayout) -> TelemetryRecord {
    let text = match printable_ascii(line) {
        Some(text) => text,
        None => {
            warn!("discarding undecodable telemetry line: {:?}", line);
            return TelemetryRecord::empty();
        }
    };

    let parts: Vec<&str> = text.split(',').collect();
    if parts.len() != FIELD_COUNT {
        warn!(
            "discarding telemetry line with {} fields (expected {}): {:?}",
            parts.len(),
            FIELD_COUNT,
            text
        );
        return TelemetryRecord::empty();
    }

    trace!("controller firmware version {}", parts[0]);

    let mut record = TelemetryRecord {
        valid: true,
        ..TelemetryRecord::empty()
    };

    for (raw, field) in parts[1..5].iter().zip(layout.slots()) {
        match parse_int(raw) {
            Some(value) => record.set(field, Some(value)),
            None => {
                warn!("invalid {} value {:?}", field.name(), raw);
                record.valid = false;
            }
        }
    }

    match parse_int(parts[5]) {
        Some(code) => {
            record.heating = Heating::from_code(code);
            if !record.heating.is_known() {
                warn!("unknown heating state code {}", code);
            }
        }
        None => {
            warn!("invalid heating state {:?}", parts[5]);
            record.valid = false;
        }
    }

    record
}

fn printable_ascii(line: &[u8]) -> Option<&str> {
    let end = line
        .iter()
        .rposition(|b| *b != b'\n' && *b != b'\r')
        .map_or(0, |i| i + 1);
    let body = &line[..end];
    if !body.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        return None;
    }
    std::str::from_utf8(body).ok()
}

fn parse_int(raw: &str) -> Option<i32> {
    raw.trim().parse::<i32>().ok()
}

/// What one poll of the serial port produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    /// Not enough buffered input for a full line.
    NoData,
    /// A line arrived but was empty or unreadable.
    Discarded,
    Decoded(TelemetryRecord),
}

impl LineOutcome {
    pub fn record(&self) -> TelemetryRecord {
        match self {
            LineOutcome::Decoded(record) => *record,
            LineOutcome::NoData | LineOutcome::Discarded => TelemetryRecord::empty(),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, LineOutcome::Decoded(r) if r.valid)
    }
}

/// Reads lines from a bounded-buffer source without ever blocking on an
/// empty buffer.
pub struct TelemetryPort<L: LineSource> {
    source: L,
    layout: FieldLayout,
}

impl<L: LineSource> TelemetryPort<L> {
    pub fn new(source: L, layout: FieldLayout) -> Self {
        Self { source, layout }
    }

    pub fn source(&self) -> &L {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut L {
        &mut self.source
    }

    /// In realtime mode a backlog is kept so no line is lost during a shot;
    /// otherwise an old backlog is flushed to bound latency.
    pub fn poll(&mut self, realtime: bool) -> LineOutcome {
        match self.try_poll(realtime) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("serial read failed: {}", e);
                LineOutcome::Discarded
            }
        }
    }

    fn try_poll(&mut self, realtime: bool) -> Result<LineOutcome, HalError> {
        let available = self.source.bytes_available()?;
        if available < MIN_LINE_BYTES {
            return Ok(LineOutcome::NoData);
        }

        if !realtime && available > FLUSH_THRESHOLD_BYTES {
            debug!("flushing {} stale serial bytes", available);
            self.source.clear_input()?;
        }

        let line = match self.source.read_line()? {
            None => return Ok(LineOutcome::NoData),
            Some(line) if line.is_empty() || line[0] == 0 => return Ok(LineOutcome::Discarded),
            Some(line) => line,
        };
        trace!("serial line {:?}", String::from_utf8_lossy(&line));

        Ok(LineOutcome::Decoded(decode(&line, &self.layout)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal_sim::ScriptedLines;

    fn steam_first(line: &str) -> TelemetryRecord {
        decode(line.as_bytes(), &FieldLayout::STEAM_FIRST)
    }

    #[test]
    fn decodes_complete_line() {
        let r = steam_first("C1.23,050,140,042,1186,1\r\n");
        assert!(r.valid);
        assert_eq!(r.steam_temp, Some(50));
        assert_eq!(r.temp_target, Some(140));
        assert_eq!(r.boiler_temp, Some(42));
        assert_eq!(r.counter, Some(1186));
        assert_eq!(r.heating, Heating::On);
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert_eq!(steam_first("C1.23,050,140"), TelemetryRecord::empty());
        assert_eq!(
            steam_first("C1.23,050,140,042,1186,1,9"),
            TelemetryRecord::empty()
        );
    }

    #[test]
    fn keeps_good_fields_on_partial_failure() {
        let r = steam_first("C1.23,050,XX,042,1186,1");
        assert!(!r.valid);
        assert_eq!(r.steam_temp, Some(50));
        assert_eq!(r.temp_target, None);
        assert_eq!(r.boiler_temp, Some(42));
        assert_eq!(r.counter, Some(1186));
        assert_eq!(r.heating, Heating::On);
    }

    #[test]
    fn maps_heating_codes() {
        assert_eq!(steam_first("V,1,2,3,4,1").heating, Heating::On);
        assert_eq!(steam_first("V,1,2,3,4,0").heating, Heating::Off);

        let unknown = steam_first("V,1,2,3,4,2");
        assert_eq!(unknown.heating, Heating::Unknown);
        assert!(unknown.valid);

        let garbage = steam_first("V,1,2,3,4,on");
        assert_eq!(garbage.heating, Heating::Unknown);
        assert!(!garbage.valid);
    }

    #[test]
    fn rejects_non_ascii_and_control_bytes() {
        let r = decode(b"C1.23,05\xff,140,042,1186,1\n", &FieldLayout::STEAM_FIRST);
        assert_eq!(r, TelemetryRecord::empty());
        let r = decode(b"C1.23,050,\x07140,042,1186,1\n", &FieldLayout::STEAM_FIRST);
        assert_eq!(r, TelemetryRecord::empty());
    }

    #[test]
    fn out_of_range_integer_invalidates_field() {
        let r = steam_first("V,99999999999,2,3,4,0");
        assert!(!r.valid);
        assert_eq!(r.steam_temp, None);
        assert_eq!(r.temp_target, Some(2));
    }

    #[test]
    fn boiler_first_layout_remaps_positions() {
        let r = decode(b"C1.23,093,116,124,0840,0\n", &FieldLayout::BOILER_FIRST);
        assert!(r.valid);
        assert_eq!(r.boiler_temp, Some(93));
        assert_eq!(r.temp_target, Some(116));
        assert_eq!(r.steam_temp, Some(124));
        assert_eq!(r.counter, Some(840));
        assert_eq!(r.heating, Heating::Off);
    }

    #[test]
    fn parses_layout_strings() {
        assert_eq!(
            "boiler-first".parse::<FieldLayout>().unwrap(),
            FieldLayout::BOILER_FIRST
        );
        assert_eq!(
            "steam,target,boiler,counter".parse::<FieldLayout>().unwrap(),
            FieldLayout::STEAM_FIRST
        );
        assert_eq!(
            "steam,steam,boiler,counter".parse::<FieldLayout>(),
            Err(LayoutError::Duplicate("steam_temp"))
        );
        assert_eq!(
            "steam,target".parse::<FieldLayout>(),
            Err(LayoutError::WrongLength(2))
        );
        assert!(matches!(
            "steam,target,boiler,pressure".parse::<FieldLayout>(),
            Err(LayoutError::UnknownField(_))
        ));
        assert_eq!(
            FieldLayout::BOILER_FIRST.to_string(),
            "boiler_temp,temp_target,steam_temp,counter"
        );
    }

    #[test]
    fn port_reports_no_data_below_min_bytes() {
        let mut lines = ScriptedLines::new();
        lines.push_raw(b"C1.23,050");
        let mut port = TelemetryPort::new(lines, FieldLayout::default());
        assert_eq!(port.poll(false), LineOutcome::NoData);
        assert_eq!(port.source().clears(), 0);
    }

    #[test]
    fn port_flushes_backlog_when_not_realtime() {
        let mut lines = ScriptedLines::new();
        lines.push_line("C1.23,050,140,042,1186,1");
        lines.push_line("C1.23,051,140,043,1185,1");
        let mut port = TelemetryPort::new(lines, FieldLayout::default());

        // Backlog dropped, nothing new arrives before the read times out.
        assert_eq!(port.poll(false), LineOutcome::NoData);
        assert_eq!(port.source().clears(), 1);
    }

    #[test]
    fn port_keeps_backlog_in_realtime_mode() {
        let mut lines = ScriptedLines::new();
        lines.push_line("C1.23,050,140,042,1186,1");
        lines.push_line("C1.23,051,140,043,1185,1");
        let mut port = TelemetryPort::new(lines, FieldLayout::default());

        let first = port.poll(true);
        assert!(first.is_valid());
        assert_eq!(first.record().steam_temp, Some(50));
        assert_eq!(port.source().clears(), 0);
    }

    #[test]
    fn port_discards_nul_line() {
        let mut lines = ScriptedLines::new();
        lines.push_raw(b"\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\n");
        let mut port = TelemetryPort::new(lines, FieldLayout::default());
        assert_eq!(port.poll(true), LineOutcome::Discarded);
    }
}
