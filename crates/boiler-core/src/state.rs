//! Canonical machine state and the staleness-aware merge.

use crate::telemetry::{Heating, NumericField, TelemetryRecord};
use crate::timebase::{elapsed_ms, Millis};
use log::{debug, info};

/// Telemetry fields tracked for change detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldId {
    SteamTemp,
    TempTarget,
    BoilerTemp,
    Counter,
    Heating,
}

impl FieldId {
    pub const ALL: [FieldId; 5] = [
        FieldId::SteamTemp,
        FieldId::TempTarget,
        FieldId::BoilerTemp,
        FieldId::Counter,
        FieldId::Heating,
    ];

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl From<NumericField> for FieldId {
    fn from(field: NumericField) -> Self {
        match field {
            NumericField::SteamTemp => FieldId::SteamTemp,
            NumericField::TempTarget => FieldId::TempTarget,
            NumericField::BoilerTemp => FieldId::BoilerTemp,
            NumericField::Counter => FieldId::Counter,
        }
    }
}

/// Fields changed by one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeSet {
    bits: u8,
    offline: bool,
}

impl ChangeSet {
    pub fn insert(&mut self, field: FieldId) {
        self.bits |= field.bit();
    }

    pub fn contains(&self, field: FieldId) -> bool {
        self.bits & field.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn len(&self) -> usize {
        self.bits.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = FieldId> + '_ {
        FieldId::ALL.into_iter().filter(|f| self.contains(*f))
    }

    /// Every field went unknown in this merge: report as one offline event.
    pub fn is_offline(&self) -> bool {
        self.offline
    }
}

/// The debounced, validated view of the machine. One per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineState {
    pub pump_active: bool,
    pub steam_temp: Option<i32>,
    pub temp_target: Option<i32>,
    pub boiler_temp: Option<i32>,
    pub counter: Option<i32>,
    pub heating: Heating,
    pub last_valid_telemetry_at: Millis,
}

impl MachineState {
    /// Fresh state with everything unknown. The staleness clock starts now.
    pub fn new(now: Millis) -> Self {
        Self {
            pump_active: false,
            steam_temp: None,
            temp_target: None,
            boiler_temp: None,
            counter: None,
            heating: Heating::Unknown,
            last_valid_telemetry_at: now,
        }
    }

    /// True when no telemetry field is known.
    pub fn is_offline(&self) -> bool {
        self.steam_temp.is_none()
            && self.temp_target.is_none()
            && self.boiler_temp.is_none()
            && self.counter.is_none()
            && !self.heating.is_known()
    }

    fn numeric_mut(&mut self, field: NumericField) -> &mut Option<i32> {
        match field {
            NumericField::SteamTemp => &mut self.steam_temp,
            NumericField::TempTarget => &mut self.temp_target,
            NumericField::BoilerTemp => &mut self.boiler_temp,
            NumericField::Counter => &mut self.counter,
        }
    }

    /// Records a debounced pump level. Returns true on a transition.
    pub fn set_pump_active(&mut self, active: bool) -> bool {
        let changed = self.pump_active != active;
        self.pump_active = active;
        changed
    }

    /// Merges one decoder result.
    ///
    /// A valid record is always merged. An invalid one is ignored until no
    /// valid record has arrived for more than `stale_timeout_ms`, after which
    /// it is merged anyway so a silent controller decays to unknown.
    pub fn merge(
        &mut self,
        record: &TelemetryRecord,
        now: Millis,
        stale_timeout_ms: u32,
    ) -> ChangeSet {
        if record.valid {
            self.last_valid_telemetry_at = now;
        } else {
            let age = elapsed_ms(now, self.last_valid_telemetry_at);
            if age <= u64::from(stale_timeout_ms) {
                return ChangeSet::default();
            }
            debug!("telemetry stale for {} ms, accepting invalid record", age);
        }

        let was_offline = self.is_offline();
        let mut changes = ChangeSet::default();

        for field in NumericField::ALL {
            let incoming = record.get(field);
            let slot = self.numeric_mut(field);
            if *slot != incoming {
                *slot = incoming;
                changes.insert(field.into());
            }
        }
        if self.heating != record.heating {
            self.heating = record.heating;
            changes.insert(FieldId::Heating);
        }

        if !changes.is_empty() && self.is_offline() {
            changes.offline = true;
            info!("boiler controller offline");
        } else if was_offline && !self.is_offline() {
            info!("boiler controller online");
        }

        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(steam: i32, target: i32, boiler: i32, counter: i32, heating: Heating) -> TelemetryRecord {
        TelemetryRecord {
            steam_temp: Some(steam),
            temp_target: Some(target),
            boiler_temp: Some(boiler),
            counter: Some(counter),
            heating,
            valid: true,
        }
    }

    #[test]
    fn fresh_state_is_offline() {
        let state = MachineState::new(0);
        assert!(state.is_offline());
        assert!(!state.pump_active);
    }

    #[test]
    fn valid_record_merges_and_reports_all_fields() {
        let mut state = MachineState::new(0);
        let changes = state.merge(&record(50, 140, 42, 1186, Heating::On), 100, 5_000);
        assert_eq!(changes.len(), 5);
        assert!(!changes.is_offline());
        assert_eq!(state.steam_temp, Some(50));
        assert_eq!(state.heating, Heating::On);
        assert_eq!(state.last_valid_telemetry_at, 100);
    }

    #[test]
    fn identical_record_reports_nothing() {
        let mut state = MachineState::new(0);
        let r = record(50, 140, 42, 1186, Heating::On);
        state.merge(&r, 100, 5_000);
        assert!(state.merge(&r, 1_100, 5_000).is_empty());
    }

    #[test]
    fn single_field_delta() {
        let mut state = MachineState::new(0);
        state.merge(&record(50, 140, 42, 1186, Heating::On), 100, 5_000);
        let changes = state.merge(&record(50, 140, 43, 1186, Heating::On), 1_100, 5_000);
        assert_eq!(changes.iter().collect::<Vec<_>>(), vec![FieldId::BoilerTemp]);
    }

    #[test]
    fn invalid_record_held_within_timeout() {
        let mut state = MachineState::new(0);
        state.merge(&record(50, 140, 42, 1186, Heating::On), 1_000, 5_000);
        let before = state.clone();

        let partial = TelemetryRecord {
            steam_temp: Some(99),
            ..TelemetryRecord::empty()
        };
        assert!(state.merge(&partial, 6_000, 5_000).is_empty());
        assert_eq!(state, before);
    }

    #[test]
    fn stale_state_decays_to_offline() {
        let mut state = MachineState::new(0);
        state.merge(&record(50, 140, 42, 1186, Heating::Off), 1_000, 5_000);

        let changes = state.merge(&TelemetryRecord::empty(), 6_001, 5_000);
        assert_eq!(changes.len(), 5);
        assert!(changes.is_offline());
        assert!(state.is_offline());
        // The valid timestamp is not refreshed by a forced merge.
        assert_eq!(state.last_valid_telemetry_at, 1_000);

        assert!(state.merge(&TelemetryRecord::empty(), 6_500, 5_000).is_empty());
    }

    #[test]
    fn stale_merge_only_reports_known_fields() {
        let mut state = MachineState::new(0);
        let partial = TelemetryRecord {
            boiler_temp: Some(90),
            heating: Heating::On,
            valid: true,
            ..TelemetryRecord::empty()
        };
        state.merge(&partial, 0, 5_000);
        let changes = state.merge(&TelemetryRecord::empty(), 5_001, 5_000);
        assert_eq!(
            changes.iter().collect::<Vec<_>>(),
            vec![FieldId::BoilerTemp, FieldId::Heating]
        );
        assert!(changes.is_offline());
    }

    #[test]
    fn pump_transition_detection() {
        let mut state = MachineState::new(0);
        assert!(state.set_pump_active(true));
        assert!(!state.set_pump_active(true));
        assert!(state.set_pump_active(false));
    }
}
