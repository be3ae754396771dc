//! Text content for the local indicator display.
//!
//! Only the content is derived here; drawing it is up to the `DisplaySink`.

use crate::state::MachineState;
use crate::telemetry::Heating;
use crate::timebase::{elapsed_ms, Millis};

const DEG: &str = " C";
/// Targets below this are not a brewing set point.
const MIN_BREW_TARGET: i32 = 80;
/// Within this many degrees under target the boiler counts as ready.
const READY_MARGIN: i32 = 10;

/// Shot timing derived from debounced pump transitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShotTimer {
    started_at: Option<Millis>,
    elapsed_ms: u64,
    last_shot_ms: Option<u64>,
}

impl ShotTimer {
    pub fn start(&mut self, now: Millis) {
        self.started_at = Some(now);
        self.elapsed_ms = 0;
    }

    pub fn tick(&mut self, now: Millis) {
        if let Some(start) = self.started_at {
            self.elapsed_ms = elapsed_ms(now, start);
        }
    }

    /// The debounce hold delays the off edge, so it is taken back out of the
    /// recorded shot time.
    pub fn stop(&mut self, now: Millis, hold_ms: u32) {
        self.tick(now);
        if self.started_at.take().is_some() {
            self.last_shot_ms = Some(self.elapsed_ms.saturating_sub(u64::from(hold_ms)));
        }
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub fn last_shot_ms(&self) -> Option<u64> {
        self.last_shot_ms
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayFrame {
    pub pumping: bool,
    pub heating: Heating,
    pub boiler_text: String,
    pub steam_text: Option<String>,
    pub counter_text: Option<String>,
    pub headline: String,
    pub last_shot: Option<String>,
}

impl DisplayFrame {
    pub fn render(state: &MachineState, shot: &ShotTimer) -> Self {
        Self {
            pumping: state.pump_active,
            heating: state.heating,
            boiler_text: boiler_text(state),
            steam_text: state.steam_temp.map(|t| format!("{t}{DEG}")),
            counter_text: state.counter.map(|c| c.to_string()),
            headline: headline(state, shot),
            last_shot: shot.last_shot_ms().map(|ms| format!("Last:{}s", seconds(ms))),
        }
    }
}

fn seconds(ms: u64) -> String {
    format!("{:.2}", ms as f64 / 1_000.0)
}

fn boiler_text(state: &MachineState) -> String {
    match (state.boiler_temp, state.temp_target) {
        (Some(boiler), Some(target)) if boiler < target => format!("{boiler} => {target}{DEG}"),
        (Some(boiler), _) => format!("{boiler}{DEG}"),
        (None, Some(target)) if target != 0 => format!("< {target}{DEG}"),
        (None, Some(_)) => "no water".to_string(),
        (None, None) if !state.heating.is_known() => "controller not detected".to_string(),
        (None, None) => "?".to_string(),
    }
}

fn headline(state: &MachineState, shot: &ShotTimer) -> String {
    if state.pump_active {
        return format!("Shot: {}s", seconds(shot.elapsed_ms()));
    }
    if state.temp_target == Some(0) && state.counter == Some(0) {
        return "No Water?".to_string();
    }

    let heating = match state.heating {
        Heating::Unknown => return "?".to_string(),
        Heating::On => true,
        Heating::Off => false,
    };
    let suffix = if heating { " (Heating)" } else { "" };

    match (state.boiler_temp, state.temp_target) {
        (Some(boiler), Some(target)) if target >= MIN_BREW_TARGET => {
            if boiler < target - READY_MARGIN {
                "Not Ready".to_string()
            } else if boiler < target {
                format!("Ready{suffix}")
            } else {
                format!("READY{suffix}")
            }
        }
        _ => "?".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(boiler: Option<i32>, target: Option<i32>, heating: Heating) -> MachineState {
        MachineState {
            boiler_temp: boiler,
            temp_target: target,
            heating,
            ..MachineState::new(0)
        }
    }

    #[test]
    fn offline_frame() {
        let frame = DisplayFrame::render(&MachineState::new(0), &ShotTimer::default());
        assert_eq!(frame.boiler_text, "controller not detected");
        assert_eq!(frame.headline, "?");
        assert_eq!(frame.steam_text, None);
        assert_eq!(frame.counter_text, None);
    }

    #[test]
    fn boiler_text_variants() {
        assert_eq!(boiler_text(&state(Some(93), Some(124), Heating::On)), "93 => 124 C");
        assert_eq!(boiler_text(&state(Some(124), Some(124), Heating::Off)), "124 C");
        assert_eq!(boiler_text(&state(None, Some(124), Heating::Off)), "< 124 C");
        assert_eq!(boiler_text(&state(None, Some(0), Heating::Off)), "no water");
        assert_eq!(boiler_text(&state(None, None, Heating::Off)), "?");
    }

    #[test]
    fn readiness_headline() {
        let shot = ShotTimer::default();
        assert_eq!(headline(&state(Some(100), Some(124), Heating::On), &shot), "Not Ready");
        assert_eq!(
            headline(&state(Some(118), Some(124), Heating::On), &shot),
            "Ready (Heating)"
        );
        assert_eq!(headline(&state(Some(124), Some(124), Heating::Off), &shot), "READY");
        assert_eq!(headline(&state(Some(124), Some(60), Heating::Off), &shot), "?");
        assert_eq!(headline(&state(Some(124), Some(124), Heating::Unknown), &shot), "?");
    }

    #[test]
    fn no_water_headline() {
        let mut s = state(None, Some(0), Heating::Off);
        s.counter = Some(0);
        assert_eq!(headline(&s, &ShotTimer::default()), "No Water?");
    }

    #[test]
    fn shot_timer_subtracts_hold() {
        let mut shot = ShotTimer::default();
        shot.start(1_000);
        shot.tick(11_000);
        assert_eq!(shot.elapsed_ms(), 10_000);

        let mut s = MachineState::new(0);
        s.pump_active = true;
        assert_eq!(DisplayFrame::render(&s, &shot).headline, "Shot: 10.00s");

        shot.stop(27_200, 1_200);
        assert!(!shot.is_running());
        assert_eq!(shot.last_shot_ms(), Some(25_000));
        s.pump_active = false;
        assert_eq!(
            DisplayFrame::render(&s, &shot).last_shot.as_deref(),
            Some("Last:25.00s")
        );
    }
}
