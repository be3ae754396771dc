//! Hold-time debouncing for the pump reed switch.
//!
//! The switch opens and chatters while the pump pulses, so an inactive
//! reading only counts once it has persisted for the hold window.

use crate::timebase::{elapsed_ms, Millis};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebounceState {
    raw_off_since: Option<Millis>,
    settled_off: bool,
}

impl DebounceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts out already inactive, for a session that begins with the
    /// switch open. The first active sample returns to normal operation.
    pub fn settled_inactive() -> Self {
        Self {
            raw_off_since: None,
            settled_off: true,
        }
    }

    /// Feeds one raw sample and returns the debounced level.
    pub fn sample(&mut self, raw: bool, now: Millis, hold_ms: u32) -> bool {
        if raw {
            self.raw_off_since = None;
            self.settled_off = false;
            return true;
        }
        if self.settled_off {
            return false;
        }

        let since = *self.raw_off_since.get_or_insert(now);
        elapsed_ms(now, since) < u64::from(hold_ms)
    }

    pub fn raw_off_since(&self) -> Option<Millis> {
        self.raw_off_since
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_sample_clears_off_time() {
        let mut d = DebounceState::new();
        assert!(d.sample(false, 100, 700));
        assert_eq!(d.raw_off_since(), Some(100));
        assert!(d.sample(true, 150, 700));
        assert_eq!(d.raw_off_since(), None);
    }

    #[test]
    fn holds_active_until_window_expires() {
        let mut d = DebounceState::new();
        assert!(d.sample(true, 0, 700));
        assert!(d.sample(false, 1_000, 700));
        assert!(d.sample(false, 1_699, 700));
        assert!(!d.sample(false, 1_700, 700));
        assert!(!d.sample(false, 5_000, 700));
    }

    #[test]
    fn chatter_restarts_the_window() {
        let mut d = DebounceState::new();
        assert!(d.sample(false, 0, 700));
        assert!(d.sample(true, 600, 700));
        assert!(d.sample(false, 650, 700));
        // Window counts from 650, not from 0.
        assert!(d.sample(false, 1_300, 700));
        assert!(!d.sample(false, 1_350, 700));
    }

    #[test]
    fn settled_start_has_no_grace_window() {
        let mut d = DebounceState::settled_inactive();
        assert!(!d.sample(false, 0, 700));
        assert!(d.sample(true, 10, 700));
        assert!(d.sample(false, 20, 700));
        assert!(!d.sample(false, 720, 700));
    }

    #[test]
    fn zero_hold_reports_raw_level() {
        let mut d = DebounceState::new();
        assert!(!d.sample(false, 10, 0));
        assert!(d.sample(true, 11, 0));
    }
}
