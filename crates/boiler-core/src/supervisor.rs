use crate::error::MonitorError;
use crate::hal::DigitalInput;
use crate::sync::SnapshotExchange;
use crate::timebase::{Clock, Millis};
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A monitoring session the supervisor can run, blank and restart.
pub trait Session {
    fn run_session<C: Clock>(&mut self, clock: &C, stop: &AtomicBool) -> Result<(), MonitorError>;
    fn blank_outputs(&mut self);
    /// Starts over with fresh session state at `now`.
    fn restart(&mut self, now: Millis);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SupervisorState {
    #[default]
    Running,
    CountingDown,
    Stopped,
    HardReset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub countdown_ticks: u32,
    pub tick: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            countdown_ticks: 10,
            tick: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
pub enum SupervisorExit {
    /// The stop flag was raised.
    Stopped,
    /// The reset input was held during a restart countdown.
    HardReset(MonitorError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Countdown {
    Elapsed,
    ResetRequested,
    Stopped,
}

pub struct Supervisor {
    state: SupervisorState,
    reset_input: Option<Box<dyn DigitalInput>>,
    policy: RestartPolicy,
    restarts: u64,
    exchange: Option<Arc<SnapshotExchange>>,
}

impl Supervisor {
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            state: SupervisorState::Running,
            reset_input: None,
            policy,
            restarts: 0,
            exchange: None,
        }
    }

    pub fn with_reset_input(mut self, input: Box<dyn DigitalInput>) -> Self {
        self.reset_input = Some(input);
        self
    }

    pub fn with_exchange(mut self, exchange: Arc<SnapshotExchange>) -> Self {
        self.exchange = Some(exchange);
        self
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    /// Runs `session` until stopped, restarting it after each failure.
    pub fn supervise<S, C>(&mut self, session: &mut S, clock: &C, stop: &AtomicBool) -> SupervisorExit
    where
        S: Session,
        C: Clock,
    {
        loop {
            self.state = SupervisorState::Running;
            let err = match session.run_session(clock, stop) {
                Ok(()) => {
                    self.state = SupervisorState::Stopped;
                    return SupervisorExit::Stopped;
                }
                Err(err) => err,
            };

            session.blank_outputs();
            error!("monitor session failed: {}", err);

            self.state = SupervisorState::CountingDown;
            match self.countdown(clock, stop) {
                Countdown::Elapsed => {
                    self.restarts += 1;
                    if let Some(exchange) = &self.exchange {
                        exchange.note_restart();
                    }
                    info!("restarting monitor session (restart #{})", self.restarts);
                    session.restart(clock.now_ms());
                }
                Countdown::ResetRequested => {
                    warn!("reset input active, giving up");
                    self.state = SupervisorState::HardReset;
                    return SupervisorExit::HardReset(err);
                }
                Countdown::Stopped => {
                    self.state = SupervisorState::Stopped;
                    return SupervisorExit::Stopped;
                }
            }
        }
    }

    fn countdown<C: Clock>(&mut self, clock: &C, stop: &AtomicBool) -> Countdown {
        for remaining in (1..=self.policy.countdown_ticks).rev() {
            if stop.load(Ordering::Relaxed) {
                return Countdown::Stopped;
            }
            if self.reset_pressed() {
                return Countdown::ResetRequested;
            }
            info!("restart in {}", remaining);
            clock.sleep(self.policy.tick);
        }
        if stop.load(Ordering::Relaxed) {
            return Countdown::Stopped;
        }
        if self.reset_pressed() {
            return Countdown::ResetRequested;
        }
        Countdown::Elapsed
    }

    fn reset_pressed(&mut self) -> bool {
        let Some(input) = self.reset_input.as_mut() else {
            return false;
        };
        match input.is_active() {
            Ok(active) => active,
            Err(e) => {
                warn!("reset input unreadable: {}", e);
                false
            }
        }
    }
}
