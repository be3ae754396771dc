use crate::debounce::DebounceState;
use crate::display::{DisplayFrame, ShotTimer};
use crate::error::MonitorError;
use crate::hal::{BusClient, DigitalInput, DisplaySink, LineSource};
use crate::publish::Publisher;
use crate::state::{ChangeSet, MachineState};
use crate::supervisor::Session;
use crate::sync::{MonitorSnapshot, SnapshotExchange};
use crate::telemetry::{LineOutcome, TelemetryPort};
use crate::timebase::{Clock, Millis};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How long to pause between iterations, given the debounced pump level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollSchedule {
    pub idle_delay: Duration,
    pub active_delay: Duration,
}

impl PollSchedule {
    pub fn delay_after(&self, pump_active: bool) -> Option<Duration> {
        let delay = if pump_active {
            self.active_delay
        } else {
            self.idle_delay
        };
        (!delay.is_zero()).then_some(delay)
    }
}

impl Default for PollSchedule {
    fn default() -> Self {
        // Busy-poll during a shot for timing resolution.
        Self {
            idle_delay: Duration::from_millis(200),
            active_delay: Duration::ZERO,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ControlConfig {
    pub hold_ms: u32,
    pub stale_timeout_ms: u32,
    pub heartbeat_interval_ms: u32,
    pub schedule: PollSchedule,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            hold_ms: 1_200,
            stale_timeout_ms: 5_000,
            heartbeat_interval_ms: 5_000,
            schedule: PollSchedule::default(),
        }
    }
}

#[derive(Clone, Default, Debug)]
pub struct ExecutionStats {
    pub iterations: u64,
    pub pump_transitions: u64,
    pub lines_accepted: u64,
    pub lines_rejected: u64,
    pub lines_discarded: u64,
    pub display_updates: u64,
}

/// Result of one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iteration {
    pub pump_active: bool,
    pub pump_changed: bool,
    pub line: LineOutcome,
    pub changes: ChangeSet,
}

/// The monitoring loop: one debouncer, one aggregator, one publisher.
pub struct Monitor<P, L, B, D>
where
    P: DigitalInput,
    L: LineSource,
    B: BusClient,
    D: DisplaySink,
{
    pump_input: P,
    telemetry: TelemetryPort<L>,
    publisher: Publisher<B>,
    display: D,
    config: ControlConfig,
    debounce: DebounceState,
    state: MachineState,
    shot: ShotTimer,
    stats: ExecutionStats,
    first_iteration: bool,
    /// Pump level subscribers last saw; survives session restarts.
    announced_pump: Option<bool>,
    exchange: Option<Arc<SnapshotExchange>>,
}

impl<P, L, B, D> Monitor<P, L, B, D>
where
    P: DigitalInput,
    L: LineSource,
    B: BusClient,
    D: DisplaySink,
{
    pub fn new(
        pump_input: P,
        telemetry: TelemetryPort<L>,
        publisher: Publisher<B>,
        display: D,
        config: ControlConfig,
        now: Millis,
    ) -> Self {
        Self {
            pump_input,
            telemetry,
            publisher,
            display,
            config,
            debounce: DebounceState::new(),
            state: MachineState::new(now),
            shot: ShotTimer::default(),
            stats: ExecutionStats::default(),
            first_iteration: true,
            announced_pump: None,
            exchange: None,
        }
    }

    pub fn with_exchange(mut self, exchange: Arc<SnapshotExchange>) -> Self {
        self.exchange = Some(exchange);
        self
    }

    /// Drops all session state; peripherals, the bus and the last announced
    /// pump level are kept.
    pub fn reset_session(&mut self, now: Millis) {
        self.debounce.reset();
        self.state = MachineState::new(now);
        self.shot = ShotTimer::default();
        self.first_iteration = true;
        self.publisher.reset_heartbeat(now);
    }

    /// One pass: sensor, bus upkeep, pump, telemetry, merge, publish,
    /// display, in that order.
    pub fn step(&mut self, now: Millis) -> Result<Iteration, MonitorError> {
        let raw = self.pump_input.is_active()?;

        self.publisher.maintain()?;
        self.publisher
            .heartbeat(now, self.config.heartbeat_interval_ms)?;

        let first = self.first_iteration;
        let mut display_dirty = first;
        let mut pump_changed = false;

        if first && !raw {
            self.debounce = DebounceState::settled_inactive();
        }
        let pump_active = self.debounce.sample(raw, now, self.config.hold_ms);
        let transition = if first {
            // Baseline. After a restart, an edge missed while down still counts.
            self.state.set_pump_active(pump_active);
            self.announced_pump.is_some_and(|prev| prev != pump_active)
        } else {
            self.state.set_pump_active(pump_active)
        };
        if pump_active && (first || transition) {
            self.shot.start(now);
        } else if transition {
            self.shot.stop(now, self.config.hold_ms);
        }
        if transition {
            pump_changed = true;
            self.stats.pump_transitions += 1;
            self.publisher.publish_pump_change(pump_active)?;
            display_dirty = true;
        }
        if first || transition {
            self.announced_pump = Some(pump_active);
        }
        self.shot.tick(now);

        let line = if first {
            LineOutcome::NoData
        } else {
            self.telemetry.poll(pump_active)
        };
        match line {
            LineOutcome::Decoded(r) if r.valid => self.stats.lines_accepted += 1,
            LineOutcome::Decoded(_) => self.stats.lines_rejected += 1,
            LineOutcome::Discarded => self.stats.lines_discarded += 1,
            LineOutcome::NoData => {}
        }

        let changes = self
            .state
            .merge(&line.record(), now, self.config.stale_timeout_ms);
        if !changes.is_empty() {
            self.publisher
                .publish_telemetry_change(&self.state, &changes)?;
            display_dirty = true;
        }

        if display_dirty || pump_active {
            self.display
                .show(&DisplayFrame::render(&self.state, &self.shot));
            self.stats.display_updates += 1;
        }

        self.first_iteration = false;
        self.stats.iterations += 1;
        self.publish_snapshot(now);

        Ok(Iteration {
            pump_active,
            pump_changed,
            line,
            changes,
        })
    }

    /// Runs until `stop` is set or an iteration fails.
    pub fn run<C: Clock>(&mut self, clock: &C, stop: &AtomicBool) -> Result<(), MonitorError> {
        while !stop.load(Ordering::Relaxed) {
            let iteration = self.step(clock.now_ms())?;
            if let Some(delay) = self.config.schedule.delay_after(iteration.pump_active) {
                clock.sleep(delay);
            }
        }
        Ok(())
    }

    fn publish_snapshot(&self, now: Millis) {
        let Some(exchange) = &self.exchange else {
            return;
        };
        let publish = self.publisher.stats();
        exchange.publish(MonitorSnapshot {
            timestamp_ms: now,
            iterations: self.stats.iterations,
            pump_active: self.state.pump_active,
            shot_ms: self.shot.elapsed_ms(),
            last_shot_ms: self.shot.last_shot_ms(),
            steam_temp: self.state.steam_temp,
            temp_target: self.state.temp_target,
            boiler_temp: self.state.boiler_temp,
            counter: self.state.counter,
            heating: self.state.heating,
            online: !self.state.is_offline(),
            pump_transitions: self.stats.pump_transitions,
            lines_accepted: self.stats.lines_accepted,
            lines_rejected: self.stats.lines_rejected,
            lines_discarded: self.stats.lines_discarded,
            telemetry_events: publish.telemetry_events,
            heartbeats: publish.heartbeats,
            reconnects: publish.reconnects,
        });
    }

    pub fn state(&self) -> &MachineState {
        &self.state
    }

    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    pub fn shot(&self) -> &ShotTimer {
        &self.shot
    }

    pub fn publisher(&self) -> &Publisher<B> {
        &self.publisher
    }

    pub fn publisher_mut(&mut self) -> &mut Publisher<B> {
        &mut self.publisher
    }

    pub fn pump_input_mut(&mut self) -> &mut P {
        &mut self.pump_input
    }

    pub fn line_source_mut(&mut self) -> &mut L {
        self.telemetry.source_mut()
    }

    pub fn display(&self) -> &D {
        &self.display
    }
}

impl<P, L, B, D> Session for Monitor<P, L, B, D>
where
    P: DigitalInput,
    L: LineSource,
    B: BusClient,
    D: DisplaySink,
{
    fn run_session<C: Clock>(&mut self, clock: &C, stop: &AtomicBool) -> Result<(), MonitorError> {
        self.run(clock, stop)
    }

    fn blank_outputs(&mut self) {
        self.display.blank();
    }

    fn restart(&mut self, now: Millis) {
        self.reset_session(now);
    }
}
