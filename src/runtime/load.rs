//! # Load controller
//!
//! Translates a target rate in steps per second into bounded work requests
//! for the scheduler, once per timer tick. Time spent in one tick is capped
//! at `max_load_factor` of the tick interval so the host's own event loop
//! stays responsive.

use std::time::Instant;

use tracing::trace;

use crate::runtime::interpreter::InterpreterConfig;

/// Monotonic milliseconds.
pub trait Clock {
    fn now_ms(&self) -> f64;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Whatever executes Steps on behalf of the controller.
pub trait StepRunner {
    /// Run up to `budget` Steps, returning how many were executed. Zero
    /// does not mean the runner is stuck; `is_running` decides that.
    fn run(&mut self, budget: usize) -> usize;

    fn is_running(&self) -> bool;

    /// Publish where execution currently stands.
    fn refresh_program_pointer(&mut self) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub steps: usize,
    pub batches: usize,
}

/// Intervals at or above this are treated as a stalled timer in max-speed
/// mode, and the nominal interval is used instead.
const STALLED_TICK_MS: f64 = 100.0;

const BATCH_GROWTH: usize = 10_000;

pub struct LoadController<C: Clock = SystemClock> {
    clock: C,
    steps_per_second: Option<f64>,
    goal_interval_ms: f64,
    last_decision_ms: Option<f64>,
    last_tick_ms: Option<f64>,
    max_load_factor: f64,
    min_batch: usize,
    batch: usize,
    pointer_refresh_below: f64,
}

impl<C: Clock> LoadController<C> {
    pub fn new(config: &InterpreterConfig, clock: C) -> Self {
        let mut controller = Self {
            clock,
            steps_per_second: None,
            goal_interval_ms: 0.0,
            last_decision_ms: None,
            last_tick_ms: None,
            max_load_factor: config.max_load_factor,
            min_batch: config.min_batch.max(1),
            batch: config.max_speed_batch.max(1),
            pointer_refresh_below: config.pointer_refresh_below,
        };
        controller.set_speed(config.steps_per_second);
        controller
    }

    pub fn steps_per_second(&self) -> Option<f64> {
        self.steps_per_second
    }

    /// Minimum time between two scheduling decisions.
    pub fn goal_interval_ms(&self) -> f64 {
        self.goal_interval_ms
    }

    /// Current batch size in max-speed mode.
    pub fn batch(&self) -> usize {
        self.batch
    }

    /// `None` runs at maximum speed.
    pub fn set_speed(&mut self, steps_per_second: Option<f64>) {
        let rate = steps_per_second.filter(|r| r.is_finite() && *r > 0.0);
        self.steps_per_second = rate;
        self.goal_interval_ms = rate.map(|r| 1000.0 / r).unwrap_or(0.0);
        self.last_decision_ms = None;
    }

    /// Forget timing history, e.g. after the program was restarted.
    pub fn reset(&mut self) {
        self.last_decision_ms = None;
        self.last_tick_ms = None;
    }

    pub fn tick(&mut self, runner: &mut impl StepRunner, delta_ms: f64) -> TickReport {
        if !runner.is_running() || delta_ms <= 0.0 {
            return TickReport::default();
        }
        match self.steps_per_second {
            Some(rate) => self.tick_throttled(runner, rate, delta_ms),
            None => self.tick_max_speed(runner, delta_ms),
        }
    }

    fn tick_throttled(&mut self, runner: &mut impl StepRunner, rate: f64, delta_ms: f64) -> TickReport {
        let t0 = self.clock.now_ms();
        if let Some(last) = self.last_decision_ms {
            if t0 - last < self.goal_interval_ms {
                return TickReport::default();
            }
        }
        self.last_decision_ms = Some(t0);

        if self.goal_interval_ms >= delta_ms {
            let steps = runner.run(1);
            if rate < self.pointer_refresh_below {
                runner.refresh_program_pointer();
            }
            return TickReport { steps, batches: 1 };
        }

        let goal = rate / 1000.0 * delta_ms;
        let batch = (goal.ceil() as usize).max(self.min_batch);
        let mut report = TickReport::default();

        while (report.steps as f64) < goal
            && runner.is_running()
            && (self.clock.now_ms() - t0) / delta_ms < self.max_load_factor
        {
            let steps = runner.run(batch);
            report.steps += steps;
            report.batches += 1;
        }

        trace!(goal, steps = report.steps, batches = report.batches, "throttled tick");
        report
    }

    fn tick_max_speed(&mut self, runner: &mut impl StepRunner, delta_ms: f64) -> TickReport {
        let t0 = self.clock.now_ms();
        let mut interval = delta_ms;
        if let Some(last) = self.last_tick_ms {
            let measured = t0 - last;
            if measured > 0.0 && measured < STALLED_TICK_MS {
                interval = measured;
            }
        }
        self.last_tick_ms = Some(t0);

        let mut report = TickReport::default();
        while runner.is_running() && (self.clock.now_ms() - t0) / interval < self.max_load_factor {
            let steps = runner.run(self.batch);
            report.steps += steps;
            report.batches += 1;
        }

        if report.batches > 2 {
            self.batch += BATCH_GROWTH;
        }
        trace!(steps = report.steps, batches = report.batches, batch = self.batch, "max speed tick");
        report
    }
}
