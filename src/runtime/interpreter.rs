//! # Interpreter
//!
//! Host-facing façade over the thread pool and the load controller:
//! lifecycle, debugger commands and timer-driven execution.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bytecode::ir::Program;
use crate::runtime::load::{Clock, LoadController, SystemClock, TickReport};
use crate::runtime::pool::{PoolState, PoolStats, ThreadPool};
use crate::runtime::registry::ClassRegistry;
use crate::runtime::runtime_error::RuntimeError;
use crate::runtime::thread::{Thread, ThreadId, ThreadLimits};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// `None` runs at maximum speed.
    pub steps_per_second: Option<f64>,
    /// Fraction of a timer tick that may be spent executing Steps.
    pub max_load_factor: f64,
    pub timer_interval_ms: u64,
    pub min_batch: usize,
    pub max_speed_batch: usize,
    /// Below this rate the program pointer is refreshed after every Step.
    pub pointer_refresh_below: f64,
    pub limits: ThreadLimits,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            steps_per_second: None,
            max_load_factor: 0.7,
            timer_interval_ms: 10,
            min_batch: 1000,
            max_speed_batch: 10_000,
            pointer_refresh_below: 20.0,
            limits: ThreadLimits::default(),
        }
    }
}

pub struct Interpreter<C: Clock = SystemClock> {
    pool: ThreadPool,
    load: LoadController<C>,
    config: InterpreterConfig,
    main: Option<Rc<Program>>,
    registry: ClassRegistry,
    main_thread: Option<ThreadId>,
    single_steps: Rc<Cell<u32>>,
}

impl Interpreter<SystemClock> {
    pub fn new(config: InterpreterConfig) -> Self {
        Self::with_clock(config, SystemClock::new())
    }
}

impl<C: Clock> Interpreter<C> {
    pub fn with_clock(config: InterpreterConfig, clock: C) -> Self {
        Self {
            pool: ThreadPool::new(config.limits),
            load: LoadController::new(&config, clock),
            config,
            main: None,
            registry: ClassRegistry::new(),
            main_thread: None,
            single_steps: Rc::new(Cell::new(0)),
        }
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    pub fn state(&self) -> PoolState {
        self.pool.state()
    }

    pub fn pool(&self) -> &ThreadPool {
        &self.pool
    }

    /// Breakpoints and other debugger access.
    pub fn pool_mut(&mut self) -> &mut ThreadPool {
        &mut self.pool
    }

    pub fn main_thread(&self) -> Option<&Thread> {
        self.main_thread.and_then(|id| self.pool.thread(id))
    }

    /// Number of single steps (over, into or out) that have completed.
    pub fn completed_single_steps(&self) -> u32 {
        self.single_steps.get()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Load `main` and prepare its thread. Execution starts paused.
    pub fn init(&mut self, main: Rc<Program>, registry: ClassRegistry) -> Result<(), RuntimeError> {
        info!(program = %main.name, "init");
        self.main = Some(main);
        self.registry = registry;
        self.reinit()?;
        Ok(())
    }

    /// Rebuild the pool from the stored main program. Returns false if
    /// nothing was ever loaded.
    fn reinit(&mut self) -> Result<bool, RuntimeError> {
        let Some(main) = self.main.clone() else {
            return Ok(false);
        };
        self.main_thread = Some(self.pool.init(main, self.registry.clone())?);
        self.load.reset();
        Ok(true)
    }

    /// Run, or continue after a pause. A stopped program starts over.
    pub fn start(&mut self) -> Result<(), RuntimeError> {
        match self.pool.state() {
            PoolState::Running => return Ok(()),
            PoolState::Paused => {}
            PoolState::NotInitialized | PoolState::Stopped => {
                if !self.reinit()? {
                    warn!("nothing to start");
                    return Ok(());
                }
            }
        }
        self.load.reset();
        self.pool.start();
        Ok(())
    }

    pub fn pause(&mut self) {
        self.pool.pause();
        if let Some(pointer) = self.pool.next_step_position() {
            debug!(program = %pointer.program, step = pointer.step, "paused");
        }
    }

    pub fn stop(&mut self, restart: bool) -> Result<(), RuntimeError> {
        self.pool.stop();
        if restart {
            self.start()?;
        }
        Ok(())
    }

    // =========================================================================
    // Debugger
    // =========================================================================

    /// Step into (one Step) or over (to the next Step at this depth).
    ///
    /// Outside the paused state this only prepares: a stopped program is
    /// reloaded and paused at its first Step, a running one is paused.
    pub fn execute_one_step(&mut self, step_into: bool) -> Result<(), RuntimeError> {
        match self.pool.state() {
            PoolState::Paused => {}
            PoolState::NotInitialized => return Ok(()),
            PoolState::Running => {
                self.pause();
                return Ok(());
            }
            PoolState::Stopped => {
                self.reinit()?;
                return Ok(());
            }
        }

        let completed = Rc::clone(&self.single_steps);
        self.pool
            .run_single_step_keeping_thread(step_into, move || completed.set(completed.get() + 1));
        if !step_into {
            // ticks drive the step over until it completes
            self.pool.set_state(PoolState::Running);
        }
        Ok(())
    }

    pub fn step_out(&mut self) {
        if self.pool.state() != PoolState::Paused {
            return;
        }
        let completed = Rc::clone(&self.single_steps);
        self.pool.step_out(move || completed.set(completed.get() + 1));
        self.pool.set_state(PoolState::Running);
    }

    // =========================================================================
    // Execution
    // =========================================================================

    pub fn set_speed(&mut self, steps_per_second: Option<f64>) {
        self.config.steps_per_second = steps_per_second;
        self.load.set_speed(steps_per_second);
    }

    /// One timer tick; `delta_ms` is the time until the next one.
    pub fn tick(&mut self, delta_ms: f64) -> TickReport {
        self.load.tick(&mut self.pool, delta_ms)
    }

    /// Drive ticks from a real timer until the pool leaves the running
    /// state.
    pub fn run_with_timer(&mut self) -> Result<PoolStats, RuntimeError> {
        self.start()?;
        let interval = Duration::from_millis(self.config.timer_interval_ms.max(1));
        let delta_ms = interval.as_secs_f64() * 1000.0;

        while self.pool.state() == PoolState::Running {
            std::thread::sleep(interval);
            self.tick(delta_ms);
        }
        Ok(self.pool.stats())
    }

    /// Run to completion without any timer or throttling.
    pub fn run_synchronously(&mut self) -> Result<PoolStats, RuntimeError> {
        self.start()?;
        while self.pool.state() == PoolState::Running {
            // a thread can exit without running a Step, so retiring it
            // counts as progress too
            let before = (self.pool.stats().steps, self.pool.finished().len());
            self.pool.run(100);
            let after = (self.pool.stats().steps, self.pool.finished().len());
            if before == after && self.pool.state() == PoolState::Running {
                warn!("scheduler made no progress");
                break;
            }
        }
        Ok(self.pool.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::ir::{FrameLayout, Step};
    use crate::bytecode::link::Linker;
    use crate::bytecode::op::{BinaryOp, Instr, Term};
    use crate::bytecode::snippet::Snippet;
    use crate::lang::span::SourceRange;
    use crate::lang::value::Value;

    /// Frozen unless a test moves it.
    #[derive(Clone, Default)]
    struct ManualClock(Rc<Cell<f64>>);

    impl Clock for ManualClock {
        fn now_ms(&self) -> f64 {
            self.0.get()
        }
    }

    fn line(n: u32) -> Option<SourceRange> {
        Some(SourceRange::line(n, 1, 30))
    }

    fn add(lhs: Snippet, rhs: Snippet, range: Option<SourceRange>) -> Snippet {
        Snippet::binary(BinaryOp::Add, lhs, rhs, "int", range).unwrap()
    }

    /// i = 0; sum = 0; while (i < n) { sum = sum + i; i = i + 1; } return sum;
    fn summing(n: i64) -> Rc<Program> {
        let cond = Snippet::binary(
            BinaryOp::Lt,
            Snippet::local(0, "int", line(3)),
            Snippet::constant(n, "int", line(3)),
            "boolean",
            line(3),
        )
        .unwrap();
        let body = Snippet::block(
            vec![
                Snippet::assign(1, add(Snippet::local(1, "int", line(4)), Snippet::local(0, "int", line(4)), line(4)), line(4)),
                Snippet::assign(0, add(Snippet::local(0, "int", line(5)), Snippet::constant(1, "int", line(5)), line(5)), line(5)),
            ],
            line(4),
        );
        let program = Linker::new()
            .link_program(
                "sum",
                FrameLayout::new(0, 2).with_symbols(&["i", "sum"]),
                vec![
                    Snippet::assign(0, Snippet::constant(0, "int", line(1)), line(1)),
                    Snippet::assign(1, Snippet::constant(0, "int", line(2)), line(2)),
                    Snippet::while_loop(cond, body, line(3)),
                    Snippet::ret(Some(Snippet::local(1, "int", line(6))), line(6)),
                ],
            )
            .unwrap();
        Rc::new(program)
    }

    fn interpreter(main: Rc<Program>) -> Interpreter<ManualClock> {
        let mut interpreter = Interpreter::with_clock(InterpreterConfig::default(), ManualClock::default());
        interpreter.init(main, ClassRegistry::new()).unwrap();
        interpreter
    }

    /// `main` calls `foo` and has no Step after the call. With two threads
    /// `foo` returns on the last Step of main's slice, so main's next slice
    /// exits without running a Step. Returns the interpreter and the id of
    /// the other thread.
    fn exits_between_slices() -> (Interpreter<ManualClock>, ThreadId) {
        let mut foo: Vec<Step> = (0..48)
            .map(|index| Step {
                index,
                instrs: vec![Instr::Eval(Term::constant(0))],
                range: None,
            })
            .collect();
        foo.push(Step {
            index: 48,
            instrs: vec![Instr::Return(None)],
            range: None,
        });
        let mut registry = ClassRegistry::new();
        registry.add_program(Program::new("foo", FrameLayout::default(), foo));
        let main = Program::new(
            "main",
            FrameLayout::default(),
            vec![Step {
                index: 0,
                instrs: vec![Instr::Invoke {
                    method: "foo".into(),
                    argc: 0,
                }],
                range: None,
            }],
        );

        // 50 Steps per thread and slice, also in max-speed ticks
        let config = InterpreterConfig {
            max_speed_batch: 100,
            ..InterpreterConfig::default()
        };
        let mut interpreter = Interpreter::with_clock(config, ManualClock::default());
        interpreter.init(Rc::new(main), registry).unwrap();
        let other = interpreter.pool_mut().create_thread(summing(100), vec![]).unwrap();
        (interpreter, other)
    }

    #[test]
    fn test_run_synchronously_past_stepless_exit() {
        let (mut interpreter, other) = exits_between_slices();

        interpreter.run_synchronously().unwrap();
        assert_eq!(interpreter.state(), PoolState::Stopped);
        assert_eq!(interpreter.pool().finished().len(), 2);
        let other = interpreter.pool().thread(other).unwrap();
        assert_eq!(other.result(), Some(&Value::Integer(4950)));
    }

    #[test]
    fn test_tick_past_stepless_exit() {
        let (mut interpreter, other) = exits_between_slices();

        interpreter.start().unwrap();
        interpreter.tick(10.0);
        assert_eq!(interpreter.state(), PoolState::Stopped);
        let other = interpreter.pool().thread(other).unwrap();
        assert_eq!(other.result(), Some(&Value::Integer(4950)));
    }

    #[test]
    fn test_config_defaults() {
        let config = InterpreterConfig::default();
        assert_eq!(config.steps_per_second, None);
        assert_eq!(config.max_load_factor, 0.7);
        assert_eq!(config.min_batch, 1000);
        assert_eq!(config.limits.max_call_depth, 1000);
    }

    #[test]
    fn test_run_synchronously() {
        let mut interpreter = interpreter(summing(5));
        assert_eq!(interpreter.state(), PoolState::Paused);

        let stats = interpreter.run_synchronously().unwrap();
        assert_eq!(interpreter.state(), PoolState::Stopped);
        assert!(stats.steps > 5);
        assert_eq!(interpreter.main_thread().unwrap().result(), Some(&Value::Integer(10)));
    }

    #[test]
    fn test_start_after_stop_starts_over() {
        let mut interpreter = interpreter(summing(3));
        interpreter.run_synchronously().unwrap();
        let first = interpreter.main_thread().map(Thread::id);

        interpreter.start().unwrap();
        assert_eq!(interpreter.state(), PoolState::Running);
        assert_ne!(interpreter.main_thread().map(Thread::id), first);
        assert_eq!(interpreter.pool().stats().steps, 0);
    }

    #[test]
    fn test_stop_with_restart() {
        let mut interpreter = interpreter(summing(1000));
        interpreter.start().unwrap();
        interpreter.pool_mut().run(50);

        interpreter.stop(true).unwrap();
        assert_eq!(interpreter.state(), PoolState::Running);
        assert_eq!(interpreter.pool().stats().steps, 0);
    }

    #[test]
    fn test_tick_at_max_speed_runs_to_completion() {
        let mut interpreter = interpreter(summing(100));
        interpreter.start().unwrap();

        let report = interpreter.tick(10.0);
        assert_eq!(interpreter.state(), PoolState::Stopped);
        assert_eq!(report.steps as u64, interpreter.pool().stats().steps);
        assert_eq!(interpreter.main_thread().unwrap().result(), Some(&Value::Integer(4950)));
    }

    #[test]
    fn test_throttled_tick_runs_one_step() {
        let mut interpreter = interpreter(summing(100));
        interpreter.set_speed(Some(100.0));
        interpreter.start().unwrap();

        assert_eq!(interpreter.tick(5.0).steps, 1);
        assert_eq!(interpreter.config().steps_per_second, Some(100.0));
    }

    #[test]
    fn test_step_into_and_over() {
        let mut interpreter = interpreter(summing(3));

        // both initial assignments share the first Step
        interpreter.execute_one_step(true).unwrap();
        assert_eq!(interpreter.completed_single_steps(), 1);
        assert_eq!(interpreter.state(), PoolState::Paused);
        let locals = interpreter.pool().current_thread().unwrap().locals();
        assert_eq!(locals[0], ("i".to_string(), Value::Integer(0)));

        // stepping over the loop Step runs the whole loop on the next tick
        interpreter.execute_one_step(false).unwrap();
        assert_eq!(interpreter.state(), PoolState::Running);
        interpreter.tick(10.0);
        assert_eq!(interpreter.state(), PoolState::Paused);
        assert_eq!(interpreter.completed_single_steps(), 2);
        let locals = interpreter.pool().current_thread().unwrap().locals();
        assert_eq!(locals[1], ("sum".to_string(), Value::Integer(3)));
    }

    #[test]
    fn test_step_from_stopped_reloads_paused() {
        let mut interpreter = interpreter(summing(2));
        interpreter.run_synchronously().unwrap();

        interpreter.execute_one_step(true).unwrap();
        assert_eq!(interpreter.state(), PoolState::Paused);
        assert_eq!(interpreter.completed_single_steps(), 0);
        assert_eq!(interpreter.pool().next_step_position().unwrap().step, 0);
    }

    #[test]
    fn test_step_out_of_callee() {
        let mut registry = ClassRegistry::new();
        registry.add_program((*summing(4)).clone());
        let main = Linker::new()
            .link_program(
                "main",
                FrameLayout::new(0, 1),
                vec![
                    Snippet::assign(0, Snippet::call("sum", vec![], Some("int"), line(10)), line(10)),
                    Snippet::ret(Some(Snippet::local(0, "int", line(11))), line(11)),
                ],
            )
            .unwrap();

        let mut interpreter = Interpreter::with_clock(InterpreterConfig::default(), ManualClock::default());
        interpreter.init(Rc::new(main), registry).unwrap();

        // call, then the first Step of the callee
        interpreter.execute_one_step(true).unwrap();
        interpreter.execute_one_step(true).unwrap();
        assert_eq!(interpreter.pool().current_thread().unwrap().depth(), 2);

        interpreter.step_out();
        interpreter.tick(10.0);
        assert_eq!(interpreter.state(), PoolState::Paused);
        assert_eq!(interpreter.pool().current_thread().unwrap().depth(), 1);

        interpreter.start().unwrap();
        interpreter.tick(10.0);
        assert_eq!(interpreter.main_thread().unwrap().result(), Some(&Value::Integer(6)));
    }

    #[test]
    fn test_config_from_json_fills_defaults() {
        let config: InterpreterConfig = serde_json::from_str(r#"{ "steps_per_second": 50.0 }"#).unwrap();
        assert_eq!(config.steps_per_second, Some(50.0));
        assert_eq!(config.timer_interval_ms, 10);
    }
}
