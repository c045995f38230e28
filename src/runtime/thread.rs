use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::bytecode::ir::Program;
use crate::lang::span::SourceRange;
use crate::lang::value::Value;
use crate::runtime::exec::StepOutcome;
use crate::runtime::pool::RunContext;
use crate::runtime::runtime_error::{RuntimeError, stack_underflow};
use crate::runtime::semaphore::SemaphoreId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId(pub u32);

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadState {
    Runnable,
    /// Blocked on a semaphore; not scheduled.
    Waiting,
    /// Held by the debugger (breakpoint).
    Paused,
    Exited,
    ExitedWithError,
    Terminated,
}

impl ThreadState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ThreadState::Exited | ThreadState::ExitedWithError | ThreadState::Terminated
        )
    }
}

/// Safety limits, checked after every Step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThreadLimits {
    pub max_call_depth: usize,
    pub max_stack_size: usize,
}

impl Default for ThreadLimits {
    fn default() -> Self {
        ThreadLimits {
            max_call_depth: 1000,
            max_stack_size: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TryHandler {
    pub catch_index: usize,
    /// Operand stack size when the try region was entered.
    pub stack_size: usize,
    /// Number of semaphores held when the try region was entered.
    pub held: usize,
}

/// One activation of a program.
#[derive(Debug, Clone)]
pub struct Frame {
    pub program: Rc<Program>,
    pub step_index: usize,
    /// First slot of this frame on the thread's stack (`this`, then
    /// parameters, then locals; operands above).
    pub stack_base: usize,
    pub handlers: Vec<TryHandler>,
}

impl Frame {
    pub fn operand_floor(&self) -> usize {
        self.stack_base + self.program.frame.slots()
    }

    pub fn next_range(&self) -> Option<SourceRange> {
        self.program.step(self.step_index).and_then(|s| s.range)
    }
}

pub type StepCallback = Box<dyn FnOnce()>;

/// Remembers where a single step (over or out) ends.
struct StepMarker {
    depth: usize,
    not_index: Option<usize>,
    callback: Option<StepCallback>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadRunInfo {
    pub state: ThreadState,
    pub steps_executed: usize,
    /// A single-step marker was reached; the thread stopped there.
    pub step_completed: bool,
}

/// A cooperatively scheduled call context.
pub struct Thread {
    id: ThreadId,
    name: String,
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<Frame>,
    pub(crate) state: ThreadState,
    pub(crate) held: Vec<SemaphoreId>,
    /// Program a native asked to call; pushed once the current Step ends.
    pub(crate) pending_call: Option<(Rc<Program>, Vec<Value>)>,
    marker: Option<StepMarker>,
    last_range: Option<SourceRange>,
    error: Option<RuntimeError>,
    result: Option<Value>,
    skip_breakpoint: bool,
    limits: ThreadLimits,
    steps: u64,
}

impl std::fmt::Debug for Thread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("depth", &self.frames.len())
            .field("stack", &self.stack)
            .field("held", &self.held)
            .field("marked", &self.marker.is_some())
            .finish()
    }
}

impl Thread {
    pub fn new(id: ThreadId, name: &str, limits: ThreadLimits) -> Self {
        Self {
            id,
            name: name.to_string(),
            stack: Vec::new(),
            frames: Vec::new(),
            state: ThreadState::Runnable,
            held: Vec::new(),
            pending_call: None,
            marker: None,
            last_range: None,
            error: None,
            result: None,
            skip_breakpoint: false,
            limits,
            steps: 0,
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn held(&self) -> &[SemaphoreId] {
        &self.held
    }

    pub fn error(&self) -> Option<&RuntimeError> {
        self.error.as_ref()
    }

    /// Return value of the bottom frame, once the thread has exited.
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn steps_executed(&self) -> u64 {
        self.steps
    }

    pub fn is_marked(&self) -> bool {
        self.marker.is_some()
    }

    /// Source range of the Step about to run.
    pub fn next_step_range(&self) -> Option<SourceRange> {
        self.frames.last().and_then(Frame::next_range)
    }

    /// Named local slots of the top frame, for the debugger.
    pub fn locals(&self) -> Vec<(String, Value)> {
        let Some(frame) = self.frames.last() else {
            return Vec::new();
        };
        let slots = frame.program.frame.slots();
        (0..slots)
            .filter_map(|slot| {
                let value = self.stack.get(frame.stack_base + slot)?.clone();
                let name = frame
                    .program
                    .frame
                    .symbols
                    .get(slot)
                    .cloned()
                    .unwrap_or_else(|| format!("local[{}]", slot));
                Some((name, value))
            })
            .collect()
    }

    pub(crate) fn operand_floor(&self) -> usize {
        self.frames.last().map(Frame::operand_floor).unwrap_or(0)
    }

    // =========================================================================
    // Frames
    // =========================================================================

    /// Push a new frame for `program` with the given arguments.
    pub fn push_program(&mut self, program: Rc<Program>, args: Vec<Value>) -> Result<(), RuntimeError> {
        check_arguments(&program, &args)?;
        self.stack.extend(args);
        self.call_program(program)
    }

    /// Push a new frame whose arguments are already the top values of the
    /// operand stack.
    pub(crate) fn call_program(&mut self, program: Rc<Program>) -> Result<(), RuntimeError> {
        if self.frames.len() >= self.limits.max_call_depth {
            return Err(RuntimeError::new(
                "StackOverflowError",
                &format!(
                    "call depth limit exceeded ({}) - possible infinite recursion in '{}'",
                    self.limits.max_call_depth, program.name
                ),
            ));
        }

        let argc = program.frame.arguments();
        if self.stack.len() < self.operand_floor() + argc {
            return Err(stack_underflow());
        }
        let stack_base = self.stack.len() - argc;
        self.stack
            .extend(std::iter::repeat_n(Value::Null, program.frame.locals));

        self.frames.push(Frame {
            program,
            step_index: 0,
            stack_base,
            handlers: Vec::new(),
        });
        Ok(())
    }

    fn return_from_frame(&mut self, value: Option<Value>) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        self.stack.truncate(frame.stack_base);

        match value {
            Some(value) if !self.frames.is_empty() => self.stack.push(value),
            value => {
                if self.frames.is_empty() {
                    self.result = value;
                }
            }
        }
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Run up to `max_steps` Steps. Stops early when the thread leaves the
    /// runnable state or a single-step marker is reached.
    pub fn run(&mut self, max_steps: usize, ctx: &mut RunContext<'_>) -> ThreadRunInfo {
        let mut executed = 0;
        let mut step_completed = false;

        while executed < max_steps && self.state == ThreadState::Runnable {
            let Some(frame) = self.frames.last() else {
                self.finish(ThreadState::Exited, ctx);
                break;
            };
            let program = Rc::clone(&frame.program);
            let index = frame.step_index;
            let depth = self.frames.len();

            if !std::mem::take(&mut self.skip_breakpoint) && ctx.is_breakpoint(&program.name, index) {
                self.state = ThreadState::Paused;
                self.skip_breakpoint = true;
                break;
            }

            let Some(step) = program.step(index) else {
                // ran past the last Step
                self.return_from_frame(None);
                continue;
            };

            let outcome = step.invoke(self, ctx);
            executed += 1;
            self.steps += 1;
            self.last_range = step.range;

            match outcome {
                StepOutcome::Continue(next) => {
                    if let Some(frame) = self.frames.get_mut(depth - 1) {
                        frame.step_index = next;
                    }
                }
                StepOutcome::Return(value) => self.return_from_frame(value),
                StepOutcome::Suspend(resume_at) => {
                    if let Some(frame) = self.frames.get_mut(depth - 1) {
                        frame.step_index = resume_at;
                    }
                    self.state = ThreadState::Waiting;
                }
                StepOutcome::Fail(err) => self.throw(err.with_range(step.range), ctx),
                StepOutcome::Exit => self.finish(ThreadState::Terminated, ctx),
            }

            if self.state != ThreadState::Runnable && self.state != ThreadState::Waiting {
                // finished inside the Step
            } else if self.stack.len() > self.limits.max_stack_size {
                let err = RuntimeError::new(
                    "StackOverflowError",
                    &format!("stack size limit exceeded ({})", self.limits.max_stack_size),
                );
                self.throw(err.with_range(step.range), ctx);
            }

            if self.state == ThreadState::Runnable && self.frames.is_empty() {
                self.finish(ThreadState::Exited, ctx);
            }

            if self.marker.is_some() && self.single_step_completed() {
                if let Some(callback) = self.marker.take().and_then(|m| m.callback) {
                    callback();
                }
                step_completed = true;
                break;
            }
        }

        ThreadRunInfo {
            state: self.state,
            steps_executed: executed,
            step_completed,
        }
    }

    /// Leave the debugger-held state.
    pub fn resume(&mut self) {
        if self.state == ThreadState::Paused {
            self.state = ThreadState::Runnable;
        }
    }

    // =========================================================================
    // Single stepping
    // =========================================================================

    /// Stop once control is back at the current depth (or shallower) on a
    /// different Step. A callee that runs for many Steps, or waits across
    /// scheduler ticks, does not end the step.
    pub fn mark_single_step_over(&mut self, callback: impl FnOnce() + 'static) {
        self.marker = Some(StepMarker {
            depth: self.frames.len(),
            not_index: self.frames.last().map(|f| f.step_index),
            callback: Some(Box::new(callback)),
        });
    }

    /// Stop once the current frame has returned.
    pub fn mark_step_out(&mut self, callback: impl FnOnce() + 'static) {
        self.marker = Some(StepMarker {
            depth: self.frames.len().saturating_sub(1),
            not_index: None,
            callback: Some(Box::new(callback)),
        });
    }

    pub fn unmark_step(&mut self) {
        self.marker = None;
    }

    fn single_step_completed(&self) -> bool {
        let Some(marker) = &self.marker else {
            return false;
        };

        let depth = self.frames.len();
        if depth != marker.depth {
            return depth < marker.depth;
        }
        let Some(frame) = self.frames.last() else {
            return true;
        };
        if marker.not_index == Some(frame.step_index) {
            return false;
        }

        // Steps of the same source position count as one
        !matches!(
            (frame.next_range(), self.last_range),
            (Some(next), Some(last)) if next.same_start(&last)
        )
    }

    // =========================================================================
    // Exceptions and exit
    // =========================================================================

    /// Unwind to the innermost try handler, or end the thread with the
    /// error if there is none.
    pub fn throw(&mut self, mut error: RuntimeError, ctx: &mut RunContext<'_>) {
        while let Some(frame) = self.frames.last_mut() {
            match frame.handlers.pop() {
                Some(handler) => {
                    frame.step_index = handler.catch_index;
                    self.stack.truncate(handler.stack_size);
                    self.stack.push(Value::String(error.describe()));
                    self.release_above(handler.held, ctx);
                    debug!(thread = %self.id, exception = %error.exception, "caught");
                    return;
                }
                None => {
                    let name = frame.program.name.clone();
                    let base = frame.stack_base;
                    self.frames.pop();
                    self.stack.truncate(base);
                    error = error.with_context(&name);
                }
            }
        }

        error!(thread = %self.id, name = %self.name, "uncaught {}", error);
        self.error = Some(error);
        self.finish(ThreadState::ExitedWithError, ctx);
    }

    /// Enter a terminal state, giving back every semaphore still held.
    pub(crate) fn finish(&mut self, state: ThreadState, ctx: &mut RunContext<'_>) {
        self.state = state;
        self.release_above(0, ctx);
        if state != ThreadState::Exited {
            self.frames.clear();
            self.stack.clear();
        }
        debug!(thread = %self.id, state = ?state, steps = self.steps, "thread finished");
    }

    fn release_above(&mut self, keep: usize, ctx: &mut RunContext<'_>) {
        while self.held.len() > keep {
            if let Some(semaphore) = self.held.pop() {
                ctx.release(semaphore, self.id);
            }
        }
    }
}

pub(crate) fn check_arguments(program: &Program, args: &[Value]) -> Result<(), RuntimeError> {
    let expected = program.frame.arguments();
    if args.len() != expected {
        return Err(RuntimeError::new(
            "IllegalArgumentException",
            &format!(
                "{} expects {} argument(s), got {}",
                program.name,
                expected,
                args.len()
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::ir::{FrameLayout, Step};
    use crate::bytecode::op::{BinaryOp, Instr, Term};
    use crate::runtime::pool::Breakpoint;
    use crate::runtime::registry::ClassRegistry;
    use crate::runtime::semaphore::Semaphore;
    use std::cell::Cell;
    use std::collections::HashSet;

    fn step(index: usize, line: u32, instrs: Vec<Instr>) -> Step {
        Step {
            index,
            instrs,
            range: Some(SourceRange::line(line, 1, 20)),
        }
    }

    fn program(name: &str, frame: FrameLayout, steps: Vec<Step>) -> Rc<Program> {
        Rc::new(Program::new(name, frame, steps))
    }

    struct Harness {
        registry: ClassRegistry,
        semaphores: Vec<Semaphore>,
        breakpoints: HashSet<Breakpoint>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                registry: ClassRegistry::new(),
                semaphores: Vec::new(),
                breakpoints: HashSet::new(),
            }
        }

        fn run(&mut self, thread: &mut Thread, max_steps: usize) -> ThreadRunInfo {
            let mut ctx = RunContext::new(&self.registry, &mut self.semaphores, &self.breakpoints);
            thread.run(max_steps, &mut ctx)
        }
    }

    fn thread_for(program: Rc<Program>, args: Vec<Value>) -> Thread {
        let mut thread = Thread::new(ThreadId(1), "main", ThreadLimits::default());
        thread.push_program(program, args).unwrap();
        thread
    }

    /// local[0] = local[0] + 1 per Step, `count` Steps, then return local[0]
    fn counter(count: usize) -> Rc<Program> {
        let mut steps: Vec<Step> = (0..count)
            .map(|i| {
                step(
                    i,
                    i as u32 + 1,
                    vec![Instr::Store(
                        0,
                        Term::binary(BinaryOp::Add, Term::Local(0), Term::constant(1)),
                    )],
                )
            })
            .collect();
        steps.push(step(count, count as u32 + 1, vec![Instr::Return(Some(Term::Local(0)))]));
        program("counter", FrameLayout::new(0, 1), steps)
    }

    #[test]
    fn test_run_respects_budget() {
        let mut h = Harness::new();
        let mut thread = thread_for(counter(5), vec![]);

        let info = h.run(&mut thread, 3);
        assert_eq!(info.steps_executed, 3);
        assert_eq!(info.state, ThreadState::Runnable);
        assert_eq!(thread.frames()[0].step_index, 3);

        let info = h.run(&mut thread, 100);
        assert_eq!(info.steps_executed, 3);
        assert_eq!(info.state, ThreadState::Exited);
        assert_eq!(thread.result(), Some(&Value::Integer(5)));
    }

    #[test]
    fn test_call_passes_arguments_and_return_value() {
        let mut h = Harness::new();
        let double = program(
            "double",
            FrameLayout::new(1, 0),
            vec![step(
                0,
                10,
                vec![Instr::Return(Some(Term::binary(
                    BinaryOp::Mul,
                    Term::Local(0),
                    Term::constant(2),
                )))],
            )],
        );
        h.registry.add_program((*double).clone());

        let main = program(
            "main",
            FrameLayout::new(0, 1),
            vec![
                step(0, 1, vec![Instr::Push(Term::constant(21)), Instr::Invoke { method: "double".into(), argc: 1 }]),
                step(1, 2, vec![Instr::Store(0, Term::Pop), Instr::Return(Some(Term::Local(0)))]),
            ],
        );
        let mut thread = thread_for(main, vec![]);

        let info = h.run(&mut thread, 10);
        assert_eq!(info.state, ThreadState::Exited);
        assert_eq!(info.steps_executed, 3);
        assert_eq!(thread.result(), Some(&Value::Integer(42)));
    }

    #[test]
    fn test_uncaught_error_exits_with_call_stack() {
        let mut h = Harness::new();
        let main = program(
            "main",
            FrameLayout::new(0, 0),
            vec![step(0, 4, vec![Instr::Eval(Term::binary(BinaryOp::Div, Term::constant(1), Term::constant(0)))])],
        );
        let mut thread = thread_for(main, vec![]);

        let info = h.run(&mut thread, 10);
        assert_eq!(info.state, ThreadState::ExitedWithError);
        let err = thread.error().unwrap();
        assert_eq!(err.exception, "ArithmeticException");
        assert_eq!(err.call_stack, vec!["main".to_string()]);
        assert_eq!(err.range, Some(SourceRange::line(4, 1, 20)));
    }

    #[test]
    fn test_try_catch_pushes_message() {
        let mut h = Harness::new();
        let main = program(
            "main",
            FrameLayout::new(0, 1),
            vec![
                step(0, 1, vec![
                    Instr::EnterTry { catch: 1 },
                    Instr::Push(Term::constant(7)),
                    Instr::Throw { class: "IllegalStateException".into(), message: Term::constant("boom") },
                ]),
                step(1, 2, vec![Instr::Store(0, Term::Pop), Instr::Return(Some(Term::Local(0)))]),
            ],
        );
        let mut thread = thread_for(main, vec![]);

        let info = h.run(&mut thread, 10);
        assert_eq!(info.state, ThreadState::Exited);
        assert_eq!(thread.result(), Some(&Value::from("IllegalStateException: boom")));
    }

    #[test]
    fn test_error_in_callee_unwinds_to_caller_handler() {
        let mut h = Harness::new();
        h.registry.add_program(Program::new(
            "fail",
            FrameLayout::new(0, 0),
            vec![step(0, 9, vec![Instr::Throw { class: "E".into(), message: Term::constant("x") }])],
        ));
        let main = program(
            "main",
            FrameLayout::new(0, 0),
            vec![
                step(0, 1, vec![Instr::EnterTry { catch: 2 }, Instr::Invoke { method: "fail".into(), argc: 0 }]),
                step(1, 2, vec![Instr::ExitTry, Instr::Return(Some(Term::constant("no")))]),
                step(2, 3, vec![Instr::Return(Some(Term::Pop))]),
            ],
        );
        let mut thread = thread_for(main, vec![]);

        h.run(&mut thread, 10);
        assert_eq!(thread.result(), Some(&Value::from("E: x")));
    }

    #[test]
    fn test_exit_releases_semaphores() {
        let mut h = Harness::new();
        h.semaphores.push(Semaphore::new(SemaphoreId(0), 1));
        let main = program(
            "main",
            FrameLayout::new(0, 0),
            vec![
                step(0, 1, vec![Instr::Acquire(Term::Const(Value::Semaphore(SemaphoreId(0))))]),
                step(1, 2, vec![Instr::Exit]),
            ],
        );
        let mut thread = thread_for(main, vec![]);

        let info = h.run(&mut thread, 10);
        assert_eq!(info.state, ThreadState::Terminated);
        assert!(thread.held().is_empty());
        assert_eq!(h.semaphores[0].available(), 1);
    }

    #[test]
    fn test_recursion_limit() {
        let mut h = Harness::new();
        h.registry.add_program(Program::new(
            "forever",
            FrameLayout::new(0, 0),
            vec![step(0, 1, vec![Instr::Invoke { method: "forever".into(), argc: 0 }])],
        ));
        let forever = h.registry.program("forever").unwrap();
        let mut thread = Thread::new(
            ThreadId(1),
            "main",
            ThreadLimits {
                max_call_depth: 10,
                max_stack_size: 100,
            },
        );
        thread.push_program(forever, vec![]).unwrap();

        let info = h.run(&mut thread, 100);
        assert_eq!(info.state, ThreadState::ExitedWithError);
        assert_eq!(thread.error().unwrap().exception, "StackOverflowError");
    }

    #[test]
    fn test_breakpoint_pauses_then_resumes_past_it() {
        let mut h = Harness::new();
        h.breakpoints.insert(Breakpoint::new("counter", 2));
        let mut thread = thread_for(counter(4), vec![]);

        let info = h.run(&mut thread, 100);
        assert_eq!(info.state, ThreadState::Paused);
        assert_eq!(info.steps_executed, 2);

        thread.resume();
        let info = h.run(&mut thread, 1);
        assert_eq!(info.steps_executed, 1);
        assert_eq!(thread.frames()[0].step_index, 3);
    }

    #[test]
    fn test_step_over_waits_for_callee() {
        let mut h = Harness::new();
        h.registry.add_program((*counter(5)).clone());
        let main = program(
            "main",
            FrameLayout::new(0, 0),
            vec![
                step(0, 1, vec![Instr::Invoke { method: "counter".into(), argc: 0 }]),
                step(1, 2, vec![Instr::Drop]),
                step(2, 3, vec![Instr::Return(None)]),
            ],
        );
        let mut thread = thread_for(main, vec![]);

        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        thread.mark_single_step_over(move || flag.set(true));

        let info = h.run(&mut thread, 100);
        assert!(info.step_completed);
        assert!(fired.get());
        // invoke + 6 Steps of the callee
        assert_eq!(info.steps_executed, 7);
        assert_eq!(thread.frames()[0].step_index, 1);
        assert!(!thread.is_marked());
    }

    #[test]
    fn test_step_out_stops_in_caller() {
        let mut h = Harness::new();
        h.registry.add_program((*counter(3)).clone());
        let main = program(
            "main",
            FrameLayout::new(0, 0),
            vec![
                step(0, 1, vec![Instr::Invoke { method: "counter".into(), argc: 0 }]),
                step(1, 2, vec![Instr::Return(None)]),
            ],
        );
        let mut thread = thread_for(main, vec![]);

        h.run(&mut thread, 2);
        assert_eq!(thread.depth(), 2);

        thread.mark_step_out(|| {});
        let info = h.run(&mut thread, 100);
        assert!(info.step_completed);
        assert_eq!(thread.depth(), 1);
        assert_eq!(thread.stack(), &[Value::Integer(3)]);
    }

    #[test]
    fn test_unmark_cancels_step() {
        let mut h = Harness::new();
        let mut thread = thread_for(counter(3), vec![]);
        thread.mark_single_step_over(|| {});
        thread.unmark_step();

        let info = h.run(&mut thread, 100);
        assert!(!info.step_completed);
        assert_eq!(info.state, ThreadState::Exited);
    }

    #[test]
    fn test_wrong_argument_count() {
        let mut thread = Thread::new(ThreadId(1), "main", ThreadLimits::default());
        let err = thread
            .push_program(counter(1), vec![Value::Integer(1)])
            .unwrap_err();
        assert_eq!(err.exception, "IllegalArgumentException");
    }

    #[test]
    fn test_locals_are_named() {
        let main = program(
            "main",
            FrameLayout::new(1, 1).with_symbols(&["n", "total"]),
            vec![step(0, 1, vec![Instr::Return(None)])],
        );
        let thread = thread_for(main, vec![Value::Integer(3)]);
        assert_eq!(
            thread.locals(),
            vec![("n".to_string(), Value::Integer(3)), ("total".to_string(), Value::Null)]
        );
    }
}
