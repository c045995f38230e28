//! # Thread pool
//!
//! Owns every live thread and semaphore and drives them round robin.
//!
//! Steps never touch the pool directly. While a thread runs, it sees a
//! [`RunContext`] that lends out the registry, the semaphores and the
//! breakpoints, and collects [`PoolRequest`]s (re-admit a thread that
//! received a permit, start a new thread). The pool applies the requests
//! after the thread's slice, so the runnable list and its cursor are only
//! ever changed by the pool's own methods.

use std::collections::HashSet;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::bytecode::ir::Program;
use crate::lang::span::SourceRange;
use crate::lang::value::Value;
use crate::runtime::load::StepRunner;
use crate::runtime::registry::ClassRegistry;
use crate::runtime::runtime_error::RuntimeError;
use crate::runtime::semaphore::{Acquire, Semaphore, SemaphoreError, SemaphoreId};
use crate::runtime::thread::{Thread, ThreadId, ThreadLimits, ThreadState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolState {
    NotInitialized,
    Running,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Breakpoint {
    pub program: String,
    pub step: usize,
}

impl Breakpoint {
    pub fn new(program: &str, step: usize) -> Self {
        Self {
            program: program.to_string(),
            step,
        }
    }
}

/// Where the current thread will continue, for the program pointer.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramPointer {
    pub thread: ThreadId,
    pub program: String,
    pub step: usize,
    pub range: Option<SourceRange>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub steps: u64,
    pub threads_started: u32,
    pub threads_failed: u32,
}

#[derive(Debug, Clone)]
pub enum PoolRequest {
    /// `thread` received a permit of `semaphore` and may run again.
    Restore {
        thread: ThreadId,
        semaphore: SemaphoreId,
    },
    Spawn {
        program: Rc<Program>,
        args: Vec<Value>,
    },
}

// =============================================================================
// Run context
// =============================================================================

/// The part of the pool a running thread may use.
pub struct RunContext<'p> {
    pub registry: &'p ClassRegistry,
    semaphores: &'p mut Vec<Semaphore>,
    breakpoints: &'p HashSet<Breakpoint>,
    requests: Vec<PoolRequest>,
}

impl<'p> RunContext<'p> {
    pub fn new(
        registry: &'p ClassRegistry,
        semaphores: &'p mut Vec<Semaphore>,
        breakpoints: &'p HashSet<Breakpoint>,
    ) -> Self {
        Self {
            registry,
            semaphores,
            breakpoints,
            requests: Vec::new(),
        }
    }

    pub fn is_breakpoint(&self, program: &str, step: usize) -> bool {
        !self.breakpoints.is_empty()
            && self
                .breakpoints
                .iter()
                .any(|b| b.step == step && b.program == program)
    }

    pub fn new_semaphore(&mut self, permits: u32) -> SemaphoreId {
        let id = SemaphoreId(self.semaphores.len() as u32);
        self.semaphores.push(Semaphore::new(id, permits));
        id
    }

    pub fn acquire(&mut self, id: SemaphoreId, thread: ThreadId) -> Result<Acquire, RuntimeError> {
        let semaphore = self.semaphores.get_mut(id.0 as usize).ok_or_else(|| {
            RuntimeError::new(
                "IllegalMonitorStateException",
                &SemaphoreError::Unknown(id).to_string(),
            )
        })?;
        Ok(semaphore.acquire(thread))
    }

    /// Give back a permit. A waiter that receives it is re-admitted after
    /// the current slice.
    pub fn release(&mut self, id: SemaphoreId, thread: ThreadId) {
        let Some(semaphore) = self.semaphores.get_mut(id.0 as usize) else {
            warn!("{}", SemaphoreError::Unknown(id));
            return;
        };
        match semaphore.release(thread) {
            Ok(Some(next)) => self.requests.push(PoolRequest::Restore {
                thread: next,
                semaphore: id,
            }),
            Ok(None) => {}
            Err(err) => warn!("{}", err),
        }
    }

    pub fn spawn(&mut self, program: Rc<Program>, args: Vec<Value>) {
        self.requests.push(PoolRequest::Spawn { program, args });
    }

    pub fn into_requests(self) -> Vec<PoolRequest> {
        self.requests
    }
}

// =============================================================================
// Pool
// =============================================================================

pub struct ThreadPool {
    runnable: Vec<Thread>,
    /// Threads waiting on a semaphore.
    suspended: Vec<Thread>,
    finished: Vec<Thread>,
    cursor: usize,
    semaphores: Vec<Semaphore>,
    state: PoolState,
    /// Single-step mode: stay on the current thread.
    keep_thread: bool,
    registry: ClassRegistry,
    breakpoints: HashSet<Breakpoint>,
    limits: ThreadLimits,
    next_thread: u32,
    stats: PoolStats,
    pointer: Option<ProgramPointer>,
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new(ThreadLimits::default())
    }
}

impl ThreadPool {
    pub fn new(limits: ThreadLimits) -> Self {
        Self {
            runnable: Vec::new(),
            suspended: Vec::new(),
            finished: Vec::new(),
            cursor: 0,
            semaphores: Vec::new(),
            state: PoolState::NotInitialized,
            keep_thread: false,
            registry: ClassRegistry::new(),
            breakpoints: HashSet::new(),
            limits,
            next_thread: 0,
            stats: PoolStats::default(),
            pointer: None,
        }
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    pub fn set_state(&mut self, state: PoolState) {
        if self.state != state {
            info!(from = ?self.state, to = ?state, "pool state");
            self.state = state;
        }
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    pub fn semaphores(&self) -> &[Semaphore] {
        &self.semaphores
    }

    pub fn runnable(&self) -> &[Thread] {
        &self.runnable
    }

    pub fn suspended(&self) -> &[Thread] {
        &self.suspended
    }

    /// Threads that have exited since the last `init`.
    pub fn finished(&self) -> &[Thread] {
        &self.finished
    }

    pub fn current_thread(&self) -> Option<&Thread> {
        self.runnable.get(self.cursor)
    }

    pub fn thread(&self, id: ThreadId) -> Option<&Thread> {
        self.runnable
            .iter()
            .chain(&self.suspended)
            .chain(&self.finished)
            .find(|t| t.id() == id)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Discard everything and prepare a main thread for `main`. The pool is
    /// left paused.
    pub fn init(&mut self, main: Rc<Program>, registry: ClassRegistry) -> Result<ThreadId, RuntimeError> {
        self.clear();
        self.stats = PoolStats::default();
        self.finished.clear();
        self.registry = registry;

        let id = self.create_thread(main, Vec::new())?;
        self.set_state(PoolState::Paused);
        Ok(id)
    }

    pub fn start(&mut self) {
        match self.state {
            PoolState::NotInitialized | PoolState::Stopped => {
                warn!(state = ?self.state, "start needs a fresh init");
            }
            _ => {
                self.resume_threads();
                self.keep_thread = false;
                self.set_state(PoolState::Running);
            }
        }
    }

    pub fn pause(&mut self) {
        if self.state == PoolState::Running {
            self.set_state(PoolState::Paused);
        }
        self.keep_thread = true;
        self.unmark_step();
    }

    /// Drop all threads and semaphores immediately.
    pub fn stop(&mut self) {
        if self.state == PoolState::NotInitialized {
            return;
        }
        self.unmark_step();
        info!(
            steps = self.stats.steps,
            threads = self.stats.threads_started,
            failed = self.stats.threads_failed,
            "program stopped"
        );
        self.clear();
        self.set_state(PoolState::Stopped);
    }

    fn clear(&mut self) {
        self.runnable.clear();
        self.suspended.clear();
        self.semaphores.clear();
        self.cursor = 0;
        self.keep_thread = false;
        self.pointer = None;
    }

    pub fn create_thread(&mut self, program: Rc<Program>, args: Vec<Value>) -> Result<ThreadId, RuntimeError> {
        let id = ThreadId(self.next_thread);
        self.next_thread += 1;

        let mut thread = Thread::new(id, &program.name, self.limits);
        thread.push_program(program, args)?;
        debug!(thread = %id, name = thread.name(), "thread created");

        self.runnable.push(thread);
        self.stats.threads_started += 1;
        Ok(id)
    }

    /// Create a semaphore from outside any thread.
    pub fn new_semaphore(&mut self, permits: u32) -> SemaphoreId {
        let id = SemaphoreId(self.semaphores.len() as u32);
        self.semaphores.push(Semaphore::new(id, permits));
        id
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    /// Share `budget` Steps evenly among the runnable threads, round robin
    /// from the cursor. Returns the number of Steps executed.
    ///
    /// Returns early as soon as a thread exits, blocks, halts at a
    /// breakpoint or finishes a single step, so the debugger sees the
    /// change right away.
    pub fn run(&mut self, budget: usize) -> usize {
        if self.runnable.is_empty() {
            if self.state == PoolState::Running {
                self.stop_idle();
            }
            return 0;
        }
        if budget == 0 {
            return 0;
        }
        let per_thread = budget.div_ceil(self.runnable.len());
        let mut requested = 0;
        let mut executed = 0;

        while requested < budget && !self.runnable.is_empty() {
            if self.cursor >= self.runnable.len() {
                self.cursor = 0;
            }

            let (info, requests) = {
                let mut ctx = RunContext::new(&self.registry, &mut self.semaphores, &self.breakpoints);
                let info = self.runnable[self.cursor].run(per_thread, &mut ctx);
                (info, ctx.into_requests())
            };
            let current = self.runnable[self.cursor].id();
            trace!(thread = %current, steps = info.steps_executed, state = ?info.state, "slice");

            requested += per_thread;
            executed += info.steps_executed;
            self.stats.steps += info.steps_executed as u64;
            self.apply(requests);

            let mut end_slice = info.step_completed;
            match info.state {
                ThreadState::Exited | ThreadState::ExitedWithError | ThreadState::Terminated => {
                    self.retire(self.cursor);
                    end_slice = true;
                }
                ThreadState::Paused => {
                    self.set_state(PoolState::Paused);
                    end_slice = true;
                }
                ThreadState::Waiting => {
                    self.suspend_thread(current);
                    end_slice = true;
                }
                ThreadState::Runnable => {}
            }

            if self.runnable.is_empty() {
                self.stop_idle();
            } else if info.step_completed {
                self.set_state(PoolState::Paused);
                self.keep_thread = true;
            }

            if end_slice {
                return executed;
            }

            if !self.keep_thread {
                self.cursor = (self.cursor + 1) % self.runnable.len();
            }
        }

        executed
    }

    /// Nothing is left to run; waiting threads can never be woken.
    fn stop_idle(&mut self) {
        if !self.suspended.is_empty() {
            warn!(waiting = self.suspended.len(), "no runnable thread left, remaining threads wait forever");
        }
        self.set_state(PoolState::Stopped);
    }

    fn apply(&mut self, requests: Vec<PoolRequest>) {
        for request in requests {
            match request {
                PoolRequest::Restore { thread, semaphore } => self.restore_thread(thread, semaphore),
                PoolRequest::Spawn { program, args } => {
                    if let Err(err) = self.create_thread(program, args) {
                        warn!("spawn failed: {}", err);
                    }
                }
            }
        }
    }

    fn retire(&mut self, index: usize) {
        let thread = self.runnable.remove(index);
        if index < self.cursor {
            self.cursor -= 1;
        }
        if self.cursor >= self.runnable.len() {
            self.cursor = 0;
        }
        if thread.state() == ThreadState::ExitedWithError {
            self.stats.threads_failed += 1;
        }
        self.finished.push(thread);
    }

    /// Take a blocked thread out of the rotation, keeping the cursor on the
    /// thread that was next.
    fn suspend_thread(&mut self, id: ThreadId) {
        let Some(index) = self.runnable.iter().position(|t| t.id() == id) else {
            return;
        };
        let thread = self.runnable.remove(index);
        if index < self.cursor {
            self.cursor -= 1;
        }
        if self.cursor >= self.runnable.len() {
            self.cursor = 0;
        }
        self.suspended.push(thread);
    }

    /// Re-admit a thread that now holds a permit of `semaphore`.
    fn restore_thread(&mut self, id: ThreadId, semaphore: SemaphoreId) {
        let thread = match self.suspended.iter().position(|t| t.id() == id) {
            Some(index) => {
                let mut thread = self.suspended.remove(index);
                thread.state = ThreadState::Runnable;
                thread.held.push(semaphore);
                self.runnable.push(thread);
                return;
            }
            None => self.runnable.iter_mut().find(|t| t.id() == id),
        };

        match thread {
            // queued during this slice, not yet moved out
            Some(thread) => {
                thread.state = ThreadState::Runnable;
                thread.held.push(semaphore);
            }
            None => warn!(thread = %id, "permit handed to unknown thread"),
        }
    }

    fn resume_threads(&mut self) {
        for thread in &mut self.runnable {
            thread.resume();
        }
    }

    // =========================================================================
    // Debugger
    // =========================================================================

    /// Execute one Step (`step_into`) or mark a step over the current Step
    /// of the current thread. Either way the scheduler stays on this thread
    /// until the pool is started again.
    pub fn run_single_step_keeping_thread(&mut self, step_into: bool, callback: impl FnOnce() + 'static) {
        self.keep_thread = true;
        self.resume_threads();

        if step_into {
            if matches!(self.state, PoolState::Running | PoolState::Paused) {
                self.run(1);
            }
            if self.state != PoolState::Stopped {
                self.set_state(PoolState::Paused);
            }
            callback();
        } else if let Some(thread) = self.runnable.get_mut(self.cursor) {
            thread.mark_single_step_over(callback);
        }
    }

    pub fn step_out(&mut self, callback: impl FnOnce() + 'static) {
        self.keep_thread = true;
        self.resume_threads();
        if let Some(thread) = self.runnable.get_mut(self.cursor) {
            thread.mark_step_out(callback);
        }
    }

    /// Cancel a single step that is still in flight.
    pub fn unmark_step(&mut self) {
        if let Some(thread) = self.runnable.get_mut(self.cursor) {
            thread.unmark_step();
        }
    }

    pub fn next_step_position(&self) -> Option<ProgramPointer> {
        let thread = self.current_thread()?;
        let frame = thread.frames().last()?;
        Some(ProgramPointer {
            thread: thread.id(),
            program: frame.program.name.clone(),
            step: frame.step_index,
            range: frame.next_range(),
        })
    }

    /// Last pointer published by `refresh_program_pointer`.
    pub fn program_pointer(&self) -> Option<&ProgramPointer> {
        self.pointer.as_ref()
    }

    pub fn set_breakpoint(&mut self, program: &str, step: usize) {
        self.breakpoints.insert(Breakpoint::new(program, step));
    }

    /// Breakpoint on the first Step of `program` at `line`.
    pub fn set_line_breakpoint(&mut self, program: &str, line: u32) -> Option<Breakpoint> {
        let step = self.registry.program(program)?.find_step(line)?;
        let breakpoint = Breakpoint::new(program, step);
        self.breakpoints.insert(breakpoint.clone());
        Some(breakpoint)
    }

    pub fn clear_breakpoint(&mut self, program: &str, step: usize) {
        self.breakpoints.remove(&Breakpoint::new(program, step));
    }

    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }
}

impl StepRunner for ThreadPool {
    fn run(&mut self, budget: usize) -> usize {
        ThreadPool::run(self, budget)
    }

    fn is_running(&self) -> bool {
        self.state == PoolState::Running
    }

    fn refresh_program_pointer(&mut self) {
        self.pointer = self.next_step_position();
        if let Some(pointer) = &self.pointer {
            trace!(program = %pointer.program, step = pointer.step, "program pointer");
        }
    }
}
