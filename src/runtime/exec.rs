//! Step execution.
//!
//! A Step runs its instructions in order against the frame that was on top
//! of the thread when the Step started, and tells the thread where to go
//! next. Running off the end of the instruction list continues at the next
//! Step.

use crate::bytecode::ir::Step;
use crate::bytecode::op::{BinaryOp, Instr, Term};
use crate::lang::value::Value;
use crate::runtime::arith;
use crate::runtime::pool::RunContext;
use crate::runtime::registry::NativeCall;
use crate::runtime::runtime_error::{
    RuntimeError, null_pointer, stack_underflow, type_error, unknown_method, unknown_native,
};
use crate::runtime::semaphore::{Acquire, SemaphoreId};
use crate::runtime::thread::{Thread, TryHandler};

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Continue at this Step index of the same frame.
    Continue(usize),

    /// The frame returns, optionally with a value for the caller.
    Return(Option<Value>),

    /// The thread has to wait; once re-admitted it resumes at this index.
    Suspend(usize),

    /// Uncaught within the Step; the thread unwinds.
    Fail(RuntimeError),

    /// The thread terminates.
    Exit,
}

impl Step {
    pub fn invoke(&self, thread: &mut Thread, ctx: &mut RunContext<'_>) -> StepOutcome {
        let Some(frame) = thread.frames.last() else {
            return StepOutcome::Return(None);
        };
        let (base, floor) = (frame.stack_base, frame.operand_floor());
        let depth = thread.frames.len();
        let mut exec = Exec {
            thread: &mut *thread,
            ctx,
            base,
            floor,
            depth,
        };

        let outcome = exec.run(&self.instrs, self.index);

        // a native asked for a call; the callee goes on top of the frame
        // that just finished its Step
        let Some((program, args)) = thread.pending_call.take() else {
            return outcome;
        };
        match outcome {
            StepOutcome::Continue(_) | StepOutcome::Suspend(_) => {
                match thread.push_program(program, args) {
                    Ok(()) => outcome,
                    Err(err) => StepOutcome::Fail(err),
                }
            }
            // the caller is gone or failing; the call is dropped with it
            outcome => outcome,
        }
    }
}

struct Exec<'a, 'p> {
    thread: &'a mut Thread,
    ctx: &'a mut RunContext<'p>,
    /// Stack index of local slot 0.
    base: usize,
    /// Operands live above this index.
    floor: usize,
    /// Frame count when the Step started; the executing frame is the last
    /// of these.
    depth: usize,
}

impl Exec<'_, '_> {
    fn run(&mut self, instrs: &[Instr], index: usize) -> StepOutcome {
        for instr in instrs {
            match self.instr(instr, index) {
                Ok(None) => {}
                Ok(Some(outcome)) => return outcome,
                Err(err) => return StepOutcome::Fail(err),
            }
        }
        StepOutcome::Continue(index + 1)
    }

    fn instr(&mut self, instr: &Instr, index: usize) -> Result<Option<StepOutcome>, RuntimeError> {
        match instr {
            Instr::Push(term) => {
                let value = self.eval(term)?;
                self.thread.stack.push(value);
            }

            Instr::Store(slot, term) => {
                let value = self.eval(term)?;
                let cell = self.slot(*slot)?;
                self.thread.stack[cell] = value;
            }

            Instr::Eval(term) => {
                self.eval(term)?;
            }

            Instr::Drop => {
                self.pop()?;
            }

            Instr::Reorder(order) => {
                let n = order.len();
                if self.thread.stack.len() < self.floor + n {
                    return Err(stack_underflow());
                }
                let at = self.thread.stack.len() - n;
                let values = self.thread.stack.split_off(at);
                for &i in order {
                    let value = values.get(i).cloned().ok_or_else(stack_underflow)?;
                    self.thread.stack.push(value);
                }
            }

            Instr::Goto(target) => return Ok(Some(StepOutcome::Continue(*target))),

            Instr::BranchIf {
                cond,
                when,
                push,
                target,
            } => {
                let value = self.eval(cond)?;
                let taken = value
                    .as_bool()
                    .ok_or_else(|| type_error("if", value.type_name()))?;
                if taken == *when {
                    if let Some(value) = push {
                        self.thread.stack.push(value.clone());
                    }
                    return Ok(Some(StepOutcome::Continue(*target)));
                }
            }

            Instr::Invoke { method, argc } => {
                let program = self
                    .ctx
                    .registry
                    .program(method)
                    .ok_or_else(|| unknown_method(method))?;
                check_arity(method, program.frame.arguments(), *argc)?;
                self.thread.call_program(program)?;
                // the callee runs next; the caller resumes after this Step
                return Ok(Some(StepOutcome::Continue(index + 1)));
            }

            Instr::Spawn { method, argc } => {
                let program = self
                    .ctx
                    .registry
                    .program(method)
                    .ok_or_else(|| unknown_method(method))?;
                check_arity(method, program.frame.arguments(), *argc)?;
                if self.thread.stack.len() < self.floor + argc {
                    return Err(stack_underflow());
                }
                let at = self.thread.stack.len() - argc;
                let args = self.thread.stack.split_off(at);
                self.ctx.spawn(program, args);
            }

            Instr::Return(term) => {
                let value = match term {
                    Some(term) => Some(self.eval(term)?),
                    None => None,
                };
                return Ok(Some(StepOutcome::Return(value)));
            }

            Instr::Throw { class, message } => {
                let message = self.eval(message)?;
                return Err(RuntimeError::new(class, &message.to_string()));
            }

            Instr::EnterTry { catch } => {
                let handler = TryHandler {
                    catch_index: *catch,
                    stack_size: self.thread.stack.len(),
                    held: self.thread.held.len(),
                };
                if let Some(frame) = self.thread.frames.get_mut(self.depth - 1) {
                    frame.handlers.push(handler);
                }
            }

            Instr::ExitTry => {
                if let Some(frame) = self.thread.frames.get_mut(self.depth - 1) {
                    frame.handlers.pop();
                }
            }

            Instr::NewSemaphore { permits } => {
                let id = self.ctx.new_semaphore(*permits);
                self.thread.stack.push(Value::Semaphore(id));
            }

            Instr::Acquire(term) => {
                let semaphore = self.semaphore(term)?;
                match self.ctx.acquire(semaphore, self.thread.id())? {
                    Acquire::Granted => self.thread.held.push(semaphore),
                    Acquire::Queued => return Ok(Some(StepOutcome::Suspend(index + 1))),
                }
            }

            Instr::Release(term) => {
                let semaphore = self.semaphore(term)?;
                if let Some(position) = self.thread.held.iter().rposition(|&s| s == semaphore) {
                    self.thread.held.remove(position);
                }
                self.ctx.release(semaphore, self.thread.id());
            }

            Instr::Exit => return Ok(Some(StepOutcome::Exit)),
        }

        Ok(None)
    }

    // =========================================================================
    // Terms
    // =========================================================================

    fn eval(&mut self, term: &Term) -> Result<Value, RuntimeError> {
        match term {
            Term::Const(value) => Ok(value.clone()),

            Term::Local(slot) => {
                let cell = self.slot(*slot)?;
                Ok(self.thread.stack[cell].clone())
            }

            Term::Pop => self.pop(),

            Term::Param(n) => Err(RuntimeError::new(
                "InternalError",
                &format!("template parameter ${} was never substituted", n),
            )),

            Term::Unary(op, operand) => {
                let value = self.eval(operand)?;
                arith::unary(*op, &value)
            }

            // short-circuit unless skipping the right side would leave
            // operands on the stack
            Term::Binary(op @ (BinaryOp::And | BinaryOp::Or), lhs, rhs) if rhs.pops() == 0 => {
                let left = self.eval(lhs)?;
                let decided = left
                    .as_bool()
                    .ok_or_else(|| type_error(op.symbol(), left.type_name()))?;
                if decided == (*op == BinaryOp::Or) {
                    return Ok(Value::Bool(decided));
                }
                let right = self.eval(rhs)?;
                right
                    .as_bool()
                    .map(Value::Bool)
                    .ok_or_else(|| type_error(op.symbol(), right.type_name()))
            }

            Term::Binary(op, lhs, rhs) => {
                let left = self.eval(lhs)?;
                let right = self.eval(rhs)?;
                arith::binary(*op, &left, &right)
            }

            Term::Native(name, args) => {
                let native = self
                    .ctx
                    .registry
                    .native(name)
                    .ok_or_else(|| unknown_native(name))?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                let mut call = NativeCall::new(&mut *self.thread, &mut *self.ctx);
                native(&mut call, &values).map_err(|e| e.with_context(name))
            }
        }
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        if self.thread.stack.len() <= self.floor {
            return Err(stack_underflow());
        }
        self.thread.stack.pop().ok_or_else(stack_underflow)
    }

    fn slot(&self, slot: usize) -> Result<usize, RuntimeError> {
        let cell = self.base + slot;
        if cell >= self.floor {
            return Err(RuntimeError::new(
                "InternalError",
                &format!("local slot {} out of range", slot),
            ));
        }
        Ok(cell)
    }

    fn semaphore(&mut self, term: &Term) -> Result<SemaphoreId, RuntimeError> {
        match self.eval(term)? {
            Value::Semaphore(id) => Ok(id),
            Value::Null => Err(null_pointer("a semaphore")),
            other => Err(type_error("synchronized", other.type_name())),
        }
    }
}

fn check_arity(method: &str, expected: usize, given: usize) -> Result<(), RuntimeError> {
    if expected != given {
        return Err(RuntimeError::new(
            "IllegalArgumentException",
            &format!("{} expects {} argument(s), got {}", method, expected, given),
        ));
    }
    Ok(())
}
