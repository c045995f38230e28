use std::collections::HashMap;
use std::rc::Rc;

use crate::bytecode::ir::Program;
use crate::lang::value::Value;
use crate::runtime::pool::RunContext;
use crate::runtime::runtime_error::{RuntimeError, stack_underflow, unknown_method};
use crate::runtime::thread::{Thread, ThreadId, check_arguments};

/// A runtime-library function callable from a `Term::Native`.
pub type NativeFn = Rc<dyn Fn(&mut NativeCall<'_, '_>, &[Value]) -> Result<Value, RuntimeError>>;

/// Linked programs and native functions, looked up by name.
#[derive(Clone, Default)]
pub struct ClassRegistry {
    programs: HashMap<String, Rc<Program>>,
    natives: HashMap<String, NativeFn>,
}

impl std::fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut natives: Vec<_> = self.natives.keys().collect();
        natives.sort();
        f.debug_struct("ClassRegistry")
            .field("programs", &self.programs.keys().collect::<Vec<_>>())
            .field("natives", &natives)
            .finish()
    }
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_program(&mut self, program: Program) -> Rc<Program> {
        let program = Rc::new(program);
        self.programs
            .insert(program.name.clone(), Rc::clone(&program));
        program
    }

    pub fn program(&self, name: &str) -> Option<Rc<Program>> {
        self.programs.get(name).cloned()
    }

    pub fn add_native<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&mut NativeCall<'_, '_>, &[Value]) -> Result<Value, RuntimeError> + 'static,
    {
        self.natives.insert(name.to_string(), Rc::new(f));
    }

    pub fn native(&self, name: &str) -> Option<NativeFn> {
        self.natives.get(name).cloned()
    }
}

/// What a native function may do to the thread that called it.
pub struct NativeCall<'a, 'p> {
    thread: &'a mut Thread,
    ctx: &'a mut RunContext<'p>,
}

impl<'a, 'p> NativeCall<'a, 'p> {
    pub fn new(thread: &'a mut Thread, ctx: &'a mut RunContext<'p>) -> Self {
        Self { thread, ctx }
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread.id()
    }

    pub fn push(&mut self, value: Value) {
        self.thread.stack.push(value);
    }

    pub fn pop(&mut self) -> Result<Value, RuntimeError> {
        if self.thread.stack.len() <= self.thread.operand_floor() {
            return Err(stack_underflow());
        }
        self.thread.stack.pop().ok_or_else(stack_underflow)
    }

    /// Call `method` on this thread. The callee starts once the current
    /// Step has finished; its return value, if any, lands on the operand
    /// stack. One call per Step.
    pub fn push_program(&mut self, method: &str, args: Vec<Value>) -> Result<(), RuntimeError> {
        let program = self
            .ctx
            .registry
            .program(method)
            .ok_or_else(|| unknown_method(method))?;
        check_arguments(&program, &args)?;
        if self.thread.pending_call.is_some() {
            return Err(RuntimeError::new(
                "IllegalStateException",
                &format!("{} called while another call is pending", method),
            ));
        }
        self.thread.pending_call = Some((program, args));
        Ok(())
    }

    /// Run `method` on a new thread.
    pub fn spawn(&mut self, method: &str, args: Vec<Value>) -> Result<(), RuntimeError> {
        let program = self
            .ctx
            .registry
            .program(method)
            .ok_or_else(|| unknown_method(method))?;
        self.ctx.spawn(program, args);
        Ok(())
    }
}
