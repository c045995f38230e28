//! # Runtime
//!
//! Cooperative threads multiplexed by a round-robin [`pool::ThreadPool`],
//! throttled by [`load::LoadController`] and driven through
//! [`interpreter::Interpreter`].

pub mod arith;
pub mod exec;
pub mod interpreter;
pub mod load;
pub mod pool;
pub mod registry;
pub mod runtime_error;
pub mod semaphore;
pub mod thread;

pub use interpreter::{Interpreter, InterpreterConfig};
pub use pool::{PoolState, ThreadPool};
pub use registry::{ClassRegistry, NativeCall};
pub use runtime_error::RuntimeError;
pub use thread::{Thread, ThreadId, ThreadState};
