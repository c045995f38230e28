//! # Compiler back end
//!
//! Snippet trees come in from the expression and statement compiler,
//! [`link::Linker`] cuts them into Steps, and the result is a
//! [`ir::Program`] the runtime can execute and suspend at any Step
//! boundary.

pub mod compile_error;
pub mod disasm;
pub mod ir;
pub mod link;
pub mod op;
pub mod snippet;

pub use compile_error::{LinkError, TemplateError};
pub use ir::{FrameLayout, Program, Step};
pub use link::Linker;
pub use op::{BinaryOp, Instr, Term, UnaryOp};
pub use snippet::{LabelId, Snippet, Template};
