//! Back end of an educational compiler: Snippet IR, linking into
//! resumable Steps, and a cooperative scheduler with debugger support.

pub mod bytecode;
pub mod lang;
pub mod runtime;
