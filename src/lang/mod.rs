//! # Core data shared by the compiler back end and the runtime
//!
//! - [`value::Value`] is what lives on operand stacks and in local slots.
//! - [`span::SourceRange`] ties Steps back to the source text.

pub mod span;
pub mod value;
