use crate::bytecode::snippet::LabelId;
use thiserror::Error;

/// Contract violations detected while linking a snippet tree.
///
/// These are bugs in whoever assembled the snippets, not user-facing
/// diagnostics; they abort the compilation unit being linked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// A jump refers to a label that was never placed in the same list.
    #[error("link error: jump to label {0} which is not part of this program")]
    UnresolvedLabel(LabelId),

    /// The same label was placed twice.
    #[error("link error: label {0} placed more than once")]
    DuplicateLabel(LabelId),
}

/// Errors from applying a template to operand snippets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template references ${needed} but only {given} operand(s) were given")]
    TooFewOperands { needed: usize, given: usize },

    /// A non-pure operand can only be substituted once: a second occurrence
    /// would evaluate its side effects (or pop the stack) twice.
    #[error("template references non-pure operand ${0} more than once")]
    RepeatedImpureOperand(usize),

    #[error("evaluation order must list every operand exactly once")]
    InvalidEvaluationOrder,
}
