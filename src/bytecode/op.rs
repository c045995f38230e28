use crate::lang::value::Value;
use serde::{Deserialize, Serialize};

// =============================================================================
// TERM - inline expressions
// =============================================================================

/// An expression that is evaluated in place, inside a single instruction.
///
/// Terms are what templates are made of: a template is a `Term` containing
/// `Param(n)` placeholders, and applying it substitutes operand terms for the
/// placeholders. Evaluation order is left to right (operands of `Binary`,
/// arguments of `Native`), which is also the order in which `Pop` terms take
/// values off the operand stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Term {
    /// A literal.
    Const(Value),

    /// Local slot of the executing frame (`this`, parameters, then locals).
    Local(usize),

    /// Take the top of the operand stack.
    Pop,

    /// Template placeholder `$n` (1-based). Never survives template
    /// application.
    Param(usize),

    Unary(UnaryOp, Box<Term>),

    Binary(BinaryOp, Box<Term>, Box<Term>),

    /// Call a native function of the class registry. Has side effects, so a
    /// term containing it is never a pure term.
    Native(String, Vec<Term>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    // arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // comparison
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,

    // logic; And/Or short-circuit when evaluated inline
    And,
    Or,
    Xor,

    // bits
    BitAnd,
    BitOr,
    Shl,
    Shr,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Xor => "^",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        }
    }
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }
}

impl Term {
    pub fn constant(value: impl Into<Value>) -> Self {
        Term::Const(value.into())
    }

    pub fn binary(op: BinaryOp, lhs: Term, rhs: Term) -> Self {
        Term::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn unary(op: UnaryOp, operand: Term) -> Self {
        Term::Unary(op, Box::new(operand))
    }

    pub fn native(name: impl Into<String>, args: Vec<Term>) -> Self {
        Term::Native(name.into(), args)
    }

    /// No stack traffic and no side effects: the term may be substituted
    /// verbatim, any number of times, into a surrounding template.
    pub fn is_pure(&self) -> bool {
        match self {
            Term::Const(_) | Term::Local(_) | Term::Param(_) => true,
            Term::Pop | Term::Native(..) => false,
            Term::Unary(_, operand) => operand.is_pure(),
            Term::Binary(_, lhs, rhs) => lhs.is_pure() && rhs.is_pure(),
        }
    }

    /// Number of values this term takes off the operand stack.
    pub fn pops(&self) -> usize {
        match self {
            Term::Pop => 1,
            Term::Const(_) | Term::Local(_) | Term::Param(_) => 0,
            Term::Unary(_, operand) => operand.pops(),
            Term::Binary(_, lhs, rhs) => lhs.pops() + rhs.pops(),
            Term::Native(_, args) => args.iter().map(Term::pops).sum(),
        }
    }

    /// Placeholders in evaluation order, one entry per occurrence.
    pub fn params(&self) -> Vec<usize> {
        let mut out = Vec::new();
        self.collect_params(&mut out);
        out
    }

    fn collect_params(&self, out: &mut Vec<usize>) {
        match self {
            Term::Param(n) => out.push(*n),
            Term::Const(_) | Term::Local(_) | Term::Pop => {}
            Term::Unary(_, operand) => operand.collect_params(out),
            Term::Binary(_, lhs, rhs) => {
                lhs.collect_params(out);
                rhs.collect_params(out);
            }
            Term::Native(_, args) => args.iter().for_each(|a| a.collect_params(out)),
        }
    }

    /// Replace every `Param(n)` with `args[n - 1]`.
    pub fn substitute(&self, args: &[Term]) -> Term {
        match self {
            Term::Param(n) => args
                .get(n.wrapping_sub(1))
                .cloned()
                .unwrap_or(Term::Param(*n)),
            Term::Const(_) | Term::Local(_) | Term::Pop => self.clone(),
            Term::Unary(op, operand) => Term::unary(*op, operand.substitute(args)),
            Term::Binary(op, lhs, rhs) => {
                Term::binary(*op, lhs.substitute(args), rhs.substitute(args))
            }
            Term::Native(name, call_args) => Term::Native(
                name.clone(),
                call_args.iter().map(|a| a.substitute(args)).collect(),
            ),
        }
    }
}

impl std::fmt::Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Term::Const(Value::String(s)) => write!(f, "{:?}", s),
            Term::Const(v) => write!(f, "{}", v),
            Term::Local(slot) => write!(f, "local[{}]", slot),
            Term::Pop => write!(f, "pop()"),
            Term::Param(n) => write!(f, "${}", n),
            Term::Unary(op, operand) => write!(f, "{}({})", op.symbol(), operand),
            Term::Binary(op, lhs, rhs) => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            Term::Native(name, args) => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

// =============================================================================
// INSTR - step-level instructions
// =============================================================================

/// A statement-level instruction. A Step's body is a sequence of these.
///
/// Instructions that transfer control (`Goto`, `Return`, `Throw`, `Exit`)
/// end the Step. The linker also closes the Step after `Invoke` and
/// `Acquire`, see [`Instr::suspends`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instr {
    /// Stack effect: `( -- x )`
    Push(Term),

    /// Evaluate into a local slot.
    Store(usize, Term),

    /// Evaluate for side effects, discard the result.
    Eval(Term),

    /// Stack effect: `( x -- )`
    Drop,

    /// Permute the top `order.len()` values. With `v` the values in push
    /// order, pushes `v[order[0]]`, `v[order[1]]`, ...
    Reorder(Vec<usize>),

    /// Unconditional transfer to a Step index.
    Goto(usize),

    /// Transfer to `target` when `cond` evaluates to `when`, pushing `push`
    /// first if given (the short-circuit result of `&&`/`||`). Otherwise
    /// continue with the next instruction.
    BranchIf {
        cond: Term,
        when: bool,
        push: Option<Value>,
        target: usize,
    },

    /// Call a registered program. The top `argc` values become its
    /// parameters. The callee's frame starts at its Step 0; its return value
    /// (if any) is pushed onto the caller's operand stack.
    Invoke { method: String, argc: usize },

    /// Start a new thread running a registered program with `argc`
    /// arguments taken from this thread's operand stack.
    Spawn { method: String, argc: usize },

    Return(Option<Term>),

    /// Raise an exception carrying the evaluated value as its message.
    Throw { class: String, message: Term },

    /// Install an exception handler whose catch block starts at Step
    /// `catch`.
    EnterTry { catch: usize },

    /// Remove the innermost exception handler of the frame.
    ExitTry,

    /// Stack effect: `( -- sem )`
    NewSemaphore { permits: u32 },

    /// Take one permit of the evaluated semaphore; parks the thread if none
    /// is available.
    Acquire(Term),

    Release(Term),

    /// Terminate the executing thread.
    Exit,
}

impl Instr {
    /// True for instructions after which nothing else in the Step runs.
    pub fn is_transfer(&self) -> bool {
        matches!(
            self,
            Instr::Goto(_) | Instr::Return(_) | Instr::Throw { .. } | Instr::Exit
        )
    }

    /// True for instructions that may leave the Step for another frame or
    /// park the thread. The thread comes back at the following Step, so
    /// they always end their Step.
    pub fn suspends(&self) -> bool {
        matches!(self, Instr::Invoke { .. } | Instr::Acquire(_))
    }

    /// Jump target encoded in the instruction, if any.
    pub fn target(&self) -> Option<usize> {
        match self {
            Instr::Goto(target) => Some(*target),
            Instr::BranchIf { target, .. } => Some(*target),
            Instr::EnterTry { catch } => Some(*catch),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_in_evaluation_order() {
        let template = Term::binary(BinaryOp::Sub, Term::Param(2), Term::Param(1));
        assert_eq!(template.params(), vec![2, 1]);
    }

    #[test]
    fn test_substitute_replaces_every_occurrence() {
        let template = Term::binary(BinaryOp::Mul, Term::Param(1), Term::Param(1));
        let applied = template.substitute(&[Term::Local(3)]);
        assert_eq!(
            applied,
            Term::binary(BinaryOp::Mul, Term::Local(3), Term::Local(3))
        );
    }

    #[test]
    fn test_purity() {
        assert!(Term::binary(BinaryOp::Add, Term::Local(0), Term::constant(1)).is_pure());
        assert!(!Term::binary(BinaryOp::Add, Term::Pop, Term::constant(1)).is_pure());
        assert!(!Term::native("random", vec![]).is_pure());
    }

    #[test]
    fn test_pops_counts_nested() {
        let term = Term::native("max", vec![Term::Pop, Term::unary(UnaryOp::Neg, Term::Pop)]);
        assert_eq!(term.pops(), 2);
    }

    #[test]
    fn test_display() {
        let term = Term::binary(BinaryOp::Add, Term::Local(1), Term::constant("a"));
        assert_eq!(term.to_string(), "(local[1] + \"a\")");
    }
}
