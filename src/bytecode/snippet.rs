//! # Snippets: the unlinked, composable form of compiled code
//!
//! The expression and statement compiler hands the back end a tree of
//! [`Snippet`]s. Each one knows whether its value is already on the operand
//! stack or is still an inline [`Term`], whether it is a *pure term* (no
//! stack traffic, no side effects, substitutable any number of times), and
//! whether it is a compile-time constant.
//!
//! Composition follows one rule: every non-pure operand is evaluated, in the
//! chosen order, before the code that combines the operands runs; pure
//! operands are substituted inline. [`Split`](Snippet::Split) markers mark
//! where a Step must end, [`Label`](Snippet::Label)s and
//! [`Jump`](Snippet::Jump)s express control flow across Step boundaries. The
//! linker turns the tree into Steps.

use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

use crate::bytecode::compile_error::TemplateError;
use crate::bytecode::op::{BinaryOp, Instr, Term, UnaryOp};
use crate::lang::span::{SourceRange, accumulate};
use crate::lang::value::Value;
use crate::runtime::arith;

// =============================================================================
// Labels and jumps
// =============================================================================

/// Identifies a label within a compilation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LabelId(pub u32);

static NEXT_LABEL: AtomicU32 = AtomicU32::new(0);

impl LabelId {
    pub fn fresh() -> Self {
        LabelId(NEXT_LABEL.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for LabelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Jump {
    pub label: LabelId,
    pub kind: JumpKind,
    pub range: Option<SourceRange>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JumpKind {
    /// Goto the label's Step.
    Always,

    /// Goto the label's Step if `cond` evaluates to `when`, pushing `push`
    /// first.
    If {
        cond: Term,
        when: bool,
        push: Option<Value>,
    },

    /// Install an exception handler whose catch block is the label's Step.
    EnterTry,
}

// =============================================================================
// Snippet tree
// =============================================================================

/// Either an inline value or a statement-level instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Code {
    Term(Term),
    Instr(Instr),
}

/// A leaf: one fragment of code.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub code: Code,
    /// Known value for compile-time folding.
    pub constant: Option<Value>,
    /// Static result type as decided by the type resolver; `None` for void.
    pub ty: Option<String>,
    pub range: Option<SourceRange>,
}

/// An ordered sequence of child snippets.
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    pub parts: Vec<Snippet>,
    /// The value of the whole container was pushed by its parts. When false,
    /// the value is the inline term of the last part.
    pub final_value_on_stack: bool,
    pub ty: Option<String>,
    pub range: Option<SourceRange>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Snippet {
    Atom(Atom),
    Container(Container),
    /// Force a new Step here.
    Split,
    Label(LabelId),
    Jump(Jump),
}

impl Snippet {
    // ─────────────────────────── Constructors ───────────────────────────

    pub fn term(term: Term, ty: Option<&str>, range: Option<SourceRange>) -> Self {
        let constant = match &term {
            Term::Const(v) => Some(v.clone()),
            _ => None,
        };
        Snippet::Atom(Atom {
            code: Code::Term(term),
            constant,
            ty: ty.map(str::to_string),
            range,
        })
    }

    pub fn constant(value: impl Into<Value>, ty: &str, range: Option<SourceRange>) -> Self {
        Snippet::term(Term::Const(value.into()), Some(ty), range)
    }

    pub fn local(slot: usize, ty: &str, range: Option<SourceRange>) -> Self {
        Snippet::term(Term::Local(slot), Some(ty), range)
    }

    pub fn instr(instr: Instr, range: Option<SourceRange>) -> Self {
        Snippet::Atom(Atom {
            code: Code::Instr(instr),
            constant: None,
            ty: None,
            range,
        })
    }

    /// A container whose range, when not given, spans its parts.
    pub fn container(parts: Vec<Snippet>, range: Option<SourceRange>, ty: Option<&str>) -> Self {
        let range = range.or_else(|| {
            let mut spanned = None;
            for part in &parts {
                accumulate(&mut spanned, part.range().as_ref());
            }
            spanned
        });

        Snippet::Container(Container {
            parts,
            final_value_on_stack: false,
            ty: ty.map(str::to_string),
            range,
        })
    }

    /// A sequence of statements.
    pub fn block(statements: Vec<Snippet>, range: Option<SourceRange>) -> Self {
        Snippet::container(statements, range, None)
    }

    pub fn jump(label: LabelId, kind: JumpKind, range: Option<SourceRange>) -> Self {
        Snippet::Jump(Jump { label, kind, range })
    }

    // ──────────────────────────── Metadata ─────────────────────────────

    pub fn range(&self) -> Option<SourceRange> {
        match self {
            Snippet::Atom(atom) => atom.range,
            Snippet::Container(c) => c.range,
            Snippet::Jump(jump) => jump.range,
            Snippet::Split | Snippet::Label(_) => None,
        }
    }

    pub fn ty(&self) -> Option<&str> {
        match self {
            Snippet::Atom(atom) => atom.ty.as_deref(),
            Snippet::Container(c) => c.ty.as_deref(),
            _ => None,
        }
    }

    pub fn final_value_on_stack(&self) -> bool {
        match self {
            Snippet::Container(c) => c.final_value_on_stack,
            _ => false,
        }
    }

    /// Inline term without side effects or stack traffic.
    pub fn is_pure_term(&self) -> bool {
        self.pure_term().is_some()
    }

    pub fn pure_term(&self) -> Option<&Term> {
        match self {
            Snippet::Atom(Atom {
                code: Code::Term(term),
                ..
            }) if term.is_pure() => Some(term),
            Snippet::Container(c) if !c.final_value_on_stack && c.parts.len() == 1 => {
                c.parts[0].pure_term()
            }
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.constant_value().is_some()
    }

    pub fn constant_value(&self) -> Option<&Value> {
        match self {
            Snippet::Atom(atom) => atom.constant.as_ref(),
            Snippet::Container(c) if !c.final_value_on_stack && c.parts.len() == 1 => {
                c.parts[0].constant_value()
            }
            _ => None,
        }
    }

    // ─────────────────────────── Value access ──────────────────────────

    /// Separates the code that has to run before the value is available
    /// from the term that yields the value (`Pop` if it is on the stack).
    pub fn split_value(self) -> (Vec<Snippet>, Term) {
        match self {
            Snippet::Atom(Atom {
                code: Code::Term(term),
                ..
            }) => (Vec::new(), term),
            Snippet::Container(c) if c.final_value_on_stack => {
                (vec![Snippet::Container(c)], Term::Pop)
            }
            Snippet::Container(mut c) => match c.parts.pop() {
                Some(last) => {
                    let (last_prefix, term) = last.split_value();
                    c.parts.extend(last_prefix);
                    let prefix = if c.parts.is_empty() {
                        Vec::new()
                    } else {
                        vec![Snippet::Container(c)]
                    };
                    (prefix, term)
                }
                None => (Vec::new(), Term::Const(Value::Null)),
            },
            // void code used as a value
            other => (vec![other], Term::Const(Value::Null)),
        }
    }

    pub fn ensure_final_value_on_stack(self) -> Snippet {
        if self.final_value_on_stack() {
            return self;
        }
        let ty = self.ty().map(str::to_string);
        let range = self.range();
        let (mut parts, term) = self.split_value();
        parts.push(Snippet::instr(Instr::Push(term), range));

        Snippet::Container(Container {
            parts,
            final_value_on_stack: true,
            ty,
            range,
        })
    }

    /// Evaluate for side effects only and discard the value.
    pub fn into_statement(self) -> Snippet {
        let range = self.range();
        if self.final_value_on_stack() {
            return Snippet::container(vec![self, Snippet::instr(Instr::Drop, range)], range, None);
        }
        if let Snippet::Atom(Atom {
            code: Code::Instr(_),
            ..
        }) = &self
        {
            return self;
        }

        let (mut parts, term) = self.split_value();
        if !term.is_pure() {
            parts.push(Snippet::instr(Instr::Eval(term), range));
        }
        Snippet::container(parts, range, None)
    }

    // ──────────────────────── Composite expressions ────────────────────

    pub fn unary(op: UnaryOp, operand: Snippet, ty: &str, range: Option<SourceRange>) -> Snippet {
        // a single operand can neither repeat nor miss, so this cannot fail
        match Template::unary(op).apply(vec![operand.clone()], Some(ty), range) {
            Ok(snippet) => snippet,
            Err(_) => operand,
        }
    }

    pub fn binary(
        op: BinaryOp,
        lhs: Snippet,
        rhs: Snippet,
        ty: &str,
        range: Option<SourceRange>,
    ) -> Result<Snippet, TemplateError> {
        Template::binary(op).apply(vec![lhs, rhs], Some(ty), range)
    }

    /// Lazy `&&` / `||`.
    ///
    /// If both operands are pure terms the operator stays inline and the
    /// evaluator's own short-circuiting applies. Otherwise the left operand
    /// is evaluated, a conditional jump pushes the short-circuit result and
    /// skips past the right operand, and the right operand runs in a Step of
    /// its own.
    pub fn lazy_logic(
        op: BinaryOp,
        lhs: Snippet,
        rhs: Snippet,
        range: Option<SourceRange>,
    ) -> Snippet {
        debug_assert!(matches!(op, BinaryOp::And | BinaryOp::Or));

        if (lhs.is_constant() && rhs.is_constant()) || (lhs.is_pure_term() && rhs.is_pure_term()) {
            if let Ok(inline) = Template::binary(op).apply(vec![lhs.clone(), rhs.clone()], Some("boolean"), range) {
                return inline;
            }
        }

        let short_circuit = op == BinaryOp::Or;
        let end = LabelId::fresh();
        let (mut parts, cond) = lhs.split_value();

        parts.push(Snippet::jump(
            end,
            JumpKind::If {
                cond,
                when: short_circuit,
                push: Some(Value::Bool(short_circuit)),
            },
            range,
        ));
        parts.push(Snippet::Split);
        parts.push(rhs.ensure_final_value_on_stack());
        parts.push(Snippet::Split);
        parts.push(Snippet::Label(end));

        let mut container = Snippet::container(parts, range, Some("boolean"));
        if let Snippet::Container(c) = &mut container {
            c.final_value_on_stack = true;
        }
        container
    }

    /// Call a registered program. Arguments are evaluated and pushed left
    /// to right; the call ends the Step.
    pub fn call(
        method: &str,
        args: Vec<Snippet>,
        returns: Option<&str>,
        range: Option<SourceRange>,
    ) -> Snippet {
        let argc = args.len();
        let mut parts: Vec<Snippet> = args
            .into_iter()
            .map(Snippet::ensure_final_value_on_stack)
            .collect();
        parts.push(Snippet::instr(
            Instr::Invoke {
                method: method.to_string(),
                argc,
            },
            range,
        ));
        parts.push(Snippet::Split);

        Snippet::Container(Container {
            parts,
            final_value_on_stack: returns.is_some(),
            ty: returns.map(str::to_string),
            range,
        })
    }

    /// Native function call; the result is an inline (non-pure) term.
    pub fn native(
        name: &str,
        args: Vec<Snippet>,
        ty: Option<&str>,
        range: Option<SourceRange>,
    ) -> Result<Snippet, TemplateError> {
        let params = (1..=args.len()).map(Term::Param).collect();
        Template::new(Term::native(name, params)).apply(args, ty, range)
    }

    /// Start `method` on a new thread with the given arguments.
    pub fn spawn(method: &str, args: Vec<Snippet>, range: Option<SourceRange>) -> Snippet {
        let argc = args.len();
        let mut parts: Vec<Snippet> = args
            .into_iter()
            .map(Snippet::ensure_final_value_on_stack)
            .collect();
        parts.push(Snippet::instr(
            Instr::Spawn {
                method: method.to_string(),
                argc,
            },
            range,
        ));
        Snippet::container(parts, range, None)
    }

    // ─────────────────────────── Statements ────────────────────────────

    pub fn assign(slot: usize, value: Snippet, range: Option<SourceRange>) -> Snippet {
        let (mut parts, term) = value.split_value();
        parts.push(Snippet::instr(Instr::Store(slot, term), range));
        Snippet::container(parts, range, None)
    }

    pub fn ret(value: Option<Snippet>, range: Option<SourceRange>) -> Snippet {
        match value {
            Some(value) => {
                let (mut parts, term) = value.split_value();
                parts.push(Snippet::instr(Instr::Return(Some(term)), range));
                Snippet::container(parts, range, None)
            }
            None => Snippet::instr(Instr::Return(None), range),
        }
    }

    pub fn throw(class: &str, message: Snippet, range: Option<SourceRange>) -> Snippet {
        let (mut parts, term) = message.split_value();
        parts.push(Snippet::instr(
            Instr::Throw {
                class: class.to_string(),
                message: term,
            },
            range,
        ));
        Snippet::container(parts, range, None)
    }

    pub fn if_else(
        cond: Snippet,
        then_branch: Snippet,
        else_branch: Option<Snippet>,
        range: Option<SourceRange>,
    ) -> Snippet {
        let end = LabelId::fresh();
        let (mut parts, cond) = cond.split_value();

        match else_branch {
            Some(else_branch) => {
                let otherwise = LabelId::fresh();
                parts.push(Snippet::jump(otherwise, JumpKind::If { cond, when: false, push: None }, range));
                parts.push(then_branch);
                parts.push(Snippet::jump(end, JumpKind::Always, range));
                parts.push(Snippet::Split);
                parts.push(Snippet::Label(otherwise));
                parts.push(else_branch);
            }
            None => {
                parts.push(Snippet::jump(end, JumpKind::If { cond, when: false, push: None }, range));
                parts.push(then_branch);
            }
        }
        parts.push(Snippet::Split);
        parts.push(Snippet::Label(end));

        Snippet::container(parts, range, None)
    }

    /// `while (cond) body`. Every iteration is at least one Step, so a
    /// running loop can always be paused.
    pub fn while_loop(cond: Snippet, body: Snippet, range: Option<SourceRange>) -> Snippet {
        let top = LabelId::fresh();
        let end = LabelId::fresh();
        let (cond_prefix, cond) = cond.split_value();

        let mut parts = vec![Snippet::Split, Snippet::Label(top)];
        parts.extend(cond_prefix);
        parts.push(Snippet::jump(end, JumpKind::If { cond, when: false, push: None }, range));
        parts.push(body);
        parts.push(Snippet::jump(top, JumpKind::Always, range));
        parts.push(Snippet::Split);
        parts.push(Snippet::Label(end));

        Snippet::container(parts, range, None)
    }

    /// `try { body } catch { handler }`. The handler starts with the
    /// exception text on the operand stack and must consume it.
    pub fn try_catch(body: Snippet, handler: Snippet, range: Option<SourceRange>) -> Snippet {
        let catch = LabelId::fresh();
        let end = LabelId::fresh();

        Snippet::container(
            vec![
                Snippet::jump(catch, JumpKind::EnterTry, range),
                body,
                Snippet::instr(Instr::ExitTry, range),
                Snippet::jump(end, JumpKind::Always, range),
                Snippet::Split,
                Snippet::Label(catch),
                handler,
                Snippet::Split,
                Snippet::Label(end),
            ],
            range,
            None,
        )
    }

    /// A region executed while holding one permit of `semaphore`.
    /// Acquiring may park the thread, so it always ends its Step.
    pub fn synchronized(semaphore: Term, body: Snippet, range: Option<SourceRange>) -> Snippet {
        Snippet::container(
            vec![
                Snippet::instr(Instr::Acquire(semaphore.clone()), range),
                Snippet::Split,
                body,
                Snippet::instr(Instr::Release(semaphore), range),
                Snippet::Split,
            ],
            range,
            None,
        )
    }
}

// =============================================================================
// Templates
// =============================================================================

/// A term with `$n` placeholders that combines operand snippets.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    term: Term,
}

impl Template {
    pub fn new(term: Term) -> Self {
        Self { term }
    }

    pub fn unary(op: UnaryOp) -> Self {
        Self::new(Term::unary(op, Term::Param(1)))
    }

    pub fn binary(op: BinaryOp) -> Self {
        Self::new(Term::binary(op, Term::Param(1), Term::Param(2)))
    }

    /// Apply with operands evaluated left to right.
    pub fn apply(
        &self,
        operands: Vec<Snippet>,
        ty: Option<&str>,
        range: Option<SourceRange>,
    ) -> Result<Snippet, TemplateError> {
        let order: Vec<usize> = (0..operands.len()).collect();
        self.apply_in_order(operands, &order, ty, range)
    }

    /// Apply with non-pure operands evaluated in `order` (0-based operand
    /// indices).
    pub fn apply_in_order(
        &self,
        operands: Vec<Snippet>,
        order: &[usize],
        ty: Option<&str>,
        range: Option<SourceRange>,
    ) -> Result<Snippet, TemplateError> {
        let references = self.term.params();
        let needed = references.iter().copied().max().unwrap_or(0);
        if needed > operands.len() {
            return Err(TemplateError::TooFewOperands {
                needed,
                given: operands.len(),
            });
        }
        let mut sorted = order.to_vec();
        sorted.sort_unstable();
        if sorted != (0..operands.len()).collect::<Vec<_>>() {
            return Err(TemplateError::InvalidEvaluationOrder);
        }

        // all pure: substitute, fold if everything is known
        if operands.iter().all(Snippet::is_pure_term) {
            let args: Vec<Term> = operands
                .iter()
                .filter_map(|operand| operand.pure_term().cloned())
                .collect();
            let applied = self.term.substitute(&args);
            return Ok(match fold(&applied) {
                Some(value) => Snippet::term(Term::Const(value), ty, range),
                None => Snippet::term(applied, ty, range),
            });
        }

        let uses = |n: usize| references.iter().filter(|&&r| r == n).count();
        for (i, operand) in operands.iter().enumerate() {
            if !operand.is_pure_term() && uses(i + 1) > 1 {
                return Err(TemplateError::RepeatedImpureOperand(i + 1));
            }
        }

        let impure_referenced = operands
            .iter()
            .enumerate()
            .filter(|(i, operand)| !operand.is_pure_term() && uses(i + 1) > 0)
            .count();

        let mut slots: Vec<Option<Snippet>> = operands.into_iter().map(Some).collect();
        let mut args = vec![Term::Const(Value::Null); slots.len()];
        let mut parts = Vec::new();

        if impure_referenced <= 1 {
            // at most one operand has effects: its value can stay inline
            for &i in order {
                let Some(operand) = slots[i].take() else { continue };
                if uses(i + 1) == 0 {
                    parts.push(operand.into_statement());
                    continue;
                }
                let (prefix, term) = operand.split_value();
                parts.extend(prefix);
                args[i] = term;
            }
        } else {
            // several operands have effects: evaluate each onto the stack in
            // evaluation order, then arrange them so that the template's
            // pops, which happen in the template's own order, find the right
            // value on top
            let mut pushed = Vec::new();
            for &i in order {
                let Some(operand) = slots[i].take() else { continue };
                if uses(i + 1) == 0 {
                    parts.push(operand.into_statement());
                } else if let Some(term) = operand.pure_term() {
                    args[i] = term.clone();
                } else {
                    parts.push(operand.ensure_final_value_on_stack());
                    args[i] = Term::Pop;
                    pushed.push(i);
                }
            }

            let pop_order: Vec<usize> = references
                .iter()
                .map(|n| n - 1)
                .filter(|i| pushed.contains(i))
                .collect();
            let wanted: Vec<usize> = pop_order.iter().rev().copied().collect();
            if let Some(reorder) = push_permutation(&pushed, &wanted) {
                parts.push(Snippet::instr(Instr::Reorder(reorder), range));
            }
        }

        parts.push(Snippet::term(self.term.substitute(&args), ty, range));
        Ok(Snippet::container(parts, range, ty))
    }
}

/// Permutation turning the stack layout `pushed` (bottom to top) into
/// `wanted`, or `None` if they already agree.
fn push_permutation(pushed: &[usize], wanted: &[usize]) -> Option<Vec<usize>> {
    if pushed == wanted {
        return None;
    }
    Some(
        wanted
            .iter()
            .filter_map(|w| pushed.iter().position(|p| p == w))
            .collect(),
    )
}

/// Constant folding: evaluates a term made only of constants and
/// operators. Anything that would raise at run time is left unfolded so the
/// exception happens when the code actually runs.
pub fn fold(term: &Term) -> Option<Value> {
    match term {
        Term::Const(value) => Some(value.clone()),
        Term::Unary(op, operand) => arith::unary(*op, &fold(operand)?).ok(),
        Term::Binary(op, lhs, rhs) => arith::binary(*op, &fold(lhs)?, &fold(rhs)?).ok(),
        Term::Local(_) | Term::Pop | Term::Param(_) | Term::Native(..) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(n: i64) -> Snippet {
        Snippet::constant(n, "int", None)
    }

    fn local(slot: usize) -> Snippet {
        Snippet::local(slot, "int", None)
    }

    fn call(name: &str) -> Snippet {
        Snippet::call(name, vec![], Some("int"), None)
    }

    fn instrs(snippet: &Snippet) -> Vec<Instr> {
        let mut out = Vec::new();
        collect_instrs(snippet, &mut out);
        out
    }

    fn collect_instrs(snippet: &Snippet, out: &mut Vec<Instr>) {
        match snippet {
            Snippet::Atom(Atom {
                code: Code::Instr(i),
                ..
            }) => out.push(i.clone()),
            Snippet::Container(c) => c.parts.iter().for_each(|p| collect_instrs(p, out)),
            _ => {}
        }
    }

    #[test]
    fn test_negating_a_literal_folds() {
        let negated = Snippet::unary(UnaryOp::Neg, int(5), "int", None);
        assert_eq!(negated.constant_value(), Some(&Value::Integer(-5)));
        assert!(negated.is_pure_term());
    }

    #[test]
    fn test_binary_constants_fold() {
        let sum = Snippet::binary(BinaryOp::Mul, int(6), int(7), "int", None).unwrap();
        assert_eq!(sum.constant_value(), Some(&Value::Integer(42)));
    }

    #[test]
    fn test_division_by_zero_is_not_folded() {
        let div = Snippet::binary(BinaryOp::Div, int(1), int(0), "int", None).unwrap();
        assert!(!div.is_constant());
        assert_eq!(
            div.pure_term(),
            Some(&Term::binary(BinaryOp::Div, Term::constant(1), Term::constant(0)))
        );
    }

    #[test]
    fn test_pure_operands_stay_inline() {
        let sum = Snippet::binary(BinaryOp::Add, local(0), int(1), "int", None).unwrap();
        assert!(sum.is_pure_term());
        assert!(!sum.final_value_on_stack());
    }

    #[test]
    fn test_one_impure_operand_keeps_value_inline() {
        let sum = Snippet::binary(BinaryOp::Add, call("f"), local(1), "int", None).unwrap();
        assert!(!sum.is_pure_term());
        assert!(!sum.final_value_on_stack());
        assert!(!instrs(&sum).iter().any(|i| matches!(i, Instr::Reorder(_))));

        let (_, term) = sum.split_value();
        assert_eq!(term, Term::binary(BinaryOp::Add, Term::Pop, Term::Local(1)));
    }

    #[test]
    fn test_two_impure_operands_are_reordered_for_template_order() {
        // $1 + $2: first pop must yield f, so f has to end up on top
        let sum = Snippet::binary(BinaryOp::Add, call("f"), call("g"), "int", None).unwrap();
        let code = instrs(&sum);

        let invoked: Vec<&str> = code
            .iter()
            .filter_map(|i| match i {
                Instr::Invoke { method, .. } => Some(method.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(invoked, vec!["f", "g"]);
        assert!(code.contains(&Instr::Reorder(vec![1, 0])));
    }

    #[test]
    fn test_template_naming_later_operand_first_needs_no_reorder() {
        let template = Template::new(Term::binary(BinaryOp::Sub, Term::Param(2), Term::Param(1)));
        let diff = template
            .apply(vec![call("f"), call("g")], Some("int"), None)
            .unwrap();
        assert!(!instrs(&diff).iter().any(|i| matches!(i, Instr::Reorder(_))));
    }

    #[test]
    fn test_repeated_impure_operand_is_rejected() {
        let square = Template::new(Term::binary(BinaryOp::Mul, Term::Param(1), Term::Param(1)));
        let err = square.apply(vec![call("f")], Some("int"), None).unwrap_err();
        assert_eq!(err, TemplateError::RepeatedImpureOperand(1));

        // pure operands may repeat
        assert!(square.apply(vec![local(0)], Some("int"), None).is_ok());
    }

    #[test]
    fn test_too_few_operands() {
        let err = Template::binary(BinaryOp::Add)
            .apply(vec![int(1)], Some("int"), None)
            .unwrap_err();
        assert_eq!(err, TemplateError::TooFewOperands { needed: 2, given: 1 });
    }

    #[test]
    fn test_invalid_order() {
        let err = Template::binary(BinaryOp::Add)
            .apply_in_order(vec![call("f"), call("g")], &[0, 0], Some("int"), None)
            .unwrap_err();
        assert_eq!(err, TemplateError::InvalidEvaluationOrder);
    }

    #[test]
    fn test_lazy_and_of_pure_terms_is_inline() {
        let cond = Snippet::lazy_logic(
            BinaryOp::And,
            Snippet::local(0, "boolean", None),
            Snippet::local(1, "boolean", None),
            None,
        );
        assert_eq!(
            cond.pure_term(),
            Some(&Term::binary(BinaryOp::And, Term::Local(0), Term::Local(1)))
        );
    }

    #[test]
    fn test_lazy_and_with_call_splits() {
        let cond = Snippet::lazy_logic(
            BinaryOp::And,
            Snippet::local(0, "boolean", None),
            Snippet::call("check", vec![], Some("boolean"), None),
            None,
        );
        assert!(cond.final_value_on_stack());
        let Snippet::Container(c) = &cond else { panic!("expected container") };
        assert!(matches!(
            &c.parts[0],
            Snippet::Jump(Jump { kind: JumpKind::If { when: false, push: Some(Value::Bool(false)), .. }, .. })
        ));
        assert!(matches!(c.parts.last(), Some(Snippet::Label(_))));
    }

    #[test]
    fn test_ensure_on_stack_pushes_inline_value() {
        let snippet = local(2).ensure_final_value_on_stack();
        assert!(snippet.final_value_on_stack());
        assert_eq!(instrs(&snippet), vec![Instr::Push(Term::Local(2))]);
    }

    #[test]
    fn test_into_statement_drops_stacked_value() {
        let statement = call("f").into_statement();
        assert_eq!(instrs(&statement).last(), Some(&Instr::Drop));

        // a pure value as a statement does nothing
        assert!(instrs(&local(0).into_statement()).is_empty());
    }

    #[test]
    fn test_unreferenced_impure_operand_still_runs() {
        let first = Template::new(Term::Param(1));
        let snippet = first
            .apply(vec![local(0), call("g")], Some("int"), None)
            .unwrap();
        assert!(instrs(&snippet).iter().any(|i| matches!(i, Instr::Invoke { method, .. } if method == "g")));
    }

    #[test]
    fn test_container_range_spans_parts() {
        let a = Snippet::constant(1, "int", Some(SourceRange::line(2, 1, 3)));
        let b = Snippet::constant(2, "int", Some(SourceRange::line(2, 7, 9)));
        let c = Snippet::container(vec![a, b], None, None);
        assert_eq!(c.range(), Some(SourceRange::line(2, 1, 9)));
    }
}
