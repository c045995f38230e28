//! # Linker: snippet trees to Steps
//!
//! Linking runs in three passes over a flat list:
//!
//! 1. **flatten** walks the snippet tree depth first, dropping Split markers
//!    that would produce an empty Step (a Split right after another Split,
//!    with only labels in between, or at the very start) and adding one
//!    after every instruction that may suspend the Step.
//! 2. **index** numbers the Steps: every Split opens the next index, every
//!    Label records the index of the Step it starts.
//! 3. **emit** cuts the list at the Splits and resolves jumps to the label
//!    indices recorded in pass 2.

use std::collections::HashMap;

use tracing::debug;

use crate::bytecode::compile_error::LinkError;
use crate::bytecode::ir::{FrameLayout, Program, Step};
use crate::bytecode::op::Instr;
use crate::bytecode::snippet::{Atom, Code, Jump, JumpKind, LabelId, Snippet};
use crate::lang::span::{SourceRange, accumulate};

/// One element of the flattened list.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Code(Instr),
    Jump(LabelId, JumpKind),
    Split,
    Label(LabelId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatPart {
    pub part: Part,
    pub range: Option<SourceRange>,
    /// Step the part ends up in; assigned by [`Linker::index`].
    pub step: usize,
}

impl FlatPart {
    fn new(part: Part, range: Option<SourceRange>) -> Self {
        Self {
            part,
            range,
            step: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Linker;

impl Default for Linker {
    fn default() -> Self {
        Self::new()
    }
}

impl Linker {
    pub fn new() -> Self {
        Self
    }

    pub fn link_program(
        &self,
        name: &str,
        frame: FrameLayout,
        snippets: Vec<Snippet>,
    ) -> Result<Program, LinkError> {
        let mut steps = self.link(snippets)?;

        // running off the end returns; after a call or an acquire the
        // return needs a Step of its own to resume at
        match steps.last_mut() {
            Some(last) if last.ends_in_transfer() => {}
            Some(last) if !last.instrs.last().is_some_and(Instr::suspends) => {
                last.instrs.push(Instr::Return(None))
            }
            _ => {
                let mut step = Step::new(steps.len());
                step.instrs.push(Instr::Return(None));
                steps.push(step);
            }
        }

        debug!(program = name, steps = steps.len(), "linked");
        Ok(Program::new(name, frame, steps))
    }

    pub fn link(&self, snippets: Vec<Snippet>) -> Result<Vec<Step>, LinkError> {
        let mut parts = Vec::new();
        for snippet in snippets {
            self.flatten(snippet, &mut parts);
        }
        let labels = self.index(&mut parts)?;
        self.emit(parts, &labels)
    }

    // =========================================================================
    // Pass 1: flatten
    // =========================================================================

    pub fn flatten(&self, snippet: Snippet, out: &mut Vec<FlatPart>) {
        flatten_into(snippet, None, out);
    }

    // =========================================================================
    // Pass 2: index
    // =========================================================================

    /// Assign Step indices and collect label positions.
    pub fn index(&self, parts: &mut [FlatPart]) -> Result<HashMap<LabelId, usize>, LinkError> {
        let mut labels = HashMap::new();
        let mut current = 0;

        for flat in parts.iter_mut() {
            flat.step = current;
            match flat.part {
                Part::Split => current += 1,
                Part::Label(label) => {
                    if labels.insert(label, current).is_some() {
                        return Err(LinkError::DuplicateLabel(label));
                    }
                }
                Part::Code(_) | Part::Jump(..) => {}
            }
        }

        Ok(labels)
    }

    // =========================================================================
    // Pass 3: emit
    // =========================================================================

    pub fn emit(
        &self,
        parts: Vec<FlatPart>,
        labels: &HashMap<LabelId, usize>,
    ) -> Result<Vec<Step>, LinkError> {
        let mut steps = Vec::new();
        let mut current = Step::new(0);

        for flat in parts {
            match flat.part {
                Part::Split => {
                    let next = Step::new(flat.step + 1);
                    steps.push(std::mem::replace(&mut current, next));
                    continue;
                }
                Part::Label(_) => continue,
                Part::Code(instr) => current.instrs.push(instr),
                Part::Jump(label, kind) => {
                    let target = *labels
                        .get(&label)
                        .ok_or(LinkError::UnresolvedLabel(label))?;
                    current.instrs.push(resolve(kind, target));
                }
            }
            accumulate(&mut current.range, flat.range.as_ref());
        }

        if !current.instrs.is_empty() {
            steps.push(current);
        } else if labels.values().any(|&target| target == current.index) {
            // a label at the very end still needs a Step to land on
            current.instrs.push(Instr::Return(None));
            steps.push(current);
        }

        Ok(steps)
    }
}

fn resolve(kind: JumpKind, target: usize) -> Instr {
    match kind {
        JumpKind::Always => Instr::Goto(target),
        JumpKind::If { cond, when, push } => Instr::BranchIf {
            cond,
            when,
            push,
            target,
        },
        JumpKind::EnterTry => Instr::EnterTry { catch: target },
    }
}

/// True if nothing but labels was added since the last Split.
fn at_step_start(out: &[FlatPart]) -> bool {
    for flat in out.iter().rev() {
        match flat.part {
            Part::Label(_) => continue,
            Part::Split => return true,
            Part::Code(_) | Part::Jump(..) => return false,
        }
    }
    true
}

fn flatten_into(snippet: Snippet, inherited: Option<SourceRange>, out: &mut Vec<FlatPart>) {
    match snippet {
        Snippet::Atom(Atom { code, range, .. }) => {
            let range = range.or(inherited);
            match code {
                Code::Instr(instr) => {
                    let suspends = instr.suspends();
                    out.push(FlatPart::new(Part::Code(instr), range));
                    if suspends {
                        out.push(FlatPart::new(Part::Split, None));
                    }
                }
                // a value nobody consumes only matters for its effects
                Code::Term(term) if !term.is_pure() => {
                    out.push(FlatPart::new(Part::Code(Instr::Eval(term)), range))
                }
                Code::Term(_) => {}
            }
        }
        Snippet::Container(container) => {
            let range = container.range.or(inherited);
            for part in container.parts {
                flatten_into(part, range, out);
            }
        }
        Snippet::Split => {
            if !at_step_start(out) {
                out.push(FlatPart::new(Part::Split, None));
            }
        }
        Snippet::Label(label) => out.push(FlatPart::new(Part::Label(label), None)),
        Snippet::Jump(Jump { label, kind, range }) => {
            out.push(FlatPart::new(Part::Jump(label, kind), range.or(inherited)))
        }
    }
}
