use crate::bytecode::op::Instr;
use crate::lang::span::SourceRange;
use serde::{Deserialize, Serialize};

/// The unit of execution: a short run of instructions that the scheduler
/// never interrupts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Position in the owning program's step list.
    pub index: usize,

    pub instrs: Vec<Instr>,

    /// Source range covered by the Step, for highlighting while debugging.
    pub range: Option<SourceRange>,
}

impl Step {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            instrs: Vec::new(),
            range: None,
        }
    }

    /// True if control cannot fall through into the next Step.
    pub fn ends_in_transfer(&self) -> bool {
        self.instrs.last().is_some_and(Instr::is_transfer)
    }
}

/// How a frame of this program lays out its local slots:
/// `this` first, then parameters, then locals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameLayout {
    /// 1 for instance methods, 0 otherwise.
    pub this_slots: usize,
    pub parameters: usize,
    pub locals: usize,

    /// Slot names for the debugger, `this`/parameters/locals in slot order.
    pub symbols: Vec<String>,
}

impl FrameLayout {
    pub fn new(parameters: usize, locals: usize) -> Self {
        Self {
            this_slots: 0,
            parameters,
            locals,
            symbols: Vec::new(),
        }
    }

    pub fn with_symbols(mut self, symbols: &[&str]) -> Self {
        self.symbols = symbols.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Values a caller leaves on the operand stack for the callee.
    pub fn arguments(&self) -> usize {
        self.this_slots + self.parameters
    }

    pub fn slots(&self) -> usize {
        self.arguments() + self.locals
    }
}

/// A linked method: its Steps plus the frame layout they assume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub name: String,
    pub frame: FrameLayout,
    pub steps: Vec<Step>,
}

impl Program {
    pub fn new(name: &str, frame: FrameLayout, steps: Vec<Step>) -> Self {
        Self {
            name: name.to_string(),
            frame,
            steps,
        }
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    /// First Step whose range starts on `line`, or failing that the first
    /// Step covering it. Used to place line breakpoints.
    pub fn find_step(&self, line: u32) -> Option<usize> {
        self.steps
            .iter()
            .find(|s| s.range.is_some_and(|r| r.start_line == line))
            .or_else(|| {
                self.steps
                    .iter()
                    .find(|s| s.range.is_some_and(|r| r.contains_line(line)))
            })
            .map(|s| s.index)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}
