use crate::bytecode::ir::{Program, Step};
use crate::bytecode::op::Instr;
use std::collections::{BTreeSet, HashMap};

/// Print the Step listing of a program
pub fn print_program(program: &Program) {
    print!("{}", listing(program));
}

/// Return the Step listing of a program as a String
pub fn listing(program: &Program) -> String {
    let mut output = String::new();
    let targets = collect_jump_targets(&program.steps);

    output.push_str("════════════════════════════════════════\n");
    output.push_str(&format!(" {}\n", program.name));
    output.push_str(&format!(
        " {} steps, {} slots",
        program.steps.len(),
        program.frame.slots()
    ));
    if !program.frame.symbols.is_empty() {
        output.push_str(&format!(" ({})", program.frame.symbols.join(", ")));
    }
    output.push_str("\n════════════════════════════════════════\n");

    for step in &program.steps {
        let targeted = targets.contains(&step.index);
        if targeted {
            output.push_str("      ┌──────────────────────────────────\n");
        }

        output.push_str(&format!("{:04} ", step.index));
        output.push_str(if targeted { "► " } else { "  " });

        match &step.range {
            Some(range) => output.push_str(&format!("; {}\n", range)),
            None => output.push('\n'),
        }

        for instr in &step.instrs {
            output.push_str("        ");
            output.push_str(&format_instr(instr, step.index));
            output.push('\n');
        }
    }

    output
}

fn collect_jump_targets(steps: &[Step]) -> BTreeSet<usize> {
    steps
        .iter()
        .flat_map(|step| step.instrs.iter().filter_map(Instr::target))
        .collect()
}

fn arrow(from: usize, to: usize) -> &'static str {
    if to <= from { "↑" } else { "↓" }
}

fn format_instr(instr: &Instr, at: usize) -> String {
    match instr {
        Instr::Push(term) => format!("PUSH        {}", term),
        Instr::Store(slot, term) => format!("STORE       local[{}] = {}", slot, term),
        Instr::Eval(term) => format!("EVAL        {}", term),
        Instr::Drop => "DROP        ; ( x -- )".to_string(),
        Instr::Reorder(order) => format!("REORDER     {:?}", order),
        Instr::Goto(target) => format!("GOTO        {} (→ {:04})", arrow(at, *target), target),
        Instr::BranchIf {
            cond,
            when,
            push,
            target,
        } => {
            let mut text = format!(
                "BRANCH_{}  {} {} (→ {:04})",
                if *when { "T" } else { "F" },
                cond,
                arrow(at, *target),
                target
            );
            if let Some(value) = push {
                text.push_str(&format!(" ; push {}", value));
            }
            text
        }
        Instr::Invoke { method, argc } => format!("INVOKE      \"{}\" ({} args)", method, argc),
        Instr::Spawn { method, argc } => format!("SPAWN       \"{}\" ({} args)", method, argc),
        Instr::Return(Some(term)) => format!("RETURN      {}", term),
        Instr::Return(None) => "RETURN".to_string(),
        Instr::Throw { class, message } => format!("THROW       {}({})", class, message),
        Instr::EnterTry { catch } => format!("ENTER_TRY   catch → {:04}", catch),
        Instr::ExitTry => "EXIT_TRY".to_string(),
        Instr::NewSemaphore { permits } => format!("NEW_SEM     {} permits ; ( -- sem )", permits),
        Instr::Acquire(term) => format!("ACQUIRE     {}", term),
        Instr::Release(term) => format!("RELEASE     {}", term),
        Instr::Exit => "EXIT".to_string(),
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Print instruction statistics over a set of programs
pub fn print_stats(programs: &[&Program]) {
    println!("=== STEP STATISTICS ===\n");

    let steps: usize = programs.iter().map(|p| p.steps.len()).sum();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for program in programs {
        for step in &program.steps {
            count_instrs(&step.instrs, &mut counts);
        }
    }
    let total: usize = counts.values().sum();

    println!("Programs:      {}", programs.len());
    println!("Steps:         {}", steps);
    println!("Instructions:  {}", total);
    if steps > 0 {
        println!("Per step:      {:.2}", total as f64 / steps as f64);
    }
    println!();

    println!("Instruction frequency:");
    let mut counts: Vec<_> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    for (name, count) in counts.iter().take(10) {
        let pct = (*count as f64 / total as f64) * 100.0;
        println!("  {:<14} {:>4} ({:>5.1}%)", name, count, pct);
    }
}

fn count_instrs<'a>(instrs: &'a [Instr], counts: &mut HashMap<&'a str, usize>) {
    for instr in instrs {
        *counts.entry(instr_name(instr)).or_insert(0) += 1;
    }
}

fn instr_name(instr: &Instr) -> &'static str {
    match instr {
        Instr::Push(_) => "PUSH",
        Instr::Store(..) => "STORE",
        Instr::Eval(_) => "EVAL",
        Instr::Drop => "DROP",
        Instr::Reorder(_) => "REORDER",
        Instr::Goto(_) => "GOTO",
        Instr::BranchIf { .. } => "BRANCH",
        Instr::Invoke { .. } => "INVOKE",
        Instr::Spawn { .. } => "SPAWN",
        Instr::Return(_) => "RETURN",
        Instr::Throw { .. } => "THROW",
        Instr::EnterTry { .. } => "ENTER_TRY",
        Instr::ExitTry => "EXIT_TRY",
        Instr::NewSemaphore { .. } => "NEW_SEM",
        Instr::Acquire(_) => "ACQUIRE",
        Instr::Release(_) => "RELEASE",
        Instr::Exit => "EXIT",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::ir::FrameLayout;
    use crate::bytecode::op::Term;
    use crate::lang::value::Value;

    fn program() -> Program {
        Program::new(
            "Main.count",
            FrameLayout::new(0, 1).with_symbols(&["i"]),
            vec![
                Step {
                    index: 0,
                    instrs: vec![
                        Instr::BranchIf {
                            cond: Term::Local(0),
                            when: false,
                            push: Some(Value::Bool(false)),
                            target: 1,
                        },
                        Instr::Goto(0),
                    ],
                    range: None,
                },
                Step {
                    index: 1,
                    instrs: vec![Instr::Return(None)],
                    range: None,
                },
            ],
        )
    }

    #[test]
    fn test_listing_marks_jump_targets() {
        let text = listing(&program());
        assert!(text.contains("0000 ► "));
        assert!(text.contains("0001 ► "));
        assert!(text.contains("GOTO        ↑ (→ 0000)"));
        assert!(text.contains("; push false"));
        assert!(text.contains("(i)"));
    }

    #[test]
    fn test_instr_counts() {
        let program = program();
        let mut counts = HashMap::new();
        for step in &program.steps {
            count_instrs(&step.instrs, &mut counts);
        }
        assert_eq!(counts.get("BRANCH"), Some(&1));
        assert_eq!(counts.get("GOTO"), Some(&1));
        assert_eq!(counts.get("RETURN"), Some(&1));
    }
}
