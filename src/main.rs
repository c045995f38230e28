use std::env;
use std::rc::Rc;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use stepwise::bytecode::disasm::{print_program, print_stats};
use stepwise::bytecode::snippet::{Container, Snippet};
use stepwise::bytecode::{BinaryOp, FrameLayout, Instr, LinkError, Linker, Program, Term, TemplateError};
use stepwise::lang::span::SourceRange;
use stepwise::lang::value::Value;
use stepwise::runtime::{ClassRegistry, Interpreter, InterpreterConfig};

#[derive(Debug, Error)]
enum DemoError {
    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stepwise=info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return;
    }

    let show_listing = args.contains(&"--listing".to_string());
    let show_bytes = args.contains(&"--bytes".to_string());
    let max_speed = args.contains(&"--max-speed".to_string());
    let speed = match flag_value(&args, "--speed").map(str::parse::<f64>) {
        Some(Ok(speed)) => Some(speed),
        Some(Err(e)) => {
            eprintln!("Invalid --speed: {}", e);
            std::process::exit(1);
        }
        None => None,
    };

    let (main, registry) = match build_demo() {
        Ok(demo) => demo,
        Err(e) => {
            eprintln!("Compile error: {}", e);
            std::process::exit(1);
        }
    };

    let mut programs: Vec<Rc<Program>> = vec![Rc::clone(&main)];
    programs.extend(["worker", "busy"].iter().filter_map(|name| registry.program(name)));

    if show_listing {
        for program in &programs {
            print_program(program);
            println!();
        }
        print_stats(&programs.iter().map(|p| &**p).collect::<Vec<&Program>>());
        println!();
    }

    if show_bytes {
        for program in &programs {
            match program.to_bytes() {
                Ok(bytes) => println!("{:<8} {:>5} bytes", program.name, bytes.len()),
                Err(e) => eprintln!("Encode error in {}: {}", program.name, e),
            }
        }
        println!();
    }

    let config = InterpreterConfig {
        steps_per_second: if max_speed { None } else { speed },
        ..InterpreterConfig::default()
    };

    let mut interpreter = Interpreter::new(config);
    if let Err(e) = interpreter.init(main, registry) {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }

    match interpreter.run_with_timer() {
        Ok(stats) => {
            println!();
            println!(
                "{} steps, {} threads ({} failed)",
                stats.steps, stats.threads_started, stats.threads_failed
            );
        }
        Err(e) => {
            eprintln!("Runtime error: {}", e);
            std::process::exit(1);
        }
    }

    for thread in interpreter.pool().finished() {
        if let Some(err) = thread.error() {
            eprintln!("{} {}: {}", thread.id(), thread.name(), err.describe());
        }
    }
}

fn print_usage() {
    println!("STEPWISE - resumable step interpreter demo");
    println!();
    println!("Usage:");
    println!("  stepwise                  Run the two-thread demo at maximum speed");
    println!("  stepwise --speed <n>      Run at <n> steps per second");
    println!("  stepwise --max-speed      Run as fast as the load factor allows");
    println!("  stepwise --listing        Print the linked programs first");
    println!("  stepwise --bytes          Print the encoded program sizes");
    println!("  stepwise --help, -h       Show this help");
    println!();
    println!("Log level: RUST_LOG (default stepwise=info)");
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let position = args.iter().position(|a| a == flag)?;
    args.get(position + 1).map(String::as_str)
}

fn line(n: u32) -> Option<SourceRange> {
    Some(SourceRange::line(n, 1, 40))
}

fn print(message: Snippet, range: Option<SourceRange>) -> Result<Snippet, TemplateError> {
    Ok(Snippet::native("print", vec![message], None, range)?.into_statement())
}

// =============================================================================
// Demo programs
// =============================================================================

/// Two workers take turns in a synchronized region:
///
/// ```text
/// main():
///     lock = new Semaphore(1)
///     spawn worker(lock, "A")
///     spawn worker(lock, "B")
///     print("main done")
///
/// worker(lock, name):
///     i = 0
///     while (i < 3 && busy(i)) {
///         synchronized (lock) {
///             print(name + " enters round " + i)
///             print(name + " leaves")
///         }
///         i = i + 1
///     }
///
/// busy(n): return n >= 0
/// ```
fn build_demo() -> Result<(Rc<Program>, ClassRegistry), DemoError> {
    let linker = Linker::new();
    let mut registry = ClassRegistry::new();

    registry.add_native("print", |call, args| {
        let text: Vec<String> = args.iter().map(ToString::to_string).collect();
        println!("[{}] {}", call.thread_id(), text.join(" "));
        Ok(Value::Null)
    });

    // busy(n)
    let busy = Snippet::ret(
        Some(Snippet::binary(
            BinaryOp::Ge,
            Snippet::local(0, "int", line(20)),
            Snippet::constant(0, "int", line(20)),
            "boolean",
            line(20),
        )?),
        line(20),
    );
    registry.add_program(linker.link_program("busy", FrameLayout::new(1, 0).with_symbols(&["n"]), vec![busy])?);

    // worker(lock, name)
    let (lock, name, i) = (0, 1, 2);
    let cond = Snippet::lazy_logic(
        BinaryOp::And,
        Snippet::binary(
            BinaryOp::Lt,
            Snippet::local(i, "int", line(12)),
            Snippet::constant(3, "int", line(12)),
            "boolean",
            line(12),
        )?,
        Snippet::call("busy", vec![Snippet::local(i, "int", line(12))], Some("boolean"), line(12)),
        line(12),
    );
    let enters = Snippet::binary(
        BinaryOp::Add,
        Snippet::binary(
            BinaryOp::Add,
            Snippet::local(name, "String", line(14)),
            Snippet::constant(" enters round", "String", line(14)),
            "String",
            line(14),
        )?,
        Snippet::local(i, "int", line(14)),
        "String",
        line(14),
    )?;
    let leaves = Snippet::binary(
        BinaryOp::Add,
        Snippet::local(name, "String", line(15)),
        Snippet::constant(" leaves", "String", line(15)),
        "String",
        line(15),
    )?;
    let region = Snippet::synchronized(
        Term::Local(lock),
        Snippet::block(vec![print(enters, line(14))?, print(leaves, line(15))?], line(14)),
        line(13),
    );
    let increment = Snippet::assign(
        i,
        Snippet::binary(
            BinaryOp::Add,
            Snippet::local(i, "int", line(17)),
            Snippet::constant(1, "int", line(17)),
            "int",
            line(17),
        )?,
        line(17),
    );
    let worker = vec![
        Snippet::assign(i, Snippet::constant(0, "int", line(11)), line(11)),
        Snippet::while_loop(cond, Snippet::block(vec![region, increment], line(13)), line(12)),
    ];
    registry.add_program(linker.link_program(
        "worker",
        FrameLayout::new(2, 1).with_symbols(&["lock", "name", "i"]),
        worker,
    )?);

    // main()
    let new_lock = Snippet::Container(Container {
        parts: vec![Snippet::instr(Instr::NewSemaphore { permits: 1 }, line(2))],
        final_value_on_stack: true,
        ty: Some("Semaphore".to_string()),
        range: line(2),
    });
    let spawn = |label: &str, at: u32| {
        Snippet::spawn(
            "worker",
            vec![
                Snippet::local(0, "Semaphore", line(at)),
                Snippet::constant(label, "String", line(at)),
            ],
            line(at),
        )
    };
    let main = vec![
        Snippet::assign(0, new_lock, line(2)),
        spawn("A", 3),
        spawn("B", 4),
        print(Snippet::constant("main done", "String", line(5)), line(5))?,
    ];
    let main = linker.link_program("main", FrameLayout::new(0, 1).with_symbols(&["lock"]), main)?;

    Ok((Rc::new(main), registry))
}
