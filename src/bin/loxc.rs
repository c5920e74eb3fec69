//! CLI for the bytecode VM: `loxc [script]`.
//!
//! With a path argument, compiles and runs that file. With no arguments, runs an interactive
//! REPL, one full program per line, against a single [VM] so that globals persist across lines.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use rlox::error::InterpretationError;
use rlox::vm::VM;

fn main() -> ExitCode {
    init_logging();

    let mut args = std::env::args().skip(1);
    match (args.next(), args.next()) {
        (None, _) => run_repl(),
        (Some(path), None) => run_file(PathBuf::from(path)),
        (Some(_), Some(_)) => {
            eprintln!("Usage: loxc [script]");
            ExitCode::from(1)
        }
    }
}

fn init_logging() {
    let level = match std::env::var("RLOX_LOG") {
        Ok(_) => log::Level::Debug,
        Err(_) => log::Level::Warn,
    };
    simple_logger::init_with_level(level).expect("logger can only be initialized once");
}

fn run_file(path: PathBuf) -> ExitCode {
    let source = match std::fs::read_to_string(&path).with_context(|| format!("could not read {}", path.display()))
    {
        Ok(source) => source,
        Err(err) => {
            eprintln!("{err:#}");
            return ExitCode::from(1);
        }
    };

    let mut vm = VM::new();
    let mut stdout = io::stdout();
    match vm.interpret(&source, &mut stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(InterpretationError::CompileError(diagnostics)) => {
            for diagnostic in diagnostics {
                eprintln!("{diagnostic}");
            }
            ExitCode::from(65)
        }
        Err(InterpretationError::RuntimeError(err)) => {
            eprintln!("{err}");
            ExitCode::from(70)
        }
    }
}

fn run_repl() -> ExitCode {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut vm = VM::new();

    loop {
        print!("> ");
        io::stdout().flush().expect("stdout should be writable");

        let mut line = String::new();
        let bytes_read = stdin
            .lock()
            .read_line(&mut line)
            .expect("stdin should be readable");
        if bytes_read == 0 {
            println!();
            break;
        }

        if let Err(err) = vm.interpret(&line, &mut stdout) {
            match err {
                InterpretationError::CompileError(diagnostics) => {
                    for diagnostic in diagnostics {
                        eprintln!("{diagnostic}");
                    }
                }
                InterpretationError::RuntimeError(err) => eprintln!("{err}"),
            }
        }
    }

    ExitCode::SUCCESS
}
