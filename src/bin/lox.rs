//! CLI for the tree-walk interpreter: `lox [script]`.
//!
//! With a path argument, reads and runs that file. With no arguments, runs an interactive REPL,
//! one full program per line. Host errors (bad path, I/O failure) are handled here, not by the
//! library -- see `rlox::error` for the errors the core itself can return.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use rlox::interpreter::Interpreter;
use rlox::{parser, resolver};

fn main() -> ExitCode {
    init_logging();

    let mut args = std::env::args().skip(1);
    match (args.next(), args.next()) {
        (None, _) => run_repl(),
        (Some(path), None) => run_file(PathBuf::from(path)),
        (Some(_), Some(_)) => {
            eprintln!("Usage: lox [script]");
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

    let mut stdout = io::stdout();
    match run(&source, &mut stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Outcome::Static) => ExitCode::from(65),
        Err(Outcome::Runtime) => ExitCode::from(70),
    }
}

fn run_repl() -> ExitCode {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

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

        // A REPL error never kills the session -- only the exit code of a file run reflects it.
        let _ = run(&line, &mut stdout);
    }

    ExitCode::SUCCESS
}

enum Outcome {
    Static,
    Runtime,
}

/// Runs one program through scan -> parse -> resolve -> interpret, printing diagnostics to
/// stderr and `print` output to `out`.
fn run(source: &str, out: &mut dyn Write) -> Result<(), Outcome> {
    let stmts = parser::parse(source).map_err(|diagnostics| {
        for diagnostic in diagnostics {
            eprintln!("{diagnostic}");
        }
        Outcome::Static
    })?;

    let resolved = resolver::resolve(&stmts).map_err(|diagnostics| {
        for diagnostic in diagnostics {
            eprintln!("{diagnostic}");
        }
        Outcome::Static
    })?;

    let mut interpreter = Interpreter::new(resolved, out);
    interpreter.interpret(&stmts).map_err(|err| {
        eprintln!("{err}");
        Outcome::Runtime
    })
}
