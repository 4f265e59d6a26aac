//! loam-drv - Driver for the Loam interpreter.
//!
//! The driver is everything outside the compiler/VM core: reading script
//! files, the interactive shell, standard-library registration, and the
//! mapping from interpreter outcomes to process exit codes.
//!
//! # Exit codes
//!
//! Following the sysexits convention:
//!
//! | code | meaning |
//! |------|---------|
//! | 0    | program ran to completion |
//! | 65   | compile error (`EX_DATAERR`) |
//! | 66   | script file unreadable (`EX_NOINPUT`) |
//! | 70   | runtime error (`EX_SOFTWARE`) |

pub mod stdlib;

use std::fs;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::Path;

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::debug;

use loam_vm::{DebugOptions, InterpretError, Vm};

/// Compile error exit code.
pub const EX_DATAERR: i32 = 65;
/// Unreadable-input exit code.
pub const EX_NOINPUT: i32 = 66;
/// Runtime error exit code.
pub const EX_SOFTWARE: i32 = 70;

/// Builds a VM with the standard library registered.
///
/// `ndebug` turns off chunk dumps and execution tracing, which otherwise
/// default to on in debug builds.
pub fn new_vm(ndebug: bool) -> Vm {
    let debug = if ndebug {
        DebugOptions::quiet()
    } else {
        DebugOptions::default()
    };
    let mut vm = Vm::with_debug(debug);
    stdlib::register(&mut vm);
    vm
}

/// Runs a script file, returning the process exit code.
///
/// Errors have already been reported by the compiler or the VM; this
/// only adds the message for an unreadable file.
pub fn run_file(vm: &mut Vm, path: &Path) -> i32 {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("File with path \"{}\" could not be opened: {err}", path.display());
            return EX_NOINPUT;
        }
    };

    debug!(path = %path.display(), bytes = source.len(), "running script file");
    match vm.interpret(&source) {
        Ok(()) => 0,
        Err(InterpretError::Compile(_)) => EX_DATAERR,
        Err(InterpretError::Runtime(_)) => EX_SOFTWARE,
    }
}

/// The line-buffered interactive shell.
///
/// Each line is a full compilation unit; globals and interned strings
/// persist in the VM between lines. `q`, `quit`, or end of input exit.
/// A real terminal gets line editing and history; piped input falls back
/// to plain buffered reads so the REPL stays scriptable.
pub fn run_repl(vm: &mut Vm) -> Result<()> {
    println!("loam repl mode ('q' or 'quit' to quit)");

    if io::stdin().is_terminal() {
        run_editor_repl(vm)
    } else {
        run_piped_repl(vm)
    }
}

fn run_editor_repl(vm: &mut Vm) -> Result<()> {
    let mut editor = DefaultEditor::new().context("could not initialize line editor")?;

    loop {
        match editor.readline("loam > ") {
            Ok(line) => {
                if is_quit(&line) {
                    return Ok(());
                }
                let _ = editor.add_history_entry(&line);
                // Errors were already printed; the shell keeps going.
                let _ = vm.interpret(&line);
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => {
                println!();
                return Ok(());
            }
            Err(err) => return Err(err).context("could not read line"),
        }
    }
}

fn run_piped_repl(vm: &mut Vm) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("loam > ");
        stdout.flush().context("could not flush prompt")?;

        let mut line = String::new();
        let read = stdin
            .lock()
            .read_line(&mut line)
            .context("could not read line")?;
        if read == 0 {
            println!();
            return Ok(());
        }

        let line = line.trim_end_matches(['\n', '\r']);
        if is_quit(line) {
            return Ok(());
        }
        let _ = vm.interpret(line);
    }
}

fn is_quit(line: &str) -> bool {
    line == "q" || line == "quit"
}
