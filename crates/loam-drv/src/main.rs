//! The `loam` binary.
//!
//! `loam [path] [--ndebug]`: with a path, runs the script and exits with
//! a status describing the outcome; without one, starts the REPL.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Interpreter for the Loam scripting language.
#[derive(Parser, Debug)]
#[command(name = "loam")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Interpreter for the Loam scripting language", long_about = None)]
struct Cli {
    /// Script to run; omit to start the REPL
    path: Option<PathBuf>,

    /// Disable debug output (chunk dumps and per-instruction tracing)
    #[arg(long, env = "LOAM_NDEBUG")]
    ndebug: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let mut vm = loam_drv::new_vm(cli.ndebug);

    match cli.path {
        Some(path) => {
            let code = loam_drv::run_file(&mut vm, &path);
            ExitCode::from(code as u8)
        }
        None => match loam_drv::run_repl(&mut vm) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("repl error: {err:#}");
                ExitCode::FAILURE
            }
        },
    }
}

/// Diagnostics go to stderr, filtered by `LOAM_LOG` (off by default so
/// script output stays clean).
fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOAM_LOG").unwrap_or_else(|_| EnvFilter::new("off"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
