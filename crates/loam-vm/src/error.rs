//! Interpreter result types.

use loam_compiler::CompileError;
use thiserror::Error;

/// Why a program failed to run.
///
/// Compile errors have already been printed line by line; runtime errors
/// have already been printed with a stack trace. The variants exist so
/// the driver can choose the right exit code.
#[derive(Debug, Error)]
pub enum InterpretError {
    /// The source did not compile.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Execution aborted with a runtime error.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// A runtime failure, after the stack trace has been reported and the VM
/// stack reset.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RuntimeError {
    /// The already-reported error message.
    pub message: String,
}
