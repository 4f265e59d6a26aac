//! loam-vm - The Loam virtual machine.
//!
//! A stack machine with call frames. The VM owns the heap (and with it
//! the intern table), the value stack, the frame array, the global
//! environment, and the const-global set. [`Vm::interpret`] compiles a
//! source string and runs the resulting top-level function to
//! completion; the result distinguishes compile errors from runtime
//! errors so the driver can map them to exit codes.
//!
//! One VM per process is the expected shape, but nothing here is global
//! state: every piece of the machine lives inside the [`Vm`] value.
//!
//! # Example
//!
//! ```
//! use loam_vm::Vm;
//!
//! let mut vm = Vm::new();
//! vm.interpret("var greeting = \"hello\";").unwrap();
//! assert!(vm.get_global("greeting").is_some());
//! ```

pub mod error;
pub mod vm;

pub use error::{InterpretError, RuntimeError};
pub use vm::{DebugOptions, Vm, FRAMES_MAX, STACK_MAX};
