//! loam-util - Core utilities shared across the Loam interpreter.
//!
//! This crate provides the foundation pieces every other crate leans on:
//!
//! - Diagnostic reporting (`Handler`, `Diagnostic`) in the interpreter's
//!   `[line N] Error at 'lexeme': message` format
//! - Re-exports of the fast hash map used for compiler-side caches
//!
//! The diagnostic handler is deliberately small: the language reports
//! errors by source line only (tokens carry no column information), and
//! the parser owns panic-mode suppression itself. The handler's job is to
//! format, print, and count.

pub mod diagnostic;

pub use diagnostic::{Diagnostic, Handler, TokenLocation};

// Re-export commonly used hash containers so downstream crates don't each
// declare the dependency.
pub use rustc_hash::FxHashMap;
pub use rustc_hash::FxHashSet;
