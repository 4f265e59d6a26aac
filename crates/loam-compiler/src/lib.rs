//! loam-compiler - Single-pass compiler for the Loam language.
//!
//! There is no AST: a Pratt-style precedence-climbing parser consumes
//! tokens from `loam-lex` and emits bytecode directly into the chunk of
//! the function being compiled. Scope resolution, jump patching, and
//! constant interning all happen inline during the one pass.
//!
//! The public surface is [`compile`], which turns source text into the
//! implicit top-level function (named `<script>` in diagnostics) or a
//! [`CompileError`] after printing every diagnostic to stderr.
//!
//! # Example
//!
//! ```
//! use loam_core::Heap;
//!
//! let mut heap = Heap::new();
//! let script = loam_compiler::compile("print 1 + 2;", &mut heap, false).unwrap();
//! assert!(heap.function(script).chunk.len() > 0);
//! ```

pub mod compiler;

pub use compiler::{compile, CompileError};
