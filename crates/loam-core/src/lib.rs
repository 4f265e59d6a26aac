//! loam-core - Runtime data model for the Loam interpreter.
//!
//! This crate holds everything the compiler and the virtual machine share:
//!
//! - [`Value`]: the tagged scalar (`null`, booleans, f64 numbers, heap
//!   object handles)
//! - [`Heap`]: typed arenas for strings, functions, and natives, plus the
//!   string-intern table; objects live until the heap is dropped
//! - [`Chunk`]: append-only bytecode with a constant pool and a
//!   run-length-encoded line table
//! - [`Table`]: the open-addressed, tombstone-aware hash map keyed by
//!   interned-string identity, used for globals and interning
//! - the disassembler used by debug tracing
//!
//! # Ownership model
//!
//! Objects are never freed individually. Handles ([`StringId`],
//! [`FunctionId`], [`NativeId`]) are indices into the heap's arenas, so a
//! `Value` is `Copy` and stack slots are plain data. Dropping the heap
//! releases everything at once.

pub mod chunk;
pub mod disassembler;
pub mod object;
pub mod table;
pub mod value;

pub use chunk::{decode_u24, encode_u24, Chunk, LineRun, OpCode, MAX_CONSTANT_INDEX};
pub use disassembler::{disassemble_chunk, disassemble_instruction};
pub use object::{
    hash_string, ArityRange, FunctionId, Heap, NativeError, NativeFn, NativeId, ObjFunction,
    ObjNative, ObjString, StringId,
};
pub use table::Table;
pub use value::{Obj, Value};

/// Number of distinct values a one-byte operand can take.
///
/// Bounds the local-variable window of a call frame, and with it how far
/// past its base a frame may reach into the stack.
pub const UINT8_COUNT: usize = u8::MAX as usize + 1;
