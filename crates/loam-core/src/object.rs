//! Heap objects and the arena that owns them.
//!
//! The heap hands out copyable index handles instead of pointers. All
//! strings are interned: creation goes through [`Heap::copy_string`] or
//! [`Heap::take_string`], both of which consult the intern table first,
//! so two equal strings always share one handle and identity comparison
//! is byte comparison.

use std::fmt;

use thiserror::Error;

use crate::chunk::Chunk;
use crate::table::Table;
use crate::value::{Obj, Value};

/// Handle to an interned string in the heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StringId(u32);

/// Handle to a compiled function in the heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FunctionId(u32);

/// Handle to a registered native in the heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NativeId(u32);

impl StringId {
    pub(crate) fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// An interned, immutable string with its precomputed FNV-1a hash.
#[derive(Debug)]
pub struct ObjString {
    /// The string bytes.
    pub chars: Box<str>,
    /// 32-bit FNV-1a hash of the bytes, computed once at interning.
    pub hash: u32,
}

/// A compiled function: arity, bytecode, and an optional name.
///
/// The name is absent for the implicit top-level function, which prints
/// as `<script>`.
#[derive(Debug)]
pub struct ObjFunction {
    pub arity: u8,
    pub chunk: Chunk,
    pub name: Option<StringId>,
}

/// Signature of a native function.
///
/// Natives receive the heap (so they can allocate result strings) and the
/// argument window; errors surface as runtime errors with a stack trace.
pub type NativeFn = fn(&mut Heap, &[Value]) -> Result<Value, NativeError>;

/// An error raised by a native function.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct NativeError(pub String);

impl NativeError {
    /// Convenience constructor.
    pub fn msg(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Accepted argument counts for a native.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArityRange {
    /// Any number of arguments.
    Variadic,
    /// Inclusive bounds.
    Between(u8, u8),
}

impl ArityRange {
    /// Builds a range from the registration convention: `(-1, -1)` means
    /// variadic, anything else is inclusive bounds.
    pub fn from_bounds(min_arity: i32, max_arity: i32) -> Self {
        if min_arity < 0 || max_arity < 0 {
            ArityRange::Variadic
        } else {
            ArityRange::Between(min_arity as u8, max_arity as u8)
        }
    }

    /// Returns true if `argc` arguments are acceptable.
    pub fn accepts(self, argc: u8) -> bool {
        match self {
            ArityRange::Variadic => true,
            ArityRange::Between(min, max) => argc >= min && argc <= max,
        }
    }
}

/// A host function callable from Loam code.
pub struct ObjNative {
    pub name: StringId,
    pub function: NativeFn,
    pub arity: ArityRange,
}

impl fmt::Debug for ObjNative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjNative")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// The object arena.
///
/// Owns every string, function, and native created during a VM's
/// lifetime, plus the string-intern table. Nothing is freed until the
/// heap is dropped.
///
/// # Example
///
/// ```
/// use loam_core::Heap;
///
/// let mut heap = Heap::new();
/// let a = heap.copy_string("foo");
/// let b = heap.copy_string("foo");
/// assert_eq!(a, b); // interning: one handle per distinct string
/// ```
#[derive(Debug, Default)]
pub struct Heap {
    strings: Vec<ObjString>,
    functions: Vec<ObjFunction>,
    natives: Vec<ObjNative>,
    interned: Table,
}

impl Heap {
    /// Creates an empty heap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a string, copying the bytes only when it is new.
    pub fn copy_string(&mut self, chars: &str) -> StringId {
        let hash = hash_string(chars);
        if let Some(id) = self.interned.find_string(&self.strings, chars, hash) {
            return id;
        }
        self.intern(chars.into(), hash)
    }

    /// Interns a string, taking ownership of an already-built buffer.
    ///
    /// Used by concatenation: when an equal string is already interned the
    /// new buffer is released and the existing handle returned.
    pub fn take_string(&mut self, chars: String) -> StringId {
        let hash = hash_string(&chars);
        if let Some(id) = self.interned.find_string(&self.strings, &chars, hash) {
            return id;
        }
        self.intern(chars.into_boxed_str(), hash)
    }

    fn intern(&mut self, chars: Box<str>, hash: u32) -> StringId {
        let id = StringId(self.strings.len() as u32);
        self.strings.push(ObjString { chars, hash });
        // Membership in the intern table is a set: the value is unused.
        self.interned.set(&self.strings, id, Value::Null);
        id
    }

    /// Adds a compiled function to the arena.
    pub fn add_function(&mut self, function: ObjFunction) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(function);
        id
    }

    /// Adds a native to the arena.
    pub fn add_native(&mut self, native: ObjNative) -> NativeId {
        let id = NativeId(self.natives.len() as u32);
        self.natives.push(native);
        id
    }

    /// Resolves a string handle.
    pub fn string(&self, id: StringId) -> &ObjString {
        &self.strings[id.index()]
    }

    /// Resolves a function handle.
    pub fn function(&self, id: FunctionId) -> &ObjFunction {
        &self.functions[id.0 as usize]
    }

    /// Resolves a native handle.
    pub fn native(&self, id: NativeId) -> &ObjNative {
        &self.natives[id.0 as usize]
    }

    /// The string arena, in the form the [`Table`] operations take.
    pub fn strings(&self) -> &[ObjString] {
        &self.strings
    }

    /// The intern table (a set of every live string).
    pub fn interned(&self) -> &Table {
        &self.interned
    }

    /// The printable name of a function: its declared name, or
    /// `"script"` for the implicit top-level function.
    pub fn function_name(&self, id: FunctionId) -> &str {
        match self.function(id).name {
            Some(name) => &self.string(name).chars,
            None => "script",
        }
    }

    /// Renders a value the way `print` does.
    ///
    /// # Example
    ///
    /// ```
    /// use loam_core::{Heap, Value};
    ///
    /// let heap = Heap::new();
    /// assert_eq!(heap.format_value(Value::Null), "null");
    /// assert_eq!(heap.format_value(Value::Number(5.0)), "5");
    /// assert_eq!(heap.format_value(Value::Number(2.5)), "2.5");
    /// ```
    pub fn format_value(&self, value: Value) -> String {
        match value {
            Value::Null => "null".to_string(),
            Value::Bool(b) => if b { "true" } else { "false" }.to_string(),
            Value::Number(n) => format!("{n}"),
            Value::Obj(Obj::String(id)) => self.string(id).chars.to_string(),
            Value::Obj(Obj::Function(id)) => match self.function(id).name {
                Some(name) => format!("<fn {}>", self.string(name).chars),
                None => "<script>".to_string(),
            },
            Value::Obj(Obj::Native(id)) => {
                format!("<native fn {}>", self.string(self.native(id).name).chars)
            }
        }
    }
}

/// 32-bit FNV-1a.
pub fn hash_string(chars: &str) -> u32 {
    let mut hash: u32 = 2_166_136_261;
    for byte in chars.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(16_777_619);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_string_interns() {
        let mut heap = Heap::new();
        let a = heap.copy_string("value");
        let b = heap.copy_string("value");
        let c = heap.copy_string("other");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(&*heap.string(a).chars, "value");
    }

    #[test]
    fn test_take_string_reuses_interned() {
        let mut heap = Heap::new();
        let a = heap.copy_string("joined");
        let b = heap.take_string(String::from("joined"));
        assert_eq!(a, b);
        // Only one string object exists.
        assert_eq!(heap.strings().len(), 1);
    }

    #[test]
    fn test_take_string_new_buffer() {
        let mut heap = Heap::new();
        let id = heap.take_string(String::from("fresh"));
        assert_eq!(&*heap.string(id).chars, "fresh");
    }

    #[test]
    fn test_hash_is_fnv1a() {
        // Reference values for the 32-bit FNV-1a parameters.
        assert_eq!(hash_string(""), 2_166_136_261);
        assert_eq!(hash_string("a"), 0xe40c_292c);
    }

    #[test]
    fn test_function_name() {
        let mut heap = Heap::new();
        let script = heap.add_function(ObjFunction {
            arity: 0,
            chunk: Chunk::new(),
            name: None,
        });
        assert_eq!(heap.function_name(script), "script");

        let name = heap.copy_string("area");
        let named = heap.add_function(ObjFunction {
            arity: 2,
            chunk: Chunk::new(),
            name: Some(name),
        });
        assert_eq!(heap.function_name(named), "area");
        assert_eq!(heap.format_value(Value::Obj(Obj::Function(named))), "<fn area>");
    }

    #[test]
    fn test_format_scalars() {
        let heap = Heap::new();
        assert_eq!(heap.format_value(Value::Bool(true)), "true");
        assert_eq!(heap.format_value(Value::Bool(false)), "false");
        assert_eq!(heap.format_value(Value::Number(1.5)), "1.5");
        assert_eq!(heap.format_value(Value::Number(-3.0)), "-3");
    }

    #[test]
    fn test_arity_range() {
        assert!(ArityRange::from_bounds(-1, -1).accepts(0));
        assert!(ArityRange::from_bounds(-1, -1).accepts(200));
        let bounded = ArityRange::from_bounds(0, 1);
        assert!(bounded.accepts(0));
        assert!(bounded.accepts(1));
        assert!(!bounded.accepts(2));
        assert_eq!(bounded, ArityRange::Between(0, 1));
    }
}
