//! The virtual machine: stack, call frames, and the dispatch loop.

use loam_compiler::compile;
use loam_core::{
    disassemble_instruction, hash_string, ArityRange, FunctionId, Heap, NativeFn, NativeId, Obj,
    ObjNative, OpCode, StringId, Table, Value, UINT8_COUNT,
};

use crate::error::{InterpretError, RuntimeError};

/// Maximum depth of the call-frame array.
pub const FRAMES_MAX: usize = 64;

/// Value-stack capacity: one full local window per possible frame.
pub const STACK_MAX: usize = FRAMES_MAX * UINT8_COUNT;

const FRAME_STACK: &str = "frame stack is never empty while running";
const VALUE_STACK: &str = "value stack underflow";

/// One activation record: the running function, its instruction cursor,
/// and the base of its stack window. `stack[slots]` holds the callee
/// itself and is reserved.
struct CallFrame {
    function: FunctionId,
    ip: usize,
    slots: usize,
}

/// Debug toggles, both defaulting to on in a debug build.
///
/// `print_code` disassembles each compiled chunk; `trace_execution`
/// prints the stack and the decoded instruction before every dispatch.
#[derive(Clone, Copy, Debug)]
pub struct DebugOptions {
    pub print_code: bool,
    pub trace_execution: bool,
}

impl Default for DebugOptions {
    fn default() -> Self {
        Self {
            print_code: cfg!(debug_assertions),
            trace_execution: cfg!(debug_assertions),
        }
    }
}

impl DebugOptions {
    /// Everything off; what `--ndebug` selects.
    pub fn quiet() -> Self {
        Self {
            print_code: false,
            trace_execution: false,
        }
    }
}

/// The Loam virtual machine.
///
/// Owns every piece of runtime state. Dropping the VM releases the whole
/// object arena at once; nothing is freed during execution.
pub struct Vm {
    heap: Heap,
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    globals: Table,
    /// Set of globals defined `const`; the value is just `true`.
    global_consts: Table,
    debug: DebugOptions,
}

impl Default for Vm {
    fn default() -> Self {
        Self::with_debug(DebugOptions::default())
    }
}

impl Vm {
    /// Creates a VM with build-appropriate debug defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a VM with explicit debug toggles.
    pub fn with_debug(debug: DebugOptions) -> Self {
        Self {
            heap: Heap::new(),
            stack: Vec::with_capacity(STACK_MAX),
            frames: Vec::with_capacity(FRAMES_MAX),
            globals: Table::new(),
            global_consts: Table::new(),
            debug,
        }
    }

    /// Compiles and runs one source unit.
    ///
    /// Globals, consts, and interned strings persist across calls, which
    /// is what makes the REPL work.
    pub fn interpret(&mut self, source: &str) -> Result<(), InterpretError> {
        let script = compile(source, &mut self.heap, self.debug.print_code)?;

        self.stack.push(Value::Obj(Obj::Function(script)));
        self.call_function(script, 0)?;
        self.run()
    }

    /// Registers a native under `name` as a global binding.
    ///
    /// Arity bounds follow the registration convention: `(-1, -1)` is
    /// variadic, anything else is an inclusive range.
    pub fn register_native(
        &mut self,
        name: &str,
        function: NativeFn,
        min_arity: i32,
        max_arity: i32,
    ) {
        let name_id = self.heap.copy_string(name);
        let native = self.heap.add_native(ObjNative {
            name: name_id,
            function,
            arity: ArityRange::from_bounds(min_arity, max_arity),
        });
        self.globals
            .set(self.heap.strings(), name_id, Value::Obj(Obj::Native(native)));
    }

    /// Looks up a global by name. Embedding/test convenience.
    pub fn get_global(&self, name: &str) -> Option<Value> {
        let id = self
            .heap
            .interned()
            .find_string(self.heap.strings(), name, hash_string(name))?;
        self.globals.get(self.heap.strings(), id)
    }

    /// Current value-stack depth; zero between programs.
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// The VM's heap, for rendering values obtained from
    /// [`Vm::get_global`].
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    // -------------------------------------------------------------------------
    // Dispatch loop
    // -------------------------------------------------------------------------

    fn run(&mut self) -> Result<(), InterpretError> {
        if self.debug.trace_execution {
            println!("== virtual machine ==");
            self.dump_constant_table();
        }

        loop {
            if self.debug.trace_execution {
                self.dump_stack();
                let frame = self.frame();
                disassemble_instruction(
                    &self.heap,
                    &self.heap.function(frame.function).chunk,
                    frame.ip,
                );
            }

            let byte = self.read_byte();
            let Some(op) = OpCode::from_byte(byte) else {
                // A corrupt instruction stream is a bug in the emitter,
                // not a user error.
                panic!("Unknown opcode {byte}");
            };

            match op {
                OpCode::Constant => {
                    let constant = self.read_constant(false);
                    self.push(constant);
                }
                OpCode::ConstantLong => {
                    let constant = self.read_constant(true);
                    self.push(constant);
                }
                OpCode::Null => self.push(Value::Null),
                OpCode::True => self.push(Value::Bool(true)),
                OpCode::False => self.push(Value::Bool(false)),
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::Dup => {
                    let top = self.peek(0);
                    self.push(top);
                }
                OpCode::GetLocal => {
                    let slot = self.read_byte() as usize;
                    let value = self.stack[self.frame().slots + slot];
                    self.push(value);
                }
                OpCode::SetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frame().slots;
                    // Assignment is an expression; the value stays put.
                    let value = self.peek(0);
                    self.stack[base + slot] = value;
                }
                OpCode::GetGlobal => self.get_global_op(false)?,
                OpCode::GetGlobalLong => self.get_global_op(true)?,
                OpCode::DefineGlobal => self.define_global_op(false, false),
                OpCode::DefineGlobalConst => self.define_global_op(false, true),
                OpCode::DefineGlobalLong => self.define_global_op(true, false),
                OpCode::DefineGlobalLongConst => self.define_global_op(true, true),
                OpCode::SetGlobal => self.set_global_op(false)?,
                OpCode::SetGlobalLong => self.set_global_op(true)?,
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b));
                }
                OpCode::Greater => self.binary_number_op(|a, b| Value::Bool(a > b))?,
                OpCode::Less => self.binary_number_op(|a, b| Value::Bool(a < b))?,
                OpCode::Add => self.add_op()?,
                OpCode::Subtract => self.binary_number_op(|a, b| Value::Number(a - b))?,
                OpCode::Multiply => self.binary_number_op(|a, b| Value::Number(a * b))?,
                OpCode::Divide => self.binary_number_op(|a, b| Value::Number(a / b))?,
                OpCode::Not => {
                    let value = self.pop();
                    self.push(Value::Bool(value.is_falsey()));
                }
                OpCode::Negate => {
                    let Some(n) = self.peek(0).as_number() else {
                        return Err(self.runtime_error("Operand must be a number".to_string()));
                    };
                    self.pop();
                    self.push(Value::Number(-n));
                }
                OpCode::Print => {
                    let value = self.pop();
                    println!("{}", self.heap.format_value(value));
                }
                OpCode::Jump => {
                    let offset = self.read_short() as usize;
                    self.frame_mut().ip += offset;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_short() as usize;
                    if self.peek(0).is_falsey() {
                        self.frame_mut().ip += offset;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_short() as usize;
                    self.frame_mut().ip -= offset;
                }
                OpCode::Call => {
                    let argc = self.read_byte();
                    let callee = self.peek(argc as usize);
                    self.call_value(callee, argc)?;
                }
                OpCode::Return => {
                    let result = self.pop();
                    let finished = self.frames.pop().expect(FRAME_STACK);
                    if self.frames.is_empty() {
                        // Pop the implicit top-level function and halt.
                        self.pop();
                        return Ok(());
                    }
                    self.stack.truncate(finished.slots);
                    self.push(result);
                }
                OpCode::Debug => self.dump_debug_state(),
            }
        }
    }

    // -------------------------------------------------------------------------
    // Instruction-stream readers
    // -------------------------------------------------------------------------

    fn read_byte(&mut self) -> u8 {
        let frame = self.frames.last_mut().expect(FRAME_STACK);
        let byte = self.heap.function(frame.function).chunk.code()[frame.ip];
        frame.ip += 1;
        byte
    }

    fn read_short(&mut self) -> u16 {
        let hi = self.read_byte();
        let lo = self.read_byte();
        u16::from_be_bytes([hi, lo])
    }

    fn read_index(&mut self, long: bool) -> usize {
        if long {
            let bytes = [self.read_byte(), self.read_byte(), self.read_byte()];
            loam_core::decode_u24(bytes)
        } else {
            self.read_byte() as usize
        }
    }

    fn read_constant(&mut self, long: bool) -> Value {
        let index = self.read_index(long);
        let frame = self.frames.last().expect(FRAME_STACK);
        self.heap.function(frame.function).chunk.constants()[index]
    }

    fn read_string(&mut self, long: bool) -> StringId {
        self.read_constant(long)
            .as_string()
            .expect("variable instructions carry string constants")
    }

    // -------------------------------------------------------------------------
    // Stack primitives
    // -------------------------------------------------------------------------

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect(VALUE_STACK)
    }

    fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    fn frame(&self) -> &CallFrame {
        self.frames.last().expect(FRAME_STACK)
    }

    fn frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect(FRAME_STACK)
    }

    // -------------------------------------------------------------------------
    // Globals
    // -------------------------------------------------------------------------

    fn get_global_op(&mut self, long: bool) -> Result<(), InterpretError> {
        let name = self.read_string(long);
        match self.globals.get(self.heap.strings(), name) {
            Some(value) => {
                self.push(value);
                Ok(())
            }
            None => {
                let message = format!("Undefined variable '{}'.", self.heap.string(name).chars);
                Err(self.runtime_error(message))
            }
        }
    }

    fn define_global_op(&mut self, long: bool, is_const: bool) {
        let name = self.read_string(long);
        let value = self.peek(0);
        self.globals.set(self.heap.strings(), name, value);
        if is_const {
            self.global_consts
                .set(self.heap.strings(), name, Value::Bool(true));
        }
        self.pop();
    }

    fn set_global_op(&mut self, long: bool) -> Result<(), InterpretError> {
        let name = self.read_string(long);

        if self
            .global_consts
            .get(self.heap.strings(), name)
            .is_some()
        {
            let message = "Cannot reassign to a global variable marked 'const'.".to_string();
            return Err(self.runtime_error(message));
        }

        let value = self.peek(0);
        if self.globals.set(self.heap.strings(), name, value) {
            // Assignment must not create bindings: roll the insert back
            // so the table is untouched on the error path.
            self.globals.delete(self.heap.strings(), name);
            let message = format!("Undefined variable '{}'.", self.heap.string(name).chars);
            return Err(self.runtime_error(message));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Arithmetic
    // -------------------------------------------------------------------------

    fn binary_number_op(&mut self, op: fn(f64, f64) -> Value) -> Result<(), InterpretError> {
        let (Some(b), Some(a)) = (self.peek(0).as_number(), self.peek(1).as_number()) else {
            return Err(self.runtime_error("Operands must be numbers.".to_string()));
        };
        self.pop();
        self.pop();
        self.push(op(a, b));
        Ok(())
    }

    /// ADD is overloaded: numeric addition, or concatenation when both
    /// operands are strings.
    fn add_op(&mut self) -> Result<(), InterpretError> {
        if self.peek(0).is_string() && self.peek(1).is_string() {
            self.concatenate_strings();
            return Ok(());
        }
        if self.peek(0).as_number().is_some() && self.peek(1).as_number().is_some() {
            return self.binary_number_op(|a, b| Value::Number(a + b));
        }
        Err(self.runtime_error(
            "Operands must be two numbers or two strings.".to_string(),
        ))
    }

    fn concatenate_strings(&mut self) {
        let b = self.pop().as_string().expect("checked string operand");
        let a = self.pop().as_string().expect("checked string operand");

        let mut joined =
            String::with_capacity(self.heap.string(a).chars.len() + self.heap.string(b).chars.len());
        joined.push_str(&self.heap.string(a).chars);
        joined.push_str(&self.heap.string(b).chars);

        // Take path: the buffer is dropped if an equal string is already
        // interned.
        let id = self.heap.take_string(joined);
        self.push(Value::Obj(Obj::String(id)));
    }

    // -------------------------------------------------------------------------
    // Calls
    // -------------------------------------------------------------------------

    fn call_value(&mut self, callee: Value, argc: u8) -> Result<(), InterpretError> {
        match callee {
            Value::Obj(Obj::Function(function)) => self.call_function(function, argc),
            Value::Obj(Obj::Native(native)) => self.call_native(native, argc),
            _ => Err(self.runtime_error("Can only call functions and classes.".to_string())),
        }
    }

    fn call_function(&mut self, function: FunctionId, argc: u8) -> Result<(), InterpretError> {
        let arity = self.heap.function(function).arity;
        if argc != arity {
            let message = format!("Expected {arity} arguments but got {argc}.");
            return Err(self.runtime_error(message));
        }
        if self.frames.len() == FRAMES_MAX {
            return Err(self.runtime_error("Stack overflow.".to_string()));
        }

        self.frames.push(CallFrame {
            function,
            ip: 0,
            slots: self.stack.len() - argc as usize - 1,
        });
        Ok(())
    }

    /// Natives run synchronously on the VM thread and never get a frame;
    /// their result replaces the callee and argument window.
    fn call_native(&mut self, native: NativeId, argc: u8) -> Result<(), InterpretError> {
        let ObjNative {
            function, arity, ..
        } = *self.heap.native(native);

        if !arity.accepts(argc) {
            let message = match arity {
                ArityRange::Between(min, max) if min == max => {
                    format!("Expected {min} arguments but got {argc}.")
                }
                ArityRange::Between(min, max) => {
                    format!("Expected between {min} and {max} arguments but got {argc}.")
                }
                ArityRange::Variadic => unreachable!("variadic natives accept any arity"),
            };
            return Err(self.runtime_error(message));
        }

        let first_arg = self.stack.len() - argc as usize;
        let result = function(&mut self.heap, &self.stack[first_arg..]);
        match result {
            Ok(value) => {
                self.stack.truncate(first_arg - 1);
                self.push(value);
                Ok(())
            }
            Err(native_error) => Err(self.runtime_error(native_error.0)),
        }
    }

    // -------------------------------------------------------------------------
    // Error reporting and debug dumps
    // -------------------------------------------------------------------------

    /// Prints the message and a stack trace innermost-frame-first, resets
    /// the stack, and produces the error value for the caller.
    fn runtime_error(&mut self, message: String) -> InterpretError {
        eprintln!("{message}");

        for frame in self.frames.iter().rev() {
            let function = self.heap.function(frame.function);
            // ip already advanced past the faulting instruction.
            let line = function.chunk.get_line(frame.ip.saturating_sub(1));
            match function.name {
                Some(name) => {
                    eprintln!("[line {line}] in {}()", self.heap.string(name).chars);
                }
                None => eprintln!("[line {line}] in script"),
            }
        }

        self.reset_stack();
        InterpretError::Runtime(RuntimeError { message })
    }

    fn reset_stack(&mut self) {
        self.stack.clear();
        self.frames.clear();
    }

    /// The `debug;` statement: dump VM state and keep executing.
    fn dump_debug_state(&self) {
        println!("===== DEBUG =====");
        self.dump_constant_table();
        self.dump_stack();
        self.dump_globals();
        self.dump_interned_strings();
        println!("===== END DEBUG =====");
    }

    fn dump_constant_table(&self) {
        let frame = self.frame();
        let constants = self.heap.function(frame.function).chunk.constants();
        let rendered: Vec<String> = constants
            .iter()
            .map(|&value| self.heap.format_value(value))
            .collect();
        println!("constant table: [{}]", rendered.join(", "));
    }

    fn dump_stack(&self) {
        print!("stack: ");
        for &value in &self.stack {
            print!("[{}]", self.heap.format_value(value));
        }
        println!();
    }

    fn dump_globals(&self) {
        let rendered: Vec<String> = self
            .globals
            .iter_entries()
            .map(|(key, value)| {
                format!(
                    "{{{}:{}}}",
                    self.heap.string(key).chars,
                    self.heap.format_value(value)
                )
            })
            .collect();
        println!("global variables: [{}]", rendered.join(", "));
    }

    fn dump_interned_strings(&self) {
        let rendered: Vec<String> = self
            .heap
            .interned()
            .iter_entries()
            .map(|(key, _)| format!("'{}'", self.heap.string(key).chars))
            .collect();
        println!("interned strings: [{}]", rendered.join(", "));
    }
}
