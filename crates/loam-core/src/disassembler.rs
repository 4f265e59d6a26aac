//! Human-readable chunk dumps for debug tracing.
//!
//! One line per instruction:
//!
//! ```text
//! 000000      1 OP_CONSTANT           0 '1.5'
//! 000002      | OP_NEGATE
//! ```
//!
//! The offset is six decimal digits; the line column shows `     |` when
//! the instruction continues the previous instruction's source line.

use crate::chunk::{decode_u24, Chunk, OpCode};
use crate::object::Heap;

/// Disassembles a whole chunk under a header.
pub fn disassemble_chunk(heap: &Heap, chunk: &Chunk, name: &str) {
    println!("== {name} ==");

    let mut offset = 0;
    while offset < chunk.len() {
        offset = disassemble_instruction(heap, chunk, offset);
    }
}

/// Disassembles the instruction at `offset`, returning the offset of the
/// next instruction.
pub fn disassemble_instruction(heap: &Heap, chunk: &Chunk, offset: usize) -> usize {
    print!("{offset:06} ");

    let line = chunk.get_line(offset);
    if offset > 0 && line == chunk.get_line(offset - 1) {
        print!("     | ");
    } else {
        print!("{line:6} ");
    }

    let byte = chunk.code()[offset];
    let Some(op) = OpCode::from_byte(byte) else {
        println!("Unknown opcode {byte}");
        return offset + 1;
    };

    match op {
        OpCode::Constant => constant_instruction("OP_CONSTANT", heap, chunk, offset, false),
        OpCode::ConstantLong => constant_instruction("OP_CONSTANT_LONG", heap, chunk, offset, true),
        OpCode::Null => simple_instruction("OP_NULL", offset),
        OpCode::True => simple_instruction("OP_TRUE", offset),
        OpCode::False => simple_instruction("OP_FALSE", offset),
        OpCode::Pop => simple_instruction("OP_POP", offset),
        OpCode::Dup => simple_instruction("OP_DUP", offset),
        OpCode::GetLocal => byte_instruction("OP_GET_LOCAL", chunk, offset),
        OpCode::SetLocal => byte_instruction("OP_SET_LOCAL", chunk, offset),
        OpCode::GetGlobal => constant_instruction("OP_GET_GLOBAL", heap, chunk, offset, false),
        OpCode::GetGlobalLong => {
            constant_instruction("OP_GET_GLOBAL_LONG", heap, chunk, offset, true)
        }
        OpCode::DefineGlobal => {
            constant_instruction("OP_DEFINE_GLOBAL", heap, chunk, offset, false)
        }
        OpCode::DefineGlobalConst => {
            constant_instruction("OP_DEFINE_GLOBAL_CONST", heap, chunk, offset, false)
        }
        OpCode::DefineGlobalLong => {
            constant_instruction("OP_DEFINE_GLOBAL_LONG", heap, chunk, offset, true)
        }
        OpCode::DefineGlobalLongConst => {
            constant_instruction("OP_DEFINE_GLOBAL_LONG_CONST", heap, chunk, offset, true)
        }
        OpCode::SetGlobal => constant_instruction("OP_SET_GLOBAL", heap, chunk, offset, false),
        OpCode::SetGlobalLong => {
            constant_instruction("OP_SET_GLOBAL_LONG", heap, chunk, offset, true)
        }
        OpCode::Equal => simple_instruction("OP_EQUAL", offset),
        OpCode::Greater => simple_instruction("OP_GREATER", offset),
        OpCode::Less => simple_instruction("OP_LESS", offset),
        OpCode::Add => simple_instruction("OP_ADD", offset),
        OpCode::Subtract => simple_instruction("OP_SUBTRACT", offset),
        OpCode::Multiply => simple_instruction("OP_MULTIPLY", offset),
        OpCode::Divide => simple_instruction("OP_DIVIDE", offset),
        OpCode::Not => simple_instruction("OP_NOT", offset),
        OpCode::Negate => simple_instruction("OP_NEGATE", offset),
        OpCode::Print => simple_instruction("OP_PRINT", offset),
        OpCode::Jump => jump_instruction("OP_JUMP", 1, chunk, offset),
        OpCode::JumpIfFalse => jump_instruction("OP_JUMP_IF_FALSE", 1, chunk, offset),
        OpCode::Loop => jump_instruction("OP_LOOP", -1, chunk, offset),
        OpCode::Call => byte_instruction("OP_CALL", chunk, offset),
        OpCode::Return => simple_instruction("OP_RETURN", offset),
        OpCode::Debug => simple_instruction("OP_DEBUG", offset),
    }
}

fn simple_instruction(name: &str, offset: usize) -> usize {
    println!("{name}");
    offset + 1
}

fn constant_instruction(
    name: &str,
    heap: &Heap,
    chunk: &Chunk,
    offset: usize,
    is_long: bool,
) -> usize {
    let code = chunk.code();
    let index = if is_long {
        decode_u24([code[offset + 1], code[offset + 2], code[offset + 3]])
    } else {
        code[offset + 1] as usize
    };
    let rendered = heap.format_value(chunk.constants()[index]);
    println!("{name:<16} {index:6} '{rendered}'");
    if is_long {
        offset + 4
    } else {
        offset + 2
    }
}

fn byte_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let operand = chunk.code()[offset + 1];
    println!("{name:<16} {operand:6}");
    offset + 2
}

fn jump_instruction(name: &str, sign: i64, chunk: &Chunk, offset: usize) -> usize {
    let code = chunk.code();
    let jump = u16::from_be_bytes([code[offset + 1], code[offset + 2]]) as i64;
    let target = offset as i64 + 3 + sign * jump;
    println!("{name:<16} {offset:6} -> {target}");
    offset + 3
}
