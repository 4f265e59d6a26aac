//! The parser/emitter.
//!
//! # Structure
//!
//! `Parser` owns the token stream, the diagnostic handler, and a stack of
//! `FunctionCompiler`s, one per function currently being compiled (the
//! bottom entry is the implicit top-level script). Expression parsing is
//! table-driven: every token kind maps to a [`ParseRule`] carrying an
//! optional prefix action, an optional infix action, and a precedence.
//! The actions are a closed enum rather than function pointers, so
//! dispatch is a `match`.
//!
//! # Precedence (lowest to highest)
//!
//! ```text
//! NONE < ASSIGNMENT < OR < AND < EQUALITY < COMPARISON
//!      < TERM < FACTOR < UNARY < CALL < PRIMARY
//! ```
//!
//! # Error handling
//!
//! The first error in a statement flips the parser into panic mode,
//! which suppresses further reports until `synchronize` skips to the
//! next statement boundary. Compilation always runs to end of input so
//! one pass reports as many distinct errors as possible.

use loam_core::{
    disassemble_chunk, encode_u24, Chunk, FunctionId, Heap, Obj, ObjFunction, OpCode, StringId,
    Value, MAX_CONSTANT_INDEX, UINT8_COUNT,
};
use loam_lex::{Lexer, Token, TokenKind};
use loam_util::{FxHashMap, FxHashSet, Handler, TokenLocation};
use thiserror::Error;

const COMPILER_STACK: &str = "compiler stack is never empty while parsing";

/// Upper bound on `case` arms in one `switch`.
const MAX_SWITCH_CASES: usize = 255;

/// Compilation failed; diagnostics were already printed to stderr.
#[derive(Debug, Error)]
#[error("compilation failed with {errors} error(s)")]
pub struct CompileError {
    /// How many errors were reported.
    pub errors: usize,
}

/// Compiles source text into the implicit top-level function.
///
/// `dump_code` disassembles each function's chunk to stdout as it
/// finishes, matching the VM's `print_code` debug toggle.
pub fn compile(
    source: &str,
    heap: &mut Heap,
    dump_code: bool,
) -> Result<FunctionId, CompileError> {
    let mut parser = Parser::new(source, heap, dump_code);

    parser.advance();
    while !parser.match_token(TokenKind::Eof) {
        parser.declaration();
    }

    parser.finish()
}

// =============================================================================
// PARSE RULES
// =============================================================================

/// Operator precedence levels, ordered weakest-binding first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    Assignment,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    /// The next-tighter level; used for left-associative binary
    /// operators, whose right operand parses one level up.
    fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call | Precedence::Primary => Precedence::Primary,
        }
    }
}

/// The closed set of parse actions a rule can invoke.
#[derive(Clone, Copy, Debug)]
enum ParseFn {
    Grouping,
    Unary,
    Binary,
    Number,
    String,
    Literal,
    Variable,
    And,
    Or,
    Call,
}

/// One row of the parse table.
struct ParseRule {
    prefix: Option<ParseFn>,
    infix: Option<ParseFn>,
    precedence: Precedence,
}

impl ParseRule {
    const fn new(
        prefix: Option<ParseFn>,
        infix: Option<ParseFn>,
        precedence: Precedence,
    ) -> ParseRule {
        ParseRule {
            prefix,
            infix,
            precedence,
        }
    }
}

/// The parse table, indexed by token kind.
fn rule_for(kind: TokenKind) -> ParseRule {
    use ParseFn as F;
    use Precedence as P;
    use TokenKind as T;

    match kind {
        T::LeftParen => ParseRule::new(Some(F::Grouping), Some(F::Call), P::Call),
        T::Minus => ParseRule::new(Some(F::Unary), Some(F::Binary), P::Term),
        T::Plus => ParseRule::new(None, Some(F::Binary), P::Term),
        T::Slash | T::Star => ParseRule::new(None, Some(F::Binary), P::Factor),
        T::Bang => ParseRule::new(Some(F::Unary), None, P::None),
        T::BangEqual | T::EqualEqual => ParseRule::new(None, Some(F::Binary), P::Equality),
        T::Greater | T::GreaterEqual | T::Less | T::LessEqual => {
            ParseRule::new(None, Some(F::Binary), P::Comparison)
        }
        T::Identifier => ParseRule::new(Some(F::Variable), None, P::None),
        T::String => ParseRule::new(Some(F::String), None, P::None),
        T::Number => ParseRule::new(Some(F::Number), None, P::None),
        T::And => ParseRule::new(None, Some(F::And), P::And),
        T::Or => ParseRule::new(None, Some(F::Or), P::Or),
        T::True | T::False | T::Null => ParseRule::new(Some(F::Literal), None, P::None),
        _ => ParseRule::new(None, None, P::None),
    }
}

// =============================================================================
// FUNCTION COMPILER STATE
// =============================================================================

/// What kind of function the current compiler is producing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FunctionType {
    /// A `func` declaration.
    Function,
    /// The implicit top-level function.
    Script,
}

/// A local variable slot.
///
/// `depth == -1` marks a declared-but-uninitialized local; reading one in
/// its own initializer is a compile error.
struct Local<'src> {
    name: &'src str,
    depth: i32,
    is_const: bool,
}

/// Per-function compilation state.
///
/// Slot 0 of every frame holds the callee itself, so the locals array is
/// seeded with a reserved, unnameable entry.
struct FunctionCompiler<'src> {
    function_type: FunctionType,
    chunk: Chunk,
    arity: u8,
    name: Option<StringId>,
    locals: Vec<Local<'src>>,
    scope_depth: i32,
    /// Identifier string -> constant-pool index, so repeated references
    /// to one global reuse a single constant.
    ident_cache: FxHashMap<StringId, usize>,
}

impl<'src> FunctionCompiler<'src> {
    fn new(function_type: FunctionType, name: Option<StringId>) -> Self {
        Self {
            function_type,
            chunk: Chunk::new(),
            arity: 0,
            name,
            locals: vec![Local {
                name: "",
                depth: 0,
                is_const: false,
            }],
            scope_depth: 0,
            ident_cache: FxHashMap::default(),
        }
    }
}

// =============================================================================
// PARSER
// =============================================================================

/// The single-pass parser/emitter.
struct Parser<'src, 'h> {
    lexer: Lexer<'src>,
    current: Token<'src>,
    previous: Token<'src>,
    handler: Handler,
    panic_mode: bool,
    heap: &'h mut Heap,
    compilers: Vec<FunctionCompiler<'src>>,
    /// Globals declared `const` in this compilation unit; assignment to
    /// them is rejected at compile time. Consts from earlier REPL lines
    /// are enforced by the VM's own const table instead.
    const_globals: FxHashSet<StringId>,
    dump_code: bool,
}

impl<'src, 'h> Parser<'src, 'h> {
    fn new(source: &'src str, heap: &'h mut Heap, dump_code: bool) -> Self {
        Self {
            lexer: Lexer::new(source),
            current: Token::placeholder(),
            previous: Token::placeholder(),
            handler: Handler::new(),
            panic_mode: false,
            heap,
            compilers: vec![FunctionCompiler::new(FunctionType::Script, None)],
            const_globals: FxHashSet::default(),
            dump_code,
        }
    }

    /// Ends the script compiler and reports the overall result.
    fn finish(mut self) -> Result<FunctionId, CompileError> {
        let script = self.end_compiler();
        if self.handler.has_errors() {
            Err(CompileError {
                errors: self.handler.error_count(),
            })
        } else {
            Ok(script)
        }
    }

    // -------------------------------------------------------------------------
    // Token plumbing
    // -------------------------------------------------------------------------

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.lexer.scan_token();
            let TokenKind::Error(message) = self.current.kind else {
                break;
            };
            self.error_at_current(message);
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
        } else {
            self.error_at_current(message);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    // -------------------------------------------------------------------------
    // Error reporting and recovery
    // -------------------------------------------------------------------------

    fn error(&mut self, message: &str) {
        self.error_at(self.previous, message);
    }

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current, message);
    }

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;

        let location = match token.kind {
            TokenKind::Eof => TokenLocation::End,
            TokenKind::Error(_) => TokenLocation::None,
            _ => TokenLocation::Lexeme(token.lexeme.to_string()),
        };
        self.handler.report(token.line, location, message);
    }

    /// Skips tokens until the next statement boundary, then leaves panic
    /// mode.
    fn synchronize(&mut self) {
        self.panic_mode = false;

        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Func
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => self.advance(),
            }
        }
    }

    // -------------------------------------------------------------------------
    // Compiler-stack helpers and bytecode emission
    // -------------------------------------------------------------------------

    fn compiler(&self) -> &FunctionCompiler<'src> {
        self.compilers.last().expect(COMPILER_STACK)
    }

    fn compiler_mut(&mut self) -> &mut FunctionCompiler<'src> {
        self.compilers.last_mut().expect(COMPILER_STACK)
    }

    fn current_chunk(&mut self) -> &mut Chunk {
        &mut self.compiler_mut().chunk
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.current_chunk().write(byte, line);
    }

    fn emit_op(&mut self, op: OpCode) {
        self.emit_byte(op as u8);
    }

    fn emit_ops(&mut self, first: OpCode, second: OpCode) {
        self.emit_op(first);
        self.emit_op(second);
    }

    /// Implicit function epilogue: every function returns `null` if it
    /// falls off the end.
    fn emit_return(&mut self) {
        self.emit_ops(OpCode::Null, OpCode::Return);
    }

    /// Adds a constant to the current chunk, reporting overflow of the
    /// 24-bit index space.
    fn make_constant(&mut self, value: Value) -> usize {
        let index = self.current_chunk().add_constant(value);
        if index > MAX_CONSTANT_INDEX {
            self.error("Too many constants in one chunk.");
            return 0;
        }
        index
    }

    /// Emits the short or long form of a constant-bearing instruction
    /// depending on the index width.
    fn emit_indexed_op(&mut self, short: OpCode, long: OpCode, index: usize) {
        if index <= u8::MAX as usize {
            self.emit_op(short);
            self.emit_byte(index as u8);
        } else {
            self.emit_op(long);
            for byte in encode_u24(index) {
                self.emit_byte(byte);
            }
        }
    }

    fn emit_constant(&mut self, value: Value) {
        let index = self.make_constant(value);
        self.emit_indexed_op(OpCode::Constant, OpCode::ConstantLong, index);
    }

    /// Emits a forward jump with a two-byte placeholder, returning the
    /// placeholder offset for patching.
    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_byte(0xFF);
        self.emit_byte(0xFF);
        self.current_chunk().len() - 2
    }

    /// Backpatches a forward jump to land after the most recent byte.
    fn patch_jump(&mut self, offset: usize) {
        // -2 accounts for the operand itself.
        let jump = self.current_chunk().len() - offset - 2;
        if jump > u16::MAX as usize {
            self.error("Too much code to jump over.");
        }

        let bytes = (jump as u16).to_be_bytes();
        self.current_chunk().patch(offset, bytes[0]);
        self.current_chunk().patch(offset + 1, bytes[1]);
    }

    /// Emits a backward jump to `loop_start`.
    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::Loop);

        let offset = self.current_chunk().len() - loop_start + 2;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
        }

        let bytes = (offset as u16).to_be_bytes();
        self.emit_byte(bytes[0]);
        self.emit_byte(bytes[1]);
    }

    /// Finishes the innermost function: emits the epilogue, moves the
    /// chunk into the heap, and optionally disassembles it.
    fn end_compiler(&mut self) -> FunctionId {
        self.emit_return();

        let compiler = self.compilers.pop().expect(COMPILER_STACK);
        let id = self.heap.add_function(ObjFunction {
            arity: compiler.arity,
            chunk: compiler.chunk,
            name: compiler.name,
        });

        if self.dump_code && !self.handler.has_errors() {
            let name = self.heap.function_name(id).to_string();
            disassemble_chunk(self.heap, &self.heap.function(id).chunk, &name);
        }

        id
    }

    // -------------------------------------------------------------------------
    // Expressions
    // -------------------------------------------------------------------------

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    /// The Pratt core: parse a prefix expression, then fold in infix
    /// operators while their precedence is at least `precedence`.
    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let Some(prefix) = rule_for(self.previous.kind).prefix else {
            self.error("Expected expression.");
            return;
        };

        // Assignment binds loosest; only a target parsed at assignment
        // level may consume a trailing '='.
        let can_assign = precedence <= Precedence::Assignment;
        self.apply_parse_fn(prefix, can_assign);

        while precedence <= rule_for(self.current.kind).precedence {
            self.advance();
            let Some(infix) = rule_for(self.previous.kind).infix else {
                break;
            };
            self.apply_parse_fn(infix, can_assign);
        }

        if can_assign && self.match_token(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn apply_parse_fn(&mut self, parse_fn: ParseFn, can_assign: bool) {
        match parse_fn {
            ParseFn::Grouping => self.grouping(),
            ParseFn::Unary => self.unary(),
            ParseFn::Binary => self.binary(),
            ParseFn::Number => self.number(),
            ParseFn::String => self.string(),
            ParseFn::Literal => self.literal(),
            ParseFn::Variable => self.variable(can_assign),
            ParseFn::And => self.and_operator(),
            ParseFn::Or => self.or_operator(),
            ParseFn::Call => self.call(),
        }
    }

    fn grouping(&mut self) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expected ')' after expression.");
    }

    fn number(&mut self) {
        match self.previous.lexeme.parse::<f64>() {
            Ok(value) => self.emit_constant(Value::Number(value)),
            Err(_) => self.error("Invalid number literal."),
        }
    }

    fn string(&mut self) {
        // Strip the surrounding quotes; the lexeme keeps them.
        let lexeme = self.previous.lexeme;
        let contents = &lexeme[1..lexeme.len() - 1];
        let id = self.heap.copy_string(contents);
        self.emit_constant(Value::Obj(Obj::String(id)));
    }

    fn literal(&mut self) {
        match self.previous.kind {
            TokenKind::False => self.emit_op(OpCode::False),
            TokenKind::True => self.emit_op(OpCode::True),
            TokenKind::Null => self.emit_op(OpCode::Null),
            _ => unreachable!("literal rule on non-literal token"),
        }
    }

    fn unary(&mut self) {
        let operator = self.previous.kind;
        self.parse_precedence(Precedence::Unary);

        match operator {
            TokenKind::Minus => self.emit_op(OpCode::Negate),
            TokenKind::Bang => self.emit_op(OpCode::Not),
            _ => unreachable!("unary rule on non-unary token"),
        }
    }

    fn binary(&mut self) {
        let operator = self.previous.kind;
        let rule = rule_for(operator);
        self.parse_precedence(rule.precedence.next());

        match operator {
            TokenKind::BangEqual => self.emit_ops(OpCode::Equal, OpCode::Not),
            TokenKind::EqualEqual => self.emit_op(OpCode::Equal),
            TokenKind::Greater => self.emit_op(OpCode::Greater),
            TokenKind::GreaterEqual => self.emit_ops(OpCode::Less, OpCode::Not),
            TokenKind::Less => self.emit_op(OpCode::Less),
            TokenKind::LessEqual => self.emit_ops(OpCode::Greater, OpCode::Not),
            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Subtract),
            TokenKind::Star => self.emit_op(OpCode::Multiply),
            TokenKind::Slash => self.emit_op(OpCode::Divide),
            _ => unreachable!("binary rule on non-binary token"),
        }
    }

    /// `a and b`: skip the right operand when the left is falsey, leaving
    /// the left value as the result.
    fn and_operator(&mut self) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);

        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);

        self.patch_jump(end_jump);
    }

    /// `a or b`: keep the left value when it is truthy, otherwise
    /// evaluate the right operand.
    fn or_operator(&mut self) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);

        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);

        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    fn call(&mut self) {
        let argc = self.argument_list();
        self.emit_op(OpCode::Call);
        self.emit_byte(argc);
    }

    fn argument_list(&mut self) -> u8 {
        let mut argc: u8 = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression();
                if argc == u8::MAX {
                    self.error("Can't have more than 255 arguments.");
                } else {
                    argc += 1;
                }
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expected ')' after arguments.");
        argc
    }

    fn variable(&mut self, can_assign: bool) {
        self.named_variable(self.previous, can_assign);
    }

    /// Emits the get or set for a named variable, resolving locals first
    /// and falling back to late-bound globals.
    fn named_variable(&mut self, name: Token<'src>, can_assign: bool) {
        if let Some((slot, is_const)) = self.resolve_local(name.lexeme) {
            if can_assign && self.match_token(TokenKind::Equal) {
                if is_const {
                    self.error("Cannot reassign to a variable marked 'const'.");
                }
                self.expression();
                self.emit_op(OpCode::SetLocal);
                self.emit_byte(slot);
            } else {
                self.emit_op(OpCode::GetLocal);
                self.emit_byte(slot);
            }
            return;
        }

        let name_id = self.heap.copy_string(name.lexeme);
        let index = self.identifier_constant(name_id);
        if can_assign && self.match_token(TokenKind::Equal) {
            if self.const_globals.contains(&name_id) {
                self.error("Cannot reassign to a variable marked 'const'.");
            }
            self.expression();
            self.emit_indexed_op(OpCode::SetGlobal, OpCode::SetGlobalLong, index);
        } else {
            self.emit_indexed_op(OpCode::GetGlobal, OpCode::GetGlobalLong, index);
        }
    }

    /// Finds `name` among the current function's locals, innermost
    /// first. Reports a read of an uninitialized local.
    fn resolve_local(&mut self, name: &str) -> Option<(u8, bool)> {
        let found = self
            .compiler()
            .locals
            .iter()
            .enumerate()
            .rev()
            .find(|(_, local)| local.name == name)
            .map(|(slot, local)| (slot, local.depth, local.is_const));

        let (slot, depth, is_const) = found?;
        if depth == -1 {
            self.error("Can't read local variable in its own initializer.");
        }
        Some((slot as u8, is_const))
    }

    /// Interns an identifier into the current chunk's constant pool,
    /// deduplicating through the per-function cache.
    fn identifier_constant(&mut self, name: StringId) -> usize {
        if let Some(&index) = self.compiler().ident_cache.get(&name) {
            return index;
        }
        let index = self.make_constant(Value::Obj(Obj::String(name)));
        self.compiler_mut().ident_cache.insert(name, index);
        index
    }

    // -------------------------------------------------------------------------
    // Declarations
    // -------------------------------------------------------------------------

    fn declaration(&mut self) {
        if self.match_token(TokenKind::Func) {
            self.func_declaration();
        } else if self.match_token(TokenKind::Const) {
            self.const_declaration();
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration(false);
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    fn func_declaration(&mut self) {
        let global = self.parse_variable("Expected function name.", false);
        // A function may refer to itself; the name is usable before the
        // body finishes compiling.
        self.mark_initialized();
        self.function();
        self.define_variable(global, false);
    }

    fn function(&mut self) {
        let name_id = self.heap.copy_string(self.previous.lexeme);
        self.compilers
            .push(FunctionCompiler::new(FunctionType::Function, Some(name_id)));
        self.begin_scope();

        self.consume(TokenKind::LeftParen, "Expected '(' after function name.");
        if !self.check(TokenKind::RightParen) {
            loop {
                if self.compiler().arity == u8::MAX {
                    self.error_at_current("Can't have more than 255 parameters.");
                } else {
                    self.compiler_mut().arity += 1;
                }
                let param = self.parse_variable("Expected parameter name.", false);
                self.define_variable(param, false);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expected ')' after parameters.");
        self.consume(TokenKind::LeftBrace, "Expected '{' before function body.");
        self.block();

        // No end_scope: the whole compiler (and its locals) goes away.
        let function = self.end_compiler();
        self.emit_constant(Value::Obj(Obj::Function(function)));
    }

    fn const_declaration(&mut self) {
        self.consume(TokenKind::Var, "Expected 'var' after 'const'.");
        self.var_declaration(true);
    }

    fn var_declaration(&mut self, is_const: bool) {
        let global = self.parse_variable("Expected variable name.", is_const);

        if self.match_token(TokenKind::Equal) {
            self.expression();
        } else if is_const {
            self.error("Const variables must be initialized.");
            self.emit_op(OpCode::Null);
        } else {
            self.emit_op(OpCode::Null);
        }
        self.consume(
            TokenKind::Semicolon,
            "Expected ';' after variable declaration.",
        );

        self.define_variable(global, is_const);
    }

    /// Consumes a variable name. Returns the identifier's constant index
    /// for globals, or `None` for locals (which live in stack slots, not
    /// the constant pool).
    fn parse_variable(&mut self, message: &str, is_const: bool) -> Option<usize> {
        self.consume(TokenKind::Identifier, message);

        self.declare_variable(is_const);
        if self.compiler().scope_depth > 0 {
            return None;
        }

        let name_id = self.heap.copy_string(self.previous.lexeme);
        if is_const {
            self.const_globals.insert(name_id);
        }
        Some(self.identifier_constant(name_id))
    }

    /// Registers a local in the current scope; globals are late-bound and
    /// skip this entirely.
    fn declare_variable(&mut self, is_const: bool) {
        if self.compiler().scope_depth == 0 {
            return;
        }

        let name = self.previous.lexeme;
        let scope_depth = self.compiler().scope_depth;
        let duplicate = self
            .compiler()
            .locals
            .iter()
            .rev()
            .take_while(|local| local.depth == -1 || local.depth >= scope_depth)
            .any(|local| local.name == name);
        if duplicate {
            self.error("Already a variable with this name in this scope.");
        }

        self.add_local(name, is_const);
    }

    fn add_local(&mut self, name: &'src str, is_const: bool) {
        if self.compiler().locals.len() == UINT8_COUNT {
            self.error("Too many local variables in function.");
            return;
        }
        self.compiler_mut().locals.push(Local {
            name,
            depth: -1,
            is_const,
        });
    }

    fn mark_initialized(&mut self) {
        if self.compiler().scope_depth == 0 {
            return;
        }
        let depth = self.compiler().scope_depth;
        if let Some(local) = self.compiler_mut().locals.last_mut() {
            local.depth = depth;
        }
    }

    fn define_variable(&mut self, global: Option<usize>, is_const: bool) {
        let Some(index) = global else {
            // Locals become visible (and initialized) here; their value
            // is already sitting in the right stack slot.
            self.mark_initialized();
            return;
        };

        if is_const {
            self.emit_indexed_op(
                OpCode::DefineGlobalConst,
                OpCode::DefineGlobalLongConst,
                index,
            );
        } else {
            self.emit_indexed_op(OpCode::DefineGlobal, OpCode::DefineGlobalLong, index);
        }
    }

    // -------------------------------------------------------------------------
    // Statements
    // -------------------------------------------------------------------------

    fn statement(&mut self) {
        if self.match_token(TokenKind::Print) {
            self.print_statement();
        } else if self.match_token(TokenKind::If) {
            self.if_statement();
        } else if self.match_token(TokenKind::Return) {
            self.return_statement();
        } else if self.match_token(TokenKind::While) {
            self.while_statement();
        } else if self.match_token(TokenKind::For) {
            self.for_statement();
        } else if self.match_token(TokenKind::Switch) {
            self.switch_statement();
        } else if self.match_token(TokenKind::Debug) {
            self.debug_statement();
        } else if self.match_token(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expected '}' after block.");
    }

    fn begin_scope(&mut self) {
        self.compiler_mut().scope_depth += 1;
    }

    /// Pops the scope's locals off the compiler and off the runtime
    /// stack, one POP per local.
    fn end_scope(&mut self) {
        self.compiler_mut().scope_depth -= 1;

        while self
            .compiler()
            .locals
            .last()
            .is_some_and(|local| local.depth > self.compiler().scope_depth)
        {
            self.emit_op(OpCode::Pop);
            self.compiler_mut().locals.pop();
        }
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expected ';' after value.");
        self.emit_op(OpCode::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expected ';' after expression.");
        self.emit_op(OpCode::Pop);
    }

    fn debug_statement(&mut self) {
        self.consume(TokenKind::Semicolon, "Expected ';' after 'debug'.");
        self.emit_op(OpCode::Debug);
    }

    fn return_statement(&mut self) {
        if self.compiler().function_type == FunctionType::Script {
            self.error("Can't return from top-level code.");
        }

        if self.match_token(TokenKind::Semicolon) {
            self.emit_return();
        } else {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expected ';' after return value.");
            self.emit_op(OpCode::Return);
        }
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expected '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expected ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        let else_jump = self.emit_jump(OpCode::Jump);

        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);
        if self.match_token(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.current_chunk().len();
        self.consume(TokenKind::LeftParen, "Expected '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expected ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
    }

    fn for_statement(&mut self) {
        // The initializer's variable is scoped to the loop.
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expected '(' after 'for'.");
        if self.match_token(TokenKind::Semicolon) {
            // No initializer.
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration(false);
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.current_chunk().len();
        let mut exit_jump = None;
        if !self.match_token(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expected ';' after loop condition.");

            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_op(OpCode::Pop);
        }

        if !self.match_token(TokenKind::RightParen) {
            // The increment runs after the body, so jump over it now and
            // loop back to it from the bottom.
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.current_chunk().len();
            self.expression();
            self.emit_op(OpCode::Pop);
            self.consume(TokenKind::RightParen, "Expected ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit) = exit_jump {
            self.patch_jump(exit);
            self.emit_op(OpCode::Pop);
        }
        self.end_scope();
    }

    /// `switch`: the scrutinee stays on the stack while each case DUPs
    /// and compares it; the trailing POP always removes it, whether or
    /// not a `default` arm exists.
    fn switch_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expected '(' after 'switch'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expected ')' after switch value.");
        self.consume(TokenKind::LeftBrace, "Expected '{' before switch cases.");

        let mut end_jumps = Vec::new();
        let mut case_count = 0usize;

        while self.match_token(TokenKind::Case) {
            if case_count == MAX_SWITCH_CASES {
                self.error("Too many cases in switch statement.");
            }
            case_count += 1;

            self.emit_op(OpCode::Dup);
            self.expression();
            self.consume(TokenKind::Colon, "Expected ':' after case value.");
            self.emit_op(OpCode::Equal);

            let next_case = self.emit_jump(OpCode::JumpIfFalse);
            self.emit_op(OpCode::Pop);
            while !self.check(TokenKind::Case)
                && !self.check(TokenKind::Default)
                && !self.check(TokenKind::RightBrace)
                && !self.check(TokenKind::Eof)
            {
                self.statement();
            }
            end_jumps.push(self.emit_jump(OpCode::Jump));

            self.patch_jump(next_case);
            self.emit_op(OpCode::Pop);
        }

        if self.match_token(TokenKind::Default) {
            self.consume(TokenKind::Colon, "Expected ':' after 'default'.");
            while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
                self.statement();
            }
        }

        for jump in end_jumps {
            self.patch_jump(jump);
        }
        self.emit_op(OpCode::Pop);
        self.consume(TokenKind::RightBrace, "Expected '}' after switch cases.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_ok(source: &str) -> (Heap, FunctionId) {
        let mut heap = Heap::new();
        let id = compile(source, &mut heap, false).expect("program should compile");
        (heap, id)
    }

    fn compile_err(source: &str) -> CompileError {
        let mut heap = Heap::new();
        compile(source, &mut heap, false).expect_err("program should not compile")
    }

    fn code(heap: &Heap, id: FunctionId) -> &[u8] {
        heap.function(id).chunk.code()
    }

    fn contains_op(heap: &Heap, id: FunctionId, op: OpCode) -> bool {
        // Opcode bytes also appear as operands; a disassembler walk keeps
        // the scan honest.
        let chunk = &heap.function(id).chunk;
        let mut offset = 0;
        while offset < chunk.len() {
            let byte = chunk.code()[offset];
            let decoded = OpCode::from_byte(byte).expect("valid opcode stream");
            if decoded == op {
                return true;
            }
            offset += match decoded {
                OpCode::Constant
                | OpCode::GetLocal
                | OpCode::SetLocal
                | OpCode::GetGlobal
                | OpCode::DefineGlobal
                | OpCode::DefineGlobalConst
                | OpCode::SetGlobal
                | OpCode::Call => 2,
                OpCode::Jump | OpCode::JumpIfFalse | OpCode::Loop => 3,
                OpCode::ConstantLong
                | OpCode::GetGlobalLong
                | OpCode::DefineGlobalLong
                | OpCode::DefineGlobalLongConst
                | OpCode::SetGlobalLong => 4,
                _ => 1,
            };
        }
        false
    }

    #[test]
    fn test_arithmetic_bytecode_shape() {
        let (heap, id) = compile_ok("print 1 + 2;");
        assert_eq!(
            code(&heap, id),
            &[
                OpCode::Constant as u8,
                0,
                OpCode::Constant as u8,
                1,
                OpCode::Add as u8,
                OpCode::Print as u8,
                OpCode::Null as u8,
                OpCode::Return as u8,
            ]
        );
        assert_eq!(heap.function(id).chunk.constants().len(), 2);
    }

    #[test]
    fn test_precedence_orders_operations() {
        // 1 + 2 * 3: multiply before add.
        let (heap, id) = compile_ok("print 1 + 2 * 3;");
        let bytes = code(&heap, id);
        let mul = bytes
            .iter()
            .position(|&b| b == OpCode::Multiply as u8)
            .unwrap();
        let add = bytes.iter().position(|&b| b == OpCode::Add as u8).unwrap();
        assert!(mul < add);
    }

    #[test]
    fn test_comparison_negations() {
        let (heap, id) = compile_ok("print 1 >= 2;");
        assert!(contains_op(&heap, id, OpCode::Less));
        assert!(contains_op(&heap, id, OpCode::Not));
    }

    #[test]
    fn test_string_literals_share_interned_constant() {
        let (heap, id) = compile_ok("var a = \"foo\"; var b = \"foo\";");
        let constants = heap.function(id).chunk.constants();
        let strings: Vec<_> = constants
            .iter()
            .filter_map(|v| v.as_string())
            .filter(|&s| &*heap.string(s).chars == "foo")
            .collect();
        assert_eq!(strings.len(), 2);
        // Interning means one identity even across two pool entries.
        assert_eq!(strings[0], strings[1]);
    }

    #[test]
    fn test_identifier_cache_dedupes_global_names() {
        let (heap, id) = compile_ok("var n = 1; n = 2; print n;");
        let count = heap
            .function(id)
            .chunk
            .constants()
            .iter()
            .filter(|v| {
                v.as_string()
                    .is_some_and(|s| &*heap.string(s).chars == "n")
            })
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_locals_compile_to_slots() {
        let (heap, id) = compile_ok("{ var x = 1; print x; }");
        assert!(contains_op(&heap, id, OpCode::GetLocal));
        assert!(!contains_op(&heap, id, OpCode::GetGlobal));
        // End of scope pops the local.
        assert!(contains_op(&heap, id, OpCode::Pop));
    }

    #[test]
    fn test_scope_cleanup_pops_each_local() {
        let (heap, id) = compile_ok("{ var a = 1; var b = 2; }");
        let pops = code(&heap, id)
            .iter()
            .filter(|&&b| b == OpCode::Pop as u8)
            .count();
        assert_eq!(pops, 2);
    }

    #[test]
    fn test_long_constant_form_past_256_entries() {
        let mut source = String::new();
        for i in 0..300 {
            source.push_str(&format!("print {i}.5;\n"));
        }
        let (heap, id) = compile_ok(&source);
        assert!(contains_op(&heap, id, OpCode::Constant));
        assert!(contains_op(&heap, id, OpCode::ConstantLong));
        assert_eq!(heap.function(id).chunk.constants().len(), 300);
    }

    #[test]
    fn test_line_runs_cover_emitted_code() {
        let (heap, id) = compile_ok("var a = 1;\nvar b = 2;\nprint a + b;\n");
        let chunk = &heap.function(id).chunk;
        let total: usize = chunk.line_runs().iter().map(|r| r.count as usize).sum();
        assert_eq!(total, chunk.len());
    }

    #[test]
    fn test_if_else_emits_both_jumps() {
        let (heap, id) = compile_ok("if (true) print 1; else print 2;");
        assert!(contains_op(&heap, id, OpCode::JumpIfFalse));
        assert!(contains_op(&heap, id, OpCode::Jump));
    }

    #[test]
    fn test_while_emits_loop() {
        let (heap, id) = compile_ok("while (false) print 1;");
        assert!(contains_op(&heap, id, OpCode::Loop));
    }

    #[test]
    fn test_for_full_clauses() {
        let (heap, id) = compile_ok("for (var i = 0; i < 3; i = i + 1) print i;");
        assert!(contains_op(&heap, id, OpCode::Loop));
        assert!(contains_op(&heap, id, OpCode::JumpIfFalse));
    }

    #[test]
    fn test_switch_emits_dup_and_final_pop() {
        let (heap, id) = compile_ok("switch (1) { case 1: print \"one\"; }");
        assert!(contains_op(&heap, id, OpCode::Dup));
        assert!(contains_op(&heap, id, OpCode::Equal));
        let bytes = code(&heap, id);
        // Scrutinee pop precedes the function epilogue.
        assert_eq!(bytes[bytes.len() - 3], OpCode::Pop as u8);
    }

    #[test]
    fn test_switch_with_default_only() {
        let (heap, id) = compile_ok("switch (1) { default: print \"d\"; }");
        assert!(contains_op(&heap, id, OpCode::Pop));
    }

    #[test]
    fn test_function_declaration_compiles_nested_chunk() {
        let (heap, id) = compile_ok("func double(x) { return x * 2; }");
        assert!(contains_op(&heap, id, OpCode::DefineGlobal));
        let nested = heap
            .function(id)
            .chunk
            .constants()
            .iter()
            .find_map(|v| match v {
                Value::Obj(Obj::Function(f)) => Some(*f),
                _ => None,
            })
            .expect("function constant");
        assert_eq!(heap.function(nested).arity, 1);
        assert!(contains_op(&heap, nested, OpCode::Multiply));
        assert!(contains_op(&heap, nested, OpCode::Return));
    }

    #[test]
    fn test_call_emits_argc() {
        let (heap, id) = compile_ok("func f(a, b) { } f(1, 2);");
        let bytes = code(&heap, id);
        let call = bytes
            .iter()
            .position(|&b| b == OpCode::Call as u8)
            .unwrap();
        assert_eq!(bytes[call + 1], 2);
    }

    #[test]
    fn test_recursive_function_compiles() {
        compile_ok("func count(n) { if (n > 0) count(n - 1); }");
    }

    #[test]
    fn test_error_expected_expression() {
        compile_err("print ;");
    }

    #[test]
    fn test_error_invalid_assignment_target() {
        compile_err("1 + 2 = 3;");
    }

    #[test]
    fn test_error_own_initializer() {
        compile_err("{ var a = 1; { var a = a; } }");
    }

    #[test]
    fn test_error_duplicate_local() {
        compile_err("{ var a = 1; var a = 2; }");
    }

    #[test]
    fn test_shadowing_in_inner_scope_is_fine() {
        compile_ok("{ var a = 1; { var a = 2; print a; } }");
    }

    #[test]
    fn test_error_const_global_reassignment() {
        let err = compile_err("const var c = 1; c = 2;");
        assert_eq!(err.errors, 1);
    }

    #[test]
    fn test_error_const_local_reassignment() {
        compile_err("{ const var c = 1; c = 2; }");
    }

    #[test]
    fn test_error_const_requires_initializer() {
        compile_err("const var c;");
    }

    #[test]
    fn test_const_global_reads_still_work() {
        compile_ok("const var c = 1; print c;");
    }

    #[test]
    fn test_error_return_at_top_level() {
        compile_err("return 1;");
    }

    #[test]
    fn test_return_inside_function_ok() {
        compile_ok("func f() { return; }");
    }

    #[test]
    fn test_error_recovery_reports_multiple_statements() {
        let err = compile_err("print ;\nvar = 3;\n");
        assert!(err.errors >= 2);
    }

    #[test]
    fn test_local_limit() {
        // 255 user locals fit beside the reserved slot; one more is an
        // error.
        let mut ok_source = String::from("{\n");
        for i in 0..255 {
            ok_source.push_str(&format!("var l{i} = 0;\n"));
        }
        ok_source.push('}');
        compile_ok(&ok_source);

        let mut bad_source = String::from("{\n");
        for i in 0..256 {
            bad_source.push_str(&format!("var l{i} = 0;\n"));
        }
        bad_source.push('}');
        compile_err(&bad_source);
    }

    #[test]
    fn test_class_keyword_has_no_rules() {
        compile_err("class Thing {}");
    }

    #[test]
    fn test_empty_source_compiles_to_epilogue() {
        let (heap, id) = compile_ok("");
        assert_eq!(
            code(&heap, id),
            &[OpCode::Null as u8, OpCode::Return as u8]
        );
    }
}
