//! loam-lex - Lexer for the Loam scripting language.
//!
//! The lexer turns source text into a lazy stream of tokens: the parser
//! pulls one token at a time with [`Lexer::scan_token`], so the whole
//! token stream is never materialized. Each token borrows its lexeme from
//! the source buffer and carries the line it started on.
//!
//! # Token categories
//!
//! - Structural: `( ) { } , . ; :`
//! - Operators: `- + / * ! != = == > >= < <=`
//! - Literals: strings (may span newlines), numbers, identifiers
//! - Keywords: recognized with a hand-written trie over the first one or
//!   two bytes followed by a comparison of the remainder
//! - `Error` tokens carrying a static message, reported by the parser at
//!   consumption time
//! - `Eof`
//!
//! # Example
//!
//! ```
//! use loam_lex::{Lexer, TokenKind};
//!
//! let mut lexer = Lexer::new("var answer = 42;");
//! assert_eq!(lexer.scan_token().kind, TokenKind::Var);
//! assert_eq!(lexer.scan_token().lexeme, "answer");
//! ```

pub mod cursor;
pub mod lexer;
pub mod token;

pub use cursor::Cursor;
pub use lexer::Lexer;
pub use token::{Token, TokenKind};
