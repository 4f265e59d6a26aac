//! Token definitions for the Loam lexer.

/// The kind of a token.
///
/// `Error` carries a static message describing the lexical problem; the
/// parser reports it when the token is consumed. Everything else maps
/// one-to-one onto source syntax.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    // Single-character structural tokens.
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Dot,
    Semicolon,
    Colon,

    // Operators.
    Minus,
    Plus,
    Slash,
    Star,
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // Literals.
    Identifier,
    String,
    Number,

    // Keywords.
    And,
    Case,
    Class,
    Const,
    Debug,
    Default,
    Else,
    False,
    For,
    Func,
    If,
    Null,
    Or,
    Print,
    Return,
    Super,
    Switch,
    This,
    True,
    Var,
    While,

    /// A lexical error; the payload is the message.
    Error(&'static str),
    Eof,
}

/// A token: kind, borrowed lexeme, and the line it started on.
///
/// For `Error` tokens the lexeme is empty; the message travels in the
/// kind. For `Eof` the lexeme is empty as well.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub line: u32,
}

impl<'a> Token<'a> {
    /// Creates a token.
    pub fn new(kind: TokenKind, lexeme: &'a str, line: u32) -> Self {
        Self { kind, lexeme, line }
    }

    /// A synthetic token usable before the first `advance`.
    pub fn placeholder() -> Self {
        Self {
            kind: TokenKind::Eof,
            lexeme: "",
            line: 0,
        }
    }

    /// Returns true for the end-of-input token.
    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_construction() {
        let token = Token::new(TokenKind::Identifier, "total", 4);
        assert_eq!(token.kind, TokenKind::Identifier);
        assert_eq!(token.lexeme, "total");
        assert_eq!(token.line, 4);
        assert!(!token.is_eof());
    }

    #[test]
    fn test_error_kind_carries_message() {
        let kind = TokenKind::Error("Unterminated string.");
        match kind {
            TokenKind::Error(msg) => assert_eq!(msg, "Unterminated string."),
            _ => panic!("expected error kind"),
        }
    }
}
