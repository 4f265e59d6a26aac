//! The scanner: source bytes in, tokens out on demand.

use crate::cursor::Cursor;
use crate::token::{Token, TokenKind};

/// The Loam lexer.
///
/// Produces one token per [`Lexer::scan_token`] call. Whitespace and
/// `//`-line comments are skipped between tokens; newlines advance the
/// line counter. Lexical problems come back as `TokenKind::Error` tokens
/// rather than `Result`s so the parser can fold them into its normal
/// error reporting and panic-mode recovery.
///
/// # Example
///
/// ```
/// use loam_lex::{Lexer, TokenKind};
///
/// let mut lexer = Lexer::new("print 1 + 2;");
/// assert_eq!(lexer.scan_token().kind, TokenKind::Print);
/// assert_eq!(lexer.scan_token().kind, TokenKind::Number);
/// assert_eq!(lexer.scan_token().kind, TokenKind::Plus);
/// ```
pub struct Lexer<'a> {
    /// Byte cursor over the source.
    cursor: Cursor<'a>,

    /// Start position of the token currently being scanned.
    token_start: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a lexer over the given source.
    pub fn new(source: &'a str) -> Self {
        Self {
            cursor: Cursor::new(source),
            token_start: 0,
        }
    }

    /// Scans and returns the next token.
    ///
    /// Returns `Eof` forever once the source is exhausted.
    pub fn scan_token(&mut self) -> Token<'a> {
        self.skip_whitespace();
        self.token_start = self.cursor.position();

        if self.cursor.is_at_end() {
            return self.make_token(TokenKind::Eof);
        }

        let byte = self.cursor.advance();

        if is_alpha(byte) {
            return self.identifier();
        }
        if byte.is_ascii_digit() {
            return self.number();
        }

        match byte {
            b'(' => self.make_token(TokenKind::LeftParen),
            b')' => self.make_token(TokenKind::RightParen),
            b'{' => self.make_token(TokenKind::LeftBrace),
            b'}' => self.make_token(TokenKind::RightBrace),
            b';' => self.make_token(TokenKind::Semicolon),
            b':' => self.make_token(TokenKind::Colon),
            b',' => self.make_token(TokenKind::Comma),
            b'.' => self.make_token(TokenKind::Dot),
            b'-' => self.make_token(TokenKind::Minus),
            b'+' => self.make_token(TokenKind::Plus),
            b'/' => self.make_token(TokenKind::Slash),
            b'*' => self.make_token(TokenKind::Star),
            b'!' => {
                let kind = if self.cursor.match_byte(b'=') {
                    TokenKind::BangEqual
                } else {
                    TokenKind::Bang
                };
                self.make_token(kind)
            }
            b'=' => {
                let kind = if self.cursor.match_byte(b'=') {
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Equal
                };
                self.make_token(kind)
            }
            b'<' => {
                let kind = if self.cursor.match_byte(b'=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                };
                self.make_token(kind)
            }
            b'>' => {
                let kind = if self.cursor.match_byte(b'=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                };
                self.make_token(kind)
            }
            b'"' => self.string(),
            _ => self.error_token("Unexpected character."),
        }
    }

    /// Skips spaces, tabs, carriage returns, newlines, and line comments.
    fn skip_whitespace(&mut self) {
        loop {
            match self.cursor.peek() {
                b' ' | b'\r' | b'\t' | b'\n' => {
                    self.cursor.advance();
                }
                b'/' => {
                    if self.cursor.peek_next() == b'/' {
                        // A comment runs until the end of the line.
                        while !self.cursor.is_at_end() && self.cursor.peek() != b'\n' {
                            self.cursor.advance();
                        }
                    } else {
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    /// Scans an identifier, then classifies it as keyword or identifier.
    fn identifier(&mut self) -> Token<'a> {
        while is_alpha(self.cursor.peek()) || self.cursor.peek().is_ascii_digit() {
            self.cursor.advance();
        }
        let kind = identifier_kind(self.cursor.slice_from(self.token_start));
        self.make_token(kind)
    }

    /// Scans a number: digits with an optional `.digits` fraction.
    ///
    /// No exponent syntax, no leading sign; unary minus is handled at
    /// expression level.
    fn number(&mut self) -> Token<'a> {
        while self.cursor.peek().is_ascii_digit() {
            self.cursor.advance();
        }

        // A dot only belongs to the number if a digit follows it.
        if self.cursor.peek() == b'.' && self.cursor.peek_next().is_ascii_digit() {
            self.cursor.advance();
            while self.cursor.peek().is_ascii_digit() {
                self.cursor.advance();
            }
        }

        self.make_token(TokenKind::Number)
    }

    /// Scans a string literal. Strings may span newlines and end only at
    /// the closing quote; hitting end of input first is an error.
    fn string(&mut self) -> Token<'a> {
        while !self.cursor.is_at_end() && self.cursor.peek() != b'"' {
            self.cursor.advance();
        }

        if self.cursor.is_at_end() {
            return self.error_token("Unterminated string.");
        }

        // The closing quote.
        self.cursor.advance();
        self.make_token(TokenKind::String)
    }

    fn make_token(&self, kind: TokenKind) -> Token<'a> {
        Token::new(
            kind,
            self.cursor.slice_from(self.token_start),
            self.cursor.line(),
        )
    }

    fn error_token(&self, message: &'static str) -> Token<'a> {
        Token::new(TokenKind::Error(message), "", self.cursor.line())
    }
}

/// Returns true for `[A-Za-z_]`.
#[inline]
fn is_alpha(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_'
}

/// Classifies a scanned identifier lexeme as a keyword or plain
/// identifier.
///
/// This is a trie written out by hand: dispatch on the first byte, then
/// where keywords share a prefix on the second, and compare the remainder
/// in one shot.
fn identifier_kind(lexeme: &str) -> TokenKind {
    let bytes = lexeme.as_bytes();
    match bytes[0] {
        b'a' => check_keyword(lexeme, 1, "nd", TokenKind::And),
        b'c' if bytes.len() > 1 => match bytes[1] {
            b'a' => check_keyword(lexeme, 2, "se", TokenKind::Case),
            b'l' => check_keyword(lexeme, 2, "ass", TokenKind::Class),
            b'o' => check_keyword(lexeme, 2, "nst", TokenKind::Const),
            _ => TokenKind::Identifier,
        },
        b'd' if bytes.len() > 2 && bytes[1] == b'e' => match bytes[2] {
            b'b' => check_keyword(lexeme, 3, "ug", TokenKind::Debug),
            b'f' => check_keyword(lexeme, 3, "ault", TokenKind::Default),
            _ => TokenKind::Identifier,
        },
        b'e' => check_keyword(lexeme, 1, "lse", TokenKind::Else),
        b'f' if bytes.len() > 1 => match bytes[1] {
            b'a' => check_keyword(lexeme, 2, "lse", TokenKind::False),
            b'o' => check_keyword(lexeme, 2, "r", TokenKind::For),
            b'u' => check_keyword(lexeme, 2, "nc", TokenKind::Func),
            _ => TokenKind::Identifier,
        },
        b'i' => check_keyword(lexeme, 1, "f", TokenKind::If),
        b'n' => check_keyword(lexeme, 1, "ull", TokenKind::Null),
        b'o' => check_keyword(lexeme, 1, "r", TokenKind::Or),
        b'p' => check_keyword(lexeme, 1, "rint", TokenKind::Print),
        b'r' => check_keyword(lexeme, 1, "eturn", TokenKind::Return),
        b's' if bytes.len() > 1 => match bytes[1] {
            b'u' => check_keyword(lexeme, 2, "per", TokenKind::Super),
            b'w' => check_keyword(lexeme, 2, "itch", TokenKind::Switch),
            _ => TokenKind::Identifier,
        },
        b't' if bytes.len() > 1 => match bytes[1] {
            b'h' => check_keyword(lexeme, 2, "is", TokenKind::This),
            b'r' => check_keyword(lexeme, 2, "ue", TokenKind::True),
            _ => TokenKind::Identifier,
        },
        b'v' => check_keyword(lexeme, 1, "ar", TokenKind::Var),
        b'w' => check_keyword(lexeme, 1, "hile", TokenKind::While),
        _ => TokenKind::Identifier,
    }
}

/// Confirms that `lexeme[start..]` equals `rest` exactly; anything longer
/// or shorter is a user identifier (`sup`, `superb`).
#[inline]
fn check_keyword(lexeme: &str, start: usize, rest: &str, kind: TokenKind) -> TokenKind {
    if lexeme.len() == start + rest.len() && &lexeme[start..] == rest {
        kind
    } else {
        TokenKind::Identifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(source);
        let mut kinds = Vec::new();
        loop {
            let token = lexer.scan_token();
            let done = token.is_eof();
            kinds.push(token.kind);
            if done {
                break;
            }
        }
        kinds
    }

    #[test]
    fn test_structural_tokens() {
        assert_eq!(
            kinds("(){},.;:"),
            vec![
                TokenKind::LeftParen,
                TokenKind::RightParen,
                TokenKind::LeftBrace,
                TokenKind::RightBrace,
                TokenKind::Comma,
                TokenKind::Dot,
                TokenKind::Semicolon,
                TokenKind::Colon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_one_and_two_byte_operators() {
        assert_eq!(
            kinds("! != = == < <= > >= + - * /"),
            vec![
                TokenKind::Bang,
                TokenKind::BangEqual,
                TokenKind::Equal,
                TokenKind::EqualEqual,
                TokenKind::Less,
                TokenKind::LessEqual,
                TokenKind::Greater,
                TokenKind::GreaterEqual,
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_every_keyword() {
        let source = "and case class const debug default else false for func \
                      if null or print return super switch this true var while";
        assert_eq!(
            kinds(source),
            vec![
                TokenKind::And,
                TokenKind::Case,
                TokenKind::Class,
                TokenKind::Const,
                TokenKind::Debug,
                TokenKind::Default,
                TokenKind::Else,
                TokenKind::False,
                TokenKind::For,
                TokenKind::Func,
                TokenKind::If,
                TokenKind::Null,
                TokenKind::Or,
                TokenKind::Print,
                TokenKind::Return,
                TokenKind::Super,
                TokenKind::Switch,
                TokenKind::This,
                TokenKind::True,
                TokenKind::Var,
                TokenKind::While,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_keyword_prefixes_are_identifiers() {
        assert_eq!(kinds("sup superb fun funcy cas de deb"),
            vec![
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_identifier_lexemes() {
        let mut lexer = Lexer::new("_private value2 snake_case");
        assert_eq!(lexer.scan_token().lexeme, "_private");
        assert_eq!(lexer.scan_token().lexeme, "value2");
        assert_eq!(lexer.scan_token().lexeme, "snake_case");
    }

    #[test]
    fn test_numbers() {
        let mut lexer = Lexer::new("0 42 3.25 7.");
        assert_eq!(lexer.scan_token().lexeme, "0");
        assert_eq!(lexer.scan_token().lexeme, "42");
        assert_eq!(lexer.scan_token().lexeme, "3.25");
        // "7." is the number 7 followed by a dot token.
        assert_eq!(lexer.scan_token().lexeme, "7");
        assert_eq!(lexer.scan_token().kind, TokenKind::Dot);
    }

    #[test]
    fn test_string_literal_keeps_quotes() {
        let mut lexer = Lexer::new("\"hello\"");
        let token = lexer.scan_token();
        assert_eq!(token.kind, TokenKind::String);
        assert_eq!(token.lexeme, "\"hello\"");
    }

    #[test]
    fn test_string_spans_newlines() {
        let mut lexer = Lexer::new("\"one\ntwo\" x");
        let token = lexer.scan_token();
        assert_eq!(token.kind, TokenKind::String);
        assert_eq!(token.lexeme, "\"one\ntwo\"");
        // Line counter advanced inside the string.
        assert_eq!(lexer.scan_token().line, 2);
    }

    #[test]
    fn test_unterminated_string() {
        let mut lexer = Lexer::new("\"never closed");
        let token = lexer.scan_token();
        assert_eq!(token.kind, TokenKind::Error("Unterminated string."));
    }

    #[test]
    fn test_unexpected_character() {
        let mut lexer = Lexer::new("@");
        let token = lexer.scan_token();
        assert_eq!(token.kind, TokenKind::Error("Unexpected character."));
        assert!(lexer.scan_token().is_eof());
    }

    #[test]
    fn test_comments_and_whitespace() {
        let source = "// leading comment\nprint 1; // trailing\n// last";
        assert_eq!(
            kinds(source),
            vec![
                TokenKind::Print,
                TokenKind::Number,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_line_numbers() {
        let mut lexer = Lexer::new("a\nb\n\nc");
        assert_eq!(lexer.scan_token().line, 1);
        assert_eq!(lexer.scan_token().line, 2);
        assert_eq!(lexer.scan_token().line, 4);
    }

    #[test]
    fn test_slash_is_not_comment() {
        assert_eq!(
            kinds("1 / 2"),
            vec![
                TokenKind::Number,
                TokenKind::Slash,
                TokenKind::Number,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_eof_is_sticky() {
        let mut lexer = Lexer::new("");
        assert!(lexer.scan_token().is_eof());
        assert!(lexer.scan_token().is_eof());
    }
}
