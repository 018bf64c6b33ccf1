//! A structural lexer for C#-style source text.
//!
//! The lexer only separates what the scanner needs to see: identifiers, literals and single
//! punctuation characters. Whitespace, comments and preprocessor lines are dropped. String
//! literals of every flavour (regular, verbatim, interpolated and raw) are consumed as one
//! token, including string literals nested inside interpolation holes, so braces inside
//! strings never disturb brace matching.

use std::ops::Range;

use crate::{Error, Result};

/// Kind of a lexed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier or keyword, including `@`-prefixed verbatim identifiers
    Ident,
    /// Numeric literal
    Number,
    /// Character literal
    Char,
    /// String literal of any flavour
    String,
    /// A single punctuation character
    Punct(char),
}

/// A token with its byte span and 1-based line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceToken {
    /// Kind
    pub kind: TokenKind,
    /// Byte range in the source text
    pub span: Range<usize>,
    /// Line of the first byte
    pub line: usize,
}

impl SourceToken {
    /// The token text.
    #[must_use]
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.span.clone()]
    }

    /// Whether this is the punctuation character `c`.
    #[must_use]
    pub fn is_punct(&self, c: char) -> bool {
        self.kind == TokenKind::Punct(c)
    }
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    at_line_start: bool,
}

impl<'a> Lexer<'a> {
    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek(0)?;
        self.pos += 1;
        if byte == b'\n' {
            self.line += 1;
            self.at_line_start = true;
        }
        Some(byte)
    }

    fn error(&self, what: &str, line: usize) -> Error {
        Error::InvalidFragment(format!("{what} starting on line {line}"))
    }

    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            match (self.peek(0), self.peek(1)) {
                (Some(b'\n'), _) => {
                    self.bump();
                }
                (Some(c), _) if c.is_ascii_whitespace() => {
                    self.pos += 1;
                }
                (Some(b'/'), Some(b'/')) => {
                    while self.peek(0).is_some_and(|c| c != b'\n') {
                        self.pos += 1;
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    let line = self.line;
                    self.pos += 2;
                    loop {
                        match (self.peek(0), self.peek(1)) {
                            (Some(b'*'), Some(b'/')) => {
                                self.pos += 2;
                                break;
                            }
                            (Some(_), _) => {
                                self.bump();
                            }
                            (None, _) => return Err(self.error("Unterminated comment", line)),
                        }
                    }
                }
                (Some(b'#'), _) if self.at_line_start => {
                    while self.peek(0).is_some_and(|c| c != b'\n') {
                        self.pos += 1;
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<SourceToken>> {
        self.skip_trivia()?;
        let start = self.pos;
        let line = self.line;
        let Some(c) = self.peek(0) else {
            return Ok(None);
        };
        self.at_line_start = false;

        let kind = if is_ident_start(c) || (c == b'@' && self.peek(1).is_some_and(is_ident_start))
        {
            self.pos += 1;
            while self.peek(0).is_some_and(is_ident_continue) {
                self.pos += 1;
            }
            TokenKind::Ident
        } else if c.is_ascii_digit() || (c == b'.' && self.peek(1).is_some_and(|d| d.is_ascii_digit()))
        {
            self.number();
            TokenKind::Number
        } else if c == b'\'' {
            self.char_literal(line)?;
            TokenKind::Char
        } else if let Some(prefix) = self.string_prefix() {
            self.string_literal(prefix, line)?;
            TokenKind::String
        } else {
            let ch = self.source[start..]
                .chars()
                .next()
                .ok_or_else(|| self.error("Unexpected end of input", line))?;
            self.pos += ch.len_utf8();
            TokenKind::Punct(ch)
        };

        Ok(Some(SourceToken {
            kind,
            span: start..self.pos,
            line,
        }))
    }

    fn number(&mut self) {
        let hex = self.peek(0) == Some(b'0') && matches!(self.peek(1), Some(b'x' | b'X'));
        if hex {
            self.pos += 2;
        }
        while let Some(c) = self.peek(0) {
            let exponent_sign = !hex
                && matches!(c, b'+' | b'-')
                && self.pos > 0
                && matches!(self.bytes[self.pos - 1], b'e' | b'E');
            if c.is_ascii_alphanumeric() || c == b'_' || exponent_sign {
                self.pos += 1;
            } else if c == b'.' && self.peek(1).is_some_and(|d| d.is_ascii_digit()) && !hex {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn char_literal(&mut self, line: usize) -> Result<()> {
        self.pos += 1;
        loop {
            match self.peek(0) {
                Some(b'\\') => self.pos += 2,
                Some(b'\'') => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(b'\n') | None => return Err(self.error("Unterminated character literal", line)),
                Some(_) => self.pos += 1,
            }
        }
    }

    /// Detects `"`, `@"`, `$"`, `$@"`, `@$"` and raw `"""` forms. Returns (verbatim, dollars).
    fn string_prefix(&self) -> Option<(bool, usize)> {
        let mut offset = 0;
        let mut verbatim = false;
        let mut dollars = 0;
        while let Some(c) = self.peek(offset) {
            match c {
                b'@' if !verbatim => verbatim = true,
                b'$' => dollars += 1,
                b'"' => return Some((verbatim, dollars)),
                _ => return None,
            }
            offset += 1;
        }
        None
    }

    fn string_literal(&mut self, (verbatim, dollars): (bool, usize), line: usize) -> Result<()> {
        while matches!(self.peek(0), Some(b'@' | b'$')) {
            self.pos += 1;
        }

        let mut quotes = 0;
        while self.peek(quotes) == Some(b'"') {
            quotes += 1;
        }
        if quotes >= 3 {
            return self.raw_string(quotes, line);
        }

        self.pos += 1;
        let interpolated = dollars > 0;
        loop {
            match self.peek(0) {
                None => return Err(self.error("Unterminated string literal", line)),
                Some(b'\n') if !verbatim => {
                    return Err(self.error("Unterminated string literal", line));
                }
                Some(b'\\') if !verbatim => self.pos += 2,
                Some(b'"') if verbatim && self.peek(1) == Some(b'"') => self.pos += 2,
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(b'{') if interpolated && self.peek(1) == Some(b'{') => self.pos += 2,
                Some(b'{') if interpolated => self.interpolation_hole(line)?,
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    fn interpolation_hole(&mut self, line: usize) -> Result<()> {
        self.pos += 1;
        let mut depth = 1usize;
        while depth > 0 {
            self.skip_trivia()?;
            match self.peek(0) {
                None => return Err(self.error("Unterminated interpolation", line)),
                Some(b'{') => {
                    depth += 1;
                    self.pos += 1;
                }
                Some(b'}') => {
                    depth -= 1;
                    self.pos += 1;
                }
                Some(b'\'') => self.char_literal(line)?,
                Some(_) => {
                    if let Some(prefix) = self.string_prefix() {
                        self.string_literal(prefix, line)?;
                    } else {
                        self.bump();
                    }
                }
            }
        }
        Ok(())
    }

    fn raw_string(&mut self, quotes: usize, line: usize) -> Result<()> {
        self.pos += quotes;
        loop {
            match self.peek(0) {
                None => return Err(self.error("Unterminated raw string literal", line)),
                Some(b'"') => {
                    let mut run = 0;
                    while self.peek(run) == Some(b'"') {
                        run += 1;
                    }
                    self.pos += run;
                    if run >= quotes {
                        return Ok(());
                    }
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c >= 0x80
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c >= 0x80
}

/// Split `source` into tokens.
///
/// # Errors
///
/// Returns [`Error::InvalidFragment`] for unterminated comments or literals.
pub fn tokenize(source: &str) -> Result<Vec<SourceToken>> {
    let mut lexer = Lexer {
        source,
        bytes: source.as_bytes(),
        pos: 0,
        line: 1,
        at_line_start: true,
    };
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}
