//! Metadata tokens identifying definitions inside a [`crate::metadata::Module`].
//!
//! A token packs a table id into the high byte and a one-based row into the low 24 bits. Rows
//! are handed out by [`TokenAllocator`] when a definition is inserted into a module; a token of
//! zero marks a definition that has not been inserted yet.

use std::fmt;

/// Table id of type definitions.
pub const TYPE_DEF: u8 = 0x02;
/// Table id of field definitions.
pub const FIELD: u8 = 0x04;
/// Table id of method definitions.
pub const METHOD_DEF: u8 = 0x06;
/// Table id of parameter definitions.
pub const PARAM: u8 = 0x08;
/// Table id of event definitions.
pub const EVENT: u8 = 0x14;
/// Table id of property definitions.
pub const PROPERTY: u8 = 0x17;

/// A metadata token.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Token(pub u32);

impl Token {
    /// The unassigned token.
    pub const NULL: Token = Token(0);

    /// Create a token from its raw value.
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Create a token from a table id and a row.
    #[must_use]
    pub fn from_parts(table: u8, row: u32) -> Self {
        Token((u32::from(table) << 24) | (row & 0x00FF_FFFF))
    }

    /// The raw value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// The table id.
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// The one-based row.
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Whether this token has not been assigned.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Hands out consecutive rows per table.
///
/// The allocator is seeded from the highest row already present when a module is decoded, so
/// definitions added later never reuse the token of an existing one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenAllocator {
    last_rows: [u32; 0x18],
}

impl TokenAllocator {
    /// Allocate the next token of `table`.
    pub fn next(&mut self, table: u8) -> Token {
        let slot = &mut self.last_rows[usize::from(table) % 0x18];
        *slot += 1;
        Token::from_parts(table, *slot)
    }

    /// Record an already assigned token so later allocations skip past it.
    pub fn observe(&mut self, token: Token) {
        if token.is_null() {
            return;
        }
        let slot = &mut self.last_rows[usize::from(token.table()) % 0x18];
        *slot = (*slot).max(token.row());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_parts() {
        let token = Token::from_parts(METHOD_DEF, 5);
        assert_eq!(token.value(), 0x0600_0005);
        assert_eq!(token.table(), METHOD_DEF);
        assert_eq!(token.row(), 5);
        assert!(!token.is_null());
        assert!(Token::NULL.is_null());
    }

    #[test]
    fn test_token_display() {
        assert_eq!(format!("{}", Token(0x0200_0001)), "0x02000001");
        let debug_str = format!("{:?}", Token(0x0600_0001));
        assert!(debug_str.contains("table: 0x06"));
        assert!(debug_str.contains("row: 1"));
    }

    #[test]
    fn test_allocator_sequence() {
        let mut allocator = TokenAllocator::default();
        assert_eq!(allocator.next(TYPE_DEF), Token(0x0200_0001));
        assert_eq!(allocator.next(TYPE_DEF), Token(0x0200_0002));
        assert_eq!(allocator.next(FIELD), Token(0x0400_0001));
    }

    #[test]
    fn test_allocator_observe() {
        let mut allocator = TokenAllocator::default();
        allocator.observe(Token(0x0600_0009));
        allocator.observe(Token(0x0600_0003));
        allocator.observe(Token::NULL);
        assert_eq!(allocator.next(METHOD_DEF), Token(0x0600_000a));
        assert_eq!(allocator.next(PARAM), Token(0x0800_0001));
    }
}
