//! String and user-string heaps of a module image.
//!
//! The string heap holds identifiers as null-terminated UTF-8, deduplicated, with index 0
//! reserved for the empty string. The user-string heap holds literal strings (`ldstr` operands
//! and string constants) as UTF-16LE blobs prefixed with their compressed byte length and
//! followed by the ECMA-335 terminal byte, which is 1 when any code unit needs special handling.

use std::collections::HashMap;

use widestring::U16Str;

use crate::{
    file::{
        io::{write_compressed_uint, write_le},
        parser::Parser,
    },
    Result,
};

/// Builds a string heap.
pub struct StringHeapBuilder {
    data: Vec<u8>,
    index: HashMap<String, u32>,
}

impl Default for StringHeapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StringHeapBuilder {
    /// A heap holding only the empty string.
    #[must_use]
    pub fn new() -> Self {
        StringHeapBuilder {
            data: vec![0],
            index: HashMap::new(),
        }
    }

    /// Add `value` and return its index.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the value contains a null byte or the heap
    /// outgrows 32-bit indices.
    pub fn add(&mut self, value: &str) -> Result<u32> {
        if value.is_empty() {
            return Ok(0);
        }
        if let Some(index) = self.index.get(value) {
            return Ok(*index);
        }
        if value.contains('\0') {
            return Err(malformed_error!("Identifier {:?} contains a null byte", value));
        }

        let index = u32::try_from(self.data.len())
            .map_err(|_| malformed_error!("String heap exceeds 4 GiB"))?;
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
        self.index.insert(value.to_string(), index);
        Ok(index)
    }

    /// The encoded heap.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Builds a user-string heap.
pub struct UserStringHeapBuilder {
    data: Vec<u8>,
    index: HashMap<String, u32>,
}

impl Default for UserStringHeapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl UserStringHeapBuilder {
    /// A heap holding only the leading null entry.
    #[must_use]
    pub fn new() -> Self {
        UserStringHeapBuilder {
            data: vec![0],
            index: HashMap::new(),
        }
    }

    /// Add `value` and return its index.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the encoded string is too large.
    pub fn add(&mut self, value: &str) -> Result<u32> {
        if let Some(index) = self.index.get(value) {
            return Ok(*index);
        }

        let index = u32::try_from(self.data.len())
            .map_err(|_| malformed_error!("User string heap exceeds 4 GiB"))?;
        let units: Vec<u16> = value.encode_utf16().collect();
        let byte_len = u32::try_from(units.len() * 2 + 1)
            .map_err(|_| malformed_error!("User string of {} units is too large", units.len()))?;

        write_compressed_uint(&mut self.data, byte_len)?;
        for unit in &units {
            write_le(&mut self.data, *unit);
        }
        self.data.push(u8::from(units.iter().any(|u| needs_terminal_flag(*u))));

        self.index.insert(value.to_string(), index);
        Ok(index)
    }

    /// The encoded heap.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// ECMA-335 II.24.2.4: the terminal byte is set for code units outside plain ASCII text.
fn needs_terminal_flag(unit: u16) -> bool {
    unit > 0x7E
        || matches!(unit, 0x01..=0x08 | 0x0E..=0x1F | 0x27 | 0x2D)
}

/// Read access to an encoded string heap.
pub struct Strings<'a> {
    data: &'a [u8],
}

impl<'a> Strings<'a> {
    /// Wrap encoded heap bytes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the heap does not start with the empty string.
    pub fn from(data: &'a [u8]) -> Result<Strings<'a>> {
        if data.first() != Some(&0) {
            return Err(malformed_error!("String heap must start with a null byte"));
        }
        Ok(Strings { data })
    }

    /// The string at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] for an index past the heap and
    /// [`crate::Error::Malformed`] for unterminated or invalid UTF-8 data.
    pub fn get(&self, index: u32) -> Result<&'a str> {
        let index = index as usize;
        if index >= self.data.len() {
            return Err(out_of_bounds_error!());
        }
        let mut parser = Parser::new(self.data);
        parser.seek(index)?;
        parser.read_string_utf8()
    }
}

/// Read access to an encoded user-string heap.
pub struct UserStrings<'a> {
    data: &'a [u8],
}

impl<'a> UserStrings<'a> {
    /// Wrap encoded heap bytes.
    #[must_use]
    pub fn from(data: &'a [u8]) -> UserStrings<'a> {
        UserStrings { data }
    }

    /// The string at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] for an index or length past the heap and
    /// [`crate::Error::Malformed`] for an odd length or invalid UTF-16.
    pub fn get(&self, index: u32) -> Result<String> {
        let index = index as usize;
        if index == 0 || index >= self.data.len() {
            return Err(out_of_bounds_error!());
        }

        let mut parser = Parser::new(self.data);
        parser.seek(index)?;
        let bytes = parser.read_prefixed_bytes()?;
        if bytes.len() % 2 != 1 {
            return Err(malformed_error!(
                "User string at {} has invalid length {}",
                index,
                bytes.len()
            ));
        }

        let units: Vec<u16> = bytes[..bytes.len() - 1]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        U16Str::from_slice(&units)
            .to_string()
            .map_err(|_| malformed_error!("User string at {} is not valid UTF-16", index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_are_deduplicated() {
        let mut heap = StringHeapBuilder::new();
        let a = heap.add("Player").unwrap();
        let b = heap.add("Heal").unwrap();
        assert_eq!(heap.add("Player").unwrap(), a);
        assert_eq!(heap.add("").unwrap(), 0);

        let bytes = heap.into_bytes();
        let strings = Strings::from(&bytes).unwrap();
        assert_eq!(strings.get(a).unwrap(), "Player");
        assert_eq!(strings.get(b).unwrap(), "Heal");
        assert_eq!(strings.get(0).unwrap(), "");
        assert!(strings.get(1000).is_err());
    }

    #[test]
    fn null_bytes_are_rejected() {
        let mut heap = StringHeapBuilder::new();
        assert!(heap.add("a\0b").is_err());
    }

    #[test]
    fn user_strings_use_utf16() {
        let mut heap = UserStringHeapBuilder::new();
        let hello = heap.add("Hello").unwrap();
        let accent = heap.add("caf\u{e9}").unwrap();
        let bytes = heap.into_bytes();

        assert_eq!(&bytes[1..4], &[0x0B, b'H', 0x00]);
        assert_eq!(bytes[1 + 11], 0);
        assert_eq!(bytes[accent as usize + 9], 1);

        let heap = UserStrings::from(&bytes);
        assert_eq!(heap.get(hello).unwrap(), "Hello");
        assert_eq!(heap.get(accent).unwrap(), "caf\u{e9}");
        assert!(heap.get(0).is_err());
    }

    #[test]
    fn empty_user_string() {
        let mut heap = UserStringHeapBuilder::new();
        let empty = heap.add("").unwrap();
        let bytes = heap.into_bytes();
        assert_eq!(UserStrings::from(&bytes).get(empty).unwrap(), "");
    }
}
