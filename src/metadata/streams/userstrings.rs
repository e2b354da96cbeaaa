//! User String Heap (`#US`)
//!
//! String literals loaded by `ldstr`. Each entry is a compressed length, the UTF-16LE code units,
//! and one trailing byte that is 1 if any character needs special handling beyond 8-bit ASCII.
//! `ldstr` operands are tokens of the form `0x70000000 | offset`.
//!
//! # Reference
//! - [ECMA-335 II.24.2.4](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{
    file::{io::push_compressed_uint, parser::Parser},
    metadata::token::Token,
    Result,
};

/// Owned `#US` heap that can be appended to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserStrings {
    data: Vec<u8>,
    original_len: usize,
}

impl Default for UserStrings {
    fn default() -> Self {
        UserStrings {
            data: vec![0],
            original_len: 0,
        }
    }
}

impl UserStrings {
    /// Copy an existing heap.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap does not start with the empty entry.
    pub fn from(data: &[u8]) -> Result<UserStrings> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Invalid memory for #US heap"));
        }

        Ok(UserStrings {
            data: data.to_vec(),
            original_len: data.len(),
        })
    }

    /// String at offset `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the entry extends past the heap and
    /// [`crate::Error::Malformed`] for invalid UTF-16.
    pub fn get(&self, index: usize) -> Result<String> {
        let (units, _) = self.entry(index)?;
        let code_units: Vec<u16> = units
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        String::from_utf16(&code_units)
            .map_err(|_| malformed_error!("Invalid string from index - {}", index))
    }

    /// `ldstr` token of `value`, appending it if it is not present yet.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap outgrows the 24-bit token offset.
    pub fn add(&mut self, value: &str) -> Result<Token> {
        let encoded = Self::encode(value)?;
        if let Some(offset) = self.find_encoded(&encoded) {
            return Ok(Token::user_string(offset));
        }

        let offset = self.data.len();
        if offset > 0x00FF_FFFF {
            return Err(malformed_error!("#US heap exceeds the 24-bit token range"));
        }

        self.data.extend_from_slice(&encoded);
        #[allow(clippy::cast_possible_truncation)]
        Ok(Token::user_string(offset as u32))
    }

    /// Heap content.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// True if strings were appended since loading.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.data.len() != self.original_len
    }

    /// Encoded entry (length prefix, UTF-16LE, trailing byte).
    fn encode(value: &str) -> Result<Vec<u8>> {
        let mut units = Vec::with_capacity(value.len() * 2 + 1);
        let mut special = false;
        for unit in value.encode_utf16() {
            special |= Self::needs_special_handling(unit);
            units.extend_from_slice(&unit.to_le_bytes());
        }
        units.push(u8::from(special));

        let len = u32::try_from(units.len())
            .map_err(|_| malformed_error!("User string of {} bytes is too large", units.len()))?;
        let mut encoded = Vec::with_capacity(units.len() + 4);
        push_compressed_uint(&mut encoded, len)?;
        encoded.extend_from_slice(&units);
        Ok(encoded)
    }

    // II.24.2.4
    fn needs_special_handling(unit: u16) -> bool {
        unit > 0x7F
            || matches!(unit, 0x01..=0x08 | 0x0E..=0x1F | 0x27 | 0x2D | 0x7F)
    }

    /// Code units and trailing byte of the entry at `index`.
    fn entry(&self, index: usize) -> Result<(&[u8], Option<u8>)> {
        if index >= self.data.len() {
            return Err(out_of_bounds_error!());
        }

        let mut parser = Parser::new(&self.data[index..]);
        let len = parser.read_compressed_uint()? as usize;
        let start = index + parser.pos();
        let end = start.checked_add(len).ok_or_else(|| out_of_bounds_error!())?;
        if end > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        if len == 0 {
            return Ok((&[], None));
        }
        let units_end = start + (len - 1) / 2 * 2;
        Ok((&self.data[start..units_end], Some(self.data[end - 1])))
    }

    fn find_encoded(&self, encoded: &[u8]) -> Option<u32> {
        let mut position = 1;
        while position < self.data.len() {
            let mut parser = Parser::new(&self.data[position..]);
            let len = parser.read_compressed_uint().ok()? as usize;
            let end = position + parser.pos() + len;
            if end > self.data.len() {
                return None;
            }
            if &self.data[position..end] == encoded {
                return u32::try_from(position).ok();
            }
            // Heap padding is a run of zero length entries
            position = end;
        }
        None
    }
}
