//! String Heap (`#Strings`)
//!
//! Identifier strings in UTF-8, each terminated by a NUL byte, referenced by byte offset from
//! the metadata tables. Offset 0 is always the empty string.
//!
//! # Reference
//! - [ECMA-335 II.24.2.3](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use std::{ffi::CStr, str};

use crate::Result;

/// Owned `#Strings` heap that can be appended to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strings {
    data: Vec<u8>,
    original_len: usize,
}

impl Default for Strings {
    fn default() -> Self {
        Strings {
            data: vec![0],
            original_len: 0,
        }
    }
}

impl Strings {
    /// Copy an existing heap.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap does not start with the empty string.
    pub fn from(data: &[u8]) -> Result<Strings> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Provided #Strings heap is empty"));
        }

        Ok(Strings {
            data: data.to_vec(),
            original_len: data.len(),
        })
    }

    /// String at offset `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for an offset past the heap, and
    /// [`crate::Error::Malformed`] for unterminated or non-UTF-8 data.
    pub fn get(&self, index: usize) -> Result<&str> {
        if index >= self.data.len() {
            return Err(out_of_bounds_error!());
        }

        CStr::from_bytes_until_nul(&self.data[index..])
            .ok()
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| malformed_error!("Invalid string at index - {}", index))
    }

    /// Offset of `value`, either an existing string or the tail of one.
    #[must_use]
    pub fn find(&self, value: &str) -> Option<u32> {
        if value.is_empty() {
            return Some(0);
        }

        let mut needle = Vec::with_capacity(value.len() + 1);
        needle.extend_from_slice(value.as_bytes());
        needle.push(0);

        self.data
            .windows(needle.len())
            .position(|window| window == needle.as_slice())
            .and_then(|offset| u32::try_from(offset).ok())
    }

    /// Offset of `value`, appending it if it is not present yet.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for strings with embedded NUL characters.
    pub fn add(&mut self, value: &str) -> Result<u32> {
        if value.contains('\0') {
            return Err(malformed_error!("Identifier contains NUL - {:?}", value));
        }
        if let Some(offset) = self.find(value) {
            return Ok(offset);
        }

        let offset = u32::try_from(self.data.len())
            .map_err(|_| malformed_error!("#Strings heap exceeds 4GB"))?;
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
        Ok(offset)
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
}
