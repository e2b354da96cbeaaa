//! Blob Heap (`#Blob`)
//!
//! Signatures, custom attribute values and the portable PDB binary structures, each prefixed by
//! its compressed length. Offset 0 is always the empty blob.
//!
//! # Reference
//! - [ECMA-335 II.24.2.4](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{
    file::{io::push_compressed_uint, parser::Parser},
    Result,
};

/// Owned `#Blob` heap that can be appended to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    data: Vec<u8>,
    original_len: usize,
}

impl Default for Blob {
    fn default() -> Self {
        Blob {
            data: vec![0],
            original_len: 0,
        }
    }
}

impl Blob {
    /// Copy an existing heap.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap does not start with the empty blob.
    pub fn from(data: &[u8]) -> Result<Blob> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Invalid memory for #Blob heap"));
        }

        Ok(Blob {
            data: data.to_vec(),
            original_len: data.len(),
        })
    }

    /// Blob at offset `index`, without its length prefix.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the blob extends past the heap.
    pub fn get(&self, index: usize) -> Result<&[u8]> {
        if index >= self.data.len() {
            return Err(out_of_bounds_error!());
        }

        let mut parser = Parser::new(&self.data[index..]);
        let len = parser.read_compressed_uint()? as usize;
        let Some(data_start) = index.checked_add(parser.pos()) else {
            return Err(out_of_bounds_error!());
        };
        let Some(data_end) = data_start.checked_add(len) else {
            return Err(out_of_bounds_error!());
        };

        if data_end > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        Ok(&self.data[data_start..data_end])
    }

    /// Iterate `(offset, blob)` pairs, stopping at the first unreadable entry.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[u8])> + '_ {
        let mut position = 1;
        std::iter::from_fn(move || {
            if position >= self.data.len() {
                return None;
            }

            let start = position;
            let mut parser = Parser::new(&self.data[position..]);
            let len = parser.read_compressed_uint().ok()? as usize;
            let data_start = position + parser.pos();
            let data_end = data_start.checked_add(len)?;
            if data_end > self.data.len() {
                return None;
            }
            position = data_end;
            Some((start, &self.data[data_start..data_end]))
        })
    }

    /// Offset of a blob with exactly these bytes, appending it if none exists.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the blob or the heap outgrow their encodings.
    pub fn add(&mut self, value: &[u8]) -> Result<u32> {
        if value.is_empty() {
            return Ok(0);
        }
        if let Some((offset, _)) = self.iter().find(|(_, existing)| *existing == value) {
            return u32::try_from(offset).map_err(|_| malformed_error!("#Blob heap exceeds 4GB"));
        }

        let offset =
            u32::try_from(self.data.len()).map_err(|_| malformed_error!("#Blob heap exceeds 4GB"))?;
        let len = u32::try_from(value.len())
            .map_err(|_| malformed_error!("Blob of {} bytes is too large", value.len()))?;
        push_compressed_uint(&mut self.data, len)?;
        self.data.extend_from_slice(value);
        Ok(offset)
    }

    /// Heap content.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// True if blobs were appended since loading.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.data.len() != self.original_len
    }
}
