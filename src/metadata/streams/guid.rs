//! GUID Heap (`#GUID`)
//!
//! A plain array of 16-byte GUIDs addressed by 1-based index.
//!
//! # Reference
//! - [ECMA-335 II.24.2.5](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::Result;

/// Owned `#GUID` heap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Guid {
    data: Vec<u8>,
}

impl Guid {
    /// Copy an existing heap.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap is not a whole number of GUIDs.
    pub fn from(data: &[u8]) -> Result<Guid> {
        if data.len() % 16 != 0 {
            return Err(malformed_error!(
                "#GUID heap of {} bytes is not a multiple of 16",
                data.len()
            ));
        }

        Ok(Guid {
            data: data.to_vec(),
        })
    }

    /// GUID at 1-based `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for index 0 or past the heap.
    pub fn get(&self, index: usize) -> Result<[u8; 16]> {
        if index < 1 || index * 16 > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        let mut buffer = [0u8; 16];
        buffer.copy_from_slice(&self.data[(index - 1) * 16..index * 16]);
        Ok(buffer)
    }

    /// Number of GUIDs.
    #[must_use]
    pub fn count(&self) -> usize {
        self.data.len() / 16
    }

    /// Heap content.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data : [u8; 48] = [
            /* 1 - 0;16   */  0x8e, 0x90, 0x37, 0xd4, 0xe6, 0x65, 0x7c, 0x48, 0x97, 0x35, 0x7b, 0xdf, 0xf6, 0x99, 0xbe, 0xa5,
            /* 2 - 16;32  */  0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA,
            /* 3 - 32;48  */  0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];

        let guids = Guid::from(&data).unwrap();
        assert_eq!(guids.count(), 3);
        assert_eq!(guids.get(1).unwrap()[..4], [0x8e, 0x90, 0x37, 0xd4]);
        assert_eq!(guids.get(2).unwrap(), [0xAA; 16]);
        assert_eq!(guids.get(3).unwrap(), [0x00; 16]);
        assert!(guids.get(0).is_err());
        assert!(guids.get(4).is_err());

        assert!(Guid::from(&data[..20]).is_err());
    }
}
