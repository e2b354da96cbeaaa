//! Stream Header for .NET Metadata Streams
//!
//! Each header names a stream and gives its offset (relative to the metadata root) and size.
//!
//! # Reference
//! - [ECMA-335 II.24.2.2](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{
    file::io::{align_up, push_le, read_le},
    Result,
};

/// Stream names that may appear in an image or a portable PDB.
///
/// `#-` is the uncompressed table stream; it is recognised so it can be reported as unsupported
/// rather than malformed. `#JTD` is an empty marker stream emitted by some compilers.
pub const KNOWN_STREAMS: [&str; 8] = ["#Strings", "#US", "#Blob", "#GUID", "#~", "#-", "#Pdb", "#JTD"];

/// A stream header provides the names, and the position and length of a particular table or heap. Note that the
/// length of a Stream header structure is not fixed, but depends on the length of its name field (a variable
/// length null-terminated string, padded to 4 bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    /// Memory offset with start of the stream
    pub offset: u32,
    /// Size of this stream in bytes, shall be a multiple of 4
    pub size: u32,
    /// Name of Stream\0 max 32char
    pub name: String,
}

impl StreamHeader {
    /// Create a `Stream` object from a sequence of bytes
    ///
    /// # Arguments
    /// * 'data' - The byte slice from which this object shall be created
    ///
    /// # Errors
    /// Returns an error if the data is too short or stream header format is invalid
    pub fn from(data: &[u8]) -> Result<StreamHeader> {
        if data.len() < 9 {
            return Err(out_of_bounds_error!());
        }

        let name_bytes = &data[8..data.len().min(8 + 32)];
        let Some(name_len) = name_bytes.iter().position(|byte| *byte == 0) else {
            return Err(malformed_error!("Unterminated stream header name"));
        };
        let name = String::from_utf8_lossy(&name_bytes[..name_len]).into_owned();

        if !KNOWN_STREAMS.iter().any(|valid_name| name == *valid_name) {
            return Err(malformed_error!("Invalid stream header name - {}", name));
        }

        Ok(StreamHeader {
            offset: read_le::<u32>(data)?,
            size: read_le::<u32>(&data[4..])?,
            name,
        })
    }

    /// Bytes this header occupies in the stream directory.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        8 + align_up(self.name.len() + 1, 4)
    }

    /// Append the encoded header.
    pub fn write(&self, out: &mut Vec<u8>) {
        push_le(out, self.offset);
        push_le(out, self.size);
        out.extend_from_slice(self.name.as_bytes());
        let padding = align_up(self.name.len() + 1, 4) - self.name.len();
        out.resize(out.len() + padding, 0);
    }
}
