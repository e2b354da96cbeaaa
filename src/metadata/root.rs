//! Metadata root header and stream directory.
//!
//! The metadata root (`BSJB`) is the same for an image's metadata and for a portable PDB. It holds
//! the runtime version string and the directory of named streams.
//!
//! ```text
//! Offset  Size Field
//! 0       4    Signature (0x424A5342)
//! 4       2    MajorVersion
//! 6       2    MinorVersion
//! 8       4    Reserved
//! 12      4    Length of the version string, padded to 4
//! 16      n    Version string
//! 16+n    2    Flags
//! 18+n    2    Number of streams
//! 20+n         Stream headers
//! ```
//!
//! # References
//!
//! - [ECMA-335 II.24.2.1: Metadata root](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{
    file::io::{align_up, push_le, read_le, read_le_at},
    metadata::streams::StreamHeader,
    Error, Result,
};

/// `BSJB`
pub const CIL_HEADER_MAGIC: u32 = 0x424A_5342;

/// An image has at most 6 streams (`#JTD` plus the 5 standard ones); a portable PDB has `#Pdb`
/// plus the 5 standard ones
const MAX_STREAMS: usize = 6;

/// The metadata root of an image or a portable PDB.
#[derive(Debug, Clone)]
pub struct Root {
    /// Magic signature `BSJB`
    pub signature: u32,
    /// Major version, 1
    pub major_version: u16,
    /// Minor version, 1
    pub minor_version: u16,
    /// Reserved, 0
    pub reserved: u32,
    /// Raw version field including its NUL padding
    pub version_raw: Vec<u8>,
    /// Version string up to the first NUL, e.g. `v4.0.30319`
    pub version: String,
    /// Reserved, 0
    pub flags: u16,
    /// Stream directory in file order
    pub stream_headers: Vec<StreamHeader>,
}

impl Root {
    /// Parse the root at the start of `data`, which must span the whole metadata.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`]/[`Error::OutOfBounds`] for invalid data and
    /// [`Error::NotSupported`] for the uncompressed `#-` table stream.
    pub fn read(data: &[u8]) -> Result<Root> {
        if data.len() < 20 {
            return Err(out_of_bounds_error!());
        }

        let signature = read_le::<u32>(data)?;
        if signature != CIL_HEADER_MAGIC {
            return Err(malformed_error!(
                "CIL_HEADER_MAGIC does not match - {:#x}",
                signature
            ));
        }

        let version_length = read_le::<u32>(&data[12..])? as usize;
        let Some(version_end) = version_length.checked_add(16) else {
            return Err(malformed_error!("Version string length overflows"));
        };
        if version_end + 4 > data.len() {
            return Err(out_of_bounds_error!());
        }

        let version_raw = data[16..version_end].to_vec();
        let version = String::from_utf8_lossy(
            version_raw.split(|byte| *byte == 0).next().unwrap_or_default(),
        )
        .into_owned();

        let mut offset = version_end;
        let flags = read_le_at::<u16>(data, &mut offset)?;
        let stream_count = read_le_at::<u16>(data, &mut offset)? as usize;
        if stream_count == 0 || stream_count > MAX_STREAMS || stream_count * 9 > data.len() {
            return Err(malformed_error!("Invalid stream count - {}", stream_count));
        }

        let mut streams: Vec<StreamHeader> = Vec::with_capacity(stream_count);
        for _ in 0..stream_count {
            if offset >= data.len() {
                return Err(out_of_bounds_error!());
            }

            let stream = StreamHeader::from(&data[offset..])?;
            match stream.offset.checked_add(stream.size) {
                Some(end) if end as usize <= data.len() => {}
                Some(_) => return Err(out_of_bounds_error!()),
                None => {
                    return Err(malformed_error!(
                        "Stream offset and size cause integer overflow - {} + {}",
                        stream.offset,
                        stream.size
                    ))
                }
            }

            if stream.name == "#-" {
                return Err(Error::NotSupported(
                    "uncompressed metadata tables (#- stream)".to_string(),
                ));
            }
            if streams.iter().any(|existing| existing.name == stream.name) {
                return Err(malformed_error!("Duplicate stream - {}", stream.name));
            }

            offset += stream.encoded_size();
            streams.push(stream);
        }

        Ok(Root {
            signature,
            major_version: read_le::<u16>(&data[4..])?,
            minor_version: read_le::<u16>(&data[6..])?,
            reserved: read_le::<u32>(&data[8..])?,
            version_raw,
            version,
            flags,
            stream_headers: streams,
        })
    }

    /// Header of the stream called `name`.
    #[must_use]
    pub fn stream(&self, name: &str) -> Option<&StreamHeader> {
        self.stream_headers.iter().find(|stream| stream.name == name)
    }

    /// Content of the stream called `name` within `data`, the bytes [`Root::read`] parsed.
    #[must_use]
    pub fn stream_data<'a>(&self, data: &'a [u8], name: &str) -> Option<&'a [u8]> {
        let stream = self.stream(name)?;
        let start = stream.offset as usize;
        data.get(start..start + stream.size as usize)
    }

    /// Serialize a root with this root's header fields, directory order and the given content.
    ///
    /// `content` must supply data for every stream in the directory. Every stream is padded to a
    /// multiple of 4 bytes.
    ///
    /// # Errors
    /// Returns [`Error::WriteLayoutFailed`] if content for a stream is missing.
    pub fn write(&self, content: &[(&str, &[u8])]) -> Result<Vec<u8>> {
        let version_len = align_up(self.version_raw.len(), 4);

        let mut headers = Vec::with_capacity(self.stream_headers.len());
        let directory_size: usize = self
            .stream_headers
            .iter()
            .map(StreamHeader::encoded_size)
            .sum();
        let mut offset = 20 + version_len + directory_size;
        for stream in &self.stream_headers {
            let Some((_, data)) = content.iter().find(|(name, _)| *name == stream.name) else {
                return Err(Error::WriteLayoutFailed {
                    message: format!("no content for stream {}", stream.name),
                });
            };
            let size = align_up(data.len(), 4);
            headers.push((
                StreamHeader {
                    offset: u32::try_from(offset).map_err(|_| Error::WriteLayoutFailed {
                        message: "metadata exceeds 4GB".to_string(),
                    })?,
                    size: u32::try_from(size).map_err(|_| Error::WriteLayoutFailed {
                        message: format!("stream {} exceeds 4GB", stream.name),
                    })?,
                    name: stream.name.clone(),
                },
                *data,
            ));
            offset += size;
        }

        let mut out = Vec::with_capacity(offset);
        push_le(&mut out, self.signature);
        push_le(&mut out, self.major_version);
        push_le(&mut out, self.minor_version);
        push_le(&mut out, self.reserved);
        #[allow(clippy::cast_possible_truncation)]
        push_le(&mut out, version_len as u32);
        out.extend_from_slice(&self.version_raw);
        out.resize(16 + version_len, 0);
        push_le(&mut out, self.flags);
        #[allow(clippy::cast_possible_truncation)]
        push_le(&mut out, headers.len() as u16);

        for (header, _) in &headers {
            header.write(&mut out);
        }
        for (header, data) in &headers {
            out.extend_from_slice(data);
            out.resize(header.offset as usize + header.size as usize, 0);
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rustfmt::skip]
    const HEADER: [u8; 40] = [
        0x42, 0x53, 0x4A, 0x42,
        0x01, 0x00,
        0x01, 0x00,
        0x00, 0x00, 0x00, 0x00,
        0x08, 0x00, 0x00, 0x00,
        b'v', b'4', b'.', b'0', 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00,
        0x01, 0x00,

        0x28, 0x00, 0x00, 0x00, // StreamHeader
        0x00, 0x00, 0x00, 0x00,
        0x23, 0x7E, 0x00, 0x00,
    ];

    #[test]
    fn crafted() {
        let root = Root::read(&HEADER).unwrap();

        assert_eq!(root.signature, CIL_HEADER_MAGIC);
        assert_eq!(root.major_version, 1);
        assert_eq!(root.minor_version, 1);
        assert_eq!(root.version, "v4.0");
        assert_eq!(root.version_raw.len(), 8);
        assert_eq!(root.stream_headers.len(), 1);
        assert_eq!(root.stream_headers[0].offset, 0x28);
        assert_eq!(root.stream_headers[0].name, "#~");
        assert_eq!(root.stream_data(&HEADER, "#~"), Some(&[][..]));
        assert!(root.stream("#Strings").is_none());
    }

    #[test]
    fn write_layout() {
        let root = Root::read(&HEADER).unwrap();
        let empty: &[u8] = &[];
        assert_eq!(root.write(&[("#~", empty)]).unwrap(), HEADER);

        let tables: &[u8] = &[1, 2, 3, 4, 5];
        let out = root.write(&[("#~", tables)]).unwrap();
        let reread = Root::read(&out).unwrap();
        assert_eq!(reread.stream_headers[0].size, 8);
        assert_eq!(
            reread.stream_data(&out, "#~"),
            Some(&[1u8, 2, 3, 4, 5, 0, 0, 0][..])
        );

        let strings: &[u8] = &[0];
        assert!(root.write(&[("#Strings", strings)]).is_err());
    }

    #[test]
    fn rejects() {
        let mut data = HEADER;
        data[0] = 0x43;
        assert!(Root::read(&data).is_err());

        let mut data = HEADER;
        data[37] = b'-';
        assert!(matches!(Root::read(&data), Err(Error::NotSupported(_))));

        let mut data = HEADER;
        data[26] = 0x07;
        assert!(Root::read(&data).is_err());

        let mut data = HEADER;
        data[32] = 0x10;
        assert!(Root::read(&data).is_err());

        assert!(Root::read(&HEADER[..18]).is_err());
    }
}
