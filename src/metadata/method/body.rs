//! Method body headers (II.25.4).
//!
//! A method body is a tiny (1 byte) or fat (12 byte) header, the CIL code, and for fat headers
//! optional data sections holding exception handling clauses. [`MethodHeader::from`] reads the
//! header and the clauses so the code range of an existing body is known;
//! [`MethodHeader::encode_fat`] produces the header of a new body.

use crate::{
    file::io::{push_le, read_le, read_le_at},
    metadata::method::{ExceptionHandler, ExceptionHandlerFlags, MethodBodyFlags, SectionFlags},
    Result,
};

/// Size of a fat header in bytes
pub const FAT_HEADER_SIZE: usize = 12;

/// Parsed header of a method body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodHeader {
    /// Size of the CIL code in bytes
    pub size_code: usize,
    /// Size of the header in bytes
    pub size_header: usize,
    /// StandAloneSig token of the locals, 0 if none
    pub local_var_sig_token: u32,
    /// Maximum evaluation stack depth (8 for tiny headers)
    pub max_stack: usize,
    /// Header is in fat format
    pub is_fat: bool,
    /// Locals are zero-initialized
    pub is_init_local: bool,
    /// Exception handling clauses
    pub exception_handlers: Vec<ExceptionHandler>,
}

impl MethodHeader {
    /// Parse the body starting at `data[0]`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the body does not fit into `data` and
    /// [`crate::Error::Malformed`] for an unknown header format.
    pub fn from(data: &[u8]) -> Result<MethodHeader> {
        if data.is_empty() {
            return Err(malformed_error!("Provided data for body parsing is empty"));
        }

        let first_byte = read_le::<u8>(data)?;
        match MethodBodyFlags::from_bits_truncate(u16::from(first_byte & 0b_0000_0011_u8)) {
            MethodBodyFlags::TINY_FORMAT => {
                let size_code = (first_byte >> 2) as usize;
                if size_code + 1 > data.len() {
                    return Err(out_of_bounds_error!());
                }

                Ok(MethodHeader {
                    size_code,
                    size_header: 1,
                    local_var_sig_token: 0,
                    max_stack: 8,
                    is_fat: false,
                    is_init_local: false,
                    exception_handlers: Vec::new(),
                })
            }
            MethodBodyFlags::FAT_FORMAT => {
                if data.len() < FAT_HEADER_SIZE {
                    return Err(out_of_bounds_error!());
                }

                let first_duo = read_le::<u16>(data)?;
                let size_header = usize::from(first_duo >> 12) * 4;
                let size_code = read_le::<u32>(&data[4..])? as usize;
                if size_header < FAT_HEADER_SIZE || data.len() < size_code + size_header {
                    return Err(out_of_bounds_error!());
                }

                let flags_header = MethodBodyFlags::from_bits_truncate(first_duo & 0x0FFF);
                let exception_handlers = if flags_header.contains(MethodBodyFlags::MORE_SECTS) {
                    Self::read_sections(data, (size_header + size_code + 3) & !3)?
                } else {
                    Vec::new()
                };

                Ok(MethodHeader {
                    size_code,
                    size_header,
                    local_var_sig_token: read_le::<u32>(&data[8..])?,
                    max_stack: read_le::<u16>(&data[2..])? as usize,
                    is_fat: true,
                    is_init_local: flags_header.contains(MethodBodyFlags::INIT_LOCALS),
                    exception_handlers,
                })
            }
            _ => Err(malformed_error!(
                "MethodHeader is neither FAT nor TINY - {}",
                first_byte
            )),
        }
    }

    // Exception Handling -> II.25.4.6
    fn read_sections(data: &[u8], mut cursor: usize) -> Result<Vec<ExceptionHandler>> {
        let mut exception_handlers = Vec::new();
        loop {
            if cursor + 4 > data.len() {
                return Err(out_of_bounds_error!());
            }

            let section_flags = SectionFlags::from_bits_truncate(read_le::<u8>(&data[cursor..])?);
            let is_fat = section_flags.contains(SectionFlags::FAT_FORMAT);
            let section_size = if is_fat {
                (read_le::<u32>(&data[cursor..])? >> 8) as usize
            } else {
                usize::from(read_le::<u8>(&data[cursor + 1..])?)
            };
            if section_size < 4 || cursor + section_size > data.len() {
                return Err(out_of_bounds_error!());
            }

            if section_flags.contains(SectionFlags::EHTABLE) {
                let mut offset = cursor + 4;
                let clause_size = if is_fat { 24 } else { 12 };
                for _ in 0..(section_size - 4) / clause_size {
                    let handler = if is_fat {
                        #[allow(clippy::cast_possible_truncation)]
                        let flags = read_le_at::<u32>(data, &mut offset)? as u16;
                        ExceptionHandler {
                            flags: ExceptionHandlerFlags::from_bits_truncate(flags),
                            try_offset: read_le_at::<u32>(data, &mut offset)?,
                            try_length: read_le_at::<u32>(data, &mut offset)?,
                            handler_offset: read_le_at::<u32>(data, &mut offset)?,
                            handler_length: read_le_at::<u32>(data, &mut offset)?,
                            class_token_or_filter: read_le_at::<u32>(data, &mut offset)?,
                        }
                    } else {
                        ExceptionHandler {
                            flags: ExceptionHandlerFlags::from_bits_truncate(read_le_at::<u16>(
                                data,
                                &mut offset,
                            )?),
                            try_offset: u32::from(read_le_at::<u16>(data, &mut offset)?),
                            try_length: u32::from(read_le_at::<u8>(data, &mut offset)?),
                            handler_offset: u32::from(read_le_at::<u16>(data, &mut offset)?),
                            handler_length: u32::from(read_le_at::<u8>(data, &mut offset)?),
                            class_token_or_filter: read_le_at::<u32>(data, &mut offset)?,
                        }
                    };
                    exception_handlers.push(handler);
                }
            }

            if !section_flags.contains(SectionFlags::MORE_SECTS) {
                return Ok(exception_handlers);
            }
            cursor = (cursor + section_size + 3) & !3;
        }
    }

    /// Total size of header and code.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size_code + self.size_header
    }

    /// Encode a fat header without data sections for a body of `size_code` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `max_stack` or `size_code` do not fit the header.
    pub fn encode_fat(
        max_stack: usize,
        size_code: usize,
        local_var_sig_token: u32,
        init_locals: bool,
    ) -> Result<Vec<u8>> {
        let max_stack = u16::try_from(max_stack)
            .map_err(|_| malformed_error!("Max stack {} exceeds 65535", max_stack))?;
        let size_code = u32::try_from(size_code)
            .map_err(|_| malformed_error!("Code size {} exceeds 4GB", size_code))?;

        let mut flags = MethodBodyFlags::FAT_FORMAT;
        if init_locals {
            flags |= MethodBodyFlags::INIT_LOCALS;
        }
        #[allow(clippy::cast_possible_truncation)]
        let first_duo = flags.bits() | (((FAT_HEADER_SIZE / 4) as u16) << 12);

        let mut header = Vec::with_capacity(FAT_HEADER_SIZE);
        push_le(&mut header, first_duo);
        push_le(&mut header, max_stack);
        push_le(&mut header, size_code);
        push_le(&mut header, local_var_sig_token);
        Ok(header)
    }
}
