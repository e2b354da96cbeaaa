//! CLR 2.0 (Cor20) header.
//!
//! The 72-byte header found through the `CLR Runtime Header` data directory. It locates the
//! metadata, names the entry point and carries the image flags that decide whether the image can
//! be rewritten at all.
//!
//! # Reference
//! - [ECMA-335 II.25.3.3](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use bitflags::bitflags;

use crate::{
    file::{io::write_le, parser::Parser},
    metadata::token::Token,
    Error, Result,
};

/// Size of the header
pub const COR20_HEADER_SIZE: usize = 72;

bitflags! {
    /// `COMIMAGE_FLAGS_*`
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ComImageFlags: u32 {
        /// Image contains only IL code
        const IL_ONLY = 0x0000_0001;
        /// Image can only be loaded into a 32-bit process
        const REQUIRED_32BIT = 0x0000_0002;
        /// Image is an IL library
        const IL_LIBRARY = 0x0000_0004;
        /// Image is strong-name signed
        const STRONG_NAME_SIGNED = 0x0000_0008;
        /// The entry point is an RVA into native code
        const NATIVE_ENTRYPOINT = 0x0000_0010;
        /// Debug tracking is enabled
        const TRACK_DEBUG_DATA = 0x0001_0000;
        /// Prefer a 32-bit process
        const PREFER_32BIT = 0x0002_0000;
    }
}

/// The Cor20 header of a managed image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cor20Header {
    /// Size of the header, 72
    pub cb: u32,
    /// Minimum runtime major version
    pub major_runtime_version: u16,
    /// Minimum runtime minor version
    pub minor_runtime_version: u16,
    /// RVA of the metadata root
    pub meta_data_rva: u32,
    /// Size of the metadata
    pub meta_data_size: u32,
    /// Image flags
    pub flags: ComImageFlags,
    /// MethodDef or File token of the entry point, unless `NATIVE_ENTRYPOINT` is set
    pub entry_point_token: u32,
    /// RVA of managed resources
    pub resource_rva: u32,
    /// Size of managed resources
    pub resource_size: u32,
    /// RVA of the strong name signature
    pub strong_name_signature_rva: u32,
    /// Size of the strong name signature
    pub strong_name_signature_size: u32,
    /// Reserved, 0
    pub code_manager_table_rva: u32,
    /// Reserved, 0
    pub code_manager_table_size: u32,
    /// RVA of the VTable fixups
    pub vtable_fixups_rva: u32,
    /// Size of the VTable fixups
    pub vtable_fixups_size: u32,
    /// Reserved, 0
    pub export_address_table_jmp_rva: u32,
    /// Reserved, 0
    pub export_address_table_jmp_size: u32,
    /// ReadyToRun header RVA
    pub managed_native_header_rva: u32,
    /// ReadyToRun header size
    pub managed_native_header_size: u32,
}

impl Cor20Header {
    /// Offset of the `MetaData` directory within the header
    pub const META_DATA_OFFSET: usize = 8;
    /// Offset of `Flags`
    pub const FLAGS_OFFSET: usize = 16;
    /// Offset of `EntryPointToken`
    pub const ENTRY_POINT_OFFSET: usize = 20;

    /// Parse the header.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] for truncated data and [`Error::Malformed`] for an invalid
    /// header.
    pub fn read(data: &[u8]) -> Result<Cor20Header> {
        if data.len() < COR20_HEADER_SIZE {
            return Err(out_of_bounds_error!());
        }

        let mut parser = Parser::new(data);

        let cb = parser.read_le::<u32>()?;
        if cb as usize != COR20_HEADER_SIZE {
            return Err(malformed_error!(
                "Invalid CLR header size: expected 72, got {}",
                cb
            ));
        }

        let major_runtime_version = parser.read_le::<u16>()?;
        let minor_runtime_version = parser.read_le::<u16>()?;

        let meta_data_rva = parser.read_le::<u32>()?;
        let meta_data_size = parser.read_le::<u32>()?;
        if meta_data_rva == 0 || meta_data_size == 0 {
            return Err(malformed_error!("Metadata directory is empty"));
        }

        let flags = ComImageFlags::from_bits_retain(parser.read_le::<u32>()?);

        Ok(Cor20Header {
            cb,
            major_runtime_version,
            minor_runtime_version,
            meta_data_rva,
            meta_data_size,
            flags,
            entry_point_token: parser.read_le::<u32>()?,
            resource_rva: parser.read_le::<u32>()?,
            resource_size: parser.read_le::<u32>()?,
            strong_name_signature_rva: parser.read_le::<u32>()?,
            strong_name_signature_size: parser.read_le::<u32>()?,
            code_manager_table_rva: parser.read_le::<u32>()?,
            code_manager_table_size: parser.read_le::<u32>()?,
            vtable_fixups_rva: parser.read_le::<u32>()?,
            vtable_fixups_size: parser.read_le::<u32>()?,
            export_address_table_jmp_rva: parser.read_le::<u32>()?,
            export_address_table_jmp_size: parser.read_le::<u32>()?,
            managed_native_header_rva: parser.read_le::<u32>()?,
            managed_native_header_size: parser.read_le::<u32>()?,
        })
    }

    /// Reject images that cannot be rewritten by moving metadata: mixed-mode images, images with
    /// VTable fixups, and ReadyToRun images whose native code embeds metadata tokens.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] naming the offending feature.
    pub fn check_rewritable(&self) -> Result<()> {
        if !self.flags.contains(ComImageFlags::IL_ONLY) {
            return Err(Error::NotSupported(
                "mixed-mode image (COMIMAGE_FLAGS_ILONLY not set)".to_string(),
            ));
        }
        if self.flags.contains(ComImageFlags::NATIVE_ENTRYPOINT) {
            return Err(Error::NotSupported("native entry point".to_string()));
        }
        if self.vtable_fixups_rva != 0 || self.vtable_fixups_size != 0 {
            return Err(Error::NotSupported("VTable fixups".to_string()));
        }
        if self.managed_native_header_rva != 0 || self.managed_native_header_size != 0 {
            return Err(Error::NotSupported(
                "ReadyToRun image (ManagedNativeHeader present)".to_string(),
            ));
        }
        Ok(())
    }

    /// Entry point as a token, `None` if the image has none.
    #[must_use]
    pub fn entry_point(&self) -> Option<Token> {
        let token = Token::new(self.entry_point_token);
        (!token.is_null() && !self.flags.contains(ComImageFlags::NATIVE_ENTRYPOINT))
            .then_some(token)
    }

    /// Write the fields the rewriter changes (metadata directory, flags, entry point) into the
    /// header bytes at the start of `data`.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] if `data` is shorter than the header.
    pub fn patch(&self, data: &mut [u8]) -> Result<()> {
        if data.len() < COR20_HEADER_SIZE {
            return Err(out_of_bounds_error!());
        }

        write_le(&mut data[Self::META_DATA_OFFSET..], self.meta_data_rva)?;
        write_le(&mut data[Self::META_DATA_OFFSET + 4..], self.meta_data_size)?;
        write_le(&mut data[Self::FLAGS_OFFSET..], self.flags.bits())?;
        write_le(&mut data[Self::ENTRY_POINT_OFFSET..], self.entry_point_token)?;
        Ok(())
    }
}
