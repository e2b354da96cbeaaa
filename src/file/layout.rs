use goblin::pe::PE;

use crate::{
    file::io::{read_le_at, write_le_at},
    Result,
};

/// Size of one section table entry
pub const SECTION_HEADER_SIZE: usize = 40;
/// Size of one debug directory entry
pub const DEBUG_DIRECTORY_ENTRY_SIZE: usize = 28;

/// Data directory slots of the optional header used by the rewriter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDirectoryKind {
    /// Authenticode attribute certificates (raw file offset, not an RVA)
    CertificateTable = 4,
    /// Debug directory
    Debug = 6,
    /// CLI header
    ClrRuntimeHeader = 14,
}

/// One entry of the section table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    /// Raw 8-byte name
    pub name: [u8; 8],
    /// Size in memory
    pub virtual_size: u32,
    /// RVA of the first byte
    pub virtual_address: u32,
    /// Size on disk
    pub size_of_raw_data: u32,
    /// File offset of the first byte
    pub pointer_to_raw_data: u32,
    /// `IMAGE_SCN_*` flags
    pub characteristics: u32,
}

impl SectionHeader {
    /// Name with trailing NULs removed.
    #[must_use]
    pub fn name(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(8);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    /// Serialize into the 40-byte on-disk layout.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `out` is too small.
    pub fn write(&self, out: &mut [u8]) -> Result<()> {
        let mut offset = 0;
        for byte in self.name {
            write_le_at(out, &mut offset, byte)?;
        }
        write_le_at(out, &mut offset, self.virtual_size)?;
        write_le_at(out, &mut offset, self.virtual_address)?;
        write_le_at(out, &mut offset, self.size_of_raw_data)?;
        write_le_at(out, &mut offset, self.pointer_to_raw_data)?;
        // PointerToRelocations, PointerToLinenumbers, NumberOfRelocations, NumberOfLinenumbers
        write_le_at(out, &mut offset, 0u32)?;
        write_le_at(out, &mut offset, 0u32)?;
        write_le_at(out, &mut offset, 0u16)?;
        write_le_at(out, &mut offset, 0u16)?;
        write_le_at(out, &mut offset, self.characteristics)?;
        Ok(())
    }

    /// True if `rva` falls inside this section's mapped range.
    #[must_use]
    pub fn contains_rva(&self, rva: u32) -> bool {
        let span = self.virtual_size.max(self.size_of_raw_data);
        rva >= self.virtual_address && u64::from(rva) < u64::from(self.virtual_address) + u64::from(span)
    }
}

/// Owned snapshot of the PE header fields and their file offsets.
///
/// goblin gives a parsed view; the writer additionally needs to know *where* each field lives in
/// the file so it can patch it in place, which is what the `*_offset` members record.
#[derive(Debug, Clone)]
pub struct PeLayout {
    /// Offset of the `PE\0\0` signature
    pub pe_offset: usize,
    /// PE32+ optional header
    pub is_64: bool,
    /// Offset of the optional header
    pub optional_header_offset: usize,
    /// Offset of the first section table entry
    pub section_table_offset: usize,
    /// Offset of the first data directory entry
    pub data_directory_offset: usize,
    /// Number of data directory entries present
    pub data_directory_count: usize,
    /// `FileAlignment`
    pub file_alignment: u32,
    /// `SectionAlignment`
    pub section_alignment: u32,
    /// `SizeOfHeaders`
    pub size_of_headers: u32,
    /// `SizeOfImage`
    pub size_of_image: u32,
    /// `SizeOfInitializedData`
    pub size_of_initialized_data: u32,
    /// The section table
    pub sections: Vec<SectionHeader>,
    /// `(rva, size)` for each data directory
    pub directories: Vec<(u32, u32)>,
}

impl PeLayout {
    /// Offset of `NumberOfSections` in the COFF header
    pub const NUMBER_OF_SECTIONS: usize = 6;
    /// Offset of `SizeOfInitializedData` in the optional header
    pub const SIZE_OF_INITIALIZED_DATA: usize = 8;
    /// Offset of `SizeOfImage` in the optional header
    pub const SIZE_OF_IMAGE: usize = 56;
    /// Offset of `SizeOfHeaders` in the optional header
    pub const SIZE_OF_HEADERS: usize = 60;
    /// Offset of `CheckSum` in the optional header
    pub const CHECKSUM: usize = 64;

    /// Build a layout from raw image bytes and goblin's parse of them.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the optional header is missing or the data
    /// directories are truncated.
    pub fn read(data: &[u8], pe: &PE) -> Result<PeLayout> {
        let Some(optional_header) = pe.header.optional_header.as_ref() else {
            return Err(malformed_error!("File does not have an OptionalHeader"));
        };

        let pe_offset = pe.header.dos_header.pe_pointer as usize;
        let optional_header_offset = pe_offset + 24;
        let section_table_offset =
            optional_header_offset + pe.header.coff_header.size_of_optional_header as usize;

        // Data directories start after the fixed part of the optional header
        let (data_directory_offset, count_offset) = if pe.is_64 {
            (optional_header_offset + 112, optional_header_offset + 108)
        } else {
            (optional_header_offset + 96, optional_header_offset + 92)
        };

        let mut offset = count_offset;
        let data_directory_count = (read_le_at::<u32>(data, &mut offset)? as usize).min(16);

        let mut directories = Vec::with_capacity(data_directory_count);
        let mut offset = data_directory_offset;
        for _ in 0..data_directory_count {
            let rva = read_le_at::<u32>(data, &mut offset)?;
            let size = read_le_at::<u32>(data, &mut offset)?;
            directories.push((rva, size));
        }

        let mut offset = optional_header_offset + Self::SIZE_OF_INITIALIZED_DATA;
        let size_of_initialized_data = read_le_at::<u32>(data, &mut offset)?;
        let mut offset = optional_header_offset + Self::SIZE_OF_IMAGE;
        let size_of_image = read_le_at::<u32>(data, &mut offset)?;
        let size_of_headers = read_le_at::<u32>(data, &mut offset)?;

        let sections = pe
            .sections
            .iter()
            .map(|section| SectionHeader {
                name: section.name,
                virtual_size: section.virtual_size,
                virtual_address: section.virtual_address,
                size_of_raw_data: section.size_of_raw_data,
                pointer_to_raw_data: section.pointer_to_raw_data,
                characteristics: section.characteristics,
            })
            .collect();

        Ok(PeLayout {
            pe_offset,
            is_64: pe.is_64,
            optional_header_offset,
            section_table_offset,
            data_directory_offset,
            data_directory_count,
            file_alignment: optional_header.windows_fields.file_alignment,
            section_alignment: optional_header.windows_fields.section_alignment,
            size_of_headers,
            size_of_image,
            size_of_initialized_data,
            sections,
            directories,
        })
    }

    /// `(rva, size)` of a data directory, `(0, 0)` if the slot is absent.
    #[must_use]
    pub fn directory(&self, kind: DataDirectoryKind) -> (u32, u32) {
        self.directories
            .get(kind as usize)
            .copied()
            .unwrap_or((0, 0))
    }

    /// File offset of a data directory slot.
    #[must_use]
    pub fn directory_entry_offset(&self, kind: DataDirectoryKind) -> Option<usize> {
        let index = kind as usize;
        (index < self.data_directory_count).then(|| self.data_directory_offset + index * 8)
    }

    /// Translate an RVA into a file offset.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if no section maps the RVA.
    pub fn rva_to_offset(&self, rva: u32) -> Result<usize> {
        self.sections
            .iter()
            .find(|section| section.contains_rva(rva))
            .map(|section| (rva - section.virtual_address + section.pointer_to_raw_data) as usize)
            .ok_or_else(|| malformed_error!("RVA could not be converted to offset - {}", rva))
    }

    /// First byte past the section table.
    #[must_use]
    pub fn section_table_end(&self) -> usize {
        self.section_table_offset + self.sections.len() * SECTION_HEADER_SIZE
    }

    /// Lowest raw data offset of any section; the section table may not grow past it.
    #[must_use]
    pub fn first_raw_data(&self) -> u32 {
        self.sections
            .iter()
            .filter(|section| section.size_of_raw_data > 0)
            .map(|section| section.pointer_to_raw_data)
            .min()
            .unwrap_or(self.size_of_headers)
            .min(self.size_of_headers)
    }

    /// Lowest section RVA; headers are mapped below it.
    #[must_use]
    pub fn first_section_rva(&self) -> u32 {
        self.sections
            .iter()
            .map(|section| section.virtual_address)
            .min()
            .unwrap_or(self.section_alignment)
    }

    /// First RVA past the last mapped section.
    #[must_use]
    pub fn mapped_end(&self) -> u32 {
        self.sections
            .iter()
            .map(|section| {
                section
                    .virtual_address
                    .saturating_add(section.virtual_size.max(section.size_of_raw_data))
            })
            .max()
            .unwrap_or(self.size_of_headers)
    }

    /// First file offset past the raw data of every section.
    #[must_use]
    pub fn raw_end(&self) -> usize {
        self.sections
            .iter()
            .map(|section| {
                section.pointer_to_raw_data as usize + section.size_of_raw_data as usize
            })
            .max()
            .unwrap_or(self.size_of_headers as usize)
    }
}
