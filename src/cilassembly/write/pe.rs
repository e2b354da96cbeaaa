//! In-place editing of a PE image.
//!
//! [`ImageWriter`] owns a copy of the input image and the matching [`PeLayout`] and keeps the two
//! in sync while the image grows. It knows how to append a section (growing the header area when
//! the section table is full), strip an Authenticode certificate, patch bytes by RVA, maintain
//! the debug directory, and recompute the PE checksum.

use crate::{
    file::{
        io::{align_up, read_le_at, write_le, write_le_at},
        DataDirectoryKind, PeLayout, SectionHeader, DEBUG_DIRECTORY_ENTRY_SIZE,
        SECTION_HEADER_SIZE,
    },
    Error, Result,
};

/// `IMAGE_SCN_CNT_INITIALIZED_DATA | IMAGE_SCN_MEM_READ`
pub const METADATA_SECTION_CHARACTERISTICS: u32 = 0x4000_0040;

/// `IMAGE_DEBUG_TYPE_CODEVIEW`
pub const DEBUG_TYPE_CODEVIEW: u32 = 2;
/// `IMAGE_DEBUG_TYPE_EMBEDDED_PORTABLE_PDB`
pub const DEBUG_TYPE_EMBEDDED_PORTABLE_PDB: u32 = 17;
/// `IMAGE_DEBUG_TYPE_PDBCHECKSUM`
pub const DEBUG_TYPE_PDB_CHECKSUM: u32 = 19;

/// One `IMAGE_DEBUG_DIRECTORY` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugEntry {
    /// File offset of the entry itself
    pub entry_offset: usize,
    /// `Type`
    pub kind: u32,
    /// `SizeOfData`
    pub size_of_data: u32,
    /// `AddressOfRawData`
    pub address_of_raw_data: u32,
    /// `PointerToRawData`
    pub pointer_to_raw_data: u32,
}

impl DebugEntry {
    const TYPE_OFFSET: usize = 12;
    const POINTER_TO_RAW_DATA_OFFSET: usize = 24;
}

/// A PE image being rewritten.
#[derive(Debug)]
pub struct ImageWriter {
    data: Vec<u8>,
    layout: PeLayout,
}

impl ImageWriter {
    /// Start from the input image and its layout.
    #[must_use]
    pub fn new(data: Vec<u8>, layout: PeLayout) -> Self {
        ImageWriter { data, layout }
    }

    /// Current image bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Current layout.
    #[must_use]
    pub fn layout(&self) -> &PeLayout {
        &self.layout
    }

    /// Overwrite `bytes` at `rva`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if no section maps `rva` and
    /// [`crate::Error::OutOfBounds`] if the range exceeds the image.
    pub fn patch_rva(&mut self, rva: u32, bytes: &[u8]) -> Result<()> {
        let offset = self.layout.rva_to_offset(rva)?;
        self.patch(offset, bytes)
    }

    /// Overwrite `bytes` at file offset `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the image.
    pub fn patch(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let target = offset
            .checked_add(bytes.len())
            .and_then(|end| self.data.get_mut(offset..end))
            .ok_or_else(|| out_of_bounds_error!())?;
        target.copy_from_slice(bytes);
        Ok(())
    }

    /// Remove the Authenticode certificate table, which a rewritten image invalidates.
    ///
    /// A table at the end of the file is cut off; the directory entry is cleared either way.
    /// Returns true if there was a certificate.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the directory entry lies outside the headers.
    pub fn strip_certificate(&mut self) -> Result<bool> {
        let (offset, size) = self.layout.directory(DataDirectoryKind::CertificateTable);
        if offset == 0 || size == 0 {
            return Ok(false);
        }

        let Some(entry) = self
            .layout
            .directory_entry_offset(DataDirectoryKind::CertificateTable)
        else {
            return Ok(false);
        };
        self.patch(entry, &[0; 8])?;
        if let Some(directory) = self
            .layout
            .directories
            .get_mut(DataDirectoryKind::CertificateTable as usize)
        {
            *directory = (0, 0);
        }

        let end = offset as usize + size as usize;
        if end >= self.data.len() && (offset as usize) >= self.layout.raw_end() {
            self.data.truncate(offset as usize);
        }

        log::warn!(
            "Removed the Authenticode signature ({} bytes); the image must be re-signed",
            size
        );
        Ok(true)
    }

    /// Make room for one more section header, growing `SizeOfHeaders` by whole `FileAlignment`
    /// units if the section table runs into the first section's raw data.
    ///
    /// # Errors
    /// Returns [`Error::WriteLayoutFailed`] if the headers would overlap the first section in
    /// memory or other header data follows the section table.
    pub fn reserve_section_header(&mut self) -> Result<()> {
        let table_end = self.layout.section_table_end();
        let needed = table_end + SECTION_HEADER_SIZE;
        let first_raw = self.layout.first_raw_data() as usize;

        if needed > first_raw {
            let alignment = self.layout.file_alignment.max(1) as usize;
            let growth = align_up(needed - first_raw, alignment);
            let size_of_headers = self.layout.size_of_headers as usize + growth;
            if size_of_headers > self.layout.first_section_rva() as usize {
                return Err(Error::WriteLayoutFailed {
                    message: format!(
                        "no room for another section header: SizeOfHeaders {:#x} would overlap the first section at {:#x}",
                        size_of_headers,
                        self.layout.first_section_rva()
                    ),
                });
            }
            self.grow_headers(first_raw, growth)?;
        }

        let slot = self
            .data
            .get(table_end..needed)
            .ok_or_else(|| out_of_bounds_error!())?;
        if slot.iter().any(|&byte| byte != 0) {
            return Err(Error::WriteLayoutFailed {
                message: "header data follows the section table".to_string(),
            });
        }
        Ok(())
    }

    fn grow_headers(&mut self, at: usize, growth: usize) -> Result<()> {
        let growth_u32 = u32::try_from(growth).map_err(|_| Error::WriteLayoutFailed {
            message: "header growth exceeds 4GB".to_string(),
        })?;
        log::debug!(
            "Section table is full; growing SizeOfHeaders by {:#x} at {:#x}",
            growth,
            at
        );

        self.data
            .splice(at..at, std::iter::repeat(0u8).take(growth));

        self.layout.size_of_headers += growth_u32;
        let size_of_headers = self.layout.size_of_headers;
        let offset = self.layout.optional_header_offset + PeLayout::SIZE_OF_HEADERS;
        write_le(&mut self.data[offset..], size_of_headers)?;

        for index in 0..self.layout.sections.len() {
            let section = &mut self.layout.sections[index];
            if section.pointer_to_raw_data as usize >= at && section.size_of_raw_data != 0 {
                section.pointer_to_raw_data += growth_u32;
            }
            let header = section.clone();
            let entry = self.layout.section_table_offset + index * SECTION_HEADER_SIZE;
            let out = self
                .data
                .get_mut(entry..entry + SECTION_HEADER_SIZE)
                .ok_or_else(|| out_of_bounds_error!())?;
            header.write(out)?;
        }

        for entry in self.debug_entries()? {
            if entry.pointer_to_raw_data as usize >= at {
                let field = entry.entry_offset + DebugEntry::POINTER_TO_RAW_DATA_OFFSET;
                self.patch(field, &(entry.pointer_to_raw_data + growth_u32).to_le_bytes())?;
            }
        }
        Ok(())
    }

    /// RVA the next appended section will get.
    #[must_use]
    pub fn next_section_rva(&self) -> u32 {
        let alignment = self.layout.section_alignment.max(1) as usize;
        #[allow(clippy::cast_possible_truncation)]
        let rva = align_up(self.layout.mapped_end() as usize, alignment) as u32;
        rva
    }

    /// Append a section holding `content` at [`ImageWriter::next_section_rva`].
    ///
    /// [`ImageWriter::reserve_section_header`] must have been called first.
    ///
    /// # Errors
    /// Returns [`Error::WriteLayoutFailed`] if the image would exceed 4GB.
    pub fn append_section(
        &mut self,
        name: [u8; 8],
        content: &[u8],
        characteristics: u32,
    ) -> Result<SectionHeader> {
        let too_large = || Error::WriteLayoutFailed {
            message: "image exceeds 4GB".to_string(),
        };
        let file_alignment = self.layout.file_alignment.max(1) as usize;
        let section_alignment = self.layout.section_alignment.max(1) as usize;

        let pointer = align_up(self.data.len(), file_alignment);
        let raw_size = align_up(content.len(), file_alignment);
        self.data.resize(pointer, 0);
        self.data.extend_from_slice(content);
        self.data.resize(pointer + raw_size, 0);

        let header = SectionHeader {
            name,
            virtual_size: u32::try_from(content.len()).map_err(|_| too_large())?,
            virtual_address: self.next_section_rva(),
            size_of_raw_data: u32::try_from(raw_size).map_err(|_| too_large())?,
            pointer_to_raw_data: u32::try_from(pointer).map_err(|_| too_large())?,
            characteristics,
        };

        let entry = self.layout.section_table_end();
        let out = self
            .data
            .get_mut(entry..entry + SECTION_HEADER_SIZE)
            .ok_or_else(|| out_of_bounds_error!())?;
        header.write(out)?;
        self.layout.sections.push(header.clone());

        let count = u16::try_from(self.layout.sections.len()).map_err(|_| Error::WriteLayoutFailed {
            message: "too many sections".to_string(),
        })?;
        let offset = self.layout.pe_offset + PeLayout::NUMBER_OF_SECTIONS;
        write_le(&mut self.data[offset..], count)?;

        let size_of_image = align_up(
            header.virtual_address as usize + content.len(),
            section_alignment,
        );
        self.layout.size_of_image = u32::try_from(size_of_image).map_err(|_| too_large())?;
        self.layout.size_of_initialized_data = self
            .layout
            .size_of_initialized_data
            .saturating_add(header.size_of_raw_data);

        let mut offset = self.layout.optional_header_offset + PeLayout::SIZE_OF_INITIALIZED_DATA;
        write_le_at(&mut self.data, &mut offset, self.layout.size_of_initialized_data)?;
        let offset = self.layout.optional_header_offset + PeLayout::SIZE_OF_IMAGE;
        write_le(&mut self.data[offset..], self.layout.size_of_image)?;

        log::debug!(
            "Appended section {} at RVA {:#x}, file offset {:#x}, {} bytes",
            header.name(),
            header.virtual_address,
            header.pointer_to_raw_data,
            content.len()
        );
        Ok(header)
    }

    /// Entries of the debug directory, empty if there is none.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the directory is not mapped by a section.
    pub fn debug_entries(&self) -> Result<Vec<DebugEntry>> {
        debug_entries(&self.data, &self.layout)
    }

    /// Store `checksum` in every `PdbChecksum` debug entry naming SHA-256. Returns the number of
    /// entries updated.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if an entry's data lies outside the image.
    pub fn update_pdb_checksum(&mut self, checksum: &[u8; 32]) -> Result<usize> {
        const ALGORITHM: &[u8] = b"SHA256\0";

        let mut updated = 0;
        for entry in self.debug_entries()? {
            if entry.kind != DEBUG_TYPE_PDB_CHECKSUM {
                continue;
            }

            let start = entry.pointer_to_raw_data as usize;
            let data = self
                .data
                .get(start..start + entry.size_of_data as usize)
                .ok_or_else(|| out_of_bounds_error!())?;
            if data.len() != ALGORITHM.len() + checksum.len() || !data.starts_with(ALGORITHM) {
                log::warn!("PdbChecksum entry with an unknown algorithm left unchanged");
                continue;
            }

            self.patch(start + ALGORITHM.len(), checksum)?;
            updated += 1;
        }
        Ok(updated)
    }

    /// Recompute the PE checksum and return the finished image.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        let offset = self.layout.optional_header_offset + PeLayout::CHECKSUM;
        let checksum = pe_checksum(&self.data, offset);
        if let Some(field) = self.data.get_mut(offset..offset + 4) {
            field.copy_from_slice(&checksum.to_le_bytes());
        }
        self.data
    }
}

/// Entries of the debug directory of `data`, empty if there is none.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the directory is not mapped by a section and
/// [`crate::Error::OutOfBounds`] if it is truncated.
pub fn debug_entries(data: &[u8], layout: &PeLayout) -> Result<Vec<DebugEntry>> {
    let (rva, size) = layout.directory(DataDirectoryKind::Debug);
    if rva == 0 || size == 0 {
        return Ok(Vec::new());
    }

    let start = layout.rva_to_offset(rva)?;
    let count = size as usize / DEBUG_DIRECTORY_ENTRY_SIZE;
    let mut entries = Vec::with_capacity(count);
    for index in 0..count {
        let entry_offset = start + index * DEBUG_DIRECTORY_ENTRY_SIZE;
        let mut offset = entry_offset + DebugEntry::TYPE_OFFSET;
        entries.push(DebugEntry {
            entry_offset,
            kind: read_le_at::<u32>(data, &mut offset)?,
            size_of_data: read_le_at::<u32>(data, &mut offset)?,
            address_of_raw_data: read_le_at::<u32>(data, &mut offset)?,
            pointer_to_raw_data: read_le_at::<u32>(data, &mut offset)?,
        });
    }
    Ok(entries)
}

/// GUID of the `RSDS` CodeView record, the first 16 bytes of the linked PDB id.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the record is truncated.
pub fn codeview_guid(data: &[u8], entry: &DebugEntry) -> Result<Option<[u8; 16]>> {
    let start = entry.pointer_to_raw_data as usize;
    let record = data
        .get(start..start + entry.size_of_data as usize)
        .ok_or_else(|| out_of_bounds_error!())?;
    match record {
        [b'R', b'S', b'D', b'S', rest @ ..] if rest.len() >= 16 => {
            let mut guid = [0u8; 16];
            guid.copy_from_slice(&rest[..16]);
            Ok(Some(guid))
        }
        _ => Ok(None),
    }
}

/// The PE image checksum: 16-bit one's complement style sum of the file with the checksum field
/// treated as zero, plus the file length.
#[must_use]
pub fn pe_checksum(data: &[u8], checksum_offset: usize) -> u32 {
    let mut sum: u64 = 0;
    for (index, chunk) in data.chunks(2).enumerate() {
        let offset = index * 2;
        if offset >= checksum_offset && offset < checksum_offset + 4 {
            continue;
        }
        let word = match chunk {
            [low, high] => u16::from_le_bytes([*low, *high]),
            [low] => u16::from(*low),
            _ => 0,
        };
        sum += u64::from(word);
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum = (sum & 0xFFFF) + (sum >> 16);

    #[allow(clippy::cast_possible_truncation)]
    let checksum = (sum as u32).wrapping_add(data.len() as u32);
    checksum
}
