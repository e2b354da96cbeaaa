//! PE file access for managed images.
//!
//! The rewriter loads the whole image eagerly: [`File`] owns the raw bytes and a
//! [`goblin::pe::PE`] parsed from them, tied together with `ouroboros` so the parsed headers can
//! borrow the buffer they came from. Loading rejects anything that is not a PE image carrying a
//! CLI header.
//!
//! The header values the writer needs to grow an image ([`PeLayout`]) are extracted once into a
//! plain owned struct, so later stages never have to reach back into goblin's borrowed view.
//!
//! # Key Components
//!
//! - [`File`] - Owned image bytes plus the goblin parse
//! - [`PeLayout`] / [`SectionHeader`] - Owned snapshot of header fields and file offsets
//! - [`io`] - Little-endian read/write helpers
//! - [`parser`] - Cursor-based parser for heaps, signatures and method bodies
//!
//! # Examples
//!
//! ```rust,no_run
//! use modinit::File;
//! use std::path::Path;
//!
//! let file = File::from_file(Path::new("app.dll"))?;
//! let (clr_rva, clr_size) = file.clr();
//! let clr_offset = file.rva_to_offset(clr_rva)?;
//! println!("CLI header at {clr_offset:#x} ({clr_size} bytes)");
//! # Ok::<(), modinit::Error>(())
//! ```

pub mod io;
mod layout;
pub mod parser;

pub use layout::{
    DataDirectoryKind, PeLayout, SectionHeader, DEBUG_DIRECTORY_ENTRY_SIZE, SECTION_HEADER_SIZE,
};

use std::path::Path;

use goblin::pe::PE;
use ouroboros::self_referencing;

use crate::{
    Error::{Empty, GoblinErr},
    Result,
};

#[self_referencing]
/// An eagerly loaded PE image.
pub struct File {
    /// The complete image
    data: Vec<u8>,
    /// The goblin parse of `data`
    #[borrows(data)]
    #[not_covariant]
    pe: PE<'this>,
}

impl File {
    /// Read a file from disk completely into memory and parse it.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be read, and the errors of
    /// [`File::from_mem`] otherwise.
    pub fn from_file(file: &Path) -> Result<File> {
        let data = std::fs::read(file)?;

        Self::from_mem(data)
    }

    /// Parse an in-memory image.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] for empty input, [`crate::Error::GoblinErr`] if the data is
    /// not a PE image, and [`crate::Error::NotSupported`] if it is not a managed image.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        if data.is_empty() {
            return Err(Empty);
        }

        File::try_new(data, |data| match PE::parse(data) {
            Ok(pe) => match pe.header.optional_header {
                Some(_) => {
                    let layout = PeLayout::read(data, &pe)?;
                    let clr = layout.directory(DataDirectoryKind::ClrRuntimeHeader);
                    if clr.0 == 0 || clr.1 == 0 {
                        Err(crate::Error::NotSupported(
                            "image does not have a CLR runtime header".to_string(),
                        ))
                    } else {
                        Ok(pe)
                    }
                }
                None => Err(malformed_error!("File does not have an OptionalHeader")),
            },
            Err(error) => Err(GoblinErr(error)),
        })
    }

    /// Image size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data().len()
    }

    /// True for an empty image, which [`File::from_mem`] never produces.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data().is_empty()
    }

    /// The raw image bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.borrow_data()
    }

    /// Give up the parse and return the raw image bytes.
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.into_heads().data
    }

    /// True for PE32+ (64-bit optional header) images.
    #[must_use]
    pub fn is_pe32_plus(&self) -> bool {
        self.with_pe(|pe| pe.is_64)
    }

    /// Owned snapshot of the header fields the writer works with.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if a header is truncated.
    pub fn layout(&self) -> Result<PeLayout> {
        self.with(|fields| PeLayout::read(fields.data, fields.pe))
    }

    /// RVA and size of the CLI header.
    #[must_use]
    pub fn clr(&self) -> (usize, usize) {
        let (rva, size) = self
            .layout()
            .map(|layout| layout.directory(DataDirectoryKind::ClrRuntimeHeader))
            .unwrap_or((0, 0));
        (rva as usize, size as usize)
    }

    /// Translate an RVA into a file offset using the section table.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if no section maps the RVA.
    pub fn rva_to_offset(&self, rva: usize) -> Result<usize> {
        self.with_pe(|pe| {
            for section in &pe.sections {
                let start = section.virtual_address as usize;
                let span = section.virtual_size.max(section.size_of_raw_data) as usize;
                let Some(section_max) = start.checked_add(span) else {
                    return Err(malformed_error!(
                        "Section malformed, causing integer overflow - {} + {}",
                        section.virtual_address,
                        span
                    ));
                };

                if rva >= start && rva < section_max {
                    return Ok((rva - start) + section.pointer_to_raw_data as usize);
                }
            }

            Err(malformed_error!(
                "RVA could not be converted to offset - {}",
                rva
            ))
        })
    }

    /// Borrow `len` bytes starting at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the image.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let data = self.data();
        match offset.checked_add(len) {
            Some(end) if end <= data.len() => Ok(&data[offset..end]),
            _ => Err(out_of_bounds_error!()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::fixture::FixtureBuilder;

    #[test]
    fn load_fixture() {
        let image = FixtureBuilder::new().build().image;
        let file = File::from_mem(image.clone()).unwrap();

        assert_eq!(file.len(), image.len());
        assert!(!file.is_pe32_plus());

        let (clr_rva, clr_size) = file.clr();
        assert_eq!(clr_size, 72);
        let offset = file.rva_to_offset(clr_rva).unwrap();
        assert_eq!(file.data_slice(offset, 4).unwrap(), &[72, 0, 0, 0]);
        assert_eq!(file.into_data(), image);
    }

    #[test]
    fn load_pe32_plus() {
        let image = FixtureBuilder::new().pe32_plus().build().image;
        let file = File::from_mem(image).unwrap();
        assert!(file.is_pe32_plus());
    }

    #[test]
    fn rejects_non_images() {
        assert!(matches!(File::from_mem(Vec::new()), Err(Empty)));
        assert!(matches!(
            File::from_mem(vec![0xCC; 512]),
            Err(crate::Error::GoblinErr(_))
        ));
    }

    #[test]
    fn rejects_native_images() {
        let image = FixtureBuilder::new().without_clr_header().build().image;
        assert!(matches!(
            File::from_mem(image),
            Err(crate::Error::NotSupported(_))
        ));
    }

    #[test]
    fn rva_outside_sections() {
        let image = FixtureBuilder::new().build().image;
        let file = File::from_mem(image).unwrap();
        assert!(file.rva_to_offset(0x10).is_err());
        assert!(file.rva_to_offset(0x00FF_FFFF).is_err());
    }
}
