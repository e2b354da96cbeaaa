//! Portable PDB `#Pdb` stream.
//!
//! ```text
//! Offset Size Field
//! 0      20   PDB id: GUID + stamp, matched against the image's CodeView record
//! 20     4    EntryPoint - MethodDef token, 0 if none
//! 24     8    ReferencedTypeSystemTables - bit vector of image tables
//! 32     4*n  TypeSystemTableRows - row count of each referenced table
//! ```
//!
//! The row counts decide the width of the PDB table columns that index into the image.

use strum::IntoEnumIterator;

use crate::{
    file::io::{push_le, read_le_at},
    metadata::{
        tables::{TableId, TABLE_SLOTS},
        token::Token,
    },
    Result,
};

/// Length of the PDB id
pub const PDB_ID_SIZE: usize = 20;

/// Parsed `#Pdb` stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdbStream {
    /// GUID followed by a 4-byte stamp
    pub id: [u8; PDB_ID_SIZE],
    /// Entry point of the image
    pub entry_point: Token,
    /// Image tables whose row counts are recorded
    pub referenced_tables: u64,
    /// Image row counts indexed by `TableId as usize`
    pub row_counts: [u32; TABLE_SLOTS],
}

impl PdbStream {
    /// Parse the stream.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for truncated data and [`crate::Error::Malformed`]
    /// if non type-system tables are referenced.
    pub fn from(data: &[u8]) -> Result<PdbStream> {
        if data.len() < 32 {
            return Err(out_of_bounds_error!());
        }

        let mut id = [0u8; PDB_ID_SIZE];
        id.copy_from_slice(&data[..PDB_ID_SIZE]);

        let mut offset = PDB_ID_SIZE;
        let entry_point = Token::new(read_le_at::<u32>(data, &mut offset)?);
        let referenced_tables = read_le_at::<u64>(data, &mut offset)?;

        let type_system = TableId::iter()
            .filter(|table| table.is_type_system())
            .fold(0u64, |mask, table| mask | table.mask());
        if referenced_tables & !type_system != 0 {
            return Err(malformed_error!(
                "#Pdb references unknown tables - {:#x}",
                referenced_tables & !type_system
            ));
        }

        let mut row_counts = [0u32; TABLE_SLOTS];
        for table in TableId::iter() {
            if referenced_tables & table.mask() != 0 {
                row_counts[table as usize] = read_le_at::<u32>(data, &mut offset)?;
            }
        }

        Ok(PdbStream {
            id,
            entry_point,
            referenced_tables,
            row_counts,
        })
    }

    /// Record the image's current row counts, referencing every non-empty type-system table.
    pub fn set_type_system_rows(&mut self, image_rows: &[u32; TABLE_SLOTS]) {
        self.referenced_tables = 0;
        self.row_counts = [0; TABLE_SLOTS];
        for table in TableId::iter().filter(|table| table.is_type_system()) {
            let rows = image_rows[table as usize];
            if rows != 0 {
                self.referenced_tables |= table.mask();
                self.row_counts[table as usize] = rows;
            }
        }
    }

    /// Encode the stream.
    #[must_use]
    pub fn write(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + 4 * 64);
        out.extend_from_slice(&self.id);
        push_le(&mut out, self.entry_point.value());
        push_le(&mut out, self.referenced_tables);
        for table in TableId::iter() {
            if self.referenced_tables & table.mask() != 0 {
                push_le(&mut out, self.row_counts[table as usize]);
            }
        }
        out
    }
}
