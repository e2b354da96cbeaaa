//! The compressed metadata table stream (`#~`).
//!
//! # Layout
//!
//! ```text
//! Offset Size Field
//! 0      4    Reserved (0)
//! 4      1    MajorVersion
//! 5      1    MinorVersion
//! 6      1    HeapSizes
//! 7      1    Reserved (1)
//! 8      8    Valid   - bit vector of present tables
//! 16     8    Sorted  - bit vector of sorted tables
//! 24     4*n  Rows    - row count of each present table, ascending table number
//! ...    4    ExtraData, only if HeapSizes & 0x40
//! ...         Table data, ascending table number
//! ```
//!
//! The same stream format carries the portable PDB tables. In a PDB the column widths of
//! references into the type system (e.g. `LocalScope.Method`) depend on the row counts of the
//! *image's* tables, which the `#Pdb` stream records; callers pass those counts in as
//! `external_rows`.

use strum::IntoEnumIterator;

use crate::{
    file::io::{push_le, push_le_dyn, read_le, read_le_at, read_le_at_dyn},
    metadata::tables::{ColumnKind, Table, TableId, TableInfo, TABLE_SLOTS},
    Result,
};

/// `HeapSizes` flag announcing a trailing 4-byte value after the row counts
const HEAP_EXTRA_DATA: u8 = 0x40;

/// Parsed `#~` stream with all rows decoded.
#[derive(Debug, Clone)]
pub struct TablesHeader {
    /// Reserved leading dword, preserved as read
    pub reserved: u32,
    /// Major schema version (2)
    pub major_version: u8,
    /// Minor schema version (0)
    pub minor_version: u8,
    /// `HeapSizes` flags as read
    pub heap_sizes: u8,
    /// Reserved byte after `HeapSizes`, preserved as read
    pub reserved2: u8,
    /// Tables present in the input
    pub valid: u64,
    /// Tables flagged as sorted
    pub sorted: u64,
    /// Value following the row counts when `HeapSizes & 0x40`
    pub extra_data: Option<u32>,
    tables: Vec<Table>,
}

impl TablesHeader {
    /// Decode a `#~` stream.
    ///
    /// `external_rows` supplies row counts of tables stored elsewhere (the image tables when
    /// decoding a portable PDB); they only influence column widths.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for truncated data, [`crate::Error::Malformed`] for
    /// unknown tables and [`crate::Error::NotSupported`] for indirection tables.
    pub fn read(data: &[u8], external_rows: Option<&[u32; TABLE_SLOTS]>) -> Result<TablesHeader> {
        if data.len() < 24 {
            return Err(out_of_bounds_error!());
        }

        let valid = read_le::<u64>(&data[8..])?;
        if valid == 0 {
            return Err(malformed_error!("No valid rows in any of the tables"));
        }

        let known = TableId::iter().fold(0u64, |mask, table| mask | table.mask());
        if valid & !known != 0 {
            return Err(malformed_error!(
                "Unknown metadata tables present - {:#x}",
                valid & !known
            ));
        }

        let heap_sizes = read_le::<u8>(&data[6..])?;
        let mut offset = 24;
        let mut counts = [0u32; TABLE_SLOTS];
        for table in TableId::iter() {
            if valid & table.mask() != 0 {
                counts[table as usize] = read_le_at::<u32>(data, &mut offset)?;
            }
        }

        let extra_data = if heap_sizes & HEAP_EXTRA_DATA != 0 {
            Some(read_le_at::<u32>(data, &mut offset)?)
        } else {
            None
        };

        let mut width_counts = counts;
        if let Some(external) = external_rows {
            for table in TableId::iter().filter(|table| table.is_type_system()) {
                if valid & table.mask() == 0 {
                    width_counts[table as usize] = external[table as usize];
                }
            }
        }
        let info = TableInfo::new(&width_counts, heap_sizes);

        let mut tables: Vec<Table> = TableId::iter().map(Table::new).collect();
        for table_id in TableId::iter() {
            let rows = counts[table_id as usize];
            if rows == 0 {
                continue;
            }
            if table_id.is_indirection() {
                return Err(crate::Error::NotSupported(format!(
                    "metadata uses the {table_id:?} indirection table"
                )));
            }

            let table = Self::slot_mut(&mut tables, table_id)?;
            let columns = table_id.columns();
            let mut row = Vec::with_capacity(columns.len());
            for _ in 0..rows {
                row.clear();
                for column in columns {
                    let value = match column.kind {
                        ColumnKind::U16 => u32::from(read_le_at::<u16>(data, &mut offset)?),
                        ColumnKind::U32 | ColumnKind::Token => read_le_at::<u32>(data, &mut offset)?,
                        kind => read_le_at_dyn(data, &mut offset, info.is_large_column(kind))?,
                    };
                    row.push(value);
                }
                table.push(&row)?;
            }
        }

        Ok(TablesHeader {
            reserved: read_le::<u32>(data)?,
            major_version: read_le::<u8>(&data[4..])?,
            minor_version: read_le::<u8>(&data[5..])?,
            heap_sizes,
            reserved2: read_le::<u8>(&data[7..])?,
            valid,
            sorted: read_le::<u64>(&data[16..])?,
            extra_data,
            tables,
        })
    }

    /// Rows of a table.
    #[must_use]
    pub fn table(&self, id: TableId) -> &Table {
        // `tables` holds one entry per TableId, in TableId order
        &self.tables[Self::position(id)]
    }

    /// Mutable rows of a table.
    pub fn table_mut(&mut self, id: TableId) -> &mut Table {
        &mut self.tables[Self::position(id)]
    }

    /// Number of rows of a table.
    #[must_use]
    pub fn row_count(&self, id: TableId) -> u32 {
        self.table(id).row_count()
    }

    /// Row counts indexed by `TableId as usize`.
    #[must_use]
    pub fn row_counts(&self) -> [u32; TABLE_SLOTS] {
        let mut counts = [0u32; TABLE_SLOTS];
        for table in &self.tables {
            counts[table.id() as usize] = table.row_count();
        }
        counts
    }

    /// True if the `Sorted` vector flags `id`.
    #[must_use]
    pub fn is_sorted(&self, id: TableId) -> bool {
        self.sorted & id.mask() != 0
    }

    /// `Valid` vector for the current contents: everything present on input plus every table that
    /// gained rows.
    #[must_use]
    pub fn valid_out(&self) -> u64 {
        self.tables
            .iter()
            .filter(|table| !table.is_empty())
            .fold(self.valid, |mask, table| mask | table.id().mask())
    }

    /// Serialize the stream.
    ///
    /// `heap_flags` are the `HeapSizes` index-width bits for the heaps that will be written
    /// alongside; other `HeapSizes` bits are carried over from the input.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a value does not fit its column.
    pub fn write(
        &self,
        heap_flags: u8,
        external_rows: Option<&[u32; TABLE_SLOTS]>,
    ) -> Result<Vec<u8>> {
        let heap_sizes = (self.heap_sizes & !0x07) | (heap_flags & 0x07);
        let valid = self.valid_out();

        let counts = self.row_counts();
        let mut width_counts = counts;
        if let Some(external) = external_rows {
            for table in TableId::iter().filter(|table| table.is_type_system()) {
                if valid & table.mask() == 0 {
                    width_counts[table as usize] = external[table as usize];
                }
            }
        }
        let info = TableInfo::new(&width_counts, heap_sizes);

        let mut out = Vec::new();
        push_le(&mut out, self.reserved);
        push_le(&mut out, self.major_version);
        push_le(&mut out, self.minor_version);
        push_le(&mut out, heap_sizes);
        push_le(&mut out, self.reserved2);
        push_le(&mut out, valid);
        push_le(&mut out, self.sorted);

        for table in TableId::iter() {
            if valid & table.mask() != 0 {
                push_le(&mut out, counts[table as usize]);
            }
        }
        if heap_sizes & HEAP_EXTRA_DATA != 0 {
            push_le(&mut out, self.extra_data.unwrap_or(0));
        }

        for table in &self.tables {
            let columns = table.id().columns();
            for (_, row) in table.rows() {
                for (column, value) in columns.iter().zip(row) {
                    match column.kind {
                        ColumnKind::U16 => {
                            let value = u16::try_from(*value).map_err(|_| {
                                malformed_error!(
                                    "{:?}.{} value {} exceeds 2 bytes",
                                    table.id(),
                                    column.name,
                                    value
                                )
                            })?;
                            push_le(&mut out, value);
                        }
                        ColumnKind::U32 | ColumnKind::Token => push_le(&mut out, *value),
                        kind => push_le_dyn(&mut out, *value, info.is_large_column(kind))?,
                    }
                }
            }
        }

        Ok(out)
    }

    fn position(id: TableId) -> usize {
        TableId::iter().position(|table| table == id).unwrap_or(0)
    }

    fn slot_mut(tables: &mut [Table], id: TableId) -> Result<&mut Table> {
        tables
            .iter_mut()
            .find(|table| table.id() == id)
            .ok_or_else(|| malformed_error!("Missing table slot {:?}", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tables::HEAP_LARGE_STRINGS;

    /// Module (1 row) and TypeRef (2 rows), small heaps.
    fn crafted() -> Vec<u8> {
        let mut data = vec![
            0x00, 0x00, 0x00, 0x00, // Reserved
            0x02, // MajorVersion
            0x00, // MinorVersion
            0x00, // HeapSizes
            0x01, // Reserved
            0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // Valid: Module | TypeRef
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // Sorted
            0x01, 0x00, 0x00, 0x00, // Module rows
            0x02, 0x00, 0x00, 0x00, // TypeRef rows
        ];
        // Module: Generation, Name, Mvid, EncId, EncBaseId
        data.extend_from_slice(&[0x00, 0x00, 0x0A, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00]);
        // TypeRef: ResolutionScope, Name, Namespace
        data.extend_from_slice(&[0x06, 0x00, 0x14, 0x00, 0x1E, 0x00]);
        data.extend_from_slice(&[0x06, 0x00, 0x28, 0x00, 0x1E, 0x00]);
        data
    }

    #[test]
    fn read_crafted() {
        let header = TablesHeader::read(&crafted(), None).unwrap();

        assert_eq!(header.major_version, 2);
        assert_eq!(header.minor_version, 0);
        assert_eq!(header.reserved2, 1);
        assert_eq!(header.row_count(TableId::Module), 1);
        assert_eq!(header.row_count(TableId::TypeRef), 2);
        assert_eq!(header.row_count(TableId::TypeDef), 0);

        assert_eq!(header.table(TableId::Module).row(1), Some(&[0, 0x0A, 1, 0, 0][..]));
        assert_eq!(header.table(TableId::TypeRef).get(2, 1), Some(0x28));
    }

    #[test]
    fn write_identity() {
        let data = crafted();
        let header = TablesHeader::read(&data, None).unwrap();
        assert_eq!(header.write(0, None).unwrap(), data);
    }

    #[test]
    fn write_grows_columns() {
        let header = TablesHeader::read(&crafted(), None).unwrap();
        let out = header.write(HEAP_LARGE_STRINGS, None).unwrap();
        let reread = TablesHeader::read(&out, None).unwrap();

        assert_eq!(reread.heap_sizes, HEAP_LARGE_STRINGS);
        assert_eq!(reread.table(TableId::TypeRef).row(2), Some(&[6, 0x28, 0x1E][..]));
        // 32 header bytes + Module (2+4+2+2+2) + 2 * TypeRef (2+4+4)
        assert_eq!(out.len(), 32 + 12 + 20);
    }

    #[test]
    fn new_tables_become_valid() {
        let mut header = TablesHeader::read(&crafted(), None).unwrap();
        header.table_mut(TableId::StandAloneSig).push(&[0x10]).unwrap();
        assert_eq!(header.valid_out(), 0x03 | TableId::StandAloneSig.mask());

        let reread = TablesHeader::read(&header.write(0, None).unwrap(), None).unwrap();
        assert_eq!(reread.table(TableId::StandAloneSig).get(1, 0), Some(0x10));
    }

    #[test]
    fn external_rows_widen_pdb_columns() {
        // StateMachineMethod with one row, MethodDef lives in the image
        let mut data = vec![0, 0, 0, 0, 2, 0, 0, 1];
        data.extend_from_slice(&TableId::StateMachineMethod.mask().to_le_bytes());
        data.extend_from_slice(&0u64.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&[0x02, 0x00, 0x01, 0x00, 0x03, 0x00, 0x01, 0x00]);

        let mut external = [0u32; TABLE_SLOTS];
        external[TableId::MethodDef as usize] = 0x1_0000;
        let header = TablesHeader::read(&data, Some(&external)).unwrap();
        assert_eq!(
            header.table(TableId::StateMachineMethod).row(1),
            Some(&[0x0001_0002, 0x0001_0003][..])
        );
        assert_eq!(header.write(0, Some(&external)).unwrap(), data);
    }

    #[test]
    fn rejects_bad_headers() {
        let mut data = crafted();
        data[8..16].copy_from_slice(&0u64.to_le_bytes());
        assert!(TablesHeader::read(&data, None).is_err());

        let mut data = crafted();
        data[8..16].copy_from_slice(&(1u64 << 0x2E).to_le_bytes());
        assert!(TablesHeader::read(&data, None).is_err());

        let mut data = crafted();
        data.truncate(data.len() - 1);
        assert!(TablesHeader::read(&data, None).is_err());

        assert!(TablesHeader::read(&[0u8; 10], None).is_err());
    }

    #[test]
    fn rejects_indirection_tables() {
        let mut data = vec![0, 0, 0, 0, 2, 0, 0, 1];
        data.extend_from_slice(&TableId::MethodPtr.mask().to_le_bytes());
        data.extend_from_slice(&0u64.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&[0x01, 0x00]);

        assert!(matches!(
            TablesHeader::read(&data, None),
            Err(crate::Error::NotSupported(_))
        ));
    }
}
