use strum::{EnumCount, IntoEnumIterator};

use crate::metadata::tables::{
    types::{tableid::TABLE_SLOTS, CodedIndexType, TableId},
    ColumnKind,
};

/// `HeapSizes` flag: `#Strings` indexes are 4 bytes
pub const HEAP_LARGE_STRINGS: u8 = 0x01;
/// `HeapSizes` flag: `#GUID` indexes are 4 bytes
pub const HEAP_LARGE_GUID: u8 = 0x02;
/// `HeapSizes` flag: `#Blob` indexes are 4 bytes
pub const HEAP_LARGE_BLOB: u8 = 0x04;

/// Row count and index width of one table.
#[derive(Clone, Copy, Default, PartialEq, Debug)]
pub struct TableRowInfo {
    /// Number of rows
    pub rows: u32,
    /// Bits needed to hold any row number
    pub bits: u8,
    /// Simple indexes into this table are 4 bytes
    pub is_large: bool,
}

impl TableRowInfo {
    /// Derive widths from a row count.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(rows: u32) -> Self {
        let bits = if rows == 0 {
            1
        } else {
            (32 - rows.leading_zeros()) as u8
        };

        Self {
            rows,
            bits,
            is_large: rows > u32::from(u16::MAX),
        }
    }
}

/// Column widths for a set of row counts and heap sizes.
///
/// Every column width in a `#~` stream is a function of the row counts of all tables and of the
/// `HeapSizes` flags, so the same type serves the reader (widths of the input) and the writer
/// (widths after rows were added).
#[derive(Clone, Debug)]
pub struct TableInfo {
    rows: Vec<TableRowInfo>,
    coded_indexes: Vec<u8>,
    heap_sizes: u8,
}

impl TableInfo {
    /// Build from per-table row counts (indexed by `TableId as usize`) and `HeapSizes` flags.
    #[must_use]
    pub fn new(row_counts: &[u32; TABLE_SLOTS], heap_sizes: u8) -> Self {
        let rows = row_counts.iter().map(|&rows| TableRowInfo::new(rows)).collect();
        let mut table_info = TableInfo {
            rows,
            coded_indexes: vec![0; CodedIndexType::COUNT],
            heap_sizes,
        };

        table_info.calculate_coded_index_bits();
        table_info
    }

    /// Row counts for the listed tables, everything else empty.
    #[cfg(test)]
    pub fn new_test(valid_tables: &[(TableId, u32)], heap_sizes: u8) -> Self {
        let mut counts = [0u32; TABLE_SLOTS];
        for (table, rows) in valid_tables {
            counts[*table as usize] = *rows;
        }
        TableInfo::new(&counts, heap_sizes)
    }

    /// Row information of `table`.
    #[must_use]
    pub fn get(&self, table: TableId) -> &TableRowInfo {
        &self.rows[table as usize]
    }

    /// Simple indexes into `table` are 4 bytes.
    #[must_use]
    pub fn is_large(&self, table: TableId) -> bool {
        self.rows[table as usize].is_large
    }

    /// `#Strings` indexes are 4 bytes.
    #[must_use]
    pub fn is_large_str(&self) -> bool {
        self.heap_sizes & HEAP_LARGE_STRINGS != 0
    }

    /// `#GUID` indexes are 4 bytes.
    #[must_use]
    pub fn is_large_guid(&self) -> bool {
        self.heap_sizes & HEAP_LARGE_GUID != 0
    }

    /// `#Blob` indexes are 4 bytes.
    #[must_use]
    pub fn is_large_blob(&self) -> bool {
        self.heap_sizes & HEAP_LARGE_BLOB != 0
    }

    /// Bits of a coded index of the given kind.
    #[must_use]
    pub fn coded_index_bits(&self, coded_index_type: CodedIndexType) -> u8 {
        self.coded_indexes[coded_index_type as usize]
    }

    /// Coded indexes of the given kind are 4 bytes.
    #[must_use]
    pub fn is_large_coded(&self, coded_index_type: CodedIndexType) -> bool {
        self.coded_indexes[coded_index_type as usize] > 16
    }

    /// Width in bytes of a column of the given kind.
    #[must_use]
    pub fn column_size(&self, kind: ColumnKind) -> usize {
        let large = match kind {
            ColumnKind::U16 => return 2,
            ColumnKind::U32 | ColumnKind::Token => return 4,
            ColumnKind::Str => self.is_large_str(),
            ColumnKind::Guid => self.is_large_guid(),
            ColumnKind::Blob => self.is_large_blob(),
            ColumnKind::Index(table) | ColumnKind::List(table) => self.is_large(table),
            ColumnKind::Coded(kind) => self.is_large_coded(kind),
        };
        if large {
            4
        } else {
            2
        }
    }

    /// True if the column is stored in 4 bytes.
    #[must_use]
    pub fn is_large_column(&self, kind: ColumnKind) -> bool {
        self.column_size(kind) == 4
    }

    /// Width in bytes of one row of `table`.
    #[must_use]
    pub fn row_size(&self, table: TableId) -> usize {
        table
            .columns()
            .iter()
            .map(|column| self.column_size(column.kind))
            .sum()
    }

    fn calculate_coded_index_bits(&mut self) {
        for coded_index in CodedIndexType::iter() {
            let max_bits = coded_index
                .tables()
                .iter()
                .flatten()
                .map(|table| self.rows[*table as usize].bits)
                .max()
                .unwrap_or(1);
            self.coded_indexes[coded_index as usize] = max_bits + coded_index.tag_bits();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_indexes() {
        let info = TableInfo::new_test(&[(TableId::MethodDef, 0xFFFF), (TableId::Field, 0x1_0000)], 0);
        assert!(!info.is_large(TableId::MethodDef));
        assert!(info.is_large(TableId::Field));
        assert_eq!(info.column_size(ColumnKind::Index(TableId::MethodDef)), 2);
        assert_eq!(info.column_size(ColumnKind::List(TableId::Field)), 4);
    }

    #[test]
    fn coded_indexes() {
        // 2 tag bits leave 14 bits for rows
        let info = TableInfo::new_test(&[(TableId::TypeRef, 0x3FFF)], 0);
        assert!(!info.is_large_coded(CodedIndexType::TypeDefOrRef));
        let info = TableInfo::new_test(&[(TableId::TypeRef, 0x4000)], 0);
        assert!(info.is_large_coded(CodedIndexType::TypeDefOrRef));

        // 5 tag bits leave 11 bits for rows
        let info = TableInfo::new_test(&[(TableId::MethodDef, 0x7FF)], 0);
        assert!(!info.is_large_coded(CodedIndexType::HasCustomAttribute));
        let info = TableInfo::new_test(&[(TableId::MethodDef, 0x800)], 0);
        assert!(info.is_large_coded(CodedIndexType::HasCustomAttribute));
        assert!(info.is_large_coded(CodedIndexType::HasCustomDebugInformation));
        assert!(!info.is_large_coded(CodedIndexType::MethodDefOrRef));
    }

    #[test]
    fn heaps_and_rows() {
        let info = TableInfo::new_test(&[(TableId::TypeDef, 4)], HEAP_LARGE_STRINGS | HEAP_LARGE_BLOB);
        assert!(info.is_large_str());
        assert!(!info.is_large_guid());
        assert!(info.is_large_blob());

        // Flags, Name, Namespace, Extends, FieldList, MethodList
        assert_eq!(info.row_size(TableId::TypeDef), 4 + 4 + 4 + 2 + 2 + 2);
        // Generation, Name, Mvid, EncId, EncBaseId
        assert_eq!(info.row_size(TableId::Module), 2 + 4 + 2 + 2 + 2);
    }
}
