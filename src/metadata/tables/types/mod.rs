//! Shared building blocks of the metadata tables: table identifiers, coded index kinds, and the
//! row-count dependent column widths.

mod codedindex;
mod tableid;
mod tableinfo;

pub use codedindex::CodedIndexType;
pub use tableid::{TableId, TABLE_SLOTS};
pub use tableinfo::{
    TableInfo, TableRowInfo, HEAP_LARGE_BLOB, HEAP_LARGE_GUID, HEAP_LARGE_STRINGS,
};
