//! Metadata tables (ECMA-335 II.22) and the portable PDB tables.
//!
//! Every table is held as rows of raw column values in a [`Table`]. [`TableId::columns`]
//! describes each column, which is enough to read and write the table at any index width and to
//! find every column that refers to a given table when rows move.

mod schema;
mod sorting;
mod table;
mod types;

pub use schema::{columns, Column, ColumnKind};
pub use sorting::{sort_order, SortKey};
pub use table::Table;
pub use types::*;
