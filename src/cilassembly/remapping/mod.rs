//! Keeping references valid while rows move.
//!
//! Inserting a `MethodDef` row in the middle of the table renumbers every later method, and
//! renumbering can in turn break the order of tables sorted by a coded index. This module turns
//! each such move into a [`RowMap`] and applies it to every place a row number can live:
//!
//! - table columns of the image and of the portable PDB ([`index`])
//! - metadata tokens embedded in existing IL bodies ([`body`])
//!
//! Entry point tokens and custom debug blobs are mapped by their owners using the same
//! [`RowMap`]s.

pub mod body;
pub mod index;

pub use body::{collect_token_patches, TokenPatch};
pub use index::{insert_method_row, remap_references, restore_sort_order, sorted_tables};

use crate::metadata::{tables::TableId, token::Token};

/// How the rows of one table were renumbered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowMap {
    /// A row was inserted at `at`; rows at or after it moved up by one
    Insert {
        /// Row number of the inserted row
        at: u32,
    },
    /// Rows were reordered; old row `r` is now row `new_rows[r - 1]`
    Permute(Vec<u32>),
}

impl RowMap {
    /// Build the map for [`crate::metadata::tables::Table::reorder`]'s `order` argument.
    #[must_use]
    pub fn from_order(order: &[u32]) -> RowMap {
        let mut new_rows = vec![0u32; order.len()];
        for (new, &old) in (1u32..).zip(order) {
            if let Some(slot) = new_rows.get_mut(old as usize - 1) {
                *slot = new;
            }
        }
        RowMap::Permute(new_rows)
    }

    /// New number of old row `rid`. Row 0 (null) and rows outside a permutation are unchanged.
    #[must_use]
    pub fn map(&self, rid: u32) -> u32 {
        if rid == 0 {
            return 0;
        }
        match self {
            RowMap::Insert { at } if rid >= *at => rid + 1,
            RowMap::Insert { .. } => rid,
            RowMap::Permute(new_rows) => new_rows.get(rid as usize - 1).copied().unwrap_or(rid),
        }
    }

    /// Apply the map to `token` if it points into `table`.
    #[must_use]
    pub fn map_token(&self, table: TableId, token: Token) -> Token {
        if token.table_id() == Some(table) && !token.is_null() {
            Token::from_parts(table, self.map(token.row()))
        } else {
            token
        }
    }
}
