//! Row remapping inside the metadata tables.
//!
//! [`remap_references`] rewrites every column that can hold a row of a given table: plain
//! indexes, coded indexes and the raw tokens of the EnC tables. List columns are left alone; the
//! only list that has to follow an insertion is `TypeDef.MethodList`, which
//! [`insert_method_row`] adjusts itself because only the lists of *later* types move.
//!
//! Coded index values are `row << tag_bits | tag`, so renumbering rows of one table can change the
//! relative order of coded keys that point into different tables. [`restore_sort_order`]
//! re-sorts the affected tables and feeds each resulting permutation back through
//! [`remap_references`] until every maintained table is in order.

use strum::IntoEnumIterator;

use crate::{
    cilassembly::remapping::RowMap,
    metadata::{
        streams::TablesHeader,
        tables::{columns, sort_order, ColumnKind, TableId},
    },
    Result,
};

/// Rewrite every reference to rows of `target` in `tables` through `map`.
pub fn remap_references(tables: &mut TablesHeader, target: TableId, map: &RowMap) {
    for table in TableId::iter() {
        if tables.row_count(table) == 0 {
            continue;
        }

        for (position, column) in table.columns().iter().enumerate() {
            match column.kind {
                ColumnKind::Index(referenced) if referenced == target => {
                    tables
                        .table_mut(table)
                        .map_column(position, |_, value| map.map(value));
                }
                ColumnKind::Coded(coded) if coded.references(target) => {
                    tables.table_mut(table).map_column(position, |_, value| {
                        match coded.decode(value) {
                            Some((referenced, row)) if referenced == target => {
                                coded.encode(target, map.map(row)).unwrap_or(value)
                            }
                            _ => value,
                        }
                    });
                }
                ColumnKind::Token => {
                    tables.table_mut(table).map_column(position, |_, value| {
                        if value >> 24 == target as u32 {
                            (value & 0xFF00_0000) | map.map(value & 0x00FF_FFFF)
                        } else {
                            value
                        }
                    });
                }
                _ => {}
            }
        }
    }
}

/// Tables with a sort key whose rows are currently in key order.
///
/// Only these are kept sorted after remapping; a table that arrived unsorted is left as it is.
#[must_use]
pub fn sorted_tables(tables: &TablesHeader) -> Vec<TableId> {
    TableId::iter()
        .filter(|&table| {
            table.sort_key().is_some()
                && tables.row_count(table) > 1
                && sort_order(tables.table(table)).is_none()
        })
        .collect()
}

/// Re-sort the `maintained` tables of every set and propagate the permutations.
///
/// `sets` holds the image tables and, if present, the PDB tables; a table id lives in at most
/// one of them, but references to it may live in both. Returns the number of permutations
/// applied.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the tables do not settle, which only happens for
/// references that form a cycle through sort keys.
pub fn restore_sort_order(
    sets: &mut [&mut TablesHeader],
    maintained: &[Vec<TableId>],
) -> Result<usize> {
    let limit = maintained.iter().map(Vec::len).sum::<usize>() * 4 + 4;
    let mut applied = 0;

    loop {
        let mut changed = false;
        for (set, tables) in maintained.iter().enumerate() {
            for &table in tables {
                let Some(order) = sets
                    .get(set)
                    .and_then(|header| sort_order(header.table(table)))
                else {
                    continue;
                };

                log::debug!("Re-sorting {:?} ({} rows)", table, order.len());
                sets[set].table_mut(table).reorder(&order)?;
                let map = RowMap::from_order(&order);
                for header in sets.iter_mut() {
                    remap_references(header, table, &map);
                }

                applied += 1;
                changed = true;
                if applied > limit {
                    return Err(malformed_error!(
                        "Sorted tables did not settle after {} permutations",
                        applied
                    ));
                }
            }
        }

        if !changed {
            return Ok(applied);
        }
    }
}

/// Insert `row` as a new method of the type `owner` (a `TypeDef` row) and return its row.
///
/// The new row goes at the end of the owner's method run. Every reference to a later method is
/// shifted in `image` and `pdb`, the method lists of later types move up, and an empty
/// `MethodDebugInformation` row keeps the PDB aligned with the method table. The `ParamList`
/// column of `row` is overwritten so the new method owns no parameters. Sorted tables are
/// re-sorted afterwards.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `owner` does not exist or the method lists are
/// inconsistent.
pub fn insert_method_row(
    image: &mut TablesHeader,
    pdb: Option<&mut TablesHeader>,
    owner: u32,
    row: &[u32],
) -> Result<u32> {
    let type_count = image.row_count(TableId::TypeDef);
    let method_count = image.row_count(TableId::MethodDef);
    if owner == 0 || owner > type_count {
        return Err(malformed_error!("TypeDef row {} does not exist", owner));
    }

    let at = if owner < type_count {
        image
            .table(TableId::TypeDef)
            .get(owner + 1, columns::typedef::METHOD_LIST)
            .unwrap_or(method_count + 1)
    } else {
        method_count + 1
    };
    if at == 0 || at > method_count + 1 {
        return Err(malformed_error!(
            "MethodList {} of TypeDef row {} is outside the method table",
            at,
            owner + 1
        ));
    }

    let maintained_image = sorted_tables(image);
    let mut pdb = pdb;
    let maintained_pdb = pdb.as_deref().map(sorted_tables).unwrap_or_default();

    let param_list = image
        .table(TableId::MethodDef)
        .get(at, columns::methoddef::PARAM_LIST)
        .unwrap_or(image.row_count(TableId::Param) + 1);

    let map = RowMap::Insert { at };
    remap_references(image, TableId::MethodDef, &map);
    image
        .table_mut(TableId::TypeDef)
        .map_column(columns::typedef::METHOD_LIST, |rid, value| {
            if rid > owner {
                value + 1
            } else {
                value
            }
        });

    let mut new_row = row.to_vec();
    if let Some(slot) = new_row.get_mut(columns::methoddef::PARAM_LIST) {
        *slot = param_list;
    }
    image.table_mut(TableId::MethodDef).insert(at, &new_row)?;
    log::debug!(
        "Inserted MethodDef row {} (ParamList {}) for TypeDef row {}",
        at,
        param_list,
        owner
    );

    if let Some(pdb) = pdb.as_deref_mut() {
        remap_references(pdb, TableId::MethodDef, &map);
        let debug_rows = pdb.row_count(TableId::MethodDebugInformation);
        if debug_rows == method_count {
            pdb.table_mut(TableId::MethodDebugInformation)
                .insert(at, &[0, 0])?;
        } else if debug_rows != 0 {
            log::warn!(
                "PDB has {} MethodDebugInformation rows for {} methods; not adding a row",
                debug_rows,
                method_count
            );
        }
    }

    let permutations = match pdb {
        Some(pdb) => restore_sort_order(&mut [image, pdb], &[maintained_image, maintained_pdb])?,
        None => restore_sort_order(&mut [image], &[maintained_image])?,
    };
    if permutations > 0 {
        log::debug!("Applied {} sort permutation(s) after the insertion", permutations);
    }

    Ok(at)
}
