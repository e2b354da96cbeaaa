use crate::metadata::tables::{Table, TableId};

/// Key columns of a table that must be kept sorted (ECMA-335 II.22, portable PDB tables).
///
/// Rows compare by the raw values of the key columns in order. For coded index columns this is
/// the encoded value, which is what the runtime binary-searches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey(pub &'static [usize]);

impl TableId {
    /// Sort key of this table, `None` for tables without an ordering requirement.
    #[must_use]
    pub fn sort_key(self) -> Option<SortKey> {
        let columns: &'static [usize] = match self {
            TableId::InterfaceImpl
            | TableId::CustomAttribute
            | TableId::FieldMarshal
            | TableId::MethodImpl
            | TableId::NestedClass
            | TableId::GenericParamConstraint
            | TableId::StateMachineMethod
            | TableId::CustomDebugInformation => &[0],
            TableId::Constant
            | TableId::DeclSecurity
            | TableId::FieldLayout
            | TableId::ImplMap
            | TableId::FieldRVA => &[1],
            TableId::ClassLayout | TableId::MethodSemantics => &[2],
            // Owner, then Number
            TableId::GenericParam => &[2, 0],
            // Method, then StartOffset
            TableId::LocalScope => &[0, 4],
            _ => return None,
        };
        Some(SortKey(columns))
    }
}

/// Stable order that sorts `table` by its key.
///
/// Returns `None` if the table has no key or is already in order, otherwise the old rid of each
/// new row, suitable for [`Table::reorder`].
#[must_use]
pub fn sort_order(table: &Table) -> Option<Vec<u32>> {
    let SortKey(key) = table.id().sort_key()?;
    let key_of = |rid: u32| -> Vec<u32> {
        table
            .row(rid)
            .map(|row| key.iter().map(|&column| row[column]).collect())
            .unwrap_or_default()
    };

    let mut order: Vec<u32> = (1..=table.row_count()).collect();
    order.sort_by_cached_key(|&rid| key_of(rid));

    if order.iter().zip(1..).all(|(&old, new)| old == new) {
        None
    } else {
        Some(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_sorted() {
        let mut table = Table::new(TableId::NestedClass);
        table.push(&[2, 1]).unwrap();
        table.push(&[3, 1]).unwrap();
        assert_eq!(sort_order(&table), None);

        let mut unsorted = Table::new(TableId::ModuleRef);
        unsorted.push(&[9]).unwrap();
        unsorted.push(&[1]).unwrap();
        assert_eq!(sort_order(&unsorted), None);
    }

    #[test]
    fn stable_on_equal_keys() {
        let mut table = Table::new(TableId::CustomAttribute);
        table.push(&[0x40, 0x0B, 1]).unwrap();
        table.push(&[0x21, 0x0B, 2]).unwrap();
        table.push(&[0x40, 0x0B, 3]).unwrap();
        table.push(&[0x21, 0x0B, 4]).unwrap();

        let order = sort_order(&table).unwrap();
        assert_eq!(order, [2, 4, 1, 3]);
        table.reorder(&order).unwrap();
        let blobs: Vec<u32> = table.rows().map(|(_, row)| row[2]).collect();
        assert_eq!(blobs, [2, 4, 1, 3]);
    }

    #[test]
    fn generic_param_secondary_key() {
        // Number, Flags, Owner, Name
        let mut table = Table::new(TableId::GenericParam);
        table.push(&[1, 0, 0x0A, 0]).unwrap();
        table.push(&[0, 0, 0x0A, 0]).unwrap();
        table.push(&[0, 0, 0x05, 0]).unwrap();
        assert_eq!(sort_order(&table), Some(vec![3, 2, 1]));
    }

    #[test]
    fn keys_exist_for_sorted_tables() {
        for table in [
            TableId::ClassLayout,
            TableId::Constant,
            TableId::CustomAttribute,
            TableId::DeclSecurity,
            TableId::FieldLayout,
            TableId::FieldMarshal,
            TableId::FieldRVA,
            TableId::GenericParam,
            TableId::GenericParamConstraint,
            TableId::ImplMap,
            TableId::InterfaceImpl,
            TableId::MethodImpl,
            TableId::MethodSemantics,
            TableId::NestedClass,
            TableId::LocalScope,
            TableId::StateMachineMethod,
            TableId::CustomDebugInformation,
        ] {
            let key = table.sort_key().unwrap();
            assert!(key.0.iter().all(|&column| column < table.columns().len()));
        }
        assert_eq!(TableId::TypeDef.sort_key(), None);
    }
}
