use crate::{metadata::tables::TableId, Result};

/// Rows of one metadata table as raw column values.
///
/// Rows are 1-based like metadata tokens. Values are stored without width information: string,
/// blob and GUID columns hold heap offsets/indexes, index columns hold rows, coded columns hold
/// the encoded value. Widths are decided when the table is serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    id: TableId,
    width: usize,
    values: Vec<u32>,
}

impl Table {
    /// Empty table.
    #[must_use]
    pub fn new(id: TableId) -> Self {
        Table {
            id,
            width: id.columns().len(),
            values: Vec::new(),
        }
    }

    /// Which table this is.
    #[must_use]
    pub fn id(&self) -> TableId {
        self.id
    }

    /// Number of columns.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of rows.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn row_count(&self) -> u32 {
        (self.values.len() / self.width) as u32
    }

    /// True if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column values of row `rid`.
    #[must_use]
    pub fn row(&self, rid: u32) -> Option<&[u32]> {
        let start = self.start(rid)?;
        Some(&self.values[start..start + self.width])
    }

    /// One column value of row `rid`.
    #[must_use]
    pub fn get(&self, rid: u32, column: usize) -> Option<u32> {
        if column >= self.width {
            return None;
        }
        self.row(rid).map(|row| row[column])
    }

    /// Overwrite one column value.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for a missing row or column.
    pub fn set(&mut self, rid: u32, column: usize, value: u32) -> Result<()> {
        if column >= self.width {
            return Err(out_of_bounds_error!());
        }
        let start = self.start(rid).ok_or_else(|| out_of_bounds_error!())?;
        self.values[start + column] = value;
        Ok(())
    }

    /// Append a row and return its rid.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the row has the wrong number of columns.
    pub fn push(&mut self, row: &[u32]) -> Result<u32> {
        self.check_width(row)?;
        self.values.extend_from_slice(row);
        Ok(self.row_count())
    }

    /// Insert a row so that it becomes row `rid`; later rows move up by one.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a wrong column count and
    /// [`crate::Error::OutOfBounds`] if `rid` is neither an existing row nor one past the end.
    pub fn insert(&mut self, rid: u32, row: &[u32]) -> Result<()> {
        self.check_width(row)?;
        if rid == 0 || rid > self.row_count() + 1 {
            return Err(out_of_bounds_error!());
        }

        let at = (rid as usize - 1) * self.width;
        self.values.splice(at..at, row.iter().copied());
        Ok(())
    }

    /// Iterate `(rid, row)` pairs.
    pub fn rows(&self) -> impl Iterator<Item = (u32, &[u32])> {
        self.values
            .chunks_exact(self.width)
            .enumerate()
            .map(|(index, row)| (index as u32 + 1, row))
    }

    /// Apply `f` to every value of column `column`.
    pub fn map_column(&mut self, column: usize, mut f: impl FnMut(u32, u32) -> u32) {
        if column >= self.width {
            return;
        }
        for (index, row) in self.values.chunks_exact_mut(self.width).enumerate() {
            row[column] = f(index as u32 + 1, row[column]);
        }
    }

    /// Reorder rows: the new row `i + 1` is the old row `order[i]`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `order` is not a permutation of the rows.
    pub fn reorder(&mut self, order: &[u32]) -> Result<()> {
        if order.len() != self.row_count() as usize {
            return Err(malformed_error!(
                "Permutation of {} rows applied to {} with {} rows",
                order.len(),
                self.id as u8,
                self.row_count()
            ));
        }

        let mut values = Vec::with_capacity(self.values.len());
        for &rid in order {
            let row = self
                .row(rid)
                .ok_or_else(|| malformed_error!("Invalid row {} in permutation", rid))?;
            values.extend_from_slice(row);
        }
        self.values = values;
        Ok(())
    }

    fn start(&self, rid: u32) -> Option<usize> {
        if rid == 0 || rid > self.row_count() {
            return None;
        }
        Some((rid as usize - 1) * self.width)
    }

    fn check_width(&self, row: &[u32]) -> Result<()> {
        if row.len() != self.width {
            return Err(malformed_error!(
                "Row with {} columns for table {:?} with {} columns",
                row.len(),
                self.id,
                self.width
            ));
        }
        Ok(())
    }
}
