//! Data blocks: ordered named columns with a shared row count.

use crate::{
    column::{
        Column,
        ColumnRef,
    },
    types::Type,
    Error,
    Result,
};

/// Block metadata carried in the block-info preamble.
#[derive(Debug, Clone)]
pub struct BlockInfo {
    /// Whether the block holds overflow rows past a GROUP BY limit.
    pub is_overflows: u8,
    /// Two-level aggregation bucket, -1 when not applicable.
    pub bucket_num: i32,
}

impl Default for BlockInfo {
    fn default() -> Self {
        Self { is_overflows: 0, bucket_num: -1 }
    }
}

/// A columnar batch: unique named columns, all of the same row count.
///
/// A block with zero rows whose columns carry only names and types is a
/// schema block; the insert handshake uses one to communicate the target
/// table's shape, and a terminal zero-row block ends an insert.
#[derive(Clone, Default)]
pub struct Block {
    columns: Vec<ColumnItem>,
    rows: usize,
    info: BlockInfo,
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field(
                "columns",
                &self
                    .columns
                    .iter()
                    .map(|item| (item.name.as_str(), item.column.column_type()))
                    .collect::<Vec<_>>(),
            )
            .field("rows", &self.rows)
            .field("info", &self.info)
            .finish()
    }
}

#[derive(Clone)]
struct ColumnItem {
    name: String,
    column: ColumnRef,
}

impl Block {
    /// Create an empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a named column. The first column fixes the block's row
    /// count; later columns must match it, and names must be unique.
    pub fn append_column(
        &mut self,
        name: impl Into<String>,
        column: ColumnRef,
    ) -> Result<()> {
        let name = name.into();

        if self.columns.iter().any(|item| item.name == name) {
            return Err(Error::Validation(format!(
                "duplicate column name '{}' in block",
                name
            )));
        }

        if self.columns.is_empty() {
            self.rows = column.size();
        } else if column.size() != self.rows {
            return Err(Error::Validation(format!(
                "column '{}' has {} rows, block has {}",
                name,
                column.size(),
                self.rows
            )));
        }

        self.columns.push(ColumnItem { name, column });
        Ok(())
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Column by position.
    pub fn column(&self, index: usize) -> Option<ColumnRef> {
        self.columns.get(index).map(|item| item.column.clone())
    }

    /// Column name by position.
    pub fn column_name(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(|item| item.name.as_str())
    }

    /// Column by name.
    pub fn column_by_name(&self, name: &str) -> Option<ColumnRef> {
        self.columns
            .iter()
            .find(|item| item.name == name)
            .map(|item| item.column.clone())
    }

    /// Block metadata.
    pub fn info(&self) -> &BlockInfo {
        &self.info
    }

    /// Replace the block metadata.
    pub fn set_info(&mut self, info: BlockInfo) {
        self.info = info;
    }

    /// Whether the block has no rows or no columns.
    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.columns.is_empty()
    }

    /// Recompute the row count from the columns, verifying agreement.
    pub fn refresh_row_count(&mut self) -> Result<usize> {
        let Some(first) = self.columns.first() else {
            self.rows = 0;
            return Ok(0);
        };

        let rows = first.column.size();
        for item in &self.columns {
            if item.column.size() != rows {
                return Err(Error::Validation(format!(
                    "column '{}' has {} rows, expected {}",
                    item.name,
                    item.column.size(),
                    rows
                )));
            }
        }
        self.rows = rows;
        Ok(rows)
    }

    /// Iterate over `(name, type, column)` triples in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Type, ColumnRef)> {
        self.columns.iter().map(|item| {
            (
                item.name.as_str(),
                item.column.column_type(),
                item.column.clone(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::numeric::ColumnUInt64;
    use std::sync::Arc;

    fn column_of(values: &[u64]) -> ColumnRef {
        let mut col = ColumnUInt64::new();
        for &v in values {
            col.append(v);
        }
        Arc::new(col)
    }

    #[test]
    fn append_fixes_row_count() {
        let mut block = Block::new();
        block.append_column("id", column_of(&[1, 2, 3])).unwrap();

        assert_eq!(block.column_count(), 1);
        assert_eq!(block.row_count(), 3);
        assert!(!block.is_empty());
    }

    #[test]
    fn mismatched_rows_rejected() {
        let mut block = Block::new();
        block.append_column("a", column_of(&[1, 2])).unwrap();
        assert!(block.append_column("b", column_of(&[1, 2, 3])).is_err());
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut block = Block::new();
        block.append_column("a", column_of(&[1])).unwrap();
        assert!(block.append_column("a", column_of(&[2])).is_err());
    }

    #[test]
    fn lookup_by_name_and_index() {
        let mut block = Block::new();
        block.append_column("first", column_of(&[1])).unwrap();
        block.append_column("second", column_of(&[2])).unwrap();

        assert_eq!(block.column_name(0), Some("first"));
        assert!(block.column_by_name("second").is_some());
        assert!(block.column_by_name("missing").is_none());
        assert!(block.column(2).is_none());

        let names: Vec<&str> = block.iter().map(|(name, _, _)| name).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn default_info_has_sentinel_bucket() {
        let block = Block::new();
        assert_eq!(block.info().bucket_num, -1);
        assert_eq!(block.info().is_overflows, 0);
    }

    #[test]
    fn empty_block_is_schema_marker() {
        let block = Block::new();
        assert!(block.is_empty());
        assert_eq!(block.row_count(), 0);
    }
}
