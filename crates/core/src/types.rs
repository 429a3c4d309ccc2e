//! Cell-level types for Tabula
//!
//! This module defines the shapes exchanged with the table substrate:
//! - Column: (family, qualifier) storage coordinate
//! - Row: a physical row key plus its cells
//! - RowMutation: puts and deletes applied atomically to one row
//! - ScanRange: half-open `[start, end)` row key range

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Schema version number, strictly increasing per (table, entity)
pub type SchemaVersion = u32;

/// Storage coordinate of a cell
///
/// Columns order by family, then qualifier bytes, which is the order the
/// substrate keeps cells in within a row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Column {
    /// Column family
    pub family: String,
    /// Column qualifier (arbitrary bytes)
    pub qualifier: Vec<u8>,
}

impl Column {
    /// Create a column from a family and qualifier
    pub fn new(family: impl Into<String>, qualifier: impl AsRef<[u8]>) -> Self {
        Self {
            family: family.into(),
            qualifier: qualifier.as_ref().to_vec(),
        }
    }

    /// Qualifier as UTF-8, if valid
    pub fn qualifier_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.qualifier).ok()
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.family,
            String::from_utf8_lossy(&self.qualifier)
        )
    }
}

/// A physical row: key plus cells
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Row {
    /// Physical row key
    pub key: Vec<u8>,
    /// Cells by column
    pub cells: BTreeMap<Column, Vec<u8>>,
}

impl Row {
    /// Create an empty row
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            cells: BTreeMap::new(),
        }
    }

    /// Value stored at `column`
    pub fn get(&self, column: &Column) -> Option<&[u8]> {
        self.cells.get(column).map(|v| v.as_slice())
    }

    /// Cells of one family whose qualifier starts with `prefix`, in qualifier order
    pub fn cells_with_prefix<'a>(
        &'a self,
        family: &'a str,
        prefix: &'a [u8],
    ) -> impl Iterator<Item = (&'a Column, &'a Vec<u8>)> + 'a {
        self.cells
            .range(Column::new(family, prefix)..)
            .take_while(move |(c, _)| c.family == family && c.qualifier.starts_with(prefix))
    }

    /// True if the row holds no cells
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Puts and deletes applied to a single row as one atomic unit
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowMutation {
    /// Physical row key
    pub row: Vec<u8>,
    /// Cells to write
    pub puts: Vec<(Column, Vec<u8>)>,
    /// Cells to remove
    pub deletes: Vec<Column>,
}

impl RowMutation {
    /// Create an empty mutation for `row`
    pub fn new(row: impl Into<Vec<u8>>) -> Self {
        Self {
            row: row.into(),
            puts: Vec::new(),
            deletes: Vec::new(),
        }
    }

    /// Add a cell write
    pub fn put(&mut self, column: Column, value: impl Into<Vec<u8>>) -> &mut Self {
        self.puts.push((column, value.into()));
        self
    }

    /// Add a cell delete
    pub fn delete(&mut self, column: Column) -> &mut Self {
        self.deletes.push(column);
        self
    }

    /// True if the mutation changes nothing
    pub fn is_empty(&self) -> bool {
        self.puts.is_empty() && self.deletes.is_empty()
    }
}

/// Half-open row key range `[start, end)`; `None` bounds are unbounded
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanRange {
    /// Inclusive lower bound
    pub start: Option<Vec<u8>>,
    /// Exclusive upper bound
    pub end: Option<Vec<u8>>,
}

impl ScanRange {
    /// Range covering the whole table
    pub fn all() -> Self {
        Self::default()
    }

    /// Range with explicit bounds
    pub fn new(start: Option<Vec<u8>>, end: Option<Vec<u8>>) -> Self {
        Self { start, end }
    }

    /// Range of all row keys starting with `prefix`
    pub fn prefix(prefix: &[u8]) -> Self {
        Self {
            start: Some(prefix.to_vec()),
            end: prefix_successor(prefix),
        }
    }

    /// True if `key` falls inside the range
    pub fn contains(&self, key: &[u8]) -> bool {
        let above_start = self.start.as_deref().map_or(true, |s| key >= s);
        let below_end = self.end.as_deref().map_or(true, |e| key < e);
        above_start && below_end
    }
}

/// Smallest key greater than every key with the given prefix
///
/// Returns `None` when the prefix is empty or all `0xFF`.
fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}
