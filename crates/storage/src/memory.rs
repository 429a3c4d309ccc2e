//! MemTableStore: in-memory sorted table substrate
//!
//! This module implements the TableStore trait using:
//! - `DashMap<String, Arc<MemTable>>` as the table registry
//! - `BTreeMap<row key, BTreeMap<Column, bytes>>` per table for ordered rows
//! - `parking_lot::RwLock` per table for thread-safe access
//!
//! # Design Notes
//!
//! - **Row atomicity**: a mutation holds the table write lock for all of its
//!   puts and deletes, so readers never see half a row update
//! - **Empty rows vanish**: a row whose last cell is deleted is removed
//! - **No cell history**: each column keeps only its latest value

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::info;

use tabula_core::{Column, Error, Result, Row, RowMutation, RowScanner, ScanRange, TableStore};

use crate::scanner::MemScanner;

pub(crate) type Cells = BTreeMap<Column, Vec<u8>>;

/// One table: rows in key order
#[derive(Debug, Default)]
pub(crate) struct MemTable {
    pub(crate) rows: RwLock<BTreeMap<Vec<u8>, Cells>>,
}

impl MemTable {
    fn apply(rows: &mut BTreeMap<Vec<u8>, Cells>, mutation: RowMutation) {
        let RowMutation { row, puts, deletes } = mutation;
        let cells = rows.entry(row.clone()).or_default();
        for (column, value) in puts {
            cells.insert(column, value);
        }
        for column in &deletes {
            cells.remove(column);
        }
        if cells.is_empty() {
            rows.remove(&row);
        }
    }
}

/// In-memory table substrate
///
/// Thread-safe through `DashMap` and per-table `parking_lot::RwLock`.
/// Cloning is cheap and clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemTableStore {
    tables: Arc<DashMap<String, Arc<MemTable>>>,
    open_scanners: Arc<AtomicUsize>,
}

impl MemTableStore {
    /// Create an empty store with no tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with the given tables already created
    pub fn with_tables(tables: &[&str]) -> Self {
        let store = Self::new();
        for table in tables {
            store.tables.insert((*table).to_string(), Arc::default());
        }
        store
    }

    /// Number of scanners opened and not yet closed
    pub fn open_scanners(&self) -> usize {
        self.open_scanners.load(Ordering::SeqCst)
    }

    /// Number of rows currently in `table`
    pub fn row_count(&self, table: &str) -> Result<usize> {
        Ok(self.table(table)?.rows.read().len())
    }

    /// Remove every row of `table`, keeping the table itself
    pub fn truncate(&self, table: &str) -> Result<()> {
        self.table(table)?.rows.write().clear();
        Ok(())
    }

    fn table(&self, table: &str) -> Result<Arc<MemTable>> {
        self.tables
            .get(table)
            .map(|t| Arc::clone(t.value()))
            .ok_or_else(|| Error::TableNotFound(table.to_string()))
    }
}

impl TableStore for MemTableStore {
    fn create_table(&self, table: &str) -> Result<()> {
        if !self.tables.contains_key(table) {
            self.tables.entry(table.to_string()).or_default();
            info!(target: "tabula::store", table, "Table created");
        }
        Ok(())
    }

    fn table_exists(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    fn get_row(&self, table: &str, row: &[u8]) -> Result<Option<Row>> {
        let t = self.table(table)?;
        let rows = t.rows.read();
        Ok(rows.get(row).map(|cells| Row {
            key: row.to_vec(),
            cells: cells.clone(),
        }))
    }

    fn mutate_row(&self, table: &str, mutation: RowMutation) -> Result<()> {
        let t = self.table(table)?;
        let mut rows = t.rows.write();
        MemTable::apply(&mut rows, mutation);
        Ok(())
    }

    fn check_and_mutate(
        &self,
        table: &str,
        column: &Column,
        expected: Option<&[u8]>,
        mutation: RowMutation,
    ) -> Result<bool> {
        let t = self.table(table)?;
        let mut rows = t.rows.write();
        let current = rows
            .get(&mutation.row)
            .and_then(|cells| cells.get(column))
            .map(|v| v.as_slice());
        if current != expected {
            return Ok(false);
        }
        MemTable::apply(&mut rows, mutation);
        Ok(true)
    }

    fn delete_row(&self, table: &str, row: &[u8]) -> Result<bool> {
        let t = self.table(table)?;
        let removed = t.rows.write().remove(row);
        Ok(removed.is_some())
    }

    fn increment(&self, table: &str, row: &[u8], column: &Column, amount: i64) -> Result<i64> {
        let t = self.table(table)?;
        let mut rows = t.rows.write();
        let cells = rows.get_mut(row).ok_or_else(|| Error::RowNotFound {
            table: table.to_string(),
            row: row.to_vec(),
        })?;
        let current = match cells.get(column) {
            None => 0,
            Some(bytes) => {
                let arr: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    Error::Storage(format!(
                        "column {} holds {} bytes, not an 8-byte counter",
                        column,
                        bytes.len()
                    ))
                })?;
                i64::from_be_bytes(arr)
            }
        };
        let next = current.checked_add(amount).ok_or_else(|| {
            Error::Storage(format!("counter overflow incrementing column {}", column))
        })?;
        cells.insert(column.clone(), next.to_be_bytes().to_vec());
        Ok(next)
    }

    fn scan(&self, table: &str, range: ScanRange, caching: usize) -> Result<Box<dyn RowScanner>> {
        let t = self.table(table)?;
        Ok(Box::new(MemScanner::open(
            t,
            range,
            caching,
            Arc::clone(&self.open_scanners),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(q: &str) -> Column {
        Column::new("f", q)
    }

    fn put(row: &str, q: &str, v: &str) -> RowMutation {
        let mut m = RowMutation::new(row.as_bytes().to_vec());
        m.put(col(q), v.as_bytes().to_vec());
        m
    }

    #[test]
    fn test_missing_table_is_error() {
        let store = MemTableStore::new();
        assert!(matches!(
            store.get_row("nope", b"r"),
            Err(Error::TableNotFound(_))
        ));
        assert!(matches!(
            store.mutate_row("nope", put("r", "q", "v")),
            Err(Error::TableNotFound(_))
        ));
    }

    #[test]
    fn test_create_table_is_idempotent() {
        let store = MemTableStore::new();
        store.create_table("t").unwrap();
        store.mutate_row("t", put("r", "q", "v")).unwrap();
        store.create_table("t").unwrap();
        assert!(store.table_exists("t"));
        assert_eq!(store.row_count("t").unwrap(), 1);
    }

    #[test]
    fn test_put_get_row() {
        let store = MemTableStore::with_tables(&["t"]);
        let mut m = RowMutation::new(b"r1".to_vec());
        m.put(col("a"), b"1".to_vec()).put(col("b"), b"2".to_vec());
        store.mutate_row("t", m).unwrap();

        let row = store.get_row("t", b"r1").unwrap().unwrap();
        assert_eq!(row.key, b"r1".to_vec());
        assert_eq!(row.get(&col("a")), Some(&b"1"[..]));
        assert_eq!(row.get(&col("b")), Some(&b"2"[..]));
        assert!(store.get_row("t", b"r2").unwrap().is_none());
    }

    #[test]
    fn test_mutation_merges_with_existing_cells() {
        let store = MemTableStore::with_tables(&["t"]);
        store.mutate_row("t", put("r", "a", "1")).unwrap();
        store.mutate_row("t", put("r", "b", "2")).unwrap();
        let row = store.get_row("t", b"r").unwrap().unwrap();
        assert_eq!(row.cells.len(), 2);
    }

    #[test]
    fn test_deleting_last_cell_removes_row() {
        let store = MemTableStore::with_tables(&["t"]);
        store.mutate_row("t", put("r", "a", "1")).unwrap();
        let mut m = RowMutation::new(b"r".to_vec());
        m.delete(col("a"));
        store.mutate_row("t", m).unwrap();
        assert!(store.get_row("t", b"r").unwrap().is_none());
        assert_eq!(store.row_count("t").unwrap(), 0);
    }

    #[test]
    fn test_delete_row() {
        let store = MemTableStore::with_tables(&["t"]);
        store.mutate_row("t", put("r", "a", "1")).unwrap();
        assert!(store.delete_row("t", b"r").unwrap());
        assert!(!store.delete_row("t", b"r").unwrap());
        assert!(store.get_row("t", b"r").unwrap().is_none());
    }

    #[test]
    fn test_check_and_mutate_absent() {
        let store = MemTableStore::with_tables(&["t"]);
        let applied = store
            .check_and_mutate("t", &col("v0"), None, put("r", "v0", "x"))
            .unwrap();
        assert!(applied);
        let applied = store
            .check_and_mutate("t", &col("v0"), None, put("r", "v0", "y"))
            .unwrap();
        assert!(!applied);
        let row = store.get_row("t", b"r").unwrap().unwrap();
        assert_eq!(row.get(&col("v0")), Some(&b"x"[..]));
    }

    #[test]
    fn test_check_and_mutate_expected_value() {
        let store = MemTableStore::with_tables(&["t"]);
        store.mutate_row("t", put("r", "q", "old")).unwrap();
        assert!(!store
            .check_and_mutate("t", &col("q"), Some(b"other"), put("r", "q", "new"))
            .unwrap());
        assert!(store
            .check_and_mutate("t", &col("q"), Some(b"old"), put("r", "q", "new"))
            .unwrap());
        let row = store.get_row("t", b"r").unwrap().unwrap();
        assert_eq!(row.get(&col("q")), Some(&b"new"[..]));
    }

    #[test]
    fn test_increment() {
        let store = MemTableStore::with_tables(&["t"]);
        store.mutate_row("t", put("r", "q", "v")).unwrap();
        assert_eq!(store.increment("t", b"r", &col("c"), 10).unwrap(), 10);
        assert_eq!(store.increment("t", b"r", &col("c"), 5).unwrap(), 15);
        assert_eq!(store.increment("t", b"r", &col("c"), -20).unwrap(), -5);
        let row = store.get_row("t", b"r").unwrap().unwrap();
        assert_eq!(row.get(&col("c")), Some(&(-5i64).to_be_bytes()[..]));
    }

    #[test]
    fn test_increment_never_creates_rows() {
        let store = MemTableStore::with_tables(&["t"]);
        assert!(matches!(
            store.increment("t", b"r", &col("c"), 1),
            Err(Error::RowNotFound { .. })
        ));
        assert!(store.get_row("t", b"r").unwrap().is_none());
    }

    #[test]
    fn test_increment_rejects_non_counter_cell() {
        let store = MemTableStore::with_tables(&["t"]);
        store.mutate_row("t", put("r", "c", "abc")).unwrap();
        assert!(matches!(
            store.increment("t", b"r", &col("c"), 1),
            Err(Error::Storage(_))
        ));
    }

    #[test]
    fn test_increment_overflow() {
        let store = MemTableStore::with_tables(&["t"]);
        store.mutate_row("t", put("r", "q", "v")).unwrap();
        store.increment("t", b"r", &col("c"), i64::MAX).unwrap();
        assert!(store.increment("t", b"r", &col("c"), 1).is_err());
    }

    #[test]
    fn test_truncate() {
        let store = MemTableStore::with_tables(&["t"]);
        store.mutate_row("t", put("a", "q", "1")).unwrap();
        store.mutate_row("t", put("b", "q", "1")).unwrap();
        store.truncate("t").unwrap();
        assert_eq!(store.row_count("t").unwrap(), 0);
        assert!(store.table_exists("t"));
    }
}
