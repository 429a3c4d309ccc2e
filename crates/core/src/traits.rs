//! Core traits for the table substrate
//!
//! This module defines the TableStore and RowScanner traits: the sorted,
//! column-family table primitives the entity layer is built on. Anything
//! offering these operations (an in-memory table, a remote Bigtable-style
//! cluster client) can back a Dao without changes to upper layers.
//!
//! Thread safety: implementations must be safe to call concurrently from
//! multiple threads (requires Send + Sync).

use crate::error::Result;
use crate::types::{Column, Row, RowMutation, ScanRange};

/// Sorted table substrate with column families
///
/// Rows are kept in lexicographic row key order. Every method is a single
/// request from the caller's perspective; implementations guarantee that all
/// puts and deletes of one [`RowMutation`] become visible together and that
/// `increment` is atomic per cell. Nothing is atomic across rows.
pub trait TableStore: Send + Sync {
    /// Create a table if it does not exist yet
    fn create_table(&self, table: &str) -> Result<()>;

    /// Check whether a table exists
    fn table_exists(&self, table: &str) -> bool;

    /// Read every cell of a row
    ///
    /// Returns `None` if the row does not exist.
    ///
    /// # Errors
    ///
    /// Returns `TableNotFound` if the table was never created.
    fn get_row(&self, table: &str, row: &[u8]) -> Result<Option<Row>>;

    /// Apply puts and deletes to one row atomically
    ///
    /// # Errors
    ///
    /// Returns `TableNotFound` if the table was never created.
    fn mutate_row(&self, table: &str, mutation: RowMutation) -> Result<()>;

    /// Apply `mutation` only if `column` of `mutation.row` currently holds
    /// `expected` (`None` meaning "no such cell")
    ///
    /// The check and the write happen under the same row lock. Returns
    /// whether the mutation was applied.
    fn check_and_mutate(
        &self,
        table: &str,
        column: &Column,
        expected: Option<&[u8]>,
        mutation: RowMutation,
    ) -> Result<bool>;

    /// Remove a row and all its cells
    ///
    /// Returns `true` if the row existed.
    fn delete_row(&self, table: &str, row: &[u8]) -> Result<bool>;

    /// Atomically add `amount` to an 8-byte big-endian counter cell
    ///
    /// A missing cell counts as zero. Returns the value after the add.
    /// Rows are never created by an increment.
    ///
    /// # Errors
    ///
    /// Returns `RowNotFound` if the row does not exist, and a storage error
    /// if the existing cell is not 8 bytes wide.
    fn increment(&self, table: &str, row: &[u8], column: &Column, amount: i64) -> Result<i64>;

    /// Open a scan over `range`, fetching `caching` rows per round-trip
    ///
    /// The returned scanner holds a substrate resource until it is closed.
    fn scan(&self, table: &str, range: ScanRange, caching: usize) -> Result<Box<dyn RowScanner>>;
}

/// Open range scan over a table
///
/// Rows are returned in row key order. A scanner is single-pass.
pub trait RowScanner: Send {
    /// Fetch the next row, or `None` once the range is exhausted
    fn next_row(&mut self) -> Result<Option<Row>>;

    /// Release the underlying scan resource
    ///
    /// Idempotent. After close, `next_row` returns `Ok(None)`.
    fn close(&mut self);
}
