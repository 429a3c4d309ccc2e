//! MemScanner: batched range scanner over a MemTable
//!
//! A scanner does not snapshot the table. It copies up to `caching` rows at a
//! time under a short read lock and resumes after the last key it returned,
//! so rows written concurrently may or may not be observed.

use std::collections::VecDeque;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tabula_core::{Result, Row, RowScanner, ScanRange};

use crate::memory::MemTable;

/// Range scanner handed out by [`crate::MemTableStore::scan`]
///
/// Counts as an open scan resource from creation until `close` (or drop).
pub struct MemScanner {
    table: Arc<MemTable>,
    range: ScanRange,
    caching: usize,
    buffer: VecDeque<Row>,
    last_key: Option<Vec<u8>>,
    exhausted: bool,
    open: bool,
    open_scanners: Arc<AtomicUsize>,
}

impl MemScanner {
    pub(crate) fn open(
        table: Arc<MemTable>,
        range: ScanRange,
        caching: usize,
        open_scanners: Arc<AtomicUsize>,
    ) -> Self {
        open_scanners.fetch_add(1, Ordering::SeqCst);
        Self {
            table,
            range,
            caching: caching.max(1),
            buffer: VecDeque::new(),
            last_key: None,
            exhausted: false,
            open: true,
            open_scanners,
        }
    }

    /// Whether the scanner still holds its resource
    pub fn is_open(&self) -> bool {
        self.open
    }

    fn lower_bound(&self) -> Bound<Vec<u8>> {
        match (&self.last_key, &self.range.start) {
            (Some(last), _) => Bound::Excluded(last.clone()),
            (None, Some(start)) => Bound::Included(start.clone()),
            (None, None) => Bound::Unbounded,
        }
    }

    /// BTreeMap::range panics on inverted bounds, so those ranges are empty here
    fn is_empty_range(lower: &Bound<Vec<u8>>, upper: &Bound<Vec<u8>>) -> bool {
        match (lower, upper) {
            (Bound::Included(l), Bound::Excluded(u)) => l >= u,
            (Bound::Excluded(l), Bound::Excluded(u)) => l >= u,
            _ => false,
        }
    }

    fn fill(&mut self) {
        let lower = self.lower_bound();
        let upper = match &self.range.end {
            Some(end) => Bound::Excluded(end.clone()),
            None => Bound::Unbounded,
        };
        if Self::is_empty_range(&lower, &upper) {
            self.exhausted = true;
            return;
        }

        let rows = self.table.rows.read();
        self.buffer.extend(
            rows.range((lower, upper))
                .take(self.caching)
                .map(|(key, cells)| Row {
                    key: key.clone(),
                    cells: cells.clone(),
                }),
        );
        drop(rows);

        if self.buffer.len() < self.caching {
            self.exhausted = true;
        }
        if let Some(last) = self.buffer.back() {
            self.last_key = Some(last.key.clone());
        }
    }
}

impl RowScanner for MemScanner {
    fn next_row(&mut self) -> Result<Option<Row>> {
        if !self.open {
            return Ok(None);
        }
        if self.buffer.is_empty() && !self.exhausted {
            self.fill();
        }
        Ok(self.buffer.pop_front())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.buffer.clear();
            self.open_scanners.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MemScanner {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use crate::MemTableStore;
    use proptest::prelude::*;
    use tabula_core::{Column, RowMutation, ScanRange, TableStore};

    fn store_with_rows(keys: &[&str]) -> MemTableStore {
        let store = MemTableStore::with_tables(&["t"]);
        for key in keys {
            let mut m = RowMutation::new(key.as_bytes().to_vec());
            m.put(Column::new("f", "q"), key.as_bytes().to_vec());
            store.mutate_row("t", m).unwrap();
        }
        store
    }

    fn collect(store: &MemTableStore, range: ScanRange, caching: usize) -> Vec<String> {
        let mut scanner = store.scan("t", range, caching).unwrap();
        let mut keys = Vec::new();
        while let Some(row) = scanner.next_row().unwrap() {
            keys.push(String::from_utf8(row.key).unwrap());
        }
        keys
    }

    #[test]
    fn test_full_scan_in_key_order() {
        let store = store_with_rows(&["c", "a", "b", "e", "d"]);
        for caching in [1, 2, 3, 100] {
            assert_eq!(
                collect(&store, ScanRange::all(), caching),
                vec!["a", "b", "c", "d", "e"]
            );
        }
    }

    #[test]
    fn test_bounded_scan() {
        let store = store_with_rows(&["a", "b", "c", "d", "e"]);
        let range = ScanRange::new(Some(b"b".to_vec()), Some(b"d".to_vec()));
        assert_eq!(collect(&store, range, 1), vec!["b", "c"]);
    }

    #[test]
    fn test_inverted_range_is_empty() {
        let store = store_with_rows(&["a", "b", "c"]);
        let range = ScanRange::new(Some(b"c".to_vec()), Some(b"a".to_vec()));
        assert!(collect(&store, range, 10).is_empty());
        let range = ScanRange::new(Some(b"b".to_vec()), Some(b"b".to_vec()));
        assert!(collect(&store, range, 10).is_empty());
    }

    #[test]
    fn test_open_scanner_accounting() {
        let store = store_with_rows(&["a", "b"]);
        assert_eq!(store.open_scanners(), 0);

        let mut scanner = store.scan("t", ScanRange::all(), 1).unwrap();
        assert_eq!(store.open_scanners(), 1);
        assert!(scanner.next_row().unwrap().is_some());

        scanner.close();
        assert_eq!(store.open_scanners(), 0);
        scanner.close();
        assert_eq!(store.open_scanners(), 0);
        assert!(scanner.next_row().unwrap().is_none());
    }

    #[test]
    fn test_drop_releases_scanner() {
        let store = store_with_rows(&["a"]);
        {
            let _scanner = store.scan("t", ScanRange::all(), 1).unwrap();
            assert_eq!(store.open_scanners(), 1);
        }
        assert_eq!(store.open_scanners(), 0);
    }

    #[test]
    fn test_scan_sees_rows_written_after_open_beyond_cursor() {
        let store = store_with_rows(&["a", "b"]);
        let mut scanner = store.scan("t", ScanRange::all(), 1).unwrap();
        assert_eq!(scanner.next_row().unwrap().unwrap().key, b"a".to_vec());

        let mut m = RowMutation::new(b"c".to_vec());
        m.put(Column::new("f", "q"), b"c".to_vec());
        store.mutate_row("t", m).unwrap();

        assert_eq!(scanner.next_row().unwrap().unwrap().key, b"b".to_vec());
        assert_eq!(scanner.next_row().unwrap().unwrap().key, b"c".to_vec());
        assert!(scanner.next_row().unwrap().is_none());
    }

    proptest! {
        #[test]
        fn prop_scan_returns_sorted_unique_keys(
            keys in proptest::collection::vec("[a-z]{1,4}", 0..40),
            caching in 1usize..8,
        ) {
            let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
            let store = store_with_rows(&refs);
            let mut expected = keys.clone();
            expected.sort();
            expected.dedup();
            prop_assert_eq!(collect(&store, ScanRange::all(), caching), expected);
            prop_assert_eq!(store.open_scanners(), 0);
        }
    }
}
