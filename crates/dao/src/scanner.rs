//! Entity scanner over a row key range
//!
//! ## States
//!
//! ```text
//! Open ──next──▶ Active ──next──▶ Active ...
//!   │               │
//!   └──end / error / close / drop──▶ Closed
//! ```
//!
//! The substrate scan is released exactly once, on the transition to
//! `Closed`. Reaching the end of the range, a decode or substrate error,
//! an explicit `close()` and dropping the scanner all take that path.

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use tabula_codec::Entity;
use tabula_core::{Result, RowScanner};
use tabula_schema::{EntitySchema, SchemaManager};

use crate::dao::decode_row;

/// Lifecycle state of an [`EntityScanner`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Scan opened, nothing read yet
    Open,
    /// At least one row read
    Active,
    /// Scan resource released; yields nothing more
    Closed,
}

/// Single-pass iterator of entities in row key order
///
/// Each row is decoded with the schema version recorded on it and shaped
/// as the reader schema captured when the scanner was opened.
pub struct EntityScanner<E: Entity> {
    rows: Box<dyn RowScanner>,
    manager: Arc<dyn SchemaManager>,
    table: String,
    entity: String,
    reader: Arc<EntitySchema>,
    state: ScanState,
    yielded: usize,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> EntityScanner<E> {
    pub(crate) fn open(
        rows: Box<dyn RowScanner>,
        manager: Arc<dyn SchemaManager>,
        table: String,
        entity: String,
        reader: Arc<EntitySchema>,
    ) -> Self {
        debug!(target: "tabula::scan", table = %table, entity = %entity, version = reader.version(), "Scanner opened");
        Self {
            rows,
            manager,
            table,
            entity,
            reader,
            state: ScanState::Open,
            yielded: 0,
            _entity: PhantomData,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Whether the scan resource has been released
    pub fn is_closed(&self) -> bool {
        self.state == ScanState::Closed
    }

    /// Schema every entity is shaped as
    pub fn reader_schema(&self) -> &Arc<EntitySchema> {
        &self.reader
    }

    /// Release the scan resource. Idempotent.
    pub fn close(&mut self) {
        if self.state == ScanState::Closed {
            return;
        }
        self.rows.close();
        self.state = ScanState::Closed;
        debug!(target: "tabula::scan", table = %self.table, entity = %self.entity, rows = self.yielded, "Scanner closed");
    }
}

impl<E: Entity> Iterator for EntityScanner<E> {
    type Item = Result<E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == ScanState::Closed {
            return None;
        }
        match self.rows.next_row() {
            Ok(Some(row)) => {
                self.state = ScanState::Active;
                let decoded = decode_row(
                    self.manager.as_ref(),
                    &self.table,
                    &self.entity,
                    &row,
                    &self.reader,
                );
                match decoded {
                    Ok(_) => self.yielded += 1,
                    Err(_) => self.close(),
                }
                Some(decoded)
            }
            Ok(None) => {
                self.close();
                None
            }
            Err(e) => {
                self.close();
                Some(Err(e))
            }
        }
    }
}

impl<E: Entity> Drop for EntityScanner<E> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::Dao;
    use tabula_codec::GenericRecord;
    use tabula_core::{Error, RowMutation, TableStore, Value};
    use tabula_schema::DefaultSchemaManager;
    use tabula_storage::MemTableStore;

    const SCHEMA: &str = r#"{"name": "Event", "type": "record", "fields": [
        {"name": "id", "type": "int", "mapping": {"type": "key", "value": "0"}},
        {"name": "kind", "type": "string", "mapping": {"type": "column", "value": "e:kind"}}
    ]}"#;

    fn setup(rows: i32) -> (MemTableStore, Dao<GenericRecord>) {
        let store = MemTableStore::with_tables(&["events"]);
        let manager = Arc::new(DefaultSchemaManager::new(Arc::new(store.clone())).unwrap());
        manager
            .create_schema("events", "Event", SCHEMA, "json", "ordered", "columnar")
            .unwrap();
        let dao = Dao::dynamic(Arc::new(store.clone()), manager, "events", "Event").unwrap();
        let schema = dao.schema().unwrap();
        // Written in reverse to show scans come back in key order
        for id in (0..rows).rev() {
            let event = GenericRecord::new(Arc::clone(&schema))
                .with("id", id)
                .unwrap()
                .with("kind", format!("k{}", id))
                .unwrap();
            dao.put(&event).unwrap();
        }
        (store, dao)
    }

    fn ids(scanner: EntityScanner<GenericRecord>) -> Vec<i32> {
        scanner
            .map(|e| e.unwrap().value("id").and_then(Value::as_int).unwrap())
            .collect()
    }

    #[test]
    fn test_full_scan_in_key_order() {
        let (store, dao) = setup(5);
        assert_eq!(ids(dao.scanner().unwrap()), vec![0, 1, 2, 3, 4]);
        assert_eq!(store.open_scanners(), 0);
    }

    #[test]
    fn test_negative_keys_sort_first() {
        let (_, dao) = setup(2);
        let schema = dao.schema().unwrap();
        let event = GenericRecord::new(schema)
            .with("id", -3)
            .unwrap()
            .with("kind", "neg")
            .unwrap();
        dao.put(&event).unwrap();
        assert_eq!(ids(dao.scanner().unwrap()), vec![-3, 0, 1]);
    }

    #[test]
    fn test_range_scan() {
        let (_, dao) = setup(10);
        let start = dao.key([Value::Int(3)]).unwrap();
        let end = dao.key([Value::Int(6)]).unwrap();
        assert_eq!(
            ids(dao.scanner_range(Some(&start), Some(&end)).unwrap()),
            vec![3, 4, 5]
        );
        assert_eq!(ids(dao.scanner_range(None, Some(&start)).unwrap()), vec![0, 1, 2]);
        assert_eq!(ids(dao.scanner_range(Some(&end), None).unwrap()), vec![6, 7, 8, 9]);
    }

    #[test]
    fn test_state_transitions() {
        let (store, dao) = setup(2);
        let mut scanner = dao.scanner().unwrap();
        assert_eq!(scanner.state(), ScanState::Open);
        assert_eq!(store.open_scanners(), 1);

        assert!(scanner.next().unwrap().is_ok());
        assert_eq!(scanner.state(), ScanState::Active);
        assert!(scanner.next().unwrap().is_ok());
        assert!(scanner.next().is_none());
        assert_eq!(scanner.state(), ScanState::Closed);
        assert_eq!(store.open_scanners(), 0);
        assert!(scanner.next().is_none());
    }

    #[test]
    fn test_close_is_idempotent() {
        let (store, dao) = setup(3);
        let mut scanner = dao.scanner().unwrap();
        scanner.next();
        scanner.close();
        scanner.close();
        assert!(scanner.is_closed());
        assert!(scanner.next().is_none());
        assert_eq!(store.open_scanners(), 0);
    }

    #[test]
    fn test_drop_releases_abandoned_scan() {
        let (store, dao) = setup(3);
        {
            let mut scanner = dao.scanner().unwrap();
            scanner.next();
            assert_eq!(store.open_scanners(), 1);
        }
        assert_eq!(store.open_scanners(), 0);
    }

    #[test]
    fn test_decode_error_closes_scan() {
        let (store, dao) = setup(3);
        let strategy = dao.partition_strategy().unwrap();
        let row = strategy.to_row_bytes(&dao.key([Value::Int(1)]).unwrap()).unwrap();
        let mut mutation = RowMutation::new(row);
        mutation.delete(tabula_codec::version_marker());
        store.mutate_row("events", mutation).unwrap();

        let mut scanner = dao.scanner().unwrap();
        assert!(scanner.next().unwrap().is_ok());
        let err = scanner.next().unwrap().unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
        assert!(scanner.is_closed());
        assert!(scanner.next().is_none());
        assert_eq!(store.open_scanners(), 0);
    }
}
