//! Racing schema operations against one managed-schema table
//!
//! Every manager here shares the same substrate but has its own cache, the
//! way independent processes would.

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use tabula_core::{Error, TableStore};
use tabula_schema::{DefaultSchemaManager, SchemaManager};
use tabula_storage::MemTableStore;

const BASE: &str = r#"{"name": "Doc", "type": "record", "fields": [
    {"name": "id", "type": "string", "mapping": {"type": "key", "value": "0"}},
    {"name": "body", "type": "string", "mapping": {"type": "column", "value": "d:body"}}
]}"#;

fn with_extra_field(n: usize) -> String {
    format!(
        r#"{{"name": "Doc", "type": "record", "fields": [
            {{"name": "id", "type": "string", "mapping": {{"type": "key", "value": "0"}}}},
            {{"name": "body", "type": "string", "mapping": {{"type": "column", "value": "d:body"}}}},
            {{"name": "extra{n}", "type": "long", "default": {n},
              "mapping": {{"type": "column", "value": "d:extra{n}"}}}}
        ]}}"#,
        n = n
    )
}

// ============================================================================
// Creation races
// ============================================================================

#[test]
fn test_only_one_creation_wins() {
    let store: Arc<dyn TableStore> = Arc::new(MemTableStore::new());
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let manager = DefaultSchemaManager::new(store).unwrap();
                barrier.wait();
                manager.create_schema("docs", "Doc", BASE, "json", "ordered", "columnar")
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.into_iter().filter_map(|r| r.err()) {
        assert!(err.is_incompatible_schema(), "unexpected error: {}", err);
    }
}

// ============================================================================
// Migration races
// ============================================================================

#[test]
fn test_racing_migrations_never_share_a_version() {
    let store: Arc<dyn TableStore> = Arc::new(MemTableStore::new());
    DefaultSchemaManager::new(Arc::clone(&store))
        .unwrap()
        .create_schema("docs", "Doc", BASE, "json", "ordered", "columnar")
        .unwrap();

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|n| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let manager = DefaultSchemaManager::new(store).unwrap();
                barrier.wait();
                manager.migrate_schema("docs", "Doc", &with_extra_field(n))
            })
        })
        .collect();

    let mut versions = HashSet::new();
    let mut winners = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(schema) => {
                winners += 1;
                assert!(versions.insert(schema.version()), "version claimed twice");
            }
            Err(Error::SchemaVersionConflict { .. }) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
    assert!(winners >= 1);

    let history = DefaultSchemaManager::new(store)
        .unwrap()
        .schema_history("docs", "Doc")
        .unwrap();
    assert_eq!(history.len(), 1 + winners);
    for (expected, schema) in history.iter().enumerate() {
        assert_eq!(schema.version() as usize, expected);
    }
}

#[test]
fn test_loser_can_retry_after_conflict() {
    let store: Arc<dyn TableStore> = Arc::new(MemTableStore::new());
    let a = DefaultSchemaManager::new(Arc::clone(&store)).unwrap();
    let b = DefaultSchemaManager::new(Arc::clone(&store)).unwrap();
    a.create_schema("docs", "Doc", BASE, "json", "ordered", "columnar")
        .unwrap();

    a.migrate_schema("docs", "Doc", &with_extra_field(1)).unwrap();
    // b reloads history before deciding the version, so it lands on v2
    let schema = b.migrate_schema("docs", "Doc", &with_extra_field(2)).unwrap();
    assert_eq!(schema.version(), 2);
    assert!(schema.field("extra1").is_none());
    assert!(schema.field("extra2").is_some());
}
