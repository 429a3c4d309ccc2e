//! Shared fixtures for the workspace integration tests.
//!
//! Import via `mod common;` from a test file.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Once};

pub use tabula::{
    Dao, DefaultSchemaManager, EntitySchema, Error, GenericRecord, MemTableStore, PartitionKey,
    SchemaManager, Value,
};

// ============================================================================
// Schema fixtures
// ============================================================================

pub const TEST_RECORD: &str = include_str!("../schemas/test_record.json");
pub const TEST_RECORD_V2: &str = include_str!("../schemas/test_record_v2.json");
pub const GOOD_ADD_FIELD: &str = include_str!("../schemas/good_migration_add_field.json");
pub const GOOD_REMOVE_FIELD: &str = include_str!("../schemas/good_migration_remove_field.json");
pub const GOOD_ADD_SUB_FIELD: &str = include_str!("../schemas/good_migration_add_sub_field.json");
pub const BAD_ADD_KEY_FIELD: &str = include_str!("../schemas/bad_migration_add_key_field.json");
pub const BAD_ADD_FIELD_NO_DEFAULT: &str =
    include_str!("../schemas/bad_migration_add_field_no_default.json");
pub const BAD_ADD_SUB_FIELD_NO_DEFAULT: &str =
    include_str!("../schemas/bad_migration_add_sub_field_no_default.json");
pub const BAD_MODIFIED_MAPPING: &str =
    include_str!("../schemas/bad_migration_modified_mapping.json");
pub const BAD_INT_TO_LONG: &str = include_str!("../schemas/bad_migration_int_to_long.json");

pub const USER: &str = include_str!("../schemas/user.json");
pub const USER_BONUS: &str = include_str!("../schemas/user_bonus.json");
pub const USER_SCORE_LONG: &str = include_str!("../schemas/user_score_long.json");
pub const USER_REGION_KEY: &str = include_str!("../schemas/user_region_key.json");

pub const TABLE: &str = "testtable";
pub const ENTITY: &str = "TestRecord";

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Install a fmt subscriber once per test binary.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// TestEnv - store plus schema manager
// ============================================================================

/// In-memory store with the entity table created and a schema manager on top.
pub struct TestEnv {
    pub store: MemTableStore,
    pub manager: Arc<DefaultSchemaManager>,
}

impl TestEnv {
    /// Empty store: only the entity table and the managed-schema table exist.
    pub fn new() -> Self {
        init_tracing();
        let store = MemTableStore::with_tables(&[TABLE]);
        let manager = Arc::new(DefaultSchemaManager::new(Arc::new(store.clone())).unwrap());
        Self { store, manager }
    }

    /// TestRecord at v0 and TestRecordv2 at v1.
    pub fn with_test_record() -> Self {
        let env = Self::new();
        env.create(ENTITY, TEST_RECORD);
        env.manager.migrate_schema(TABLE, ENTITY, TEST_RECORD_V2).unwrap();
        env
    }

    /// A second manager over the same store, with its own cache.
    pub fn other_manager(&self) -> Arc<DefaultSchemaManager> {
        Arc::new(DefaultSchemaManager::new(Arc::new(self.store.clone())).unwrap())
    }

    pub fn create(&self, entity: &str, text: &str) -> Arc<EntitySchema> {
        self.manager
            .create_schema(TABLE, entity, text, "json", "ordered", "columnar")
            .unwrap()
    }

    pub fn dynamic_dao(&self, manager: &Arc<DefaultSchemaManager>) -> Dao<GenericRecord> {
        Dao::dynamic(Arc::new(self.store.clone()), manager.clone(), TABLE, ENTITY).unwrap()
    }

    pub fn fixed_dao(&self, manager: &Arc<DefaultSchemaManager>, text: &str) -> Dao<GenericRecord> {
        Dao::fixed(Arc::new(self.store.clone()), manager.clone(), TABLE, ENTITY, text).unwrap()
    }

    pub fn migrate(&self, text: &str) -> tabula::Result<Arc<EntitySchema>> {
        self.manager.migrate_schema(TABLE, ENTITY, text)
    }
}

// ============================================================================
// TestRecord entities
// ============================================================================

pub fn record(pairs: &[(&str, Value)]) -> Value {
    Value::Record(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
    )
}

/// Key of the i-th TestRecord
pub fn key(dao: &Dao<GenericRecord>, i: i64) -> PartitionKey {
    dao.key([
        Value::from(format!("part1_{}", i)),
        Value::from(format!("part2_{}", i)),
    ])
    .unwrap()
}

/// The i-th TestRecord built against `schema`
///
/// `schema` must be TestRecord or a migration of it. Array elements get
/// `subfield4` only when the schema declares it.
pub fn test_entity(i: i64, schema: &Arc<EntitySchema>) -> GenericRecord {
    let mut field3 = BTreeMap::new();
    field3.insert(format!("field3_key_1_{}", i), Value::from(format!("field3_value_1_{}", i)));
    field3.insert(format!("field3_key_2_{}", i), Value::from(format!("field3_value_2_{}", i)));

    let mut entity = GenericRecord::new(Arc::clone(schema))
        .with("keyPart1", format!("part1_{}", i))
        .unwrap()
        .with("keyPart2", format!("part2_{}", i))
        .unwrap()
        .with("field1", format!("field1_{}", i))
        .unwrap()
        .with("enum", Value::Enum("ENUM3".to_string()))
        .unwrap()
        .with("field3", Value::Map(field3))
        .unwrap()
        .with(
            "field4",
            record(&[
                ("embeddedField1", Value::from("embedded1")),
                ("embeddedField2", Value::Long(2)),
            ]),
        )
        .unwrap()
        .with(
            "field5",
            Value::Array(vec![
                record(&[
                    ("subfield1", Value::from("subfield1")),
                    ("subfield2", Value::Long(1)),
                    ("subfield3", Value::from("subfield3")),
                ]),
                record(&[
                    ("subfield1", Value::from("subfield4")),
                    ("subfield2", Value::Long(1)),
                    ("subfield3", Value::from("subfield6")),
                ]),
            ]),
        )
        .unwrap()
        .with("increment", 10i64)
        .unwrap();
    if schema.has_field("field2") {
        entity = entity.with("field2", format!("field2_{}", i)).unwrap();
    }
    entity
}

/// Set `subfield4` on every `field5` element
pub fn with_subfield4(mut entity: GenericRecord, value: &str) -> GenericRecord {
    let Some(Value::Array(elements)) = entity.remove("field5") else {
        panic!("entity has no field5");
    };
    let elements = elements
        .into_iter()
        .map(|element| match element {
            Value::Record(mut fields) => {
                fields.insert("subfield4".to_string(), Value::from(value));
                Value::Record(fields)
            }
            other => other,
        })
        .collect();
    entity.with("field5", Value::Array(elements)).unwrap()
}

/// Assert the fields every TestRecord version shares
pub fn assert_test_entity(i: i64, entity: &GenericRecord) {
    assert_eq!(entity.value("keyPart1"), Some(&Value::from(format!("part1_{}", i))));
    assert_eq!(entity.value("keyPart2"), Some(&Value::from(format!("part2_{}", i))));
    assert_eq!(entity.value("field1"), Some(&Value::from(format!("field1_{}", i))));
    assert_eq!(entity.value("enum"), Some(&Value::Enum("ENUM3".to_string())));

    let field3 = entity.value("field3").and_then(Value::as_map).unwrap();
    assert_eq!(
        field3.get(&format!("field3_key_1_{}", i)),
        Some(&Value::from(format!("field3_value_1_{}", i)))
    );
    assert_eq!(
        field3.get(&format!("field3_key_2_{}", i)),
        Some(&Value::from(format!("field3_value_2_{}", i)))
    );

    let field4 = entity.value("field4").unwrap();
    assert_eq!(field4.field("embeddedField1"), Some(&Value::from("embedded1")));
    assert_eq!(field4.field("embeddedField2"), Some(&Value::Long(2)));

    let field5 = entity.value("field5").and_then(Value::as_array).unwrap();
    assert_eq!(field5.len(), 2);
    assert_eq!(field5[0].field("subfield1"), Some(&Value::from("subfield1")));
    assert_eq!(field5[0].field("subfield2"), Some(&Value::Long(1)));
    assert_eq!(field5[1].field("subfield1"), Some(&Value::from("subfield4")));
    assert_eq!(field5[1].field("subfield3"), Some(&Value::from("subfield6")));
}
