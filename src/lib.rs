//! Tabula - schema-managed entities over a sorted column-family table
//!
//! Tabula stores application entities in a sorted key-value substrate with
//! column families. Every entity type has a versioned schema history held
//! in a managed-schema table; rows record the version they were written
//! with, so old rows stay readable after a migration.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use tabula::{Dao, DefaultSchemaManager, GenericRecord, MemTableStore, SchemaManager, Value};
//!
//! let store = Arc::new(MemTableStore::with_tables(&["users"]));
//! let manager = Arc::new(DefaultSchemaManager::new(store.clone())?);
//! manager.create_schema("users", "User", USER_SCHEMA, "json", "ordered", "columnar")?;
//!
//! let dao: Dao<GenericRecord> = Dao::dynamic(store, manager, "users", "User")?;
//! let user = GenericRecord::new(dao.schema()?)
//!     .with("id", 1i64)?
//!     .with("name", "Ann")?;
//! dao.put(&user)?;
//! let read = dao.get(&dao.key([Value::Long(1)])?)?;
//! ```
//!
//! # Architecture
//!
//! - `tabula-core`: values, cells, errors, the `TableStore` substrate traits, config
//! - `tabula-storage`: `MemTableStore`, the in-memory substrate
//! - `tabula-schema`: schemas, parser, compatibility rules, `SchemaManager`
//! - `tabula-codec`: row keys, cell encodings, `EntityCodec`
//! - `tabula-dao`: `Dao` and `EntityScanner`

pub use tabula_codec::{
    read_version, version_marker, EntityCodec, PartitionKey, PartitionStrategy,
};
pub use tabula_core::{
    Column, Error, Result, Row, RowMutation, RowScanner, ScanRange, SchemaVersion, TableStore,
    TabulaConfig, Value, CONFIG_FILE_NAME,
};
pub use tabula_dao::{Dao, Entity, EntityScanner, GenericRecord, ScanState, SchemaBinding};
pub use tabula_schema::{
    check_migration, DefaultSchemaManager, EntitySchema, FieldDef, FieldMapping, FieldType,
    JsonSchemaParser, KeyField, ManagedSchema, RecordField, RecordType, SchemaManager,
    SchemaParser,
};
pub use tabula_storage::MemTableStore;
