//! Schema layer for Tabula
//!
//! This crate owns everything about entity schemas:
//! - EntitySchema: immutable parsed schema version (key fields, fields, mappings)
//! - SchemaParser / JsonSchemaParser: schema text to EntitySchema
//! - compat: migration compatibility rules
//! - SchemaManager / DefaultSchemaManager: versioned registry in the managed-schema table

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compat;
pub mod entity_schema;
pub mod managed;
pub mod manager;
pub mod parser;

pub use compat::check_migration;
pub use entity_schema::{
    EntitySchema, FieldDef, FieldMapping, FieldType, KeyField, RecordField, RecordType,
    SchemaShape, COLUMNAR_ENTITY_SERDE, JSON_PARSER_ID, ORDERED_KEY_SERDE, RESERVED_FAMILY,
};
pub use managed::ManagedSchema;
pub use manager::{DefaultSchemaManager, SchemaManager};
pub use parser::{JsonSchemaParser, SchemaParser};
