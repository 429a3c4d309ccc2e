//! Entity access for Tabula
//!
//! This crate is the application-facing layer:
//! - Dao: put/get/delete/increment of entities in one entity table
//! - SchemaBinding: fixed schema version or latest-at-call-time
//! - EntityScanner: lazily decoded range scans with guaranteed release
//!
//! `Entity` and `GenericRecord` are re-exported from `tabula-codec` so
//! applications only need this crate to implement typed entities.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dao;
pub mod scanner;

pub use dao::{Dao, SchemaBinding};
pub use scanner::{EntityScanner, ScanState};
pub use tabula_codec::{Entity, GenericRecord, PartitionKey, PartitionStrategy};
