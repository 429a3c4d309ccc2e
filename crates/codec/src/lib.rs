//! Entity encoding for Tabula
//!
//! This crate maps schema-described entities onto rows:
//! - record: the `Entity` capability trait and `GenericRecord`
//! - key: `PartitionKey` and `PartitionStrategy` (row key composition)
//! - cell: scalar cell and array block encodings
//! - codec: `EntityCodec` (cells, version marker, cross-version resolution)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cell;
pub mod codec;
pub mod key;
pub mod record;

pub use cell::{decode_cell, encode_cell};
pub use codec::{read_version, version_marker, EntityCodec, VERSION_QUALIFIER};
pub use key::{PartitionKey, PartitionStrategy};
pub use record::{Entity, GenericRecord};
