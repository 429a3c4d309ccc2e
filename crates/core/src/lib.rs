//! Core types and traits for Tabula
//!
//! This crate defines the foundational types used throughout the system:
//! - Value: Unified value enum for entity field data
//! - Column / Row / RowMutation: Cell coordinates and row-level operations
//! - ScanRange: Half-open row key range for scans
//! - ordered: Order-preserving byte encoding for row key components
//! - Error: Error type hierarchy
//! - Traits: The table substrate (TableStore, RowScanner)
//! - TabulaConfig: `tabula.toml` configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod ordered;
pub mod traits;
pub mod types;
pub mod value;

pub use config::{TabulaConfig, CONFIG_FILE_NAME};
pub use error::{Error, Result};
pub use ordered::OrderedReader;
pub use traits::{RowScanner, TableStore};
pub use types::{Column, Row, RowMutation, ScanRange, SchemaVersion};
pub use value::Value;
