//! Error types for Tabula
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use std::io;
use thiserror::Error;

use crate::types::SchemaVersion;

/// Result type alias for Tabula operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Tabula
#[derive(Debug, Error)]
pub enum Error {
    /// No stored schema for the requested table/entity (and version, if given)
    #[error("Schema not found: {table}/{entity}{}", version_suffix(.version))]
    SchemaNotFound {
        /// Entity table name
        table: String,
        /// Entity name
        entity: String,
        /// Requested version, `None` when any version was requested
        version: Option<SchemaVersion>,
    },

    /// A schema failed a compatibility rule, or stored bytes do not match
    /// the layout their writer schema declares
    #[error("Incompatible schema: {0}")]
    IncompatibleSchema(String),

    /// Schema text could not be parsed or is structurally invalid
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Caller supplied an argument that does not fit the schema
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Another migration claimed this version first
    #[error("Schema version conflict: {table}/{entity} version {version} was claimed concurrently")]
    SchemaVersionConflict {
        /// Entity table name
        table: String,
        /// Entity name
        entity: String,
        /// The contested version
        version: SchemaVersion,
    },

    /// Table was never created in the substrate
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Row required by a non-idempotent operation does not exist
    #[error("Row not found in table {table}")]
    RowNotFound {
        /// Table name
        table: String,
        /// Physical row key
        row: Vec<u8>,
    },

    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Stored data is malformed
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error (config files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

fn version_suffix(version: &Option<SchemaVersion>) -> String {
    match version {
        Some(v) => format!(" version {}", v),
        None => String::new(),
    }
}

impl Error {
    /// Shorthand for [`Error::SchemaNotFound`]
    pub fn schema_not_found(
        table: impl Into<String>,
        entity: impl Into<String>,
        version: Option<SchemaVersion>,
    ) -> Self {
        Error::SchemaNotFound {
            table: table.into(),
            entity: entity.into(),
            version,
        }
    }

    /// Shorthand for [`Error::IncompatibleSchema`]
    pub fn incompatible(msg: impl Into<String>) -> Self {
        Error::IncompatibleSchema(msg.into())
    }

    /// Shorthand for [`Error::InvalidSchema`]
    pub fn invalid_schema(msg: impl Into<String>) -> Self {
        Error::InvalidSchema(msg.into())
    }

    /// Shorthand for [`Error::InvalidArgument`]
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// True for [`Error::SchemaNotFound`]
    pub fn is_schema_not_found(&self) -> bool {
        matches!(self, Error::SchemaNotFound { .. })
    }

    /// True for [`Error::IncompatibleSchema`]
    pub fn is_incompatible_schema(&self) -> bool {
        matches!(self, Error::IncompatibleSchema(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
