//! Stored schema records
//!
//! The managed-schema table holds one row per `(table, entity)`. Each
//! version is a column in family [`MANAGED_FAMILY`] whose qualifier is the
//! 4-byte big-endian version, so cells come back in version order. The
//! cell value is a JSON [`ManagedSchema`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tabula_core::{ordered, Column, Error, Result, SchemaVersion};

/// Column family holding schema versions
pub const MANAGED_FAMILY: &str = "s";

/// One stored schema version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedSchema {
    /// Entity table name
    pub table: String,
    /// Entity name
    pub entity: String,
    /// Version number
    pub version: SchemaVersion,
    /// Raw schema text
    pub schema: String,
    /// Parser identifier
    pub parser: String,
    /// Row key serde identifier
    pub key_serde: String,
    /// Entity cell serde identifier
    pub entity_serde: String,
    /// When the version was stored
    pub created_at: DateTime<Utc>,
}

impl ManagedSchema {
    /// Serialize for storage
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize a stored record
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::Corruption(format!("malformed managed schema record: {}", e)))
    }
}

/// Row key of an entity's schema history
pub fn managed_row_key(table: &str, entity: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(table.len() + entity.len() + 4);
    ordered::encode_str(&mut key, table);
    ordered::encode_str(&mut key, entity);
    key
}

/// Column holding one version
pub fn version_column(version: SchemaVersion) -> Column {
    Column::new(MANAGED_FAMILY, version.to_be_bytes())
}

/// Version number encoded in a version column's qualifier
pub fn version_of(column: &Column) -> Result<SchemaVersion> {
    let bytes: [u8; 4] = column.qualifier.as_slice().try_into().map_err(|_| {
        Error::Corruption(format!(
            "managed schema column {} is not a 4-byte version",
            column
        ))
    })?;
    Ok(SchemaVersion::from_be_bytes(bytes))
}
