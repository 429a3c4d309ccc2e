//! Entity codec: entities to cells and back
//!
//! ## Layout
//!
//! - `column` fields: one cell at `family:qualifier`; nested records put
//!   each leaf subfield at `family:qualifier.sub` (recursively); arrays are
//!   one block cell
//! - `keyAsColumn` maps: one cell per entry at `family:prefix<key>`
//! - `counter` fields: one 8-byte big-endian cell
//! - key fields: never stored as cells, only in the row key
//! - every write stamps `_s:v` with the writer version (4 bytes big-endian)
//!
//! ## Schema resolution
//!
//! Decoding reads cells with the writer schema's types, then shapes the
//! result as the reader schema: reader fields the writer lacks take the
//! reader default, writer fields the reader lacks are dropped, and nested
//! records are projected field by field. When writer and reader are the
//! same version the cells map 1:1 and no defaults are substituted.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::trace;

use tabula_core::{Column, Error, Result, Row, RowMutation, SchemaVersion, Value};
use tabula_schema::{EntitySchema, FieldDef, FieldMapping, FieldType, RecordType, RESERVED_FAMILY};

use crate::cell::{decode_cell, encode_cell};
use crate::key::PartitionStrategy;
use crate::record::Entity;

/// Qualifier of the per-row version marker in the reserved family
pub const VERSION_QUALIFIER: &str = "v";

/// Column holding the writer version of a row
pub fn version_marker() -> Column {
    Column::new(RESERVED_FAMILY, VERSION_QUALIFIER)
}

/// Writer version recorded on a row
///
/// # Errors
///
/// Returns `Corruption` if the marker is missing or malformed.
pub fn read_version(row: &Row) -> Result<SchemaVersion> {
    let bytes = row.get(&version_marker()).ok_or_else(|| {
        Error::Corruption(format!(
            "row {:?} has no schema version marker",
            String::from_utf8_lossy(&row.key)
        ))
    })?;
    let bytes: [u8; 4] = bytes.try_into().map_err(|_| {
        Error::Corruption(format!(
            "schema version marker holds {} bytes, expected 4",
            bytes.len()
        ))
    })?;
    Ok(SchemaVersion::from_be_bytes(bytes))
}

/// Stateless entity encoder/decoder
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityCodec;

impl EntityCodec {
    /// Cells for every non-key field of `entity`, plus the version marker
    ///
    /// Missing values fall back to the field default. Counter fields with
    /// neither are left untouched.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a missing value without default or a
    /// value whose type does not match the field.
    pub fn encode<E: Entity>(entity: &E, writer: &EntitySchema) -> Result<Vec<(Column, Vec<u8>)>> {
        let mut cells = Vec::with_capacity(writer.fields().len() + 1);
        for field in writer.fields() {
            let value = match entity.get(&field.name).filter(|v| !v.is_null()) {
                Some(value) => value,
                None => match (&field.default, &field.mapping) {
                    (Some(default), _) => default.clone(),
                    (None, FieldMapping::Counter { .. }) => continue,
                    (None, _) => {
                        return Err(Error::invalid_argument(format!(
                            "no value for field '{}' and it has no default",
                            field.name
                        )))
                    }
                },
            };
            encode_field(field, &value, &mut cells)?;
        }
        cells.push((version_marker(), writer.version().to_be_bytes().to_vec()));
        Ok(cells)
    }

    /// Encode `entity` into one atomic mutation of `row`
    pub fn encode_mutation<E: Entity>(
        entity: &E,
        writer: &EntitySchema,
        row: Vec<u8>,
    ) -> Result<RowMutation> {
        let mut mutation = RowMutation::new(row);
        for (column, value) in Self::encode(entity, writer)? {
            mutation.put(column, value);
        }
        Ok(mutation)
    }

    /// Decode a row written with `writer` into an entity shaped by `reader`
    pub fn decode<E: Entity>(
        row: &Row,
        writer: &EntitySchema,
        reader: &Arc<EntitySchema>,
    ) -> Result<E> {
        let mut entity = E::instantiate(reader);
        for (name, value) in Self::decode_fields(row, writer, reader)? {
            entity.set(&name, value)?;
        }
        Ok(entity)
    }

    /// Field values of a row, keyed by reader field name
    pub fn decode_fields(
        row: &Row,
        writer: &EntitySchema,
        reader: &EntitySchema,
    ) -> Result<BTreeMap<String, Value>> {
        let same_version = writer.version() == reader.version()
            && writer.table() == reader.table()
            && writer.entity() == reader.entity();
        if !same_version {
            trace!(
                target: "tabula::codec",
                table = %reader.table(),
                writer = writer.version(),
                reader = reader.version(),
                "Resolving row across schema versions"
            );
        }
        let mut out = BTreeMap::new();

        let key = PartitionStrategy::from_schema(writer).from_row_bytes(&row.key)?;
        for (field, value) in writer.key_fields().iter().zip(key.into_values()) {
            if reader.key_field(&field.name).is_some() {
                out.insert(field.name.clone(), value);
            }
        }

        for field in reader.fields() {
            let value = match writer.field(&field.name) {
                Some(written) => match decode_field(row, written)? {
                    Some(value) if same_version => Some(value),
                    Some(value) => Some(Self::resolve(
                        &field.name,
                        value,
                        &written.field_type,
                        &field.field_type,
                    )?),
                    None if same_version => None,
                    None => field.default.clone(),
                },
                None => field.default.clone(),
            };
            if let Some(value) = value {
                out.insert(field.name.clone(), value);
            }
        }
        Ok(out)
    }

    /// Project a value written as `writer_type` onto `reader_type`
    ///
    /// Records keep the subfields both sides share, take reader defaults
    /// for subfields the writer lacked and drop the rest. Arrays and maps
    /// resolve element-wise.
    ///
    /// # Errors
    ///
    /// Returns `IncompatibleSchema` if the two types cannot be reconciled.
    pub fn resolve(
        path: &str,
        value: Value,
        writer_type: &FieldType,
        reader_type: &FieldType,
    ) -> Result<Value> {
        match (writer_type, reader_type, value) {
            (FieldType::Record(w), FieldType::Record(r), Value::Record(mut fields)) => {
                let mut projected = BTreeMap::new();
                for sub in &r.fields {
                    let sub_path = format!("{}.{}", path, sub.name);
                    let value = match (w.field(&sub.name), fields.remove(&sub.name)) {
                        (Some(written), Some(value)) => Some(Self::resolve(
                            &sub_path,
                            value,
                            &written.field_type,
                            &sub.field_type,
                        )?),
                        _ => sub.default.clone(),
                    };
                    if let Some(value) = value {
                        projected.insert(sub.name.clone(), value);
                    }
                }
                Ok(Value::Record(projected))
            }
            (FieldType::Array(w), FieldType::Array(r), Value::Array(elements)) => elements
                .into_iter()
                .enumerate()
                .map(|(i, v)| Self::resolve(&format!("{}[{}]", path, i), v, w, r))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            (FieldType::Map(w), FieldType::Map(r), Value::Map(entries)) => entries
                .into_iter()
                .map(|(k, v)| {
                    let entry_path = format!("{}[{}]", path, k);
                    Self::resolve(&entry_path, v, w, r).map(|v| (k, v))
                })
                .collect::<Result<BTreeMap<_, _>>>()
                .map(Value::Map),
            (w, r, value) if w.canonical() == r.canonical() => Ok(value),
            (w, r, _) => Err(Error::incompatible(format!(
                "field '{}' was written as {} and cannot be read as {}",
                path, w, r
            ))),
        }
    }

    /// Column backing a counter field
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `field` is not a counter field.
    pub fn counter_column(schema: &EntitySchema, field: &str) -> Result<Column> {
        match schema.field(field).map(|f| &f.mapping) {
            Some(mapping @ FieldMapping::Counter { .. }) => mapping
                .column()
                .ok_or_else(|| Error::invalid_argument(format!("'{}' is not a counter field", field))),
            Some(_) => Err(Error::invalid_argument(format!(
                "'{}' is not a counter field",
                field
            ))),
            None => Err(Error::invalid_argument(format!(
                "{} has no field '{}'",
                schema.record_name(),
                field
            ))),
        }
    }
}

fn encode_field(field: &FieldDef, value: &Value, cells: &mut Vec<(Column, Vec<u8>)>) -> Result<()> {
    match &field.mapping {
        FieldMapping::Key { .. } => Ok(()),
        FieldMapping::Column { family, qualifier } => {
            encode_column(family, qualifier, &field.name, &field.field_type, value, cells)
        }
        FieldMapping::Counter { family, qualifier } => match value {
            Value::Long(v) => {
                cells.push((Column::new(family.as_str(), qualifier), v.to_be_bytes().to_vec()));
                Ok(())
            }
            other => Err(Error::invalid_argument(format!(
                "counter field '{}' expects long, got {}",
                field.name,
                other.type_name()
            ))),
        },
        FieldMapping::KeyAsColumn { family, prefix } => {
            let values_type = match &field.field_type {
                FieldType::Map(values) => values.as_ref(),
                other => {
                    return Err(Error::invalid_argument(format!(
                        "field '{}' of type {} cannot use keyAsColumn",
                        field.name, other
                    )))
                }
            };
            let entries = match value {
                Value::Map(entries) => entries,
                other => {
                    return Err(Error::invalid_argument(format!(
                        "field '{}' expects a map, got {}",
                        field.name,
                        other.type_name()
                    )))
                }
            };
            for (key, entry) in entries {
                let path = format!("{}[{}]", field.name, key);
                let qualifier = format!("{}{}", prefix, key);
                cells.push((
                    Column::new(family.as_str(), qualifier),
                    encode_cell(&path, values_type, entry)?,
                ));
            }
            Ok(())
        }
    }
}

fn encode_column(
    family: &str,
    qualifier: &str,
    path: &str,
    field_type: &FieldType,
    value: &Value,
    cells: &mut Vec<(Column, Vec<u8>)>,
) -> Result<()> {
    match (field_type, value) {
        (FieldType::Record(record), Value::Record(fields)) => {
            encode_record(family, qualifier, path, record, fields, cells)
        }
        (FieldType::Record(_), other) => Err(Error::invalid_argument(format!(
            "field '{}' expects {}, got {}",
            path,
            field_type,
            other.type_name()
        ))),
        _ => {
            cells.push((Column::new(family, qualifier), encode_cell(path, field_type, value)?));
            Ok(())
        }
    }
}

fn encode_record(
    family: &str,
    qualifier: &str,
    path: &str,
    record: &RecordType,
    fields: &BTreeMap<String, Value>,
    cells: &mut Vec<(Column, Vec<u8>)>,
) -> Result<()> {
    for sub in &record.fields {
        let sub_path = format!("{}.{}", path, sub.name);
        let value = match (fields.get(&sub.name), &sub.default) {
            (Some(v), _) if !v.is_null() => v,
            (_, Some(default)) => default,
            _ => {
                return Err(Error::invalid_argument(format!(
                    "no value for field '{}' and it has no default",
                    sub_path
                )))
            }
        };
        let sub_qualifier = format!("{}.{}", qualifier, sub.name);
        encode_column(family, &sub_qualifier, &sub_path, &sub.field_type, value, cells)?;
    }
    Ok(())
}

/// Value of one writer field, `None` when the row holds none of its cells
fn decode_field(row: &Row, field: &FieldDef) -> Result<Option<Value>> {
    match &field.mapping {
        FieldMapping::Key { .. } => Ok(None),
        FieldMapping::Column { family, qualifier } => {
            decode_column(row, family, qualifier, &field.name, &field.field_type)
        }
        FieldMapping::Counter { family, qualifier } => {
            match row.get(&Column::new(family.as_str(), qualifier)) {
                Some(bytes) => decode_cell(&field.name, &FieldType::Long, bytes).map(Some),
                None => Ok(None),
            }
        }
        FieldMapping::KeyAsColumn { family, prefix } => {
            let values_type = match &field.field_type {
                FieldType::Map(values) => values.as_ref(),
                other => {
                    return Err(Error::incompatible(format!(
                        "field '{}' of type {} cannot use keyAsColumn",
                        field.name, other
                    )))
                }
            };
            let mut entries = BTreeMap::new();
            for (column, bytes) in row.cells_with_prefix(family, prefix.as_bytes()) {
                let key = std::str::from_utf8(&column.qualifier[prefix.len()..]).map_err(|_| {
                    Error::incompatible(format!(
                        "map field '{}' has a non-UTF-8 key in column {}",
                        field.name, column
                    ))
                })?;
                let path = format!("{}[{}]", field.name, key);
                entries.insert(key.to_string(), decode_cell(&path, values_type, bytes)?);
            }
            Ok(Some(Value::Map(entries)))
        }
    }
}

fn decode_column(
    row: &Row,
    family: &str,
    qualifier: &str,
    path: &str,
    field_type: &FieldType,
) -> Result<Option<Value>> {
    match field_type {
        FieldType::Record(record) => {
            let mut fields = BTreeMap::new();
            for sub in &record.fields {
                let sub_qualifier = format!("{}.{}", qualifier, sub.name);
                let sub_path = format!("{}.{}", path, sub.name);
                if let Some(value) =
                    decode_column(row, family, &sub_qualifier, &sub_path, &sub.field_type)?
                {
                    fields.insert(sub.name.clone(), value);
                }
            }
            Ok((!fields.is_empty()).then_some(Value::Record(fields)))
        }
        _ => match row.get(&Column::new(family, qualifier)) {
            Some(bytes) => decode_cell(path, field_type, bytes).map(Some),
            None => Ok(None),
        },
    }
}
