//! Schema definition parsers
//!
//! A parser turns schema text into an unbound [`EntitySchema`]. The
//! manager records the parser id with every stored version so the same
//! parser rebuilds it later.
//!
//! ## JSON schema text
//!
//! ```json
//! {
//!   "name": "User", "type": "record",
//!   "fields": [
//!     {"name": "id", "type": "long", "mapping": {"type": "key", "value": "0"}},
//!     {"name": "name", "type": "string", "mapping": {"type": "column", "value": "meta:name"}},
//!     {"name": "score", "type": "int", "default": 0,
//!      "mapping": {"type": "column", "value": "meta:score"}}
//!   ]
//! }
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;

use tabula_core::{Error, Result, Value};

use crate::entity_schema::{
    EntitySchema, FieldDef, FieldMapping, FieldType, RecordField, RecordType, JSON_PARSER_ID,
};

/// Turns schema text into an [`EntitySchema`]
pub trait SchemaParser: Send + Sync {
    /// Identifier recorded with stored schemas
    fn id(&self) -> &str;

    /// Parse schema text into an unbound schema
    fn parse(&self, text: &str) -> Result<EntitySchema>;
}

/// Built-in parser for Avro-style JSON records with column mappings
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSchemaParser;

impl SchemaParser for JsonSchemaParser {
    fn id(&self) -> &str {
        JSON_PARSER_ID
    }

    fn parse(&self, text: &str) -> Result<EntitySchema> {
        let raw: RawRecord = serde_json::from_str(text)
            .map_err(|e| Error::invalid_schema(format!("malformed schema text: {}", e)))?;
        if raw.kind != "record" {
            return Err(Error::invalid_schema(format!(
                "top-level type must be record, found '{}'",
                raw.kind
            )));
        }

        let mut fields = Vec::with_capacity(raw.fields.len());
        for field in &raw.fields {
            let mapping = match &field.mapping {
                Some(mapping) => convert_mapping(&field.name, mapping)?,
                None => {
                    return Err(Error::invalid_schema(format!(
                        "field '{}' has no mapping",
                        field.name
                    )))
                }
            };
            let field_type = convert_type(&field.name, &field.field_type)?;
            let default = match &field.default {
                Some(json) => Some(convert_default(&field.name, json, &field_type)?),
                None => None,
            };
            fields.push(FieldDef {
                name: field.name.clone(),
                field_type,
                default,
                mapping,
            });
        }

        EntitySchema::from_fields(raw.name, fields, text)
    }
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    fields: Vec<RawField>,
}

#[derive(Debug, Deserialize)]
struct RawField {
    name: String,
    #[serde(rename = "type")]
    field_type: RawType,
    /// `null` and an absent default both mean "no default"
    #[serde(default)]
    default: Option<serde_json::Value>,
    #[serde(default)]
    mapping: Option<RawMapping>,
}

#[derive(Debug, Deserialize)]
struct RawMapping {
    #[serde(rename = "type")]
    kind: String,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawType {
    Named(String),
    Complex(RawComplexType),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RawComplexType {
    Record { name: String, fields: Vec<RawField> },
    Enum { name: String, symbols: Vec<String> },
    Map { values: Box<RawType> },
    Array { items: Box<RawType> },
}

fn convert_mapping(field: &str, raw: &RawMapping) -> Result<FieldMapping> {
    let split = || {
        raw.value.split_once(':').ok_or_else(|| {
            Error::invalid_schema(format!(
                "mapping of field '{}' must be '<family>:<qualifier>', found '{}'",
                field, raw.value
            ))
        })
    };
    match raw.kind.as_str() {
        "key" => {
            let position = raw.value.trim().parse::<usize>().map_err(|_| {
                Error::invalid_schema(format!(
                    "key mapping of field '{}' has invalid position '{}'",
                    field, raw.value
                ))
            })?;
            Ok(FieldMapping::Key { position })
        }
        "column" => {
            let (family, qualifier) = split()?;
            Ok(FieldMapping::Column {
                family: family.to_string(),
                qualifier: qualifier.to_string(),
            })
        }
        "keyAsColumn" => {
            let (family, prefix) = split()?;
            Ok(FieldMapping::KeyAsColumn {
                family: family.to_string(),
                prefix: prefix.to_string(),
            })
        }
        "counter" => {
            let (family, qualifier) = split()?;
            Ok(FieldMapping::Counter {
                family: family.to_string(),
                qualifier: qualifier.to_string(),
            })
        }
        other => Err(Error::invalid_schema(format!(
            "field '{}' has unknown mapping type '{}'",
            field, other
        ))),
    }
}

fn convert_type(path: &str, raw: &RawType) -> Result<FieldType> {
    match raw {
        RawType::Named(name) => match name.as_str() {
            "boolean" => Ok(FieldType::Boolean),
            "int" => Ok(FieldType::Int),
            "long" => Ok(FieldType::Long),
            "float" => Ok(FieldType::Float),
            "double" => Ok(FieldType::Double),
            "string" => Ok(FieldType::String),
            "bytes" => Ok(FieldType::Bytes),
            other => Err(Error::invalid_schema(format!(
                "field '{}' has unknown type '{}'",
                path, other
            ))),
        },
        RawType::Complex(RawComplexType::Enum { name, symbols }) => {
            if symbols.is_empty() {
                return Err(Error::invalid_schema(format!(
                    "enum {} of field '{}' has no symbols",
                    name, path
                )));
            }
            Ok(FieldType::Enum {
                name: name.clone(),
                symbols: symbols.clone(),
            })
        }
        RawType::Complex(RawComplexType::Map { values }) => {
            let values = convert_type(path, values)?;
            if !values.is_scalar() {
                return Err(Error::invalid_schema(format!(
                    "map field '{}' must have scalar values, found {}",
                    path, values
                )));
            }
            Ok(FieldType::Map(Box::new(values)))
        }
        RawType::Complex(RawComplexType::Array { items }) => {
            Ok(FieldType::Array(Box::new(convert_type(path, items)?)))
        }
        RawType::Complex(RawComplexType::Record { name, fields }) => {
            let mut converted = Vec::with_capacity(fields.len());
            for sub in fields {
                let sub_path = format!("{}.{}", path, sub.name);
                if sub.mapping.is_some() {
                    return Err(Error::invalid_schema(format!(
                        "nested field '{}' must not declare a mapping",
                        sub_path
                    )));
                }
                let field_type = convert_type(&sub_path, &sub.field_type)?;
                let default = match &sub.default {
                    Some(json) => Some(convert_default(&sub_path, json, &field_type)?),
                    None => None,
                };
                converted.push(RecordField {
                    name: sub.name.clone(),
                    field_type,
                    default,
                });
            }
            Ok(FieldType::Record(RecordType {
                name: name.clone(),
                fields: converted,
            }))
        }
    }
}

/// Convert a JSON default into a [`Value`] of `field_type`
///
/// Bytes defaults are strings whose code points are byte values
/// (`"ÿ"` is the single byte `0xff`). Record defaults may omit
/// subfields that declare their own default.
pub fn convert_default(
    path: &str,
    json: &serde_json::Value,
    field_type: &FieldType,
) -> Result<Value> {
    let mismatch = || {
        Error::invalid_schema(format!(
            "default of field '{}' does not conform to {}: {}",
            path, field_type, json
        ))
    };
    match field_type {
        FieldType::Boolean => json.as_bool().map(Value::Boolean).ok_or_else(mismatch),
        FieldType::Int => json
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(Value::Int)
            .ok_or_else(mismatch),
        FieldType::Long => json.as_i64().map(Value::Long).ok_or_else(mismatch),
        FieldType::Float => json.as_f64().map(|v| Value::Float(v as f32)).ok_or_else(mismatch),
        FieldType::Double => json.as_f64().map(Value::Double).ok_or_else(mismatch),
        FieldType::String => json
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(mismatch),
        FieldType::Bytes => {
            let text = json.as_str().ok_or_else(mismatch)?;
            text.chars()
                .map(|c| u8::try_from(u32::from(c)).map_err(|_| mismatch()))
                .collect::<Result<Vec<u8>>>()
                .map(Value::Bytes)
        }
        FieldType::Enum { symbols, .. } => match json.as_str() {
            Some(symbol) if symbols.iter().any(|s| s == symbol) => {
                Ok(Value::Enum(symbol.to_string()))
            }
            _ => Err(mismatch()),
        },
        FieldType::Map(values) => {
            let object = json.as_object().ok_or_else(mismatch)?;
            let mut entries = BTreeMap::new();
            for (key, value) in object {
                let entry_path = format!("{}[{}]", path, key);
                entries.insert(key.clone(), convert_default(&entry_path, value, values)?);
            }
            Ok(Value::Map(entries))
        }
        FieldType::Array(items) => {
            let elements = json.as_array().ok_or_else(mismatch)?;
            elements
                .iter()
                .enumerate()
                .map(|(i, v)| convert_default(&format!("{}[{}]", path, i), v, items))
                .collect::<Result<Vec<Value>>>()
                .map(Value::Array)
        }
        FieldType::Record(record) => {
            let object = json.as_object().ok_or_else(mismatch)?;
            if let Some(unknown) = object.keys().find(|k| record.field(k).is_none()) {
                return Err(Error::invalid_schema(format!(
                    "default of field '{}' sets unknown subfield '{}'",
                    path, unknown
                )));
            }
            let mut fields = BTreeMap::new();
            for sub in &record.fields {
                let sub_path = format!("{}.{}", path, sub.name);
                let value = match (object.get(&sub.name), &sub.default) {
                    (Some(v), _) => convert_default(&sub_path, v, &sub.field_type)?,
                    (None, Some(default)) => default.clone(),
                    (None, None) => {
                        return Err(Error::invalid_schema(format!(
                            "default of field '{}' is missing subfield '{}'",
                            path, sub.name
                        )))
                    }
                };
                fields.insert(sub.name.clone(), value);
            }
            Ok(Value::Record(fields))
        }
    }
}
