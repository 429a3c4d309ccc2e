//! Parsed entity schemas
//!
//! An [`EntitySchema`] is one immutable version of an entity's shape:
//! - key fields in row-key order
//! - non-key fields with their type, optional default and column mapping
//! - the raw schema text it was parsed from
//!
//! Structural rules are enforced once, in [`EntitySchema::from_fields`], so
//! every parser produces schemas the codec can rely on.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use tabula_core::{Column, Error, Result, SchemaVersion, Value};

/// Column family reserved for row metadata (the version marker)
pub const RESERVED_FAMILY: &str = "_s";

/// Parser identifier of the built-in JSON schema parser
pub const JSON_PARSER_ID: &str = "json";

/// Key serde identifier of the order-preserving row key encoding
pub const ORDERED_KEY_SERDE: &str = "ordered";

/// Entity serde identifier of the column-per-field cell encoding
pub const COLUMNAR_ENTITY_SERDE: &str = "columnar";

/// Type of a field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// true / false
    Boolean,
    /// 32-bit signed integer
    Int,
    /// 64-bit signed integer
    Long,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
    /// UTF-8 string
    String,
    /// Raw bytes
    Bytes,
    /// One of a fixed set of symbols
    Enum {
        /// Enum type name
        name: String,
        /// Allowed symbols, in declaration order
        symbols: Vec<String>,
    },
    /// String-keyed map
    Map(Box<FieldType>),
    /// Ordered list
    Array(Box<FieldType>),
    /// Nested record
    Record(RecordType),
}

impl FieldType {
    /// Scalars are the types allowed in row keys and map values
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            FieldType::Boolean
                | FieldType::Int
                | FieldType::Long
                | FieldType::Float
                | FieldType::Double
                | FieldType::String
                | FieldType::Bytes
                | FieldType::Enum { .. }
        )
    }

    /// Shape of this type with record/enum names and defaults stripped
    ///
    /// Two types with equal canonical forms store and decode identically.
    pub fn canonical(&self) -> FieldType {
        match self {
            FieldType::Enum { symbols, .. } => FieldType::Enum {
                name: String::new(),
                symbols: symbols.clone(),
            },
            FieldType::Map(values) => FieldType::Map(Box::new(values.canonical())),
            FieldType::Array(items) => FieldType::Array(Box::new(items.canonical())),
            FieldType::Record(record) => FieldType::Record(RecordType {
                name: String::new(),
                fields: record
                    .fields
                    .iter()
                    .map(|f| RecordField {
                        name: f.name.clone(),
                        field_type: f.field_type.canonical(),
                        default: None,
                    })
                    .collect(),
            }),
            other => other.clone(),
        }
    }

    /// Whether `value` is a complete, well-typed instance of this type
    pub fn conforms(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldType::Boolean, Value::Boolean(_))
            | (FieldType::Int, Value::Int(_))
            | (FieldType::Long, Value::Long(_))
            | (FieldType::Float, Value::Float(_))
            | (FieldType::Double, Value::Double(_))
            | (FieldType::String, Value::String(_))
            | (FieldType::Bytes, Value::Bytes(_)) => true,
            (FieldType::Enum { symbols, .. }, Value::Enum(symbol)) => symbols.contains(symbol),
            (FieldType::Map(values), Value::Map(entries)) => {
                entries.values().all(|v| values.conforms(v))
            }
            (FieldType::Array(items), Value::Array(elements)) => {
                elements.iter().all(|v| items.conforms(v))
            }
            (FieldType::Record(record), Value::Record(fields)) => {
                fields.len() == record.fields.len()
                    && record.fields.iter().all(|f| {
                        fields
                            .get(&f.name)
                            .map_or(false, |v| f.field_type.conforms(v))
                    })
            }
            _ => false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Boolean => write!(f, "boolean"),
            FieldType::Int => write!(f, "int"),
            FieldType::Long => write!(f, "long"),
            FieldType::Float => write!(f, "float"),
            FieldType::Double => write!(f, "double"),
            FieldType::String => write!(f, "string"),
            FieldType::Bytes => write!(f, "bytes"),
            FieldType::Enum { name, .. } => write!(f, "enum {}", name),
            FieldType::Map(values) => write!(f, "map<{}>", values),
            FieldType::Array(items) => write!(f, "array<{}>", items),
            FieldType::Record(record) => write!(f, "record {}", record.name),
        }
    }
}

/// Nested record type
#[derive(Debug, Clone, PartialEq)]
pub struct RecordType {
    /// Record type name
    pub name: String,
    /// Subfields in declaration order
    pub fields: Vec<RecordField>,
}

impl RecordType {
    /// Look up a subfield by name
    pub fn field(&self, name: &str) -> Option<&RecordField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Subfield of a nested record
#[derive(Debug, Clone, PartialEq)]
pub struct RecordField {
    /// Subfield name
    pub name: String,
    /// Subfield type
    pub field_type: FieldType,
    /// Value used when the subfield is absent
    pub default: Option<Value>,
}

/// Where a top-level field lives in a row
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldMapping {
    /// Part of the row key at `position`
    Key {
        /// Zero-based position in the composite key
        position: usize,
    },
    /// One column (records: one column per leaf subfield under `qualifier.`)
    Column {
        /// Column family
        family: String,
        /// Column qualifier
        qualifier: String,
    },
    /// Map entries, each at qualifier `prefix + key`
    KeyAsColumn {
        /// Column family
        family: String,
        /// Qualifier prefix
        prefix: String,
    },
    /// 8-byte counter column updated with atomic increments
    Counter {
        /// Column family
        family: String,
        /// Column qualifier
        qualifier: String,
    },
}

impl FieldMapping {
    /// Column family, `None` for key fields
    pub fn family(&self) -> Option<&str> {
        match self {
            FieldMapping::Key { .. } => None,
            FieldMapping::Column { family, .. }
            | FieldMapping::KeyAsColumn { family, .. }
            | FieldMapping::Counter { family, .. } => Some(family),
        }
    }

    /// The single column of a column or counter mapping
    pub fn column(&self) -> Option<Column> {
        match self {
            FieldMapping::Column { family, qualifier }
            | FieldMapping::Counter { family, qualifier } => {
                Some(Column::new(family.as_str(), qualifier))
            }
            _ => None,
        }
    }
}

impl fmt::Display for FieldMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldMapping::Key { position } => write!(f, "key({})", position),
            FieldMapping::Column { family, qualifier } => {
                write!(f, "column({}:{})", family, qualifier)
            }
            FieldMapping::KeyAsColumn { family, prefix } => {
                write!(f, "keyAsColumn({}:{})", family, prefix)
            }
            FieldMapping::Counter { family, qualifier } => {
                write!(f, "counter({}:{})", family, qualifier)
            }
        }
    }
}

/// A key field, in row-key order
#[derive(Debug, Clone, PartialEq)]
pub struct KeyField {
    /// Field name
    pub name: String,
    /// Scalar type
    pub field_type: FieldType,
}

/// A top-level field as declared in schema text
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Field type
    pub field_type: FieldType,
    /// Value used when the field is absent
    pub default: Option<Value>,
    /// Storage mapping
    pub mapping: FieldMapping,
}

/// Canonical field/type/mapping shape of a schema
///
/// Ignores defaults, record names and field declaration order. Two schema
/// versions with equal shapes are duplicates.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaShape {
    /// Key fields in key order with canonical types
    pub key_fields: Vec<(String, FieldType)>,
    /// Non-key fields by name
    pub fields: BTreeMap<String, (FieldType, FieldMapping)>,
}

/// One immutable version of an entity schema
#[derive(Debug, Clone)]
pub struct EntitySchema {
    table: String,
    entity: String,
    version: SchemaVersion,
    record_name: String,
    key_fields: Vec<KeyField>,
    fields: Vec<FieldDef>,
    raw_text: String,
    parser: String,
    key_serde: String,
    entity_serde: String,
}

impl EntitySchema {
    /// Build a schema from declared fields, enforcing structural rules
    ///
    /// The result is unbound: it carries no table, entity or version until
    /// [`with_identity`](Self::with_identity) is applied.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSchema` when:
    /// - field names repeat
    /// - key positions are not exactly `0..n`, or there are no key fields
    /// - a key field is not scalar
    /// - a mapping does not fit its type (maps need `keyAsColumn`,
    ///   counters must be `long`)
    /// - two fields share a column, or a map prefix shadows a column
    /// - the reserved family is used
    /// - a default does not conform to its type
    pub fn from_fields(
        record_name: impl Into<String>,
        fields: Vec<FieldDef>,
        raw_text: impl Into<String>,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(Error::invalid_schema(format!(
                    "duplicate field '{}'",
                    field.name
                )));
            }
        }

        let mut keyed: Vec<(usize, KeyField)> = Vec::new();
        let mut values = Vec::new();
        for field in fields {
            match field.mapping {
                FieldMapping::Key { position } => {
                    if !field.field_type.is_scalar() {
                        return Err(Error::invalid_schema(format!(
                            "key field '{}' must be scalar, found {}",
                            field.name, field.field_type
                        )));
                    }
                    keyed.push((
                        position,
                        KeyField {
                            name: field.name,
                            field_type: field.field_type,
                        },
                    ));
                }
                _ => {
                    validate_field(&field)?;
                    values.push(field);
                }
            }
        }

        if keyed.is_empty() {
            return Err(Error::invalid_schema("schema declares no key fields"));
        }
        keyed.sort_by_key(|(position, _)| *position);
        for (expected, (position, field)) in keyed.iter().enumerate() {
            if *position != expected {
                return Err(Error::invalid_schema(format!(
                    "key positions must be contiguous from 0: field '{}' has position {}, expected {}",
                    field.name, position, expected
                )));
            }
        }
        validate_columns(&values)?;

        Ok(Self {
            table: String::new(),
            entity: String::new(),
            version: 0,
            record_name: record_name.into(),
            key_fields: keyed.into_iter().map(|(_, k)| k).collect(),
            fields: values,
            raw_text: raw_text.into(),
            parser: JSON_PARSER_ID.to_string(),
            key_serde: ORDERED_KEY_SERDE.to_string(),
            entity_serde: COLUMNAR_ENTITY_SERDE.to_string(),
        })
    }

    /// Bind this schema to a stored `(table, entity, version)`
    pub fn with_identity(
        mut self,
        table: impl Into<String>,
        entity: impl Into<String>,
        version: SchemaVersion,
    ) -> Self {
        self.table = table.into();
        self.entity = entity.into();
        self.version = version;
        self
    }

    /// Record the parser and serde identifiers this schema was stored with
    pub fn with_serdes(
        mut self,
        parser: impl Into<String>,
        key_serde: impl Into<String>,
        entity_serde: impl Into<String>,
    ) -> Self {
        self.parser = parser.into();
        self.key_serde = key_serde.into();
        self.entity_serde = entity_serde.into();
        self
    }

    /// Entity table name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Entity name
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Schema version
    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    /// Name of the top-level record
    pub fn record_name(&self) -> &str {
        &self.record_name
    }

    /// Key fields in row-key order
    pub fn key_fields(&self) -> &[KeyField] {
        &self.key_fields
    }

    /// Non-key fields in declaration order
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Look up a non-key field
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a key field
    pub fn key_field(&self, name: &str) -> Option<&KeyField> {
        self.key_fields.iter().find(|k| k.name == name)
    }

    /// Whether `name` is a key or non-key field
    pub fn has_field(&self, name: &str) -> bool {
        self.key_field(name).is_some() || self.field(name).is_some()
    }

    /// Source text this schema was parsed from
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    /// Parser identifier
    pub fn parser_id(&self) -> &str {
        &self.parser
    }

    /// Row key serde identifier
    pub fn key_serde(&self) -> &str {
        &self.key_serde
    }

    /// Entity cell serde identifier
    pub fn entity_serde(&self) -> &str {
        &self.entity_serde
    }

    /// Canonical shape used for duplicate detection and by-content lookup
    pub fn shape(&self) -> SchemaShape {
        SchemaShape {
            key_fields: self
                .key_fields
                .iter()
                .map(|k| (k.name.clone(), k.field_type.canonical()))
                .collect(),
            fields: self
                .fields
                .iter()
                .map(|f| {
                    (
                        f.name.clone(),
                        (f.field_type.canonical(), f.mapping.clone()),
                    )
                })
                .collect(),
        }
    }

    /// Whether `other` has the same canonical shape
    pub fn same_shape(&self, other: &EntitySchema) -> bool {
        self.shape() == other.shape()
    }
}

fn validate_family(field: &str, family: &str) -> Result<()> {
    if family.is_empty() {
        return Err(Error::invalid_schema(format!(
            "field '{}' has an empty column family",
            field
        )));
    }
    if family == RESERVED_FAMILY {
        return Err(Error::invalid_schema(format!(
            "field '{}' uses reserved column family '{}'",
            field, RESERVED_FAMILY
        )));
    }
    Ok(())
}

fn validate_field(field: &FieldDef) -> Result<()> {
    match &field.mapping {
        FieldMapping::Key { .. } => {}
        FieldMapping::Column { family, qualifier } => {
            validate_family(&field.name, family)?;
            if qualifier.is_empty() {
                return Err(Error::invalid_schema(format!(
                    "field '{}' has an empty column qualifier",
                    field.name
                )));
            }
            validate_column_type(&field.name, &field.field_type)?;
        }
        FieldMapping::KeyAsColumn { family, .. } => {
            validate_family(&field.name, family)?;
            match &field.field_type {
                FieldType::Map(values) if values.is_scalar() => {}
                other => {
                    return Err(Error::invalid_schema(format!(
                        "keyAsColumn field '{}' must be a map of scalars, found {}",
                        field.name, other
                    )))
                }
            }
        }
        FieldMapping::Counter { family, qualifier } => {
            validate_family(&field.name, family)?;
            if qualifier.is_empty() {
                return Err(Error::invalid_schema(format!(
                    "field '{}' has an empty column qualifier",
                    field.name
                )));
            }
            if field.field_type != FieldType::Long {
                return Err(Error::invalid_schema(format!(
                    "counter field '{}' must be long, found {}",
                    field.name, field.field_type
                )));
            }
        }
    }
    if let Some(default) = &field.default {
        if !field.field_type.conforms(default) {
            return Err(Error::invalid_schema(format!(
                "default of field '{}' does not conform to {}",
                field.name, field.field_type
            )));
        }
    }
    validate_nested_defaults(&field.name, &field.field_type)
}

/// Maps are only stored through keyAsColumn, so none may appear inside a
/// column-mapped record
fn validate_column_type(path: &str, field_type: &FieldType) -> Result<()> {
    match field_type {
        FieldType::Map(_) => Err(Error::invalid_schema(format!(
            "map field '{}' must use a keyAsColumn mapping",
            path
        ))),
        FieldType::Record(record) => {
            let mut seen = HashSet::new();
            for sub in &record.fields {
                if !seen.insert(sub.name.as_str()) {
                    return Err(Error::invalid_schema(format!(
                        "duplicate field '{}.{}'",
                        path, sub.name
                    )));
                }
                validate_column_type(&format!("{}.{}", path, sub.name), &sub.field_type)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn validate_nested_defaults(path: &str, field_type: &FieldType) -> Result<()> {
    match field_type {
        FieldType::Record(record) => {
            for sub in &record.fields {
                let sub_path = format!("{}.{}", path, sub.name);
                if let Some(default) = &sub.default {
                    if !sub.field_type.conforms(default) {
                        return Err(Error::invalid_schema(format!(
                            "default of field '{}' does not conform to {}",
                            sub_path, sub.field_type
                        )));
                    }
                }
                validate_nested_defaults(&sub_path, &sub.field_type)?;
            }
            Ok(())
        }
        FieldType::Array(items) => validate_nested_defaults(path, items),
        FieldType::Map(values) => validate_nested_defaults(path, values),
        _ => Ok(()),
    }
}

fn leaf_qualifiers(qualifier: &str, field_type: &FieldType, out: &mut Vec<String>) {
    match field_type {
        FieldType::Record(record) => {
            for sub in &record.fields {
                leaf_qualifiers(&format!("{}.{}", qualifier, sub.name), &sub.field_type, out);
            }
        }
        _ => out.push(qualifier.to_string()),
    }
}

fn validate_columns(fields: &[FieldDef]) -> Result<()> {
    let mut leaves: BTreeSet<(&str, String)> = BTreeSet::new();
    let mut prefixes: Vec<(&str, &str, &str)> = Vec::new();

    for field in fields {
        match &field.mapping {
            FieldMapping::Key { .. } => {}
            FieldMapping::Column { family, qualifier }
            | FieldMapping::Counter { family, qualifier } => {
                let mut qualifiers = Vec::new();
                leaf_qualifiers(qualifier, &field.field_type, &mut qualifiers);
                for q in qualifiers {
                    if !leaves.insert((family.as_str(), q.clone())) {
                        return Err(Error::invalid_schema(format!(
                            "column {}:{} is mapped more than once",
                            family, q
                        )));
                    }
                }
            }
            FieldMapping::KeyAsColumn { family, prefix } => {
                prefixes.push((field.name.as_str(), family.as_str(), prefix.as_str()));
            }
        }
    }

    for (i, (name, family, prefix)) in prefixes.iter().enumerate() {
        if let Some((_, q)) = leaves
            .iter()
            .find(|(f, q)| f == family && q.starts_with(prefix))
        {
            return Err(Error::invalid_schema(format!(
                "keyAsColumn prefix {}:{} of field '{}' shadows column {}:{}",
                family, prefix, name, family, q
            )));
        }
        for (other, other_family, other_prefix) in &prefixes[i + 1..] {
            if family == other_family
                && (prefix.starts_with(other_prefix) || other_prefix.starts_with(prefix))
            {
                return Err(Error::invalid_schema(format!(
                    "keyAsColumn prefixes of fields '{}' and '{}' overlap in family {}",
                    name, other, family
                )));
            }
        }
    }
    Ok(())
}
