//! Partition keys and row key composition
//!
//! A [`PartitionStrategy`] turns an ordered tuple of key-field values into
//! the physical row key. Each component uses the order-preserving encoding
//! from `tabula_core::ordered`, so:
//! - equal tuples always produce identical row keys
//! - distinct tuples never collide (component boundaries are encoded)
//! - row keys sort in the same order as tuples compared field by field
//!
//! Enum key fields encode their symbol's ordinal, so they sort in
//! declaration order.

use smallvec::SmallVec;

use tabula_core::{ordered, Error, OrderedReader, Result, Value};
use tabula_schema::{EntitySchema, FieldType, KeyField};

use crate::record::Entity;

/// Ordered tuple of key-field values
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionKey {
    values: SmallVec<[Value; 4]>,
}

impl PartitionKey {
    /// Wrap values without checking them against a strategy
    pub fn new(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }

    /// Values in key order
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value at `position`
    pub fn get(&self, position: usize) -> Option<&Value> {
        self.values.get(position)
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True for the empty tuple
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Consume into the values
    pub fn into_values(self) -> Vec<Value> {
        self.values.into_vec()
    }
}

impl From<Value> for PartitionKey {
    fn from(value: Value) -> Self {
        Self::new([value])
    }
}

/// Ordered key fields of an entity and the row key layout they define
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionStrategy {
    fields: Vec<KeyField>,
}

impl PartitionStrategy {
    /// Strategy over explicit key fields
    pub fn new(fields: Vec<KeyField>) -> Self {
        Self { fields }
    }

    /// Strategy over a schema's key fields
    pub fn from_schema(schema: &EntitySchema) -> Self {
        Self::new(schema.key_fields().to_vec())
    }

    /// Key fields in key order
    pub fn key_fields(&self) -> &[KeyField] {
        &self.fields
    }

    /// Build a key from values given in key order
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the arity or any value's type does not
    /// match the key fields.
    pub fn partition_key(&self, values: impl IntoIterator<Item = Value>) -> Result<PartitionKey> {
        let key = PartitionKey::new(values);
        self.check(&key)?;
        Ok(key)
    }

    /// Extract the key-field values of an entity
    pub fn key_from_entity<E: Entity>(&self, entity: &E) -> Result<PartitionKey> {
        let mut values = SmallVec::with_capacity(self.fields.len());
        for field in &self.fields {
            match entity.get(&field.name) {
                Some(value) if !value.is_null() => values.push(value),
                _ => {
                    return Err(Error::invalid_argument(format!(
                        "entity has no value for key field '{}'",
                        field.name
                    )))
                }
            }
        }
        let key = PartitionKey { values };
        self.check(&key)?;
        Ok(key)
    }

    fn check(&self, key: &PartitionKey) -> Result<()> {
        if key.len() != self.fields.len() {
            return Err(Error::invalid_argument(format!(
                "partition key has {} values, expected {}",
                key.len(),
                self.fields.len()
            )));
        }
        for (field, value) in self.fields.iter().zip(key.values()) {
            if !field.field_type.conforms(value) {
                return Err(Error::invalid_argument(format!(
                    "key field '{}' expects {}, got {}",
                    field.name,
                    field.field_type,
                    value.type_name()
                )));
            }
        }
        Ok(())
    }

    /// Physical row key of `key`
    pub fn to_row_bytes(&self, key: &PartitionKey) -> Result<Vec<u8>> {
        self.check(key)?;
        let mut out = Vec::with_capacity(16 * key.len());
        for (field, value) in self.fields.iter().zip(key.values()) {
            encode_component(&mut out, &field.field_type, value)?;
        }
        Ok(out)
    }

    /// Decode a physical row key back into its key values
    ///
    /// # Errors
    ///
    /// Returns `Corruption` if the bytes are not a complete row key of
    /// this strategy.
    pub fn from_row_bytes(&self, bytes: &[u8]) -> Result<PartitionKey> {
        let mut reader = OrderedReader::new(bytes);
        let mut values = SmallVec::with_capacity(self.fields.len());
        for field in &self.fields {
            values.push(decode_component(&mut reader, &field.field_type)?);
        }
        if !reader.is_empty() {
            return Err(Error::Corruption(format!(
                "row key has trailing bytes after {} key fields",
                self.fields.len()
            )));
        }
        Ok(PartitionKey { values })
    }
}

fn encode_component(out: &mut Vec<u8>, field_type: &FieldType, value: &Value) -> Result<()> {
    match (field_type, value) {
        (FieldType::Boolean, Value::Boolean(b)) => ordered::encode_bool(out, *b),
        (FieldType::Int, Value::Int(i)) => ordered::encode_int(out, *i),
        (FieldType::Long, Value::Long(l)) => ordered::encode_long(out, *l),
        (FieldType::Float, Value::Float(f)) => ordered::encode_float(out, *f),
        (FieldType::Double, Value::Double(d)) => ordered::encode_double(out, *d),
        (FieldType::String, Value::String(s)) => ordered::encode_str(out, s),
        (FieldType::Bytes, Value::Bytes(b)) => ordered::encode_bytes(out, b),
        (FieldType::Enum { symbols, .. }, Value::Enum(symbol)) => {
            let ordinal = symbols.iter().position(|s| s == symbol).ok_or_else(|| {
                Error::invalid_argument(format!("unknown enum symbol '{}'", symbol))
            })?;
            ordered::encode_int(out, ordinal as i32);
        }
        _ => {
            return Err(Error::invalid_argument(format!(
                "cannot encode {} as a {} key component",
                value.type_name(),
                field_type
            )))
        }
    }
    Ok(())
}

fn decode_component(reader: &mut OrderedReader<'_>, field_type: &FieldType) -> Result<Value> {
    Ok(match field_type {
        FieldType::Boolean => Value::Boolean(reader.read_bool()?),
        FieldType::Int => Value::Int(reader.read_int()?),
        FieldType::Long => Value::Long(reader.read_long()?),
        FieldType::Float => Value::Float(reader.read_float()?),
        FieldType::Double => Value::Double(reader.read_double()?),
        FieldType::String => Value::String(reader.read_string()?),
        FieldType::Bytes => Value::Bytes(reader.read_bytes()?),
        FieldType::Enum { symbols, .. } => {
            let ordinal = reader.read_int()?;
            let symbol = usize::try_from(ordinal)
                .ok()
                .and_then(|i| symbols.get(i))
                .ok_or_else(|| {
                    Error::Corruption(format!("enum ordinal {} out of range in row key", ordinal))
                })?;
            Value::Enum(symbol.clone())
        }
        other => {
            return Err(Error::Corruption(format!(
                "{} cannot appear in a row key",
                other
            )))
        }
    })
}
