//! Entity capability trait and the dynamic record
//!
//! The codec never needs a concrete entity type: it reads fields by name
//! through [`Entity::get`] and writes them back through [`Entity::set`].
//! [`GenericRecord`] is the dynamic implementation; application structs
//! implement the trait to get a typed view.

use std::collections::BTreeMap;
use std::sync::Arc;

use tabula_core::{Error, Result, Value};
use tabula_schema::EntitySchema;

/// Field-level access to an entity
pub trait Entity: Sized {
    /// Empty instance shaped by `schema`
    fn instantiate(schema: &Arc<EntitySchema>) -> Self;

    /// Value of a key or non-key field, `None` when unset
    fn get(&self, field: &str) -> Option<Value>;

    /// Set a field decoded from storage
    fn set(&mut self, field: &str, value: Value) -> Result<()>;

    /// Schema this entity was built against, if it tracks one
    fn schema(&self) -> Option<&Arc<EntitySchema>> {
        None
    }
}

/// Dynamically-typed entity: field values by name plus its schema
#[derive(Debug, Clone)]
pub struct GenericRecord {
    schema: Arc<EntitySchema>,
    values: BTreeMap<String, Value>,
}

impl GenericRecord {
    /// Empty record of `schema`
    pub fn new(schema: Arc<EntitySchema>) -> Self {
        Self {
            schema,
            values: BTreeMap::new(),
        }
    }

    /// Builder form of [`Entity::set`]
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Result<Self> {
        self.set(field, value.into())?;
        Ok(self)
    }

    /// Borrow a field value
    pub fn value(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// All set fields
    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Unset a field
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.values.remove(field)
    }

    /// Consume into the field values
    pub fn into_values(self) -> BTreeMap<String, Value> {
        self.values
    }
}

impl Entity for GenericRecord {
    fn instantiate(schema: &Arc<EntitySchema>) -> Self {
        Self::new(Arc::clone(schema))
    }

    fn get(&self, field: &str) -> Option<Value> {
        self.values.get(field).cloned()
    }

    fn set(&mut self, field: &str, value: Value) -> Result<()> {
        if !self.schema.has_field(field) {
            return Err(Error::invalid_argument(format!(
                "{} has no field '{}'",
                self.schema.record_name(),
                field
            )));
        }
        self.values.insert(field.to_string(), value);
        Ok(())
    }

    fn schema(&self) -> Option<&Arc<EntitySchema>> {
        Some(&self.schema)
    }
}

/// Records are equal when their field values are; the schema is not compared
impl PartialEq for GenericRecord {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_schema::{JsonSchemaParser, SchemaParser};

    fn schema() -> Arc<EntitySchema> {
        Arc::new(
            JsonSchemaParser
                .parse(
                    r#"{"name": "User", "type": "record", "fields": [
                        {"name": "id", "type": "long", "mapping": {"type": "key", "value": "0"}},
                        {"name": "name", "type": "string", "mapping": {"type": "column", "value": "m:name"}}
                    ]}"#,
                )
                .unwrap(),
        )
    }

    #[test]
    fn test_set_and_get() {
        let record = GenericRecord::new(schema())
            .with("id", 7i64)
            .unwrap()
            .with("name", "ann")
            .unwrap();
        assert_eq!(record.get("id"), Some(Value::Long(7)));
        assert_eq!(record.value("name"), Some(&Value::from("ann")));
        assert_eq!(record.get("missing"), None);
        assert_eq!(record.values().len(), 2);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = GenericRecord::new(schema()).with("age", 3).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_instantiate_tracks_schema() {
        let schema = schema();
        let record = GenericRecord::instantiate(&schema);
        assert!(Arc::ptr_eq(record.schema().unwrap(), &schema));
        assert!(record.values().is_empty());
    }

    #[test]
    fn test_equality_ignores_schema_identity() {
        let a = GenericRecord::new(schema()).with("id", 1i64).unwrap();
        let b = GenericRecord::new(schema()).with("id", 1i64).unwrap();
        assert_eq!(a, b);
        let mut c = b.clone();
        c.remove("id");
        assert_ne!(a, c);
    }
}
