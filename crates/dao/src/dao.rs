//! Dao: entity-level access to one entity table
//!
//! A Dao ties a substrate table to a `(table, entity)` schema history. Reads
//! always decode with the schema version recorded on the row (the writer)
//! and shape the result as the Dao's reader schema.
//!
//! ## Schema binding
//!
//! - `Fixed`: reads and writes use one stored version for the Dao's lifetime
//! - `Dynamic`: the latest stored version is looked up on every call, so a
//!   migration made elsewhere is picked up without rebuilding the Dao

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use tabula_codec::{read_version, Entity, EntityCodec, PartitionKey, PartitionStrategy};
use tabula_core::{Error, Result, Row, ScanRange, SchemaVersion, TableStore, TabulaConfig, Value};
use tabula_schema::{EntitySchema, SchemaManager};

use crate::scanner::EntityScanner;

/// How a Dao picks its reader and writer schema
#[derive(Debug, Clone)]
pub enum SchemaBinding {
    /// Always this stored version
    Fixed(Arc<EntitySchema>),
    /// The latest stored version, resolved per operation
    Dynamic,
}

/// Entity access for one `(table, entity)`
pub struct Dao<E: Entity> {
    store: Arc<dyn TableStore>,
    manager: Arc<dyn SchemaManager>,
    table: String,
    entity: String,
    binding: SchemaBinding,
    caching: usize,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Dao<E> {
    /// Create a Dao with an explicit binding
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if a fixed schema belongs to another
    /// table or entity.
    pub fn new(
        store: Arc<dyn TableStore>,
        manager: Arc<dyn SchemaManager>,
        table: impl Into<String>,
        entity: impl Into<String>,
        binding: SchemaBinding,
    ) -> Result<Self> {
        let table = table.into();
        let entity = entity.into();
        if let SchemaBinding::Fixed(schema) = &binding {
            if schema.table() != table || schema.entity() != entity {
                return Err(Error::invalid_argument(format!(
                    "schema {}/{} cannot bind a Dao for {}/{}",
                    schema.table(),
                    schema.entity(),
                    table,
                    entity
                )));
            }
        }
        Ok(Self {
            store,
            manager,
            table,
            entity,
            binding,
            caching: TabulaConfig::default().scanner_caching,
            _entity: PhantomData,
        })
    }

    /// Dao bound to the stored version whose shape matches `schema_text`
    ///
    /// # Errors
    ///
    /// Returns `SchemaNotFound` if no stored version matches.
    pub fn fixed(
        store: Arc<dyn TableStore>,
        manager: Arc<dyn SchemaManager>,
        table: &str,
        entity: &str,
        schema_text: &str,
    ) -> Result<Self> {
        let candidate = manager.parse_schema(table, entity, schema_text)?;
        let version = manager.get_entity_version(table, entity, &candidate)?;
        Self::at_version(store, manager, table, entity, version)
    }

    /// Dao bound to a stored version
    pub fn at_version(
        store: Arc<dyn TableStore>,
        manager: Arc<dyn SchemaManager>,
        table: &str,
        entity: &str,
        version: SchemaVersion,
    ) -> Result<Self> {
        let schema = manager.get_schema(table, entity, version)?;
        Self::new(store, manager, table, entity, SchemaBinding::Fixed(schema))
    }

    /// Dao following the latest stored version
    pub fn dynamic(
        store: Arc<dyn TableStore>,
        manager: Arc<dyn SchemaManager>,
        table: &str,
        entity: &str,
    ) -> Result<Self> {
        Self::new(store, manager, table, entity, SchemaBinding::Dynamic)
    }

    /// Apply scanner settings from `config`
    pub fn with_config(mut self, config: &TabulaConfig) -> Result<Self> {
        config.validate()?;
        self.caching = config.scanner_caching;
        Ok(self)
    }

    /// Entity table name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Entity name
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// The binding this Dao was built with
    pub fn binding(&self) -> &SchemaBinding {
        &self.binding
    }

    /// Reader schema: the bound version, or the latest for a dynamic Dao
    pub fn schema(&self) -> Result<Arc<EntitySchema>> {
        match &self.binding {
            SchemaBinding::Fixed(schema) => Ok(Arc::clone(schema)),
            SchemaBinding::Dynamic => self.manager.get_latest_schema(&self.table, &self.entity),
        }
    }

    /// Key strategy of the reader schema
    pub fn partition_strategy(&self) -> Result<PartitionStrategy> {
        let schema = self.schema()?;
        Ok(PartitionStrategy::from_schema(&schema))
    }

    /// Build a partition key from key-field values in position order
    pub fn key(&self, values: impl IntoIterator<Item = Value>) -> Result<PartitionKey> {
        self.partition_strategy()?.partition_key(values)
    }

    /// Write `entity` as one atomic row mutation
    ///
    /// A dynamic Dao writes with the stored version matching the entity's
    /// own schema when it reports one, else with the latest version.
    pub fn put(&self, entity: &E) -> Result<()> {
        let writer = self.writer_for(entity)?;
        let strategy = PartitionStrategy::from_schema(&writer);
        let row = strategy.to_row_bytes(&strategy.key_from_entity(entity)?)?;
        let mutation = EntityCodec::encode_mutation(entity, &writer, row)?;
        let cells = mutation.puts.len();
        self.store.mutate_row(&self.table, mutation)?;
        debug!(target: "tabula::dao", table = %self.table, entity = %self.entity, version = writer.version(), cells, "Entity written");
        Ok(())
    }

    /// Read the entity stored under `key`, `None` if the row is absent
    pub fn get(&self, key: &PartitionKey) -> Result<Option<E>> {
        let reader = self.schema()?;
        let row = PartitionStrategy::from_schema(&reader).to_row_bytes(key)?;
        let Some(row) = self.store.get_row(&self.table, &row)? else {
            debug!(target: "tabula::dao", table = %self.table, entity = %self.entity, "Entity not found");
            return Ok(None);
        };
        decode_row(self.manager.as_ref(), &self.table, &self.entity, &row, &reader).map(Some)
    }

    /// Whether a row exists under `key`
    pub fn exists(&self, key: &PartitionKey) -> Result<bool> {
        let row = self.partition_strategy()?.to_row_bytes(key)?;
        Ok(self.store.get_row(&self.table, &row)?.is_some())
    }

    /// Remove the row under `key`; returns whether it existed
    pub fn delete(&self, key: &PartitionKey) -> Result<bool> {
        let row = self.partition_strategy()?.to_row_bytes(key)?;
        let removed = self.store.delete_row(&self.table, &row)?;
        debug!(target: "tabula::dao", table = %self.table, entity = %self.entity, removed, "Entity deleted");
        Ok(removed)
    }

    /// Atomically add `amount` to counter `field` and return the new value
    ///
    /// The counter column comes from the schema the row was written with.
    ///
    /// # Errors
    ///
    /// - `RowNotFound` if no row exists under `key`, including a row deleted
    ///   between the schema lookup and the add
    /// - `InvalidArgument` if `field` is not a counter field
    pub fn increment(&self, key: &PartitionKey, field: &str, amount: i64) -> Result<i64> {
        let row = self.partition_strategy()?.to_row_bytes(key)?;
        let Some(existing) = self.store.get_row(&self.table, &row)? else {
            return Err(Error::RowNotFound {
                table: self.table.clone(),
                row,
            });
        };
        let writer = self
            .manager
            .get_schema(&self.table, &self.entity, read_version(&existing)?)?;
        let column = EntityCodec::counter_column(&writer, field)?;
        let value = self.store.increment(&self.table, &row, &column, amount)?;
        debug!(target: "tabula::dao", table = %self.table, entity = %self.entity, field, amount, value, "Counter incremented");
        Ok(value)
    }

    /// Scan every entity in key order
    pub fn scanner(&self) -> Result<EntityScanner<E>> {
        self.scanner_range(None, None)
    }

    /// Scan entities with `start <= key < end`; `None` bounds are open
    pub fn scanner_range(
        &self,
        start: Option<&PartitionKey>,
        end: Option<&PartitionKey>,
    ) -> Result<EntityScanner<E>> {
        let reader = self.schema()?;
        let strategy = PartitionStrategy::from_schema(&reader);
        let range = ScanRange::new(
            start.map(|k| strategy.to_row_bytes(k)).transpose()?,
            end.map(|k| strategy.to_row_bytes(k)).transpose()?,
        );
        let rows = self.store.scan(&self.table, range, self.caching)?;
        Ok(EntityScanner::open(
            rows,
            Arc::clone(&self.manager),
            self.table.clone(),
            self.entity.clone(),
            reader,
        ))
    }

    fn writer_for(&self, entity: &E) -> Result<Arc<EntitySchema>> {
        match (&self.binding, entity.schema()) {
            (SchemaBinding::Fixed(schema), _) => Ok(Arc::clone(schema)),
            (SchemaBinding::Dynamic, Some(own))
                if own.table() == self.table && own.entity() == self.entity =>
            {
                self.manager.get_schema(&self.table, &self.entity, own.version())
            }
            (SchemaBinding::Dynamic, Some(own)) => {
                let version = self.manager.get_entity_version(&self.table, &self.entity, own)?;
                self.manager.get_schema(&self.table, &self.entity, version)
            }
            (SchemaBinding::Dynamic, None) => {
                self.manager.get_latest_schema(&self.table, &self.entity)
            }
        }
    }
}

/// Decode one row with the schema recorded on it, shaped as `reader`
pub(crate) fn decode_row<E: Entity>(
    manager: &dyn SchemaManager,
    table: &str,
    entity: &str,
    row: &Row,
    reader: &Arc<EntitySchema>,
) -> Result<E> {
    let version = read_version(row)?;
    if version == reader.version() {
        return EntityCodec::decode(row, reader, reader);
    }
    let writer = manager.get_schema(table, entity, version)?;
    EntityCodec::decode(row, &writer, reader)
}
