//! Schema manager: versioned schema registry over the managed-schema table
//!
//! The manager owns one substrate table. Every `(table, entity)` pair has a
//! row there holding all of its schema versions. Versions are appended with
//! a conditional write on the version's column, so two managers racing for
//! the same version cannot both win.
//!
//! ## Caching
//!
//! Parsed versions are cached per `(table, entity)` together with the stored
//! record bytes they were built from. Lookups by version number are served
//! from the cache and reload on a miss. The latest version is always re-read
//! so migrations made elsewhere are observed; a reload only parses versions
//! whose stored bytes are new or changed, and drops cached versions that are
//! gone from the store.
//!
//! A version deleted and recreated by another manager is picked up by the
//! next reload (any latest-version lookup, or `refresh`). Until then, lookups
//! of that version number on this manager return the cached schema.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use tabula_core::{Error, Result, RowMutation, SchemaVersion, TableStore, TabulaConfig};

use crate::compat::check_migration;
use crate::entity_schema::{EntitySchema, COLUMNAR_ENTITY_SERDE, ORDERED_KEY_SERDE};
use crate::managed::{managed_row_key, version_column, version_of, ManagedSchema, MANAGED_FAMILY};
use crate::parser::{JsonSchemaParser, SchemaParser};

type Versions = BTreeMap<SchemaVersion, Arc<EntitySchema>>;

/// A parsed version and the stored record it came from
#[derive(Clone)]
struct CachedVersion {
    record: Arc<[u8]>,
    schema: Arc<EntitySchema>,
}

type CachedVersions = BTreeMap<SchemaVersion, CachedVersion>;

/// Versioned schema registry
pub trait SchemaManager: Send + Sync {
    /// Store the first version (0) of a new entity schema
    ///
    /// # Errors
    ///
    /// - `IncompatibleSchema` if a schema for `(table, entity)` already exists
    /// - `InvalidArgument` for an unknown parser or serde identifier
    /// - `InvalidSchema` if the text does not parse
    fn create_schema(
        &self,
        table: &str,
        entity: &str,
        schema_text: &str,
        parser: &str,
        key_serde: &str,
        entity_serde: &str,
    ) -> Result<Arc<EntitySchema>>;

    /// Store `schema_text` as the next version after a compatibility check
    ///
    /// # Errors
    ///
    /// - `SchemaNotFound` if no version exists yet
    /// - `IncompatibleSchema` if any compatibility rule fails
    /// - `SchemaVersionConflict` if another migration claimed the version
    fn migrate_schema(
        &self,
        table: &str,
        entity: &str,
        schema_text: &str,
    ) -> Result<Arc<EntitySchema>>;

    /// Version whose shape matches `candidate`
    fn get_entity_version(
        &self,
        table: &str,
        entity: &str,
        candidate: &EntitySchema,
    ) -> Result<SchemaVersion>;

    /// A specific version
    fn get_schema(
        &self,
        table: &str,
        entity: &str,
        version: SchemaVersion,
    ) -> Result<Arc<EntitySchema>>;

    /// The highest stored version
    fn get_latest_schema(&self, table: &str, entity: &str) -> Result<Arc<EntitySchema>>;

    /// Parse text with the parser this entity's schemas were stored with
    fn parse_schema(&self, table: &str, entity: &str, schema_text: &str) -> Result<EntitySchema>;

    /// Whether any version is stored
    fn has_schema(&self, table: &str, entity: &str) -> Result<bool>;

    /// Create when absent, migrate otherwise
    fn create_or_migrate_schema(
        &self,
        table: &str,
        entity: &str,
        schema_text: &str,
    ) -> Result<Arc<EntitySchema>>;

    /// Every stored version, oldest first
    fn schema_history(&self, table: &str, entity: &str) -> Result<Vec<Arc<EntitySchema>>>;

    /// Remove the full history; returns whether anything was stored
    fn delete_schemas(&self, table: &str, entity: &str) -> Result<bool>;

    /// Drop cached versions
    fn refresh(&self, table: &str, entity: &str);
}

/// [`SchemaManager`] backed by a [`TableStore`]
pub struct DefaultSchemaManager {
    store: Arc<dyn TableStore>,
    managed_table: String,
    default_parser: String,
    parsers: FxHashMap<String, Arc<dyn SchemaParser>>,
    cache: RwLock<FxHashMap<(String, String), CachedVersions>>,
}

impl DefaultSchemaManager {
    /// Create a manager with the default configuration
    pub fn new(store: Arc<dyn TableStore>) -> Result<Self> {
        Self::with_config(store, &TabulaConfig::default())
    }

    /// Create a manager, creating the managed-schema table if needed
    pub fn with_config(store: Arc<dyn TableStore>, config: &TabulaConfig) -> Result<Self> {
        config.validate()?;
        store.create_table(&config.managed_schema_table)?;

        let mut parsers: FxHashMap<String, Arc<dyn SchemaParser>> = FxHashMap::default();
        let json: Arc<dyn SchemaParser> = Arc::new(JsonSchemaParser);
        parsers.insert(json.id().to_string(), json);

        Ok(Self {
            store,
            managed_table: config.managed_schema_table.clone(),
            default_parser: config.default_parser.clone(),
            parsers,
            cache: RwLock::new(FxHashMap::default()),
        })
    }

    /// Make another parser available by its id
    pub fn register_parser(&mut self, parser: Arc<dyn SchemaParser>) {
        self.parsers.insert(parser.id().to_string(), parser);
    }

    /// Name of the managed-schema table
    pub fn managed_table(&self) -> &str {
        &self.managed_table
    }

    fn parser(&self, id: &str) -> Result<&Arc<dyn SchemaParser>> {
        self.parsers
            .get(id)
            .ok_or_else(|| Error::invalid_argument(format!("unknown schema parser '{}'", id)))
    }

    fn cache_key(table: &str, entity: &str) -> (String, String) {
        (table.to_string(), entity.to_string())
    }

    fn cached_version(
        &self,
        table: &str,
        entity: &str,
        version: SchemaVersion,
    ) -> Option<Arc<EntitySchema>> {
        self.cache
            .read()
            .get(&Self::cache_key(table, entity))
            .and_then(|versions| versions.get(&version))
            .map(|cached| Arc::clone(&cached.schema))
    }

    fn cache_insert(&self, schema: &Arc<EntitySchema>, record: Arc<[u8]>) {
        self.cache
            .write()
            .entry(Self::cache_key(schema.table(), schema.entity()))
            .or_default()
            .insert(
                schema.version(),
                CachedVersion {
                    record,
                    schema: Arc::clone(schema),
                },
            );
    }

    /// Rebuild one stored version
    fn build(&self, table: &str, entity: &str, record: ManagedSchema) -> Result<EntitySchema> {
        if record.table != table || record.entity != entity {
            return Err(Error::Corruption(format!(
                "managed schema row for {}/{} holds a record for {}/{}",
                table, entity, record.table, record.entity
            )));
        }
        let schema = self.parser(&record.parser)?.parse(&record.schema)?;
        Ok(schema
            .with_identity(table, entity, record.version)
            .with_serdes(record.parser, record.key_serde, record.entity_serde))
    }

    /// Read every version from the managed table and replace the cache entry
    ///
    /// Versions whose stored bytes match the cache keep their parsed schema.
    fn load(&self, table: &str, entity: &str) -> Result<Versions> {
        let key = Self::cache_key(table, entity);
        let row = self
            .store
            .get_row(&self.managed_table, &managed_row_key(table, entity))?;
        let previous = self.cache.read().get(&key).cloned().unwrap_or_default();

        let mut loaded = CachedVersions::new();
        let mut parsed = 0usize;
        if let Some(row) = row {
            for (column, bytes) in row.cells {
                if column.family != MANAGED_FAMILY {
                    continue;
                }
                let version = version_of(&column)?;
                if let Some(cached) = previous.get(&version).filter(|c| *c.record == *bytes) {
                    loaded.insert(version, cached.clone());
                    continue;
                }
                let record = ManagedSchema::from_bytes(&bytes)?;
                if record.version != version {
                    return Err(Error::Corruption(format!(
                        "managed schema column {} holds version {}",
                        version, record.version
                    )));
                }
                if previous.contains_key(&version) {
                    warn!(target: "tabula::schema", table = %table, entity = %entity, version, "Stored schema version changed; replacing cached copy");
                }
                let schema = Arc::new(self.build(table, entity, record)?);
                parsed += 1;
                loaded.insert(
                    version,
                    CachedVersion {
                        record: Arc::from(bytes),
                        schema,
                    },
                );
            }
        }
        debug!(target: "tabula::schema", table = %table, entity = %entity, versions = loaded.len(), parsed, "Schema history loaded");

        let versions: Versions = loaded
            .iter()
            .map(|(v, cached)| (*v, Arc::clone(&cached.schema)))
            .collect();
        let mut cache = self.cache.write();
        if loaded.is_empty() {
            cache.remove(&key);
        } else {
            cache.insert(key, loaded);
        }
        Ok(versions)
    }

    /// Claim `version` for `schema`
    ///
    /// Returns the stored record, or `None` if the column is already taken.
    fn claim(&self, schema: &EntitySchema) -> Result<Option<Arc<[u8]>>> {
        let record = ManagedSchema {
            table: schema.table().to_string(),
            entity: schema.entity().to_string(),
            version: schema.version(),
            schema: schema.raw_text().to_string(),
            parser: schema.parser_id().to_string(),
            key_serde: schema.key_serde().to_string(),
            entity_serde: schema.entity_serde().to_string(),
            created_at: Utc::now(),
        };
        let column = version_column(schema.version());
        let bytes = record.to_bytes()?;
        let mut mutation = RowMutation::new(managed_row_key(schema.table(), schema.entity()));
        mutation.put(column.clone(), bytes.clone());
        let claimed = self
            .store
            .check_and_mutate(&self.managed_table, &column, None, mutation)?;
        Ok(claimed.then(|| Arc::from(bytes)))
    }
}

fn check_serde_ids(key_serde: &str, entity_serde: &str) -> Result<()> {
    if key_serde != ORDERED_KEY_SERDE {
        return Err(Error::invalid_argument(format!(
            "unknown key serde '{}'",
            key_serde
        )));
    }
    if entity_serde != COLUMNAR_ENTITY_SERDE {
        return Err(Error::invalid_argument(format!(
            "unknown entity serde '{}'",
            entity_serde
        )));
    }
    Ok(())
}

impl SchemaManager for DefaultSchemaManager {
    fn create_schema(
        &self,
        table: &str,
        entity: &str,
        schema_text: &str,
        parser: &str,
        key_serde: &str,
        entity_serde: &str,
    ) -> Result<Arc<EntitySchema>> {
        check_serde_ids(key_serde, entity_serde)?;
        let schema = self
            .parser(parser)?
            .parse(schema_text)?
            .with_identity(table, entity, 0)
            .with_serdes(parser, key_serde, entity_serde);

        let Some(record) = self.claim(&schema)? else {
            warn!(target: "tabula::schema", table = %table, entity = %entity, "Schema creation rejected: already exists");
            return Err(Error::incompatible(format!(
                "schema for {}/{} already exists",
                table, entity
            )));
        };

        let schema = Arc::new(schema);
        self.cache_insert(&schema, record);
        info!(target: "tabula::schema", table = %table, entity = %entity, version = 0u32, "Schema created");
        Ok(schema)
    }

    fn migrate_schema(
        &self,
        table: &str,
        entity: &str,
        schema_text: &str,
    ) -> Result<Arc<EntitySchema>> {
        let history = self.load(table, entity)?;
        let latest = history
            .values()
            .next_back()
            .cloned()
            .ok_or_else(|| Error::schema_not_found(table, entity, None))?;
        let version = latest.version().checked_add(1).ok_or_else(|| {
            Error::Storage(format!("schema versions exhausted for {}/{}", table, entity))
        })?;

        let candidate = self
            .parser(latest.parser_id())?
            .parse(schema_text)?
            .with_identity(table, entity, version)
            .with_serdes(latest.parser_id(), latest.key_serde(), latest.entity_serde());

        if let Err(e) = check_migration(&candidate, &latest, history.values().map(|s| s.as_ref())) {
            warn!(target: "tabula::schema", table = %table, entity = %entity, error = %e, "Migration rejected");
            return Err(e);
        }

        let Some(record) = self.claim(&candidate)? else {
            warn!(target: "tabula::schema", table = %table, entity = %entity, version, "Migration lost version race");
            self.refresh(table, entity);
            return Err(Error::SchemaVersionConflict {
                table: table.to_string(),
                entity: entity.to_string(),
                version,
            });
        };

        let candidate = Arc::new(candidate);
        self.cache_insert(&candidate, record);
        info!(target: "tabula::schema", table = %table, entity = %entity, version, "Schema migrated");
        Ok(candidate)
    }

    fn get_entity_version(
        &self,
        table: &str,
        entity: &str,
        candidate: &EntitySchema,
    ) -> Result<SchemaVersion> {
        let shape = candidate.shape();
        let cached = self
            .cache
            .read()
            .get(&Self::cache_key(table, entity))
            .and_then(|versions| {
                versions
                    .values()
                    .find(|c| c.schema.shape() == shape)
                    .map(|c| c.schema.version())
            });
        if let Some(version) = cached {
            return Ok(version);
        }
        self.load(table, entity)?
            .values()
            .find(|s| s.shape() == shape)
            .map(|s| s.version())
            .ok_or_else(|| Error::schema_not_found(table, entity, None))
    }

    fn get_schema(
        &self,
        table: &str,
        entity: &str,
        version: SchemaVersion,
    ) -> Result<Arc<EntitySchema>> {
        if let Some(schema) = self.cached_version(table, entity, version) {
            return Ok(schema);
        }
        self.load(table, entity)?
            .remove(&version)
            .ok_or_else(|| Error::schema_not_found(table, entity, Some(version)))
    }

    fn get_latest_schema(&self, table: &str, entity: &str) -> Result<Arc<EntitySchema>> {
        self.load(table, entity)?
            .into_values()
            .next_back()
            .ok_or_else(|| Error::schema_not_found(table, entity, None))
    }

    fn parse_schema(&self, table: &str, entity: &str, schema_text: &str) -> Result<EntitySchema> {
        let versions = self.load(table, entity)?;
        let parser = match versions.values().next_back() {
            Some(latest) => self.parser(latest.parser_id())?,
            None => self.parser(&self.default_parser)?,
        };
        parser.parse(schema_text)
    }

    fn has_schema(&self, table: &str, entity: &str) -> Result<bool> {
        Ok(!self.load(table, entity)?.is_empty())
    }

    fn create_or_migrate_schema(
        &self,
        table: &str,
        entity: &str,
        schema_text: &str,
    ) -> Result<Arc<EntitySchema>> {
        if self.has_schema(table, entity)? {
            self.migrate_schema(table, entity, schema_text)
        } else {
            self.create_schema(
                table,
                entity,
                schema_text,
                &self.default_parser,
                ORDERED_KEY_SERDE,
                COLUMNAR_ENTITY_SERDE,
            )
        }
    }

    fn schema_history(&self, table: &str, entity: &str) -> Result<Vec<Arc<EntitySchema>>> {
        Ok(self.load(table, entity)?.into_values().collect())
    }

    fn delete_schemas(&self, table: &str, entity: &str) -> Result<bool> {
        let removed = self
            .store
            .delete_row(&self.managed_table, &managed_row_key(table, entity))?;
        self.refresh(table, entity);
        if removed {
            info!(target: "tabula::schema", table = %table, entity = %entity, "Schema history deleted");
        }
        Ok(removed)
    }

    fn refresh(&self, table: &str, entity: &str) {
        self.cache.write().remove(&Self::cache_key(table, entity));
    }
}
