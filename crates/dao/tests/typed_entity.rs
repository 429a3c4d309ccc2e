//! Typed entities: application structs implementing `Entity`

use std::collections::BTreeMap;
use std::sync::Arc;

use tabula_core::{Error, Result, Value};
use tabula_dao::{Dao, Entity};
use tabula_schema::{DefaultSchemaManager, EntitySchema, SchemaManager};
use tabula_storage::MemTableStore;

const PRODUCT_V0: &str = r#"{"name": "Product", "type": "record", "fields": [
    {"name": "sku", "type": "string", "mapping": {"type": "key", "value": "0"}},
    {"name": "title", "type": "string", "mapping": {"type": "column", "value": "p:title"}},
    {"name": "price", "type": "double", "mapping": {"type": "column", "value": "p:price"}},
    {"name": "tags", "type": {"type": "map", "values": "string"},
     "mapping": {"type": "keyAsColumn", "value": "t:"}},
    {"name": "sold", "type": "long", "mapping": {"type": "counter", "value": "p:sold"}}
]}"#;

const PRODUCT_V1: &str = r#"{"name": "Product", "type": "record", "fields": [
    {"name": "sku", "type": "string", "mapping": {"type": "key", "value": "0"}},
    {"name": "title", "type": "string", "mapping": {"type": "column", "value": "p:title"}},
    {"name": "price", "type": "double", "mapping": {"type": "column", "value": "p:price"}},
    {"name": "tags", "type": {"type": "map", "values": "string"},
     "mapping": {"type": "keyAsColumn", "value": "t:"}},
    {"name": "sold", "type": "long", "mapping": {"type": "counter", "value": "p:sold"}},
    {"name": "in_stock", "type": "boolean", "default": true,
     "mapping": {"type": "column", "value": "p:in_stock"}}
]}"#;

#[derive(Debug, Clone, Default, PartialEq)]
struct Product {
    sku: String,
    title: String,
    price: f64,
    tags: BTreeMap<String, String>,
    sold: i64,
}

impl Entity for Product {
    fn instantiate(_schema: &Arc<EntitySchema>) -> Self {
        Self::default()
    }

    fn get(&self, field: &str) -> Option<Value> {
        match field {
            "sku" => Some(Value::from(self.sku.as_str())),
            "title" => Some(Value::from(self.title.as_str())),
            "price" => Some(Value::Double(self.price)),
            "tags" => Some(Value::Map(
                self.tags
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
                    .collect(),
            )),
            "sold" => Some(Value::Long(self.sold)),
            _ => None,
        }
    }

    fn set(&mut self, field: &str, value: Value) -> Result<()> {
        let mismatch = || Error::invalid_argument(format!("bad value for {}", field));
        match field {
            "sku" => self.sku = value.as_str().ok_or_else(mismatch)?.to_string(),
            "title" => self.title = value.as_str().ok_or_else(mismatch)?.to_string(),
            "price" => self.price = value.as_double().ok_or_else(mismatch)?,
            "tags" => {
                let entries = value.as_map().ok_or_else(mismatch)?;
                self.tags = entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), v.as_str().ok_or_else(mismatch)?.to_string())))
                    .collect::<Result<_>>()?;
            }
            "sold" => self.sold = value.as_long().ok_or_else(mismatch)?,
            // Fields this struct does not model are ignored
            _ => {}
        }
        Ok(())
    }
}

fn product(sku: &str, price: f64) -> Product {
    let mut tags = BTreeMap::new();
    tags.insert("color".to_string(), "blue".to_string());
    Product {
        sku: sku.to_string(),
        title: format!("Item {}", sku),
        price,
        tags,
        sold: 0,
    }
}

fn setup() -> (MemTableStore, Arc<DefaultSchemaManager>, Dao<Product>) {
    let store = MemTableStore::with_tables(&["products"]);
    let manager = Arc::new(DefaultSchemaManager::new(Arc::new(store.clone())).unwrap());
    manager
        .create_schema("products", "Product", PRODUCT_V0, "json", "ordered", "columnar")
        .unwrap();
    let dao = Dao::dynamic(
        Arc::new(store.clone()),
        manager.clone(),
        "products",
        "Product",
    )
    .unwrap();
    (store, manager, dao)
}

#[test]
fn typed_round_trip() {
    let (_, _, dao) = setup();
    let original = product("a-1", 9.5);
    dao.put(&original).unwrap();
    let key = dao.key([Value::from("a-1")]).unwrap();
    assert_eq!(dao.get(&key).unwrap(), Some(original));
}

#[test]
fn typed_counter() {
    let (_, _, dao) = setup();
    dao.put(&product("a-2", 1.0)).unwrap();
    let key = dao.key([Value::from("a-2")]).unwrap();
    dao.increment(&key, "sold", 2).unwrap();
    dao.increment(&key, "sold", 3).unwrap();
    assert_eq!(dao.get(&key).unwrap().unwrap().sold, 5);
}

#[test]
fn map_entries_merge_per_key() {
    let (_, _, dao) = setup();
    let mut first = product("a-3", 1.0);
    first.tags.insert("size".to_string(), "M".to_string());
    dao.put(&first).unwrap();

    let mut second = product("a-3", 1.0);
    second.tags = BTreeMap::from([("color".to_string(), "red".to_string())]);
    dao.put(&second).unwrap();

    let key = dao.key([Value::from("a-3")]).unwrap();
    let read = dao.get(&key).unwrap().unwrap();
    assert_eq!(read.tags.get("color").map(String::as_str), Some("red"));
    // Entries are independent cells; a put never removes other keys
    assert_eq!(read.tags.get("size").map(String::as_str), Some("M"));
}

#[test]
fn typed_struct_survives_migration() {
    let (_, manager, dao) = setup();
    dao.put(&product("a-4", 2.0)).unwrap();
    manager
        .migrate_schema("products", "Product", PRODUCT_V1)
        .unwrap();

    // The struct does not model in_stock; the default fills it on write
    dao.put(&product("a-5", 3.0)).unwrap();
    let key = dao.key([Value::from("a-5")]).unwrap();
    assert_eq!(dao.get(&key).unwrap().unwrap().price, 3.0);

    let old = dao.key([Value::from("a-4")]).unwrap();
    assert_eq!(dao.get(&old).unwrap().unwrap().price, 2.0);

    let skus: Vec<String> = dao
        .scanner()
        .unwrap()
        .map(|p| p.unwrap().sku)
        .collect();
    assert_eq!(skus, vec!["a-4", "a-5"]);
    assert_eq!(manager.get_latest_schema("products", "Product").unwrap().version(), 1);
}
