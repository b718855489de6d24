use crate::client::{ClientFactory, DynamoDbApi, ReadConsistency, TableStatus};
use crate::condition::Condition;
use crate::error::{Error, Result};
use crate::item::Item;
use crate::number::CanonicalNumber;
use crate::port::SessionIdentity;
use crate::schema::{CreateTableRequest, KeyAttribute, ScalarType};
use crate::server::ServerBackend;
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

const RESOURCE_NOT_FOUND: &str = "ResourceNotFoundException";
const RESOURCE_IN_USE: &str = "ResourceInUseException";
const VALIDATION: &str = "ValidationException";

/// An in-process DynamoDB emulator
///
/// Cloning the emulator yields another handle on the same tables, so the same value can serve as
/// server backend, client factory and client. Until [`ServerBackend::launch`] is called every
/// request fails with [`Error::Transport`], like a server that is not accepting connections yet.
#[derive(Clone, Default)]
pub struct InMemoryDynamoDb {
    state: Arc<RwLock<EngineState>>,
}

#[derive(Default)]
struct EngineState {
    /// Whether requests are served
    online: bool,

    /// Number of times the emulator was launched
    launches: usize,

    /// Keep tables across shutdown, like DynamoDB Local persisting to disk
    retain_tables: bool,

    /// Status checks a new table reports `Creating` before turning `Active`
    creation_polls: u32,

    tables: BTreeMap<String, MemoryTable>,
}

struct MemoryTable {
    definition: CreateTableRequest,
    pending_polls: u32,
    items: BTreeMap<StorageKey, Item>,
}

/// Encoded key attribute values, partition key first
type StorageKey = Vec<String>;

impl MemoryTable {
    fn key_attributes(&self) -> Vec<&KeyAttribute> {
        std::iter::once(&self.definition.key_schema.partition_key)
            .chain(self.definition.key_schema.sort_key.as_ref())
            .collect()
    }

    /// Builds the storage key from the key attributes of an item or key
    fn storage_key(&self, item: &Item) -> Result<StorageKey> {
        let mut parts = Vec::new();
        for attribute in self.key_attributes() {
            let value = item.get(&attribute.name).ok_or_else(|| {
                Error::service(
                    VALIDATION,
                    format!("Missing the key {} in the item", attribute.name),
                )
            })?;
            parts.push(encode_key_value(attribute, value)?);
        }
        Ok(parts)
    }

    fn key_only(&self, key: &Item) -> Result<StorageKey> {
        let expected = self.key_attributes().len();
        if key.len() != expected {
            return Err(Error::service(
                VALIDATION,
                "The provided key element does not match the schema",
            ));
        }
        self.storage_key(key)
    }
}

impl fmt::Debug for InMemoryDynamoDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("InMemoryDynamoDb");
        if let Ok(state) = self.state.read() {
            debug
                .field("online", &state.online)
                .field("tables", &state.tables.keys().collect::<Vec<_>>());
        }
        debug.finish()
    }
}

impl InMemoryDynamoDb {
    /// Creates an emulator that is not yet running
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps tables when the emulator shuts down, so a later session starts from stale state
    pub fn retain_tables_on_shutdown(self) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.retain_tables = true;
        }
        self
    }

    /// Makes new tables report `Creating` for the given number of status checks
    pub fn with_creation_delay(self, polls: u32) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.creation_polls = polls;
        }
        self
    }

    /// Whether the emulator serves requests
    pub fn is_online(&self) -> bool {
        self.state.read().map(|state| state.online).unwrap_or(false)
    }

    /// Number of times the emulator was launched
    pub fn launches(&self) -> usize {
        self.state.read().map(|state| state.launches).unwrap_or(0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, EngineState>> {
        let state = self
            .state
            .read()
            .map_err(|_| Error::Internal("in-memory DynamoDB state poisoned".into()))?;
        Self::ensure_online(state.online)?;
        Ok(state)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, EngineState>> {
        let state = self
            .state
            .write()
            .map_err(|_| Error::Internal("in-memory DynamoDB state poisoned".into()))?;
        Self::ensure_online(state.online)?;
        Ok(state)
    }

    fn ensure_online(online: bool) -> Result<()> {
        if online {
            Ok(())
        } else {
            Err(Error::Transport(
                "connection refused: in-memory DynamoDB is not running".into(),
            ))
        }
    }
}

fn table_not_found() -> Error {
    Error::service(
        RESOURCE_NOT_FOUND,
        "Cannot do operations on a non-existent table",
    )
}

fn encode_key_value(attribute: &KeyAttribute, value: &AttributeValue) -> Result<String> {
    let encoded = match (attribute.kind, value) {
        (ScalarType::String, AttributeValue::S(s)) => format!("S{}", s),
        (ScalarType::Number, AttributeValue::N(n)) => {
            let canonical = CanonicalNumber::parse(n).ok_or_else(|| {
                Error::service(VALIDATION, format!("Invalid number for key {}", attribute.name))
            })?;
            format!("N{}", canonical)
        }
        (ScalarType::Binary, AttributeValue::B(b)) => {
            let hex: String = b.as_ref().iter().map(|byte| format!("{:02x}", byte)).collect();
            format!("B{}", hex)
        }
        _ => {
            return Err(Error::service(
                VALIDATION,
                format!(
                    "Type mismatch for key {}: expected {}",
                    attribute.name,
                    attribute.kind.as_str()
                ),
            ))
        }
    };
    Ok(encoded)
}

fn check_condition(condition: Option<&Condition>, stored: Option<&Item>) -> Result<()> {
    match condition {
        Some(condition) if !condition.evaluate(stored) => Err(Error::ConditionFailed(
            "The conditional request failed".into(),
        )),
        _ => Ok(()),
    }
}

#[async_trait]
impl DynamoDbApi for InMemoryDynamoDb {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let state = self.read()?;
        Ok(state.tables.keys().cloned().collect())
    }

    async fn create_table(&self, request: &CreateTableRequest) -> Result<()> {
        let mut state = self.write()?;

        if state.tables.contains_key(&request.table_name) {
            return Err(Error::service(
                RESOURCE_IN_USE,
                format!("Table already exists: {}", request.table_name),
            ));
        }

        for attribute in request.key_schema.attribute_names() {
            if !request
                .attribute_definitions
                .iter()
                .any(|definition| definition.name == attribute)
            {
                return Err(Error::service(
                    VALIDATION,
                    format!("No attribute definition for key {}", attribute),
                ));
            }
        }

        let pending_polls = state.creation_polls;
        state.tables.insert(
            request.table_name.clone(),
            MemoryTable {
                definition: request.clone(),
                pending_polls,
                items: BTreeMap::new(),
            },
        );

        log::debug!("in-memory DynamoDB created table {}", request.table_name);
        Ok(())
    }

    async fn describe_table_status(&self, table_name: &str) -> Result<TableStatus> {
        let mut state = self.write()?;
        let table = state.tables.get_mut(table_name).ok_or_else(table_not_found)?;

        if table.pending_polls > 0 {
            table.pending_polls -= 1;
            return Ok(TableStatus::Creating);
        }
        Ok(TableStatus::Active)
    }

    async fn delete_table(&self, table_name: &str) -> Result<()> {
        let mut state = self.write()?;
        state
            .tables
            .remove(table_name)
            .map(|_| ())
            .ok_or_else(table_not_found)
    }

    async fn put_item(
        &self,
        table_name: &str,
        item: Item,
        condition: Option<&Condition>,
    ) -> Result<()> {
        let mut state = self.write()?;
        let table = state.tables.get_mut(table_name).ok_or_else(table_not_found)?;

        let key = table.storage_key(&item)?;
        check_condition(condition, table.items.get(&key))?;
        table.items.insert(key, item);
        Ok(())
    }

    async fn get_item(
        &self,
        table_name: &str,
        key: Item,
        _consistency: ReadConsistency,
    ) -> Result<Option<Item>> {
        // Every read is strongly consistent here.
        let state = self.read()?;
        let table = state.tables.get(table_name).ok_or_else(table_not_found)?;

        let key = table.key_only(&key)?;
        Ok(table.items.get(&key).cloned())
    }

    async fn delete_item(
        &self,
        table_name: &str,
        key: Item,
        condition: Option<&Condition>,
    ) -> Result<()> {
        let mut state = self.write()?;
        let table = state.tables.get_mut(table_name).ok_or_else(table_not_found)?;

        let key = table.key_only(&key)?;
        check_condition(condition, table.items.get(&key))?;
        table.items.remove(&key);
        Ok(())
    }
}

#[async_trait]
impl ClientFactory for InMemoryDynamoDb {
    async fn connect(&self, _identity: &SessionIdentity) -> Result<Arc<dyn DynamoDbApi>> {
        Ok(Arc::new(self.clone()))
    }
}

impl ServerBackend for InMemoryDynamoDb {
    fn name(&self) -> &str {
        "in-memory"
    }

    fn launch(&mut self, identity: &SessionIdentity) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| Error::Backend("in-memory DynamoDB state poisoned".into()))?;

        state.online = true;
        state.launches += 1;
        log::debug!("in-memory DynamoDB launched for {}", identity.id());
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| Error::Backend("in-memory DynamoDB state poisoned".into()))?;

        state.online = false;
        if !state.retain_tables {
            state.tables.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::number;
    use crate::schema::TableSchema;

    fn running() -> InMemoryDynamoDb {
        let mut db = InMemoryDynamoDb::new();
        db.launch(&SessionIdentity::new("test", 1)).expect("launch");
        db
    }

    fn orders_request() -> CreateTableRequest {
        TableSchema::new("Orders", KeyAttribute::string("order_id"))
            .create_table_request()
            .expect("valid schema")
    }

    fn order(id: &str, version: i64) -> Item {
        let mut item = Item::new();
        item.insert("order_id".into(), AttributeValue::S(id.into()));
        item.insert("version".into(), number(version));
        item
    }

    fn key(id: &str) -> Item {
        let mut key = Item::new();
        key.insert("order_id".into(), AttributeValue::S(id.into()));
        key
    }

    #[tokio::test]
    async fn test_requests_fail_until_launched() {
        let db = InMemoryDynamoDb::new();

        let err = db.list_tables().await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(!db.is_online());
    }

    #[tokio::test]
    async fn test_delete_missing_table_is_service_error() {
        let db = running();

        let err = db.delete_table("not a table").await.unwrap_err();
        assert_eq!(err.service_code(), Some(RESOURCE_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let db = running();
        db.create_table(&orders_request()).await.expect("created");

        let err = db.create_table(&orders_request()).await.unwrap_err();
        assert_eq!(err.service_code(), Some(RESOURCE_IN_USE));
        assert_eq!(db.list_tables().await.expect("listed"), vec!["Orders"]);
    }

    #[tokio::test]
    async fn test_creation_delay() {
        let db = running().with_creation_delay(2);
        db.create_table(&orders_request()).await.expect("created");

        assert_eq!(db.describe_table_status("Orders").await.expect("status"), TableStatus::Creating);
        assert_eq!(db.describe_table_status("Orders").await.expect("status"), TableStatus::Creating);
        assert_eq!(db.describe_table_status("Orders").await.expect("status"), TableStatus::Active);
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let db = running();
        db.create_table(&orders_request()).await.expect("created");

        db.put_item("Orders", order("A1", 1), None).await.expect("put");
        let loaded = db
            .get_item("Orders", key("A1"), ReadConsistency::Strong)
            .await
            .expect("get");
        assert_eq!(loaded, Some(order("A1", 1)));

        db.delete_item("Orders", key("A1"), None).await.expect("delete");
        let loaded = db
            .get_item("Orders", key("A1"), ReadConsistency::Eventual)
            .await
            .expect("get");
        assert_eq!(loaded, None);
    }

    #[tokio::test]
    async fn test_conditional_put() {
        let db = running();
        db.create_table(&orders_request()).await.expect("created");
        db.put_item("Orders", order("A1", 1), None).await.expect("put");

        let stale = Condition::equals("version", number(0));
        let err = db
            .put_item("Orders", order("A1", 1), Some(&stale))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConditionFailed(_)));

        let current = Condition::equals("version", number(1));
        db.put_item("Orders", order("A1", 2), Some(&current))
            .await
            .expect("conditional put");
    }

    #[tokio::test]
    async fn test_key_validation() {
        let db = running();
        db.create_table(&orders_request()).await.expect("created");

        let mut wrong_type = Item::new();
        wrong_type.insert("order_id".into(), number(1));
        let err = db.put_item("Orders", wrong_type, None).await.unwrap_err();
        assert_eq!(err.service_code(), Some(VALIDATION));

        let err = db
            .get_item("Orders", order("A1", 1), ReadConsistency::Eventual)
            .await
            .unwrap_err();
        assert_eq!(err.service_code(), Some(VALIDATION));
    }

    fn user(id: &str, who: &str) -> Item {
        let mut item = Item::new();
        item.insert("user_id".into(), AttributeValue::N(id.into()));
        item.insert("who".into(), AttributeValue::S(who.into()));
        item
    }

    fn user_key(id: &str) -> Item {
        let mut key = Item::new();
        key.insert("user_id".into(), AttributeValue::N(id.into()));
        key
    }

    #[tokio::test]
    async fn test_large_number_keys_stay_distinct() {
        let db = running();
        let request = TableSchema::new("Users", KeyAttribute::number("user_id"))
            .create_table_request()
            .expect("valid schema");
        db.create_table(&request).await.expect("created");

        // Adjacent snowflake-style ids that round to the same f64
        db.put_item("Users", user("1152921504606846977", "a"), None)
            .await
            .expect("put");
        db.put_item("Users", user("1152921504606846976", "b"), None)
            .await
            .expect("put");

        let loaded = db
            .get_item("Users", user_key("1152921504606846977"), ReadConsistency::Strong)
            .await
            .expect("get");
        assert_eq!(loaded, Some(user("1152921504606846977", "a")));

        // Equal numbers written differently address the same item
        let loaded = db
            .get_item("Users", user_key("1152921504606846976.00"), ReadConsistency::Strong)
            .await
            .expect("get");
        assert_eq!(loaded, Some(user("1152921504606846976", "b")));
    }

    #[tokio::test]
    async fn test_composite_keys_do_not_collide() {
        let db = running();
        let request = TableSchema::new("Events", KeyAttribute::string("pk"))
            .with_sort_key(KeyAttribute::string("sk"))
            .create_table_request()
            .expect("valid schema");
        db.create_table(&request).await.expect("created");

        let event = |pk: &str, sk: &str, who: &str| {
            let mut item = Item::new();
            item.insert("pk".into(), AttributeValue::S(pk.into()));
            item.insert("sk".into(), AttributeValue::S(sk.into()));
            item.insert("who".into(), AttributeValue::S(who.into()));
            item
        };
        let key = |pk: &str, sk: &str| {
            let mut key = Item::new();
            key.insert("pk".into(), AttributeValue::S(pk.into()));
            key.insert("sk".into(), AttributeValue::S(sk.into()));
            key
        };

        db.put_item("Events", event("a", "b\u{1f}Sc", "first"), None)
            .await
            .expect("put");
        db.put_item("Events", event("a\u{1f}Sb", "c", "second"), None)
            .await
            .expect("put");

        let first = db
            .get_item("Events", key("a", "b\u{1f}Sc"), ReadConsistency::Strong)
            .await
            .expect("get");
        assert_eq!(first, Some(event("a", "b\u{1f}Sc", "first")));
        let second = db
            .get_item("Events", key("a\u{1f}Sb", "c"), ReadConsistency::Strong)
            .await
            .expect("get");
        assert_eq!(second, Some(event("a\u{1f}Sb", "c", "second")));
    }

    #[tokio::test]
    async fn test_shutdown_clears_tables_unless_retained() {
        let identity = SessionIdentity::new("test", 1);

        let mut db = running();
        db.create_table(&orders_request()).await.expect("created");
        db.shutdown().expect("shutdown");
        db.launch(&identity).expect("launch");
        assert!(db.list_tables().await.expect("listed").is_empty());

        let mut db = running().retain_tables_on_shutdown();
        db.create_table(&orders_request()).await.expect("created");
        db.shutdown().expect("shutdown");
        db.launch(&identity).expect("launch");
        assert_eq!(db.list_tables().await.expect("listed"), vec!["Orders"]);
        assert_eq!(db.launches(), 2);
    }
}
