// Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use dynamodb_testkit::client::TableStatus;
use dynamodb_testkit::item::Item;
use dynamodb_testkit::schema::{CreateTableRequest, KeyAttribute, TableSchema};
use dynamodb_testkit::{
    ClientFactory, Condition, DynamoDbApi, Error, InMemoryDynamoDb, ItemType, LifecycleConfig,
    ProvisionConfig, ReadConsistency, Result, SessionIdentity,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

pub const ORDERS: &str = "Orders";

static LOGGER: Once = Once::new();

// Route library logs through the test harness
pub fn init_logging() {
    LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(default)]
    pub items: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderKey {
    pub order_id: String,
}

impl ItemType for Order {
    type Key = OrderKey;
    const TABLE_NAME: &'static str = ORDERS;
    const VERSION_ATTRIBUTE: Option<&'static str> = Some("version");

    fn key(&self) -> OrderKey {
        OrderKey {
            order_id: self.order_id.clone(),
        }
    }
}

pub fn order(id: &str, version: i64) -> Order {
    Order {
        order_id: id.to_string(),
        version: Some(version),
        items: Vec::new(),
    }
}

pub fn order_key(id: &str) -> OrderKey {
    OrderKey {
        order_id: id.to_string(),
    }
}

pub fn orders_table() -> TableSchema {
    TableSchema::new(ORDERS, KeyAttribute::string("order_id"))
}

pub fn identity(name: &str) -> SessionIdentity {
    SessionIdentity::new(format!("docker-dynamodb-local-{}", name), 58999)
}

pub fn fast_lifecycle() -> LifecycleConfig {
    LifecycleConfig::default().with_probe_interval(Duration::from_millis(1))
}

pub fn fast_provisioning() -> ProvisionConfig {
    ProvisionConfig::default().with_active_polling(Duration::from_millis(1), 100)
}

/// Client that refuses the first `refusals` canary requests, like a server still booting
pub struct BootingServer {
    inner: InMemoryDynamoDb,
    refusals: AtomicU32,
    canaries: AtomicU32,
}

impl BootingServer {
    pub fn canaries(&self) -> u32 {
        self.canaries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DynamoDbApi for BootingServer {
    async fn list_tables(&self) -> Result<Vec<String>> {
        self.inner.list_tables().await
    }

    async fn create_table(&self, request: &CreateTableRequest) -> Result<()> {
        self.inner.create_table(request).await
    }

    async fn describe_table_status(&self, table_name: &str) -> Result<TableStatus> {
        self.inner.describe_table_status(table_name).await
    }

    async fn delete_table(&self, table_name: &str) -> Result<()> {
        self.canaries.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if refused {
            return Err(Error::Transport("connection refused".into()));
        }
        self.inner.delete_table(table_name).await
    }

    async fn put_item(&self, table: &str, item: Item, condition: Option<&Condition>) -> Result<()> {
        self.inner.put_item(table, item, condition).await
    }

    async fn get_item(
        &self,
        table: &str,
        key: Item,
        consistency: ReadConsistency,
    ) -> Result<Option<Item>> {
        self.inner.get_item(table, key, consistency).await
    }

    async fn delete_item(&self, table: &str, key: Item, condition: Option<&Condition>) -> Result<()> {
        self.inner.delete_item(table, key, condition).await
    }
}

/// Hands out one shared [`BootingServer`] client
pub struct BootingFactory {
    client: Arc<BootingServer>,
}

impl BootingFactory {
    pub fn new(inner: InMemoryDynamoDb, refusals: u32) -> Self {
        Self {
            client: Arc::new(BootingServer {
                inner,
                refusals: AtomicU32::new(refusals),
                canaries: AtomicU32::new(0),
            }),
        }
    }

    pub fn server(&self) -> Arc<BootingServer> {
        Arc::clone(&self.client)
    }
}

#[async_trait]
impl ClientFactory for BootingFactory {
    async fn connect(&self, _identity: &SessionIdentity) -> Result<Arc<dyn DynamoDbApi>> {
        let client: Arc<dyn DynamoDbApi> = self.client.clone();
        Ok(client)
    }
}
