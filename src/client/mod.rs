//! Data-plane clients
//!
//! [`DynamoDbApi`] is the narrow slice of DynamoDB that the harness needs: table management for
//! provisioning and single-item reads and writes for views. Two implementations exist:
//!
//! - [`SdkDynamoDbClient`]: the AWS SDK pointed at a local endpoint
//! - [`InMemoryDynamoDb`]: an in-process emulator, also usable as a server backend
//!
//! A [`ClientFactory`] builds clients for a session; the lifecycle uses it to create the client
//! that probes readiness and is then handed to test code. [`connect_streams`] builds a DynamoDB
//! Streams client for the same local endpoint.

mod memory;
mod sdk;

pub use memory::InMemoryDynamoDb;
pub use sdk::{connect_streams, SdkClientFactory, SdkDynamoDbClient};

use crate::condition::Condition;
use crate::error::Result;
use crate::item::Item;
use crate::port::SessionIdentity;
use crate::schema::CreateTableRequest;
use async_trait::async_trait;
use std::sync::Arc;

/// Consistency of a read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadConsistency {
    /// May miss recent writes
    #[default]
    Eventual,
    /// Reflects every acknowledged write
    Strong,
}

impl ReadConsistency {
    /// Whether the read is strongly consistent
    pub fn is_strong(&self) -> bool {
        matches!(self, ReadConsistency::Strong)
    }
}

/// Status of a table as reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStatus {
    /// Being created
    Creating,
    /// Ready for reads and writes
    Active,
    /// Being updated
    Updating,
    /// Being deleted
    Deleting,
    /// Any status this crate does not model
    Other,
}

/// DynamoDB operations used by the harness
#[async_trait]
pub trait DynamoDbApi: Send + Sync {
    /// Lists the names of every table
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Creates a table
    async fn create_table(&self, request: &CreateTableRequest) -> Result<()>;

    /// Reports the status of a table
    async fn describe_table_status(&self, table_name: &str) -> Result<TableStatus>;

    /// Deletes a table
    async fn delete_table(&self, table_name: &str) -> Result<()>;

    /// Replaces the item stored under the item's key, if the condition holds
    async fn put_item(&self, table_name: &str, item: Item, condition: Option<&Condition>)
        -> Result<()>;

    /// Reads the item stored under the key
    async fn get_item(
        &self,
        table_name: &str,
        key: Item,
        consistency: ReadConsistency,
    ) -> Result<Option<Item>>;

    /// Deletes the item stored under the key, if the condition holds
    async fn delete_item(&self, table_name: &str, key: Item, condition: Option<&Condition>)
        -> Result<()>;
}

/// Builds data-plane clients for a session
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Creates a client pointed at the server of the given session
    async fn connect(&self, identity: &SessionIdentity) -> Result<Arc<dyn DynamoDbApi>>;
}
