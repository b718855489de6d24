//! # DynamoDB Test Kit
//!
//! Local DynamoDB servers for integration tests.
//!
//! `dynamodb-testkit` starts a DynamoDB-compatible server on a per-process port, waits until it
//! actually answers requests, recreates the tables a test suite declares and offers typed
//! [`View`]s with optimistic locking over those tables.
//!
//! The server can be an in-process emulator ([`InMemoryDynamoDb`]), the `amazon/dynamodb-local`
//! Docker image ([`server::DockerBackend`], feature `docker`) or a locally installed DynamoDB
//! Local jar ([`server::LocalProcessBackend`]).
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use dynamodb_testkit::client::ReadConsistency;
//! use dynamodb_testkit::schema::{KeyAttribute, TableSchema};
//! use dynamodb_testkit::session;
//! use dynamodb_testkit::{ItemType, View};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Order {
//!     order_id: String,
//!     version: i64,
//! }
//!
//! #[derive(Serialize)]
//! struct OrderKey {
//!     order_id: String,
//! }
//!
//! impl ItemType for Order {
//!     type Key = OrderKey;
//!     const TABLE_NAME: &'static str = "Orders";
//!     const VERSION_ATTRIBUTE: Option<&'static str> = Some("version");
//!
//!     fn key(&self) -> OrderKey {
//!         OrderKey { order_id: self.order_id.clone() }
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = session::in_memory()
//!     .with_table(TableSchema::new("Orders", KeyAttribute::string("order_id")))
//!     .build();
//! session.start().await?;
//!
//! let orders = session.view::<Order>()?;
//! orders
//!     .save(&Order { order_id: "A1".into(), version: 1 }, None, false)
//!     .await?;
//!
//! let key = OrderKey { order_id: "A1".into() };
//! let loaded = orders.load(&key, ReadConsistency::Strong).await?;
//! assert!(loaded.is_some());
//!
//! session.stop();
//! # Ok(())
//! # }
//! ```
//!
//! ## Docker
//!
//! ```rust,no_run
//! # #[cfg(feature = "docker")]
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use dynamodb_testkit::server::DockerBackend;
//! use dynamodb_testkit::TestSession;
//! use testcontainers::clients;
//!
//! let docker = clients::Cli::default();
//! let mut session = TestSession::builder(DockerBackend::new(&docker)).build();
//! session.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod condition;
pub mod config;
pub mod error;
pub mod item;
pub mod metrics;
mod number;
pub mod port;
pub mod provision;
pub mod schema;
pub mod server;
pub mod session;
pub mod view;

// Re-export key types
pub use crate::client::{ClientFactory, DynamoDbApi, InMemoryDynamoDb, ReadConsistency};
pub use crate::condition::Condition;
pub use crate::config::{ClientConfig, LifecycleConfig, ProvisionConfig};
pub use crate::error::{Error, Result};
pub use crate::port::{pick_port, SessionIdentity};
pub use crate::provision::TableProvisioner;
pub use crate::schema::{TableSchema, TableSpec};
pub use crate::server::{ServerBackend, ServerHandle, ServerLifecycle, ServerState};
pub use crate::session::{TestSession, TestSessionBuilder};
pub use crate::view::{DynamoView, ItemType, View};
