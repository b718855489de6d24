use crate::client::{ClientFactory, DynamoDbApi, InMemoryDynamoDb, SdkClientFactory};
use crate::config::{LifecycleConfig, ProvisionConfig};
use crate::error::Result;
use crate::port::SessionIdentity;
use crate::provision::TableProvisioner;
use crate::schema::TableSpec;
use crate::server::{ServerBackend, ServerHandle, ServerLifecycle, ServerState};
use crate::view::{DynamoView, ItemType};
use std::sync::Arc;

/// A local DynamoDB server plus the tables a test suite declares.
///
/// Starting the session launches the server and provisions the tables once; starting it again
/// while it runs does nothing, so suites sharing a session can all call [`TestSession::start`].
pub struct TestSession<B: ServerBackend> {
    lifecycle: ServerLifecycle<B>,
    provision_config: ProvisionConfig,
    tables: Vec<TableSpec>,
    provisioned: bool,
}

/// Collects the parts of a [`TestSession`]
pub struct TestSessionBuilder<B: ServerBackend> {
    backend: B,
    factory: Option<Arc<dyn ClientFactory>>,
    identity: Option<SessionIdentity>,
    lifecycle_config: LifecycleConfig,
    provision_config: ProvisionConfig,
    tables: Vec<TableSpec>,
}

/// Builder for a session backed by the in-process emulator, which also serves as client factory
pub fn in_memory() -> TestSessionBuilder<InMemoryDynamoDb> {
    let db = InMemoryDynamoDb::new();
    TestSession::builder(db.clone()).with_factory(Arc::new(db))
}

impl<B: ServerBackend> TestSessionBuilder<B> {
    /// Sets the client factory. Defaults to the AWS SDK pointed at the session port.
    pub fn with_factory(mut self, factory: Arc<dyn ClientFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Sets the server name and port. Defaults to [`SessionIdentity::current`].
    pub fn with_identity(mut self, identity: SessionIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_lifecycle_config(mut self, config: LifecycleConfig) -> Self {
        self.lifecycle_config = config;
        self
    }

    pub fn with_provision_config(mut self, config: ProvisionConfig) -> Self {
        self.provision_config = config;
        self
    }

    /// Declares a table to create on start
    pub fn with_table(mut self, table: impl Into<TableSpec>) -> Self {
        self.tables.push(table.into());
        self
    }

    /// Declares several tables to create on start
    pub fn with_tables<T: Into<TableSpec>>(mut self, tables: impl IntoIterator<Item = T>) -> Self {
        self.tables.extend(tables.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> TestSession<B> {
        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(SdkClientFactory::new()));
        let identity = self.identity.unwrap_or_default();

        TestSession {
            lifecycle: ServerLifecycle::new(identity, self.backend, factory)
                .with_config(self.lifecycle_config),
            provision_config: self.provision_config,
            tables: self.tables,
            provisioned: false,
        }
    }
}

impl<B: ServerBackend> TestSession<B> {
    /// Starts building a session around `backend`
    pub fn builder(backend: B) -> TestSessionBuilder<B> {
        TestSessionBuilder {
            backend,
            factory: None,
            identity: None,
            lifecycle_config: LifecycleConfig::default(),
            provision_config: ProvisionConfig::default(),
            tables: Vec::new(),
        }
    }

    /// Starts the server and provisions the declared tables if that has not happened yet
    pub async fn start(&mut self) -> Result<()> {
        self.lifecycle.start().await?;

        if !self.provisioned {
            self.provisioner()?.provision(&self.tables).await?;
            self.provisioned = true;
        }
        Ok(())
    }

    /// Drops all tables and recreates the declared ones on the running server
    pub async fn reset_tables(&mut self) -> Result<()> {
        self.provisioned = false;
        self.provisioner()?.provision(&self.tables).await?;
        self.provisioned = true;
        Ok(())
    }

    /// Stops the server. Never fails.
    pub fn stop(&mut self) {
        self.lifecycle.stop();
        self.provisioned = false;
    }

    /// Client for the running server
    pub fn client(&self) -> Result<Arc<dyn DynamoDbApi>> {
        self.lifecycle.client()
    }

    /// View over the table of `I` on the running server
    pub fn view<I: ItemType>(&self) -> Result<DynamoView<I>> {
        Ok(DynamoView::new(self.client()?))
    }

    pub fn handle(&self) -> ServerHandle {
        self.lifecycle.handle()
    }

    pub fn state(&self) -> ServerState {
        self.lifecycle.state()
    }

    /// Declared tables
    pub fn tables(&self) -> &[TableSpec] {
        &self.tables
    }

    pub fn lifecycle(&self) -> &ServerLifecycle<B> {
        &self.lifecycle
    }

    fn provisioner(&self) -> Result<TableProvisioner> {
        Ok(TableProvisioner::new(self.client()?).with_config(self.provision_config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ReadConsistency;
    use crate::error::Error;
    use crate::schema::{KeyAttribute, TableSchema};
    use crate::view::View;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Movie {
        title: String,
        year: i64,
    }

    #[derive(Serialize)]
    struct MovieKey {
        title: String,
    }

    impl ItemType for Movie {
        type Key = MovieKey;
        const TABLE_NAME: &'static str = "Movies";

        fn key(&self) -> MovieKey {
            MovieKey {
                title: self.title.clone(),
            }
        }
    }

    fn session() -> TestSession<InMemoryDynamoDb> {
        in_memory()
            .with_identity(SessionIdentity::new("session-test", 58004))
            .with_lifecycle_config(
                LifecycleConfig::default().with_probe_interval(Duration::from_millis(1)),
            )
            .with_table(TableSchema::new("Movies", KeyAttribute::string("title")))
            .build()
    }

    #[tokio::test]
    async fn test_start_provisions_once() {
        let mut session = session();
        session.start().await.unwrap();

        let view = session.view::<Movie>().unwrap();
        let movie = Movie {
            title: "Alien".into(),
            year: 1979,
        };
        view.save(&movie, None, false).await.unwrap();

        // A second start neither relaunches nor wipes the tables
        session.start().await.unwrap();
        assert_eq!(session.lifecycle().backend().launches(), 1);
        let loaded = view
            .load(
                &MovieKey {
                    title: "Alien".into(),
                },
                ReadConsistency::Strong,
            )
            .await
            .unwrap();
        assert_eq!(loaded, Some(movie));
    }

    #[tokio::test]
    async fn test_reset_tables() {
        let mut session = session();
        session.start().await.unwrap();

        let view = session.view::<Movie>().unwrap();
        let movie = Movie {
            title: "Heat".into(),
            year: 1995,
        };
        view.save(&movie, None, false).await.unwrap();

        session.reset_tables().await.unwrap();
        let key = MovieKey {
            title: "Heat".into(),
        };
        assert!(view
            .load(&key, ReadConsistency::Strong)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_view_requires_running_server() {
        let mut session = session();
        assert!(matches!(session.view::<Movie>(), Err(Error::NotReady(_))));

        session.start().await.unwrap();
        assert_eq!(session.state(), ServerState::Ready);
        assert_eq!(session.handle().port, 58004);

        session.stop();
        assert!(matches!(session.view::<Movie>(), Err(Error::NotReady(_))));
    }

    #[test]
    fn test_builder_defaults() {
        let session = TestSession::builder(InMemoryDynamoDb::new())
            .with_tables(vec![
                TableSchema::new("A", KeyAttribute::string("id")),
                TableSchema::new("B", KeyAttribute::number("id")),
            ])
            .build();

        assert_eq!(session.handle().id, SessionIdentity::current().id());
        assert_eq!(session.state(), ServerState::Idle);
        assert_eq!(session.tables().len(), 2);
    }
}
