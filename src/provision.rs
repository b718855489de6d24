//! Clean-slate table provisioning
//!
//! [`TableProvisioner::provision`] drops every table on the server and then creates the declared
//! ones, waiting for each to become active before creating the next.

use crate::client::{DynamoDbApi, TableStatus};
use crate::config::ProvisionConfig;
use crate::error::{Error, Result};
use crate::metrics::TABLES_PROVISIONED;
use crate::schema::TableSpec;
use metrics::counter;
use std::collections::HashSet;
use std::sync::Arc;

/// Recreates declared tables on a ready server
#[derive(Clone)]
pub struct TableProvisioner {
    client: Arc<dyn DynamoDbApi>,
    config: ProvisionConfig,
}

impl TableProvisioner {
    pub fn new(client: Arc<dyn DynamoDbApi>) -> Self {
        Self {
            client,
            config: ProvisionConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ProvisionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    /// Deletes every existing table, then creates `specs` in order.
    ///
    /// The first failure aborts provisioning and is returned as [`Error::Provisioning`]. Tables
    /// created before the failure are left in place.
    pub async fn provision(&self, specs: &[TableSpec]) -> Result<()> {
        reject_duplicates(specs)?;

        self.drop_all().await.map_err(|e| wrap("deleting tables", e))?;

        for spec in specs {
            self.create(spec)
                .await
                .map_err(|e| wrap(&format!("creating table {}", spec.table_name()), e))?;
            counter!(TABLES_PROVISIONED, 1);
        }

        log::info!("provisioned {} table(s)", specs.len());
        Ok(())
    }

    async fn drop_all(&self) -> Result<()> {
        let existing = self.client.list_tables().await?;
        for table in &existing {
            log::debug!("deleting table {}", table);
            self.client.delete_table(table).await?;
        }
        Ok(())
    }

    async fn create(&self, spec: &TableSpec) -> Result<()> {
        let request = spec
            .schema()
            .create_table_request()?
            .with_throughput(self.config.throughput)
            .with_index_throughput(self.config.throughput);
        let request = spec.configure(request);

        log::debug!("creating table {}", request.table_name);
        self.client.create_table(&request).await?;
        self.wait_until_active(&request.table_name).await
    }

    async fn wait_until_active(&self, table_name: &str) -> Result<()> {
        let mut polls: u32 = 0;
        loop {
            let status = self.client.describe_table_status(table_name).await?;
            polls += 1;
            if status == TableStatus::Active {
                return Ok(());
            }

            if polls >= self.config.max_active_polls {
                return Err(Error::Provisioning(format!(
                    "table {} still {:?} after {} status checks",
                    table_name, status, polls
                )));
            }
            tokio::time::sleep(self.config.active_poll_interval).await;
        }
    }
}

fn reject_duplicates(specs: &[TableSpec]) -> Result<()> {
    let mut seen = HashSet::new();
    for spec in specs {
        if !seen.insert(spec.table_name()) {
            return Err(Error::Provisioning(format!(
                "table {} is declared more than once",
                spec.table_name()
            )));
        }
    }
    Ok(())
}

fn wrap(context: &str, err: Error) -> Error {
    match err {
        Error::Provisioning(_) => err,
        other => Error::Provisioning(format!("{}: {}", context, other)),
    }
}
