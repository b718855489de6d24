use crate::client::{ClientFactory, DynamoDbApi, ReadConsistency, TableStatus};
use crate::condition::{Condition, RenderedCondition};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::item::Item;
use crate::port::SessionIdentity;
use crate::schema::{
    CreateTableRequest, IndexRequest, KeySchema, Projection, ScalarType, StreamViewType, Throughput,
};
use async_trait::async_trait;
use aws_sdk_dynamodb::config::{Credentials, Region};
use aws_sdk_dynamodb::operation::get_item::builders::GetItemFluentBuilder;
use aws_sdk_dynamodb::types as sdk;
use aws_sdk_dynamodb::Client as AwsDynamoDbClient;
use aws_sdk_dynamodbstreams::Client as StreamsClient;
use std::sync::Arc;

/// Name reported by the static credentials provider
const CREDENTIALS_PROVIDER_NAME: &str = "dynamodb-testkit";

/// DynamoDB client implementation using AWS SDK v2
#[derive(Debug, Clone)]
pub struct SdkDynamoDbClient {
    /// AWS SDK DynamoDB client
    client: AwsDynamoDbClient,

    /// Endpoint this client talks to
    endpoint: String,
}

impl SdkDynamoDbClient {
    /// Wraps an existing SDK client
    pub fn new(client: AwsDynamoDbClient, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Builds a client from the configuration: fixed endpoint, static placeholder credentials
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let sdk_config = shared_config(config).await;

        log::debug!("created DynamoDB client for {}", config.endpoint);

        Ok(Self::new(AwsDynamoDbClient::new(&sdk_config), config.endpoint.clone()))
    }

    /// The endpoint this client talks to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Get the AWS DynamoDB client
    pub fn get_client(&self) -> &AwsDynamoDbClient {
        &self.client
    }

    fn scalar_type(kind: ScalarType) -> sdk::ScalarAttributeType {
        match kind {
            ScalarType::String => sdk::ScalarAttributeType::S,
            ScalarType::Number => sdk::ScalarAttributeType::N,
            ScalarType::Binary => sdk::ScalarAttributeType::B,
        }
    }

    fn key_schema(schema: &KeySchema) -> Vec<sdk::KeySchemaElement> {
        let mut elements = vec![sdk::KeySchemaElement::builder()
            .attribute_name(schema.partition_key.name.clone())
            .key_type(sdk::KeyType::Hash)
            .build()];

        if let Some(sort_key) = &schema.sort_key {
            elements.push(
                sdk::KeySchemaElement::builder()
                    .attribute_name(sort_key.name.clone())
                    .key_type(sdk::KeyType::Range)
                    .build(),
            );
        }

        elements
    }

    fn projection(projection: &Projection) -> sdk::Projection {
        match projection {
            Projection::All => sdk::Projection::builder()
                .projection_type(sdk::ProjectionType::All)
                .build(),
            Projection::KeysOnly => sdk::Projection::builder()
                .projection_type(sdk::ProjectionType::KeysOnly)
                .build(),
            Projection::Include(attributes) => sdk::Projection::builder()
                .projection_type(sdk::ProjectionType::Include)
                .set_non_key_attributes(Some(attributes.clone()))
                .build(),
        }
    }

    fn throughput(throughput: Throughput) -> sdk::ProvisionedThroughput {
        sdk::ProvisionedThroughput::builder()
            .read_capacity_units(throughput.read)
            .write_capacity_units(throughput.write)
            .build()
    }

    fn global_index(index: &IndexRequest) -> sdk::GlobalSecondaryIndex {
        sdk::GlobalSecondaryIndex::builder()
            .index_name(index.name.clone())
            .set_key_schema(Some(Self::key_schema(&index.key_schema)))
            .projection(Self::projection(&index.projection))
            .set_provisioned_throughput(index.throughput.map(Self::throughput))
            .build()
    }

    fn local_index(index: &IndexRequest) -> sdk::LocalSecondaryIndex {
        sdk::LocalSecondaryIndex::builder()
            .index_name(index.name.clone())
            .set_key_schema(Some(Self::key_schema(&index.key_schema)))
            .projection(Self::projection(&index.projection))
            .build()
    }

    fn stream(view_type: StreamViewType) -> sdk::StreamSpecification {
        let view_type = match view_type {
            StreamViewType::KeysOnly => sdk::StreamViewType::KeysOnly,
            StreamViewType::NewImage => sdk::StreamViewType::NewImage,
            StreamViewType::OldImage => sdk::StreamViewType::OldImage,
            StreamViewType::NewAndOldImages => sdk::StreamViewType::NewAndOldImages,
        };

        sdk::StreamSpecification::builder()
            .stream_enabled(true)
            .stream_view_type(view_type)
            .build()
    }

    fn get_item_request(
        &self,
        table_name: &str,
        key: Item,
        consistency: ReadConsistency,
    ) -> GetItemFluentBuilder {
        self.client
            .get_item()
            .table_name(table_name)
            .set_key(Some(key))
            .consistent_read(consistency.is_strong())
    }

    /// Splits a rendered condition into the optional request parts. DynamoDB rejects empty
    /// placeholder maps, so they are only set when populated.
    fn condition_parts(
        condition: Option<&Condition>,
    ) -> (
        Option<String>,
        Option<std::collections::HashMap<String, String>>,
        Option<Item>,
    ) {
        match condition.map(Condition::render) {
            None => (None, None, None),
            Some(RenderedCondition {
                expression,
                names,
                values,
            }) => (
                Some(expression),
                (!names.is_empty()).then_some(names),
                (!values.is_empty()).then_some(values),
            ),
        }
    }
}

/// Loads the SDK configuration shared by the DynamoDB and Streams clients of one endpoint
async fn shared_config(config: &ClientConfig) -> aws_config::SdkConfig {
    let credentials = Credentials::new(
        config.access_key.clone(),
        config.secret_key.clone(),
        None,
        None,
        CREDENTIALS_PROVIDER_NAME,
    );

    aws_config::from_env()
        .region(Region::new(config.region.clone()))
        .endpoint_url(config.endpoint.clone())
        .credentials_provider(credentials)
        .load()
        .await
}

/// Builds a DynamoDB Streams client with the endpoint, credentials and region of `config`, for
/// reading the streams of tables created with [`CreateTableRequest::with_stream`]
pub async fn connect_streams(config: &ClientConfig) -> StreamsClient {
    let sdk_config = shared_config(config).await;

    log::debug!("created DynamoDB Streams client for {}", config.endpoint);
    StreamsClient::new(&sdk_config)
}

#[async_trait]
impl DynamoDbApi for SdkDynamoDbClient {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut start_after: Option<String> = None;

        loop {
            let response = self
                .client
                .list_tables()
                .set_exclusive_start_table_name(start_after.take())
                .send()
                .await
                .map_err(|e| Error::from_sdk("list_tables", e))?;

            names.extend(response.table_names().unwrap_or_default().iter().cloned());

            match response.last_evaluated_table_name() {
                Some(last) => start_after = Some(last.to_string()),
                None => break,
            }
        }

        Ok(names)
    }

    async fn create_table(&self, request: &CreateTableRequest) -> Result<()> {
        let attribute_definitions = request
            .attribute_definitions
            .iter()
            .map(|attribute| {
                sdk::AttributeDefinition::builder()
                    .attribute_name(attribute.name.clone())
                    .attribute_type(Self::scalar_type(attribute.kind))
                    .build()
            })
            .collect();

        let global_indexes: Vec<_> = request
            .global_secondary_indexes
            .iter()
            .map(Self::global_index)
            .collect();
        let local_indexes: Vec<_> = request
            .local_secondary_indexes
            .iter()
            .map(Self::local_index)
            .collect();

        let billing_mode = if request.throughput.is_some() {
            sdk::BillingMode::Provisioned
        } else {
            sdk::BillingMode::PayPerRequest
        };

        self.client
            .create_table()
            .table_name(request.table_name.clone())
            .set_attribute_definitions(Some(attribute_definitions))
            .set_key_schema(Some(Self::key_schema(&request.key_schema)))
            .set_global_secondary_indexes((!global_indexes.is_empty()).then_some(global_indexes))
            .set_local_secondary_indexes((!local_indexes.is_empty()).then_some(local_indexes))
            .billing_mode(billing_mode)
            .set_provisioned_throughput(request.throughput.map(Self::throughput))
            .set_stream_specification(request.stream.map(Self::stream))
            .send()
            .await
            .map_err(|e| Error::from_sdk("create_table", e))?;

        Ok(())
    }

    async fn describe_table_status(&self, table_name: &str) -> Result<TableStatus> {
        let response = self
            .client
            .describe_table()
            .table_name(table_name)
            .send()
            .await
            .map_err(|e| Error::from_sdk("describe_table", e))?;

        let status = match response.table().and_then(|table| table.table_status()) {
            Some(sdk::TableStatus::Active) => TableStatus::Active,
            Some(sdk::TableStatus::Creating) => TableStatus::Creating,
            Some(sdk::TableStatus::Updating) => TableStatus::Updating,
            Some(sdk::TableStatus::Deleting) => TableStatus::Deleting,
            _ => TableStatus::Other,
        };

        Ok(status)
    }

    async fn delete_table(&self, table_name: &str) -> Result<()> {
        self.client
            .delete_table()
            .table_name(table_name)
            .send()
            .await
            .map_err(|e| Error::from_sdk("delete_table", e))?;

        Ok(())
    }

    async fn put_item(
        &self,
        table_name: &str,
        item: Item,
        condition: Option<&Condition>,
    ) -> Result<()> {
        let (expression, names, values) = Self::condition_parts(condition);

        self.client
            .put_item()
            .table_name(table_name)
            .set_item(Some(item))
            .set_condition_expression(expression)
            .set_expression_attribute_names(names)
            .set_expression_attribute_values(values)
            .send()
            .await
            .map_err(|e| Error::from_sdk("put_item", e))?;

        Ok(())
    }

    async fn get_item(
        &self,
        table_name: &str,
        key: Item,
        consistency: ReadConsistency,
    ) -> Result<Option<Item>> {
        let response = self
            .get_item_request(table_name, key, consistency)
            .send()
            .await
            .map_err(|e| Error::from_sdk("get_item", e))?;

        // DynamoDB omits the item, or returns an empty one, when nothing is stored
        Ok(response.item().filter(|item| !item.is_empty()).cloned())
    }

    async fn delete_item(
        &self,
        table_name: &str,
        key: Item,
        condition: Option<&Condition>,
    ) -> Result<()> {
        let (expression, names, values) = Self::condition_parts(condition);

        self.client
            .delete_item()
            .table_name(table_name)
            .set_key(Some(key))
            .set_condition_expression(expression)
            .set_expression_attribute_names(names)
            .set_expression_attribute_values(values)
            .send()
            .await
            .map_err(|e| Error::from_sdk("delete_item", e))?;

        Ok(())
    }
}

/// Builds [`SdkDynamoDbClient`]s pointed at `http://localhost:<session port>`
#[derive(Debug, Clone, Default)]
pub struct SdkClientFactory {
    /// Fixed configuration. When unset, [`ClientConfig::local`] is used with the session port.
    config: Option<ClientConfig>,
}

impl SdkClientFactory {
    /// Creates a factory deriving the endpoint from the session port
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a fixed configuration regardless of the session port
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// The configuration used for the given session
    pub fn config_for(&self, identity: &SessionIdentity) -> ClientConfig {
        self.config
            .clone()
            .unwrap_or_else(|| ClientConfig::local(identity.port()))
    }

    /// Builds a DynamoDB Streams client for the server of the given session
    pub async fn connect_streams(&self, identity: &SessionIdentity) -> StreamsClient {
        connect_streams(&self.config_for(identity)).await
    }
}

#[async_trait]
impl ClientFactory for SdkClientFactory {
    async fn connect(&self, identity: &SessionIdentity) -> Result<Arc<dyn DynamoDbApi>> {
        let client = SdkDynamoDbClient::connect(&self.config_for(identity)).await?;
        Ok(Arc::new(client))
    }
}
