//! Table schemas and create-table requests
//!
//! A [`TableSchema`] describes the keys and secondary indexes of a table. It generates a
//! [`CreateTableRequest`] which the provisioner completes (throughput) and hands to the
//! [`TableSpec`]'s configuration transform before sending it.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Scalar type of a key attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// String (`S`)
    String,
    /// Number (`N`)
    Number,
    /// Binary (`B`)
    Binary,
}

impl ScalarType {
    /// The DynamoDB type descriptor
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarType::String => "S",
            ScalarType::Number => "N",
            ScalarType::Binary => "B",
        }
    }
}

/// A named key attribute
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyAttribute {
    /// Attribute name
    pub name: String,

    /// Attribute type
    pub kind: ScalarType,
}

impl KeyAttribute {
    /// Creates a key attribute
    pub fn new(name: impl Into<String>, kind: ScalarType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// A string key attribute
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ScalarType::String)
    }

    /// A number key attribute
    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, ScalarType::Number)
    }
}

/// Partition key plus optional sort key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchema {
    /// Partition (hash) key
    pub partition_key: KeyAttribute,

    /// Sort (range) key
    pub sort_key: Option<KeyAttribute>,
}

impl KeySchema {
    /// Key schema with a partition key only
    pub fn partition(partition_key: KeyAttribute) -> Self {
        Self {
            partition_key,
            sort_key: None,
        }
    }

    /// Key schema with partition and sort keys
    pub fn composite(partition_key: KeyAttribute, sort_key: KeyAttribute) -> Self {
        Self {
            partition_key,
            sort_key: Some(sort_key),
        }
    }

    /// Names of the key attributes, partition key first
    pub fn attribute_names(&self) -> Vec<&str> {
        let mut names = vec![self.partition_key.name.as_str()];
        if let Some(sort_key) = &self.sort_key {
            names.push(sort_key.name.as_str());
        }
        names
    }

    fn attributes(&self) -> impl Iterator<Item = &KeyAttribute> {
        std::iter::once(&self.partition_key).chain(self.sort_key.as_ref())
    }
}

/// Attributes copied into a secondary index
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Projection {
    /// Every attribute
    #[default]
    All,
    /// Only the table and index keys
    KeysOnly,
    /// The keys plus the listed attributes
    Include(Vec<String>),
}

/// Read/write capacity units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throughput {
    /// Read capacity units
    pub read: i64,

    /// Write capacity units
    pub write: i64,
}

impl Throughput {
    /// The smallest accepted throughput
    pub const MINIMAL: Throughput = Throughput { read: 1, write: 1 };

    /// Creates a throughput setting
    pub fn new(read: i64, write: i64) -> Self {
        Self { read, write }
    }
}

/// What a table stream captures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamViewType {
    /// Only the key attributes
    KeysOnly,
    /// The item after modification
    NewImage,
    /// The item before modification
    OldImage,
    /// Both images
    NewAndOldImages,
}

/// Declared secondary index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryIndex {
    /// Index name
    pub name: String,

    /// Index key schema
    pub key_schema: KeySchema,

    /// Projected attributes
    pub projection: Projection,
}

impl SecondaryIndex {
    /// Creates an index projecting all attributes
    pub fn new(name: impl Into<String>, key_schema: KeySchema) -> Self {
        Self {
            name: name.into(),
            key_schema,
            projection: Projection::All,
        }
    }

    /// Sets the projection
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }
}

/// Keys and indexes of a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// Table name
    pub name: String,

    /// Primary key
    pub key_schema: KeySchema,

    /// Global secondary indexes
    pub global_indexes: Vec<SecondaryIndex>,

    /// Local secondary indexes
    pub local_indexes: Vec<SecondaryIndex>,
}

impl TableSchema {
    /// Schema with a partition key only
    pub fn new(name: impl Into<String>, partition_key: KeyAttribute) -> Self {
        Self {
            name: name.into(),
            key_schema: KeySchema::partition(partition_key),
            global_indexes: Vec::new(),
            local_indexes: Vec::new(),
        }
    }

    /// Adds a sort key
    pub fn with_sort_key(mut self, sort_key: KeyAttribute) -> Self {
        self.key_schema.sort_key = Some(sort_key);
        self
    }

    /// Adds a global secondary index
    pub fn with_global_index(mut self, index: SecondaryIndex) -> Self {
        self.global_indexes.push(index);
        self
    }

    /// Adds a local secondary index
    pub fn with_local_index(mut self, index: SecondaryIndex) -> Self {
        self.local_indexes.push(index);
        self
    }

    /// Generates the create-table request for this schema.
    ///
    /// Attribute definitions are the union of every key attribute used by the table and its
    /// indexes. An attribute declared twice with different types is rejected.
    pub fn create_table_request(&self) -> Result<CreateTableRequest> {
        let mut definitions: BTreeMap<&str, ScalarType> = BTreeMap::new();
        let indexes = self.global_indexes.iter().chain(&self.local_indexes);
        let key_attributes = self
            .key_schema
            .attributes()
            .chain(indexes.flat_map(|index| index.key_schema.attributes()));

        for attribute in key_attributes {
            match definitions.get(attribute.name.as_str()) {
                Some(kind) if *kind != attribute.kind => {
                    return Err(Error::InvalidArgument(format!(
                        "attribute {} of table {} is declared as both {} and {}",
                        attribute.name,
                        self.name,
                        kind.as_str(),
                        attribute.kind.as_str()
                    )));
                }
                Some(_) => {}
                None => {
                    definitions.insert(&attribute.name, attribute.kind);
                }
            }
        }

        for index in &self.local_indexes {
            if index.key_schema.partition_key.name != self.key_schema.partition_key.name {
                return Err(Error::InvalidArgument(format!(
                    "local index {} of table {} must share the table partition key",
                    index.name, self.name
                )));
            }
        }

        Ok(CreateTableRequest {
            table_name: self.name.clone(),
            attribute_definitions: definitions
                .into_iter()
                .map(|(name, kind)| KeyAttribute::new(name, kind))
                .collect(),
            key_schema: self.key_schema.clone(),
            global_secondary_indexes: self
                .global_indexes
                .iter()
                .map(IndexRequest::from_index)
                .collect(),
            local_secondary_indexes: self
                .local_indexes
                .iter()
                .map(IndexRequest::from_index)
                .collect(),
            throughput: None,
            stream: None,
        })
    }
}

/// Secondary index as sent in a create-table request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRequest {
    /// Index name
    pub name: String,

    /// Index key schema
    pub key_schema: KeySchema,

    /// Projected attributes
    pub projection: Projection,

    /// Provisioned throughput (global indexes only)
    pub throughput: Option<Throughput>,
}

impl IndexRequest {
    fn from_index(index: &SecondaryIndex) -> Self {
        Self {
            name: index.name.clone(),
            key_schema: index.key_schema.clone(),
            projection: index.projection.clone(),
            throughput: None,
        }
    }
}

/// Create-table request understood by every [`crate::client::DynamoDbApi`] implementation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTableRequest {
    /// Table name
    pub table_name: String,

    /// Types of every key attribute used by the table or its indexes
    pub attribute_definitions: Vec<KeyAttribute>,

    /// Primary key
    pub key_schema: KeySchema,

    /// Global secondary indexes
    pub global_secondary_indexes: Vec<IndexRequest>,

    /// Local secondary indexes
    pub local_secondary_indexes: Vec<IndexRequest>,

    /// Table throughput
    pub throughput: Option<Throughput>,

    /// Stream settings
    pub stream: Option<StreamViewType>,
}

impl CreateTableRequest {
    /// Sets the table throughput
    pub fn with_throughput(mut self, throughput: Throughput) -> Self {
        self.throughput = Some(throughput);
        self
    }

    /// Sets the throughput of every global secondary index
    pub fn with_index_throughput(mut self, throughput: Throughput) -> Self {
        for index in &mut self.global_secondary_indexes {
            index.throughput = Some(throughput);
        }
        self
    }

    /// Enables a stream on the table
    pub fn with_stream(mut self, view_type: StreamViewType) -> Self {
        self.stream = Some(view_type);
        self
    }
}

/// Transform applied to the generated create-table request
pub type ConfigureTable = Arc<dyn Fn(CreateTableRequest) -> CreateTableRequest + Send + Sync>;

/// A table declared by a test suite: its schema and a configuration transform
#[derive(Clone)]
pub struct TableSpec {
    schema: TableSchema,
    configure: ConfigureTable,
}

impl fmt::Debug for TableSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableSpec")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl TableSpec {
    /// Declares a table whose request is sent unchanged
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            configure: Arc::new(|request| request),
        }
    }

    /// Sets the configuration transform
    pub fn with_configuration<F>(mut self, configure: F) -> Self
    where
        F: Fn(CreateTableRequest) -> CreateTableRequest + Send + Sync + 'static,
    {
        self.configure = Arc::new(configure);
        self
    }

    /// Table name
    pub fn table_name(&self) -> &str {
        &self.schema.name
    }

    /// Table schema
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Applies the configuration transform
    pub fn configure(&self, request: CreateTableRequest) -> CreateTableRequest {
        (self.configure)(request)
    }
}

impl From<TableSchema> for TableSpec {
    fn from(schema: TableSchema) -> Self {
        Self::new(schema)
    }
}
