//! Typed single-item access to a table
//!
//! A [`View`] loads, saves and deletes records of one [`ItemType`]. Items with a version attribute
//! get optimistic locking: a save carries the item's new version and succeeds only when the
//! stored version is the one before it.

use crate::client::{DynamoDbApi, ReadConsistency};
use crate::condition::Condition;
use crate::error::{Error, Result};
use crate::item::{self, Item};
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A record stored in a DynamoDB table
pub trait ItemType: Serialize + DeserializeOwned + Send + Sync {
    /// Primary key of the record, serialized to the table's key attributes
    type Key: Serialize + Send + Sync;

    /// Table the record is stored in
    const TABLE_NAME: &'static str;

    /// Numeric attribute used for optimistic locking
    const VERSION_ATTRIBUTE: Option<&'static str> = None;

    /// The primary key of this record
    fn key(&self) -> Self::Key;
}

/// Load, save and delete operations over records of type `I` keyed by `K`
#[async_trait]
pub trait View<K, I>: Send + Sync
where
    K: Send + Sync,
    I: Send + Sync,
{
    /// Returns the record stored under `key`, `None` if there is none
    async fn load(&self, key: &K, consistency: ReadConsistency) -> Result<Option<I>>;

    /// Replaces the stored record, including attributes the record type does not model.
    ///
    /// `condition` is combined with the version constraint unless `ignore_version` is set. When
    /// the write is rejected, the stored item is read again: a stored version other than the one
    /// expected gives [`Error::ConcurrentModification`], otherwise the caller's condition failed
    /// and [`Error::ConditionFailed`] is returned.
    async fn save(&self, item: &I, condition: Option<Condition>, ignore_version: bool) -> Result<()>;

    /// Deletes the record stored under `key`. Versions are never checked; load the record and use
    /// [`View::delete`] to delete a versioned record safely.
    async fn delete_key(
        &self,
        key: &K,
        condition: Option<Condition>,
        ignore_version: bool,
    ) -> Result<()>;

    /// Deletes `item`, requiring the stored version to match the item's unless `ignore_version`
    /// is set. Rejections are classified like [`View::save`].
    async fn delete(&self, item: &I, condition: Option<Condition>, ignore_version: bool)
        -> Result<()>;
}

/// [`View`] over a table on a DynamoDB server
pub struct DynamoView<I> {
    client: Arc<dyn DynamoDbApi>,
    table_name: String,
    _item: PhantomData<fn() -> I>,
}

impl<I> Clone for DynamoView<I> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            table_name: self.table_name.clone(),
            _item: PhantomData,
        }
    }
}

impl<I> fmt::Debug for DynamoView<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamoView")
            .field("table_name", &self.table_name)
            .finish_non_exhaustive()
    }
}

impl<I: ItemType> DynamoView<I> {
    /// Creates a view over `I::TABLE_NAME`
    pub fn new(client: Arc<dyn DynamoDbApi>) -> Self {
        Self {
            client,
            table_name: I::TABLE_NAME.to_string(),
            _item: PhantomData,
        }
    }

    /// Points the view at another table with the same schema
    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Version constraint for writing `record`, which carries its new version
    fn save_constraint(record: &Item, ignore_version: bool) -> Result<Option<Condition>> {
        let attribute = match I::VERSION_ATTRIBUTE {
            Some(attribute) if !ignore_version => attribute,
            _ => return Ok(None),
        };

        let constraint = match item::integer_attribute(record, attribute)? {
            Some(version) if version > 1 => {
                Condition::equals(attribute, item::number(version - 1))
            }
            _ => Condition::not_exists(attribute),
        };
        Ok(Some(constraint))
    }

    /// Version constraint for deleting `record`, which carries the version it was loaded with
    fn delete_constraint(record: &Item, ignore_version: bool) -> Result<Option<Condition>> {
        let attribute = match I::VERSION_ATTRIBUTE {
            Some(attribute) if !ignore_version => attribute,
            _ => return Ok(None),
        };

        let constraint = match item::integer_attribute(record, attribute)? {
            Some(version) => Condition::equals(attribute, item::number(version)),
            None => Condition::not_exists(attribute),
        };
        Ok(Some(constraint))
    }

    /// Turns a rejected write into `ConcurrentModification` when the stored item no longer
    /// satisfies the version constraint
    async fn classify(&self, key: Item, version: Option<&Condition>, err: Error) -> Error {
        let (version, reason) = match (version, err) {
            (Some(version), Error::ConditionFailed(reason)) => (version, reason),
            (_, other) => return other,
        };

        let stored = self
            .client
            .get_item(&self.table_name, key, ReadConsistency::Strong)
            .await;
        match stored {
            Ok(stored) if version.evaluate(stored.as_ref()) => Error::ConditionFailed(reason),
            _ => Error::ConcurrentModification(format!(
                "{} item version does not match: {}",
                self.table_name, reason
            )),
        }
    }

    async fn delete_with(
        &self,
        key: Item,
        version: Option<Condition>,
        condition: Option<Condition>,
    ) -> Result<()> {
        let condition = Condition::all([version.clone(), condition]);
        match self
            .client
            .delete_item(&self.table_name, key.clone(), condition.as_ref())
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => Err(self.classify(key, version.as_ref(), e).await),
        }
    }
}

/// Serializes a record for writing. Null attributes are left out, like unset fields.
fn record_item<T: Serialize>(record: &T) -> Result<Item> {
    let mut record = item::to_item(record)?;
    record.retain(|_, value| !matches!(value, AttributeValue::Null(_)));
    Ok(record)
}

#[async_trait]
impl<I: ItemType> View<I::Key, I> for DynamoView<I> {
    async fn load(&self, key: &I::Key, consistency: ReadConsistency) -> Result<Option<I>> {
        let key = record_item(key)?;
        match self.client.get_item(&self.table_name, key, consistency).await? {
            Some(stored) => Ok(Some(item::from_item(stored)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, item: &I, condition: Option<Condition>, ignore_version: bool) -> Result<()> {
        let record = record_item(item)?;
        let version = Self::save_constraint(&record, ignore_version)?;
        let condition = Condition::all([version.clone(), condition]);

        log::debug!("saving item into {}", self.table_name);
        match self
            .client
            .put_item(&self.table_name, record, condition.as_ref())
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => {
                let key = record_item(&item.key())?;
                Err(self.classify(key, version.as_ref(), e).await)
            }
        }
    }

    async fn delete_key(
        &self,
        key: &I::Key,
        condition: Option<Condition>,
        _ignore_version: bool,
    ) -> Result<()> {
        let key = record_item(key)?;
        self.delete_with(key, None, condition).await
    }

    async fn delete(&self, item: &I, condition: Option<Condition>, ignore_version: bool) -> Result<()> {
        let record = record_item(item)?;
        let key = record_item(&item.key())?;
        let version = Self::delete_constraint(&record, ignore_version)?;

        self.delete_with(key, version, condition).await
    }
}
