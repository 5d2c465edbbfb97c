//! Item backend interface.
//!
//! The primitive, table-addressed operations that an `ItemStore` executes
//! once it has picked a client, a table, and a key casing. Everything passed
//! to a backend has already been normalized; backends never rename keys.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::credentials::AssumedCredentials;
use crate::error::BackendError;
use crate::item::Item;

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Handle to a configured store client.
pub type StoreClient = Arc<dyn ItemBackend>;

/// Expression attribute name placeholders (`#name` -> field).
pub type AttributeNames = HashMap<String, String>;

/// Conditional put.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PutRequest {
    pub item: Item,
    /// Condition that must hold against the existing item, if any.
    pub condition: Option<String>,
    pub values: Item,
    pub names: AttributeNames,
}

impl PutRequest {
    pub fn new(item: Item) -> Self {
        Self {
            item,
            ..Default::default()
        }
    }

    pub fn condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn value(mut self, placeholder: impl Into<String>, value: Value) -> Self {
        self.values.insert(placeholder.into(), value);
        self
    }

    pub fn name(mut self, placeholder: impl Into<String>, field: impl Into<String>) -> Self {
        self.names.insert(placeholder.into(), field.into());
        self
    }
}

/// Partition query with optional sort-key predicate and filter.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub key_condition: String,
    pub filter: Option<String>,
    pub values: Item,
    pub names: AttributeNames,
    /// Secondary index to query instead of the base table.
    pub index_name: Option<String>,
    /// Maximum number of items returned across all pages.
    pub limit: Option<usize>,
    /// Ascending sort-key order when true.
    pub scan_forward: bool,
}

impl QueryRequest {
    pub fn new(key_condition: impl Into<String>) -> Self {
        Self {
            key_condition: key_condition.into(),
            filter: None,
            values: Item::new(),
            names: AttributeNames::new(),
            index_name: None,
            limit: None,
            scan_forward: true,
        }
    }

    pub fn value(mut self, placeholder: impl Into<String>, value: Value) -> Self {
        self.values.insert(placeholder.into(), value);
        self
    }

    pub fn values(mut self, values: Item) -> Self {
        self.values.extend(values);
        self
    }

    pub fn name(mut self, placeholder: impl Into<String>, field: impl Into<String>) -> Self {
        self.names.insert(placeholder.into(), field.into());
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn index(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn descending(mut self) -> Self {
        self.scan_forward = false;
        self
    }
}

/// Update expression applied to one key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateRequest {
    pub expression: String,
    pub values: Item,
    pub names: AttributeNames,
    pub condition: Option<String>,
}

impl UpdateRequest {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            ..Default::default()
        }
    }

    pub fn value(mut self, placeholder: impl Into<String>, value: Value) -> Self {
        self.values.insert(placeholder.into(), value);
        self
    }

    pub fn values(mut self, values: Item) -> Self {
        self.values.extend(values);
        self
    }

    pub fn name(mut self, placeholder: impl Into<String>, field: impl Into<String>) -> Self {
        self.names.insert(placeholder.into(), field.into());
        self
    }

    pub fn condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

/// Full-table scan with optional filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanRequest {
    pub filter: Option<String>,
    pub values: Item,
    pub names: AttributeNames,
}

impl ScanRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn value(mut self, placeholder: impl Into<String>, value: Value) -> Self {
        self.values.insert(placeholder.into(), value);
        self
    }

    pub fn name(mut self, placeholder: impl Into<String>, field: impl Into<String>) -> Self {
        self.names.insert(placeholder.into(), field.into());
        self
    }
}

/// Interface for single-table item persistence.
///
/// Implementations:
/// - `DynamoBackend`: Amazon DynamoDB
/// - `LocalStore`: in-memory, development only
#[async_trait]
pub trait ItemBackend: Send + Sync {
    /// Write an item, replacing any item with the same key.
    async fn put_item(&self, table: &str, request: PutRequest) -> Result<()>;

    /// Fetch an item by its full key.
    async fn get_item(&self, table: &str, key: Item) -> Result<Option<Item>>;

    /// Query one partition, following pagination to the end (or `limit`).
    async fn query(&self, table: &str, request: QueryRequest) -> Result<Vec<Item>>;

    /// Apply an update expression and return the item as it is afterwards.
    async fn update_item(&self, table: &str, key: Item, request: UpdateRequest) -> Result<Item>;

    /// Delete an item by its full key. Deleting a missing item succeeds.
    async fn delete_item(&self, table: &str, key: Item) -> Result<()>;

    /// Read every item in the table. O(table size).
    async fn scan(&self, table: &str, request: ScanRequest) -> Result<Vec<Item>>;

    /// Cheap reachability check against a table.
    async fn ping(&self, table: &str) -> Result<()>;
}

/// Builds store clients from credentials.
///
/// `None` means the process's own (direct) credentials.
pub trait ClientFactory: Send + Sync {
    fn build(&self, credentials: Option<&AssumedCredentials>, region: Option<&str>) -> StoreClient;
}
