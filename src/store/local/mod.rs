//! In-memory item backend for offline development.
//!
//! Activated only by `use_local_store`. Items live in a per-table map keyed
//! by `"{pk}#{sk}"`. Key fields are read in either casing. Expression support
//! is partial, see [`expr`] for the recognized shapes.

mod expr;

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::BackendError;
use crate::interfaces::item_backend::{
    AttributeNames, ItemBackend, PutRequest, QueryRequest, Result, ScanRequest, UpdateRequest,
};
use crate::item::{self, Item};

use expr::{apply_update, parse_condition, parse_update, Clause};

/// In-memory single-table store.
#[derive(Default)]
pub struct LocalStore {
    tables: RwLock<HashMap<String, HashMap<String, Item>>>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items stored in a table.
    pub async fn item_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .await
            .get(table)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    /// Raw stored items of a table, unordered, exactly as written.
    pub async fn raw_items(&self, table: &str) -> Vec<Item> {
        self.tables
            .read()
            .await
            .get(table)
            .map(|items| items.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Names of tables that have been written to.
    pub async fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

/// `"{pk}#{sk}"` for an item or key.
fn storage_key(item: &Item) -> Result<String> {
    let pk = item::partition_key(item)
        .ok_or_else(|| BackendError::invalid_item("item has no partition key"))?;
    let sk = item::sort_key(item)
        .map(item::key_component)
        .unwrap_or_default();
    Ok(format!("{}#{}", item::key_component(pk), sk))
}

/// Parse an optional filter or condition, warning once about clauses the
/// local store cannot interpret (they are treated as satisfied).
fn compile(condition: Option<&str>, names: &AttributeNames, values: &Item) -> Result<Vec<Clause>> {
    let Some(condition) = condition else {
        return Ok(Vec::new());
    };
    let clauses = parse_condition(condition, names, values)?;
    for clause in &clauses {
        if let Clause::Unrecognized(text) = clause {
            warn!(clause = %text, "Local store ignoring unsupported expression clause");
        }
    }
    Ok(clauses)
}

fn all_match(clauses: &[Clause], item: &Item) -> bool {
    clauses.iter().all(|clause| clause.matches(item))
}

/// Sort-key value used for ordering query results.
fn sort_value(item: &Item) -> String {
    item::sort_key(item)
        .map(item::key_component)
        .unwrap_or_default()
}

#[async_trait]
impl ItemBackend for LocalStore {
    async fn put_item(&self, table: &str, request: PutRequest) -> Result<()> {
        let key = storage_key(&request.item)?;
        let mut tables = self.tables.write().await;
        let items = tables.entry(table.to_string()).or_default();

        let condition = compile(request.condition.as_deref(), &request.names, &request.values)?;
        let existing = items.get(&key).cloned().unwrap_or_default();
        if !all_match(&condition, &existing) {
            return Err(BackendError::ConditionFailed);
        }

        items.insert(key, request.item);
        Ok(())
    }

    async fn get_item(&self, table: &str, key: Item) -> Result<Option<Item>> {
        let key = storage_key(&key)?;
        let tables = self.tables.read().await;
        Ok(tables.get(table).and_then(|items| items.get(&key)).cloned())
    }

    async fn query(&self, table: &str, request: QueryRequest) -> Result<Vec<Item>> {
        let key_clauses = parse_condition(&request.key_condition, &request.names, &request.values)?;
        if let Some(Clause::Unrecognized(text)) = key_clauses
            .iter()
            .find(|c| matches!(c, Clause::Unrecognized(_)))
        {
            return Err(BackendError::unsupported(format!(
                "key condition clause not supported by the local store: {}",
                text
            )));
        }
        let has_partition_eq = key_clauses.iter().any(|clause| {
            matches!(clause, Clause::Compare(_, expr::Comparison::Eq, _))
                && clause
                    .field()
                    .is_some_and(|f| f == item::PARTITION_KEY || f == item::PARTITION_KEY_LOWER)
        });
        if !has_partition_eq {
            return Err(BackendError::unsupported(
                "key condition must test partition key equality",
            ));
        }
        if request.index_name.is_some() {
            warn!(table = %table, "Local store has no secondary indexes, querying base items");
        }

        let filter = compile(request.filter.as_deref(), &request.names, &request.values)?;

        let tables = self.tables.read().await;
        let mut matched: Vec<Item> = tables
            .get(table)
            .map(|items| {
                items
                    .values()
                    .filter(|item| all_match(&key_clauses, item) && all_match(&filter, item))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        matched.sort_by_key(sort_value);
        if !request.scan_forward {
            matched.reverse();
        }
        if let Some(limit) = request.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn update_item(&self, table: &str, key: Item, request: UpdateRequest) -> Result<Item> {
        let storage_key = storage_key(&key)?;
        let actions = parse_update(&request.expression, &request.names, &request.values)?;

        let mut tables = self.tables.write().await;
        let items = tables.entry(table.to_string()).or_default();
        let existing = items.get(&storage_key).cloned();

        let condition = compile(request.condition.as_deref(), &request.names, &request.values)?;
        if !all_match(&condition, existing.as_ref().unwrap_or(&Item::new())) {
            return Err(BackendError::ConditionFailed);
        }

        let mut updated = existing.unwrap_or(key);
        apply_update(&mut updated, actions)?;
        items.insert(storage_key, updated.clone());
        Ok(updated)
    }

    async fn delete_item(&self, table: &str, key: Item) -> Result<()> {
        let key = storage_key(&key)?;
        if let Some(items) = self.tables.write().await.get_mut(table) {
            items.remove(&key);
        }
        Ok(())
    }

    async fn scan(&self, table: &str, request: ScanRequest) -> Result<Vec<Item>> {
        let filter = compile(request.filter.as_deref(), &request.names, &request.values)?;

        let tables = self.tables.read().await;
        let mut matched: Vec<Item> = tables
            .get(table)
            .map(|items| {
                items
                    .values()
                    .filter(|item| all_match(&filter, item))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        matched.sort_by_key(storage_key_or_empty);
        Ok(matched)
    }

    async fn ping(&self, _table: &str) -> Result<()> {
        Ok(())
    }
}

fn storage_key_or_empty(item: &Item) -> String {
    storage_key(item).unwrap_or_default()
}
