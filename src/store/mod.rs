//! Tenant-aware item store.
//!
//! `ItemStore` is what domain services call. For each operation it:
//! 1. obtains a client for the tenant from the `CredentialBroker`
//! 2. resolves the physical table and key casing with the `TableResolver`
//! 3. stamps writes with audit columns (unless opted out)
//! 4. rewrites keys, items and expressions to the table's casing
//! 5. executes against the backend and renames results back to `PK`/`SK`
//!
//! The client is obtained before the table is resolved, so a tenant pinned
//! to fallback by this very request is routed to the fallback table.
//!
//! Backend failures are wrapped as `AccessError::StoreOperation` and never
//! retried here.

#[cfg(feature = "dynamo")]
pub mod dynamo;
pub mod local;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::audit;
use crate::config::TableConfig;
use crate::credentials::{self, CredentialBroker, FallbackRegistry};
use crate::error::{AccessError, Result};
use crate::interfaces::item_backend::{
    AttributeNames, PutRequest, QueryRequest, ScanRequest, StoreClient, UpdateRequest,
};
use crate::item::{self, Item, TenantAwsConfig};
use crate::tables::{
    denormalize_item, normalize_expression, normalize_key, normalize_names, KeyCasing,
    ResolvedTable, TableResolver,
};

pub use local::LocalStore;

/// Tenant label used in errors from operations not tied to a tenant.
const NO_TENANT: &str = "-";

/// Per-write options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Stamp audit columns from the bound `AuditContext`.
    pub audit: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self { audit: true }
    }
}

impl WriteOptions {
    /// For bookkeeping writes (lookup and index records) that must not carry
    /// a human actor.
    pub fn without_audit() -> Self {
        Self { audit: false }
    }
}

enum BackendSource {
    Brokered(Arc<CredentialBroker>),
    Local(Arc<LocalStore>),
}

/// Client and table for one request.
struct Target {
    client: StoreClient,
    table: ResolvedTable,
}

/// Generic single-table operations routed per tenant.
pub struct ItemStore {
    source: BackendSource,
    resolver: TableResolver,
}

impl ItemStore {
    /// Store that obtains tenant clients from a credential broker.
    pub fn brokered(broker: Arc<CredentialBroker>, tables: TableConfig) -> Self {
        let resolver = TableResolver::new(tables, broker.fallback_registry().clone());
        Self {
            source: BackendSource::Brokered(broker),
            resolver,
        }
    }

    /// Store that serves every tenant from one in-memory backend.
    pub fn local(store: Arc<LocalStore>, tables: TableConfig) -> Self {
        Self {
            source: BackendSource::Local(store),
            resolver: TableResolver::new(tables, Arc::new(FallbackRegistry::new())),
        }
    }

    pub fn resolver(&self) -> &TableResolver {
        &self.resolver
    }

    /// The credential broker, when not running on the local store.
    pub fn broker(&self) -> Option<&Arc<CredentialBroker>> {
        match &self.source {
            BackendSource::Brokered(broker) => Some(broker),
            BackendSource::Local(_) => None,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self.source, BackendSource::Local(_))
    }

    /// Write an item with audit columns. Returns the item as stored, in the
    /// caller's key casing.
    pub async fn put(&self, tenant: &TenantAwsConfig, item: Item) -> Result<Item> {
        self.put_with(tenant, PutRequest::new(item), WriteOptions::default())
            .await
    }

    pub async fn put_with(
        &self,
        tenant: &TenantAwsConfig,
        request: PutRequest,
        options: WriteOptions,
    ) -> Result<Item> {
        let target = self.target(tenant).await?;
        let casing = target.table.casing;

        let item = if options.audit {
            audit::augment_for_create(request.item)
        } else {
            request.item
        };
        let item = normalize_key(item, casing)?;

        let request = PutRequest {
            item: item.clone(),
            condition: normalize_optional(request.condition, casing)?,
            values: request.values,
            names: normalize_names(request.names, casing),
        };

        debug!(
            tenant = %tenant.tenant_account_id,
            table = %target.table.table_name,
            "put_item"
        );
        target
            .client
            .put_item(&target.table.table_name, request)
            .await
            .map_err(|e| AccessError::store("put", &tenant.tenant_account_id, e))?;

        Ok(denormalize_item(item))
    }

    pub async fn get(&self, tenant: &TenantAwsConfig, key: Item) -> Result<Option<Item>> {
        let target = self.target(tenant).await?;
        let key = normalize_key(key, target.table.casing)?;

        debug!(
            tenant = %tenant.tenant_account_id,
            table = %target.table.table_name,
            "get_item"
        );
        let item = target
            .client
            .get_item(&target.table.table_name, key)
            .await
            .map_err(|e| AccessError::store("get", &tenant.tenant_account_id, e))?;

        Ok(item.map(denormalize_item))
    }

    /// Query one partition. `key_condition` is written with `PK`/`SK`.
    pub async fn query(
        &self,
        tenant: &TenantAwsConfig,
        key_condition: &str,
        values: Item,
    ) -> Result<Vec<Item>> {
        self.query_with(tenant, QueryRequest::new(key_condition).values(values))
            .await
    }

    pub async fn query_with(
        &self,
        tenant: &TenantAwsConfig,
        request: QueryRequest,
    ) -> Result<Vec<Item>> {
        let target = self.target(tenant).await?;
        let casing = target.table.casing;

        let request = QueryRequest {
            key_condition: normalize_expression(&request.key_condition, casing)?,
            filter: normalize_optional(request.filter, casing)?,
            names: normalize_names(request.names, casing),
            ..request
        };

        debug!(
            tenant = %tenant.tenant_account_id,
            table = %target.table.table_name,
            key_condition = %request.key_condition,
            "query"
        );
        let items = target
            .client
            .query(&target.table.table_name, request)
            .await
            .map_err(|e| AccessError::store("query", &tenant.tenant_account_id, e))?;

        Ok(items.into_iter().map(denormalize_item).collect())
    }

    /// Apply an update expression with audit columns and return the updated
    /// item.
    pub async fn update(
        &self,
        tenant: &TenantAwsConfig,
        key: Item,
        update_expression: &str,
        values: Item,
        names: Option<AttributeNames>,
    ) -> Result<Item> {
        let mut request = UpdateRequest::new(update_expression).values(values);
        request.names = names.unwrap_or_default();
        self.update_with(tenant, key, request, WriteOptions::default())
            .await
    }

    pub async fn update_with(
        &self,
        tenant: &TenantAwsConfig,
        key: Item,
        request: UpdateRequest,
        options: WriteOptions,
    ) -> Result<Item> {
        let target = self.target(tenant).await?;
        let casing = target.table.casing;
        let key = normalize_key(key, casing)?;

        let (expression, values) = if options.audit {
            audit::augment_for_update(&request.expression, request.values, &request.names)
        } else {
            (request.expression, request.values)
        };

        let request = UpdateRequest {
            expression: normalize_expression(&expression, casing)?,
            values,
            names: normalize_names(request.names, casing),
            condition: normalize_optional(request.condition, casing)?,
        };

        debug!(
            tenant = %tenant.tenant_account_id,
            table = %target.table.table_name,
            expression = %request.expression,
            "update_item"
        );
        let updated = target
            .client
            .update_item(&target.table.table_name, key, request)
            .await
            .map_err(|e| AccessError::store("update", &tenant.tenant_account_id, e))?;

        Ok(denormalize_item(updated))
    }

    pub async fn delete(&self, tenant: &TenantAwsConfig, key: Item) -> Result<()> {
        let target = self.target(tenant).await?;
        let key = normalize_key(key, target.table.casing)?;

        debug!(
            tenant = %tenant.tenant_account_id,
            table = %target.table.table_name,
            "delete_item"
        );
        target
            .client
            .delete_item(&target.table.table_name, key)
            .await
            .map_err(|e| AccessError::store("delete", &tenant.tenant_account_id, e))
    }

    /// Full table scan, O(table size). Administrative and debug paths only.
    pub async fn scan(
        &self,
        tenant: &TenantAwsConfig,
        filter: Option<&str>,
        values: Item,
    ) -> Result<Vec<Item>> {
        let mut request = ScanRequest::new();
        request.filter = filter.map(str::to_string);
        request.values = values;
        self.scan_with(tenant, request).await
    }

    pub async fn scan_with(
        &self,
        tenant: &TenantAwsConfig,
        request: ScanRequest,
    ) -> Result<Vec<Item>> {
        let target = self.target(tenant).await?;
        let casing = target.table.casing;

        let request = ScanRequest {
            filter: normalize_optional(request.filter, casing)?,
            values: request.values,
            names: normalize_names(request.names, casing),
        };

        debug!(
            tenant = %tenant.tenant_account_id,
            table = %target.table.table_name,
            "Full table scan"
        );
        let items = target
            .client
            .scan(&target.table.table_name, request)
            .await
            .map_err(|e| AccessError::store("scan", &tenant.tenant_account_id, e))?;

        Ok(items.into_iter().map(denormalize_item).collect())
    }

    /// Move a record to a new key: write `new_item`, then delete `old_key`.
    ///
    /// Not atomic. If the delete fails both records remain and the error is
    /// returned. When both keys are the same this is a plain put.
    pub async fn rename(
        &self,
        tenant: &TenantAwsConfig,
        old_key: Item,
        new_item: Item,
    ) -> Result<Item> {
        let same_key = item::partition_key(&old_key) == item::partition_key(&new_item)
            && item::sort_key(&old_key) == item::sort_key(&new_item);

        let stored = self.put(tenant, new_item).await?;
        if same_key {
            return Ok(stored);
        }

        if let Err(e) = self.delete(tenant, old_key).await {
            warn!(
                tenant = %tenant.tenant_account_id,
                error = %e,
                "Rename wrote the new record but failed to delete the old one"
            );
            return Err(e);
        }
        Ok(stored)
    }

    /// Reach the shared public table with the process's own credentials.
    pub async fn check_connectivity(&self) -> Result<()> {
        let client: StoreClient = match &self.source {
            BackendSource::Brokered(broker) => broker.direct_client(None),
            BackendSource::Local(store) => store.clone(),
        };
        let table = self.resolver.public_table();

        client
            .ping(table)
            .await
            .map_err(|e| AccessError::store("check_connectivity", NO_TENANT, e))?;
        debug!(table = %table, "Store reachable");
        Ok(())
    }

    async fn target(&self, tenant: &TenantAwsConfig) -> Result<Target> {
        let client: StoreClient = match &self.source {
            BackendSource::Brokered(broker) => broker.get_client(tenant).await?,
            BackendSource::Local(store) => {
                credentials::validate_tenant(tenant)?;
                store.clone()
            }
        };
        let table = self
            .resolver
            .resolve(&tenant.tenant_account_id, tenant.cloud_tier);
        Ok(Target { client, table })
    }
}

fn normalize_optional(expression: Option<String>, casing: KeyCasing) -> Result<Option<String>> {
    expression
        .map(|e| normalize_expression(&e, casing))
        .transpose()
}
