//! DynamoDB item backend.
//!
//! One `DynamoBackend` wraps one SDK client, which carries either a tenant's
//! assumed-role credentials or the process's direct credentials. The table
//! is chosen per call, so a single client serves every table the identity
//! can reach.

mod convert;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use aws_sdk_dynamodb::config::timeout::TimeoutConfig;
use aws_sdk_dynamodb::config::{Credentials, Region};
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client;
use tracing::debug;

use crate::credentials::AssumedCredentials;
use crate::error::BackendError;
use crate::interfaces::item_backend::{
    AttributeNames, ClientFactory, ItemBackend, PutRequest, QueryRequest, Result, ScanRequest,
    StoreClient, UpdateRequest,
};
use crate::item::Item;

pub use convert::{from_attribute_map, to_attribute_map};
use convert::to_optional_attribute_map;

/// Error code DynamoDB returns when a condition expression does not hold.
const CONDITIONAL_CHECK_FAILED: &str = "ConditionalCheckFailedException";
/// Provider name attached to assumed-role credentials.
const ASSUMED_PROVIDER_NAME: &str = "tenant-access-assumed-role";

/// DynamoDB implementation of ItemBackend.
#[derive(Clone)]
pub struct DynamoBackend {
    client: Client,
}

impl std::fmt::Debug for DynamoBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoBackend").finish_non_exhaustive()
    }
}

impl DynamoBackend {
    /// Create from a pre-built client (for testing)
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

/// Map an SDK failure to a backend error, recognizing condition failures.
fn map_sdk_error<E, R>(operation: &str, err: SdkError<E, R>) -> BackendError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    if err.code() == Some(CONDITIONAL_CHECK_FAILED) {
        return BackendError::ConditionFailed;
    }
    BackendError::service(format!("DynamoDB {} failed: {}", operation, DisplayErrorContext(&err)))
}

fn optional_names(names: &AttributeNames) -> Option<HashMap<String, String>> {
    (!names.is_empty()).then(|| names.clone())
}

fn convert_items(items: &[HashMap<String, AttributeValue>]) -> Result<Vec<Item>> {
    items.iter().map(from_attribute_map).collect()
}

#[async_trait]
impl ItemBackend for DynamoBackend {
    async fn put_item(&self, table: &str, request: PutRequest) -> Result<()> {
        self.client
            .put_item()
            .table_name(table)
            .set_item(Some(to_attribute_map(&request.item)))
            .set_condition_expression(request.condition)
            .set_expression_attribute_names(optional_names(&request.names))
            .set_expression_attribute_values(to_optional_attribute_map(&request.values))
            .send()
            .await
            .map_err(|e| map_sdk_error("put_item", e))?;
        Ok(())
    }

    async fn get_item(&self, table: &str, key: Item) -> Result<Option<Item>> {
        let output = self
            .client
            .get_item()
            .table_name(table)
            .set_key(Some(to_attribute_map(&key)))
            .send()
            .await
            .map_err(|e| map_sdk_error("get_item", e))?;

        output.item().map(from_attribute_map).transpose()
    }

    async fn query(&self, table: &str, request: QueryRequest) -> Result<Vec<Item>> {
        let names = optional_names(&request.names);
        let values = to_optional_attribute_map(&request.values);
        let mut items = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;
        let mut pages = 0u32;

        loop {
            let output = self
                .client
                .query()
                .table_name(table)
                .key_condition_expression(&request.key_condition)
                .set_filter_expression(request.filter.clone())
                .set_index_name(request.index_name.clone())
                .set_expression_attribute_names(names.clone())
                .set_expression_attribute_values(values.clone())
                .scan_index_forward(request.scan_forward)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| map_sdk_error("query", e))?;
            pages += 1;

            items.extend(convert_items(output.items())?);
            if request.limit.is_some_and(|limit| items.len() >= limit) {
                break;
            }
            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        if let Some(limit) = request.limit {
            items.truncate(limit);
        }
        debug!(table = %table, pages = pages, count = items.len(), "DynamoDB query complete");
        Ok(items)
    }

    async fn update_item(&self, table: &str, key: Item, request: UpdateRequest) -> Result<Item> {
        let output = self
            .client
            .update_item()
            .table_name(table)
            .set_key(Some(to_attribute_map(&key)))
            .update_expression(&request.expression)
            .set_condition_expression(request.condition)
            .set_expression_attribute_names(optional_names(&request.names))
            .set_expression_attribute_values(to_optional_attribute_map(&request.values))
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(|e| map_sdk_error("update_item", e))?;

        match output.attributes() {
            Some(attributes) => from_attribute_map(attributes),
            None => Ok(key),
        }
    }

    async fn delete_item(&self, table: &str, key: Item) -> Result<()> {
        self.client
            .delete_item()
            .table_name(table)
            .set_key(Some(to_attribute_map(&key)))
            .send()
            .await
            .map_err(|e| map_sdk_error("delete_item", e))?;
        Ok(())
    }

    async fn scan(&self, table: &str, request: ScanRequest) -> Result<Vec<Item>> {
        let names = optional_names(&request.names);
        let values = to_optional_attribute_map(&request.values);
        let mut items = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let output = self
                .client
                .scan()
                .table_name(table)
                .set_filter_expression(request.filter.clone())
                .set_expression_attribute_names(names.clone())
                .set_expression_attribute_values(values.clone())
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| map_sdk_error("scan", e))?;

            items.extend(convert_items(output.items())?);
            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }
        Ok(items)
    }

    async fn ping(&self, table: &str) -> Result<()> {
        self.client
            .describe_table()
            .table_name(table)
            .send()
            .await
            .map_err(|e| map_sdk_error("describe_table", e))?;
        Ok(())
    }
}

/// Builds DynamoDB clients from a base SDK config.
///
/// Every client inherits the base config (HTTP client, retry config, sleep
/// impl) and overrides region, endpoint, timeout, and credentials.
#[derive(Clone)]
pub struct DynamoClientFactory {
    sdk_config: aws_config::SdkConfig,
    endpoint_url: Option<String>,
    timeout: Option<Duration>,
}

impl DynamoClientFactory {
    pub fn new(sdk_config: aws_config::SdkConfig) -> Self {
        Self {
            sdk_config,
            endpoint_url: None,
            timeout: None,
        }
    }

    /// Endpoint override (e.g. LocalStack)
    pub fn with_endpoint(mut self, endpoint_url: Option<String>) -> Self {
        self.endpoint_url = endpoint_url;
        self
    }

    /// Operation timeout in milliseconds
    pub fn with_timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        self.timeout = timeout_ms.map(Duration::from_millis);
        self
    }
}

impl ClientFactory for DynamoClientFactory {
    fn build(&self, credentials: Option<&AssumedCredentials>, region: Option<&str>) -> StoreClient {
        let mut builder = aws_sdk_dynamodb::config::Builder::from(&self.sdk_config);

        if let Some(region) = region {
            builder = builder.region(Region::new(region.to_string()));
        }

        if let Some(endpoint) = &self.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        if let Some(timeout) = self.timeout {
            builder = builder.timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(timeout)
                    .build(),
            );
        }

        if let Some(credentials) = credentials {
            let expiry: SystemTime = credentials.expiration.into();
            builder = builder.credentials_provider(Credentials::new(
                credentials.access_key_id.clone(),
                credentials.secret_access_key.clone(),
                Some(credentials.session_token.clone()),
                Some(expiry),
                ASSUMED_PROVIDER_NAME,
            ));
        }

        Arc::new(DynamoBackend::from_client(Client::from_conf(builder.build())))
    }
}
