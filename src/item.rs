//! Item payloads and per-request tenant descriptors.
//!
//! Items are schemaless: different logical record types share one physical
//! table and are told apart only by the entity marker field. An item is an
//! insertion-ordered `serde_json` map so callers can build them with
//! `json!` and nested values survive unchanged.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored record or key: field name to variant value.
pub type Item = serde_json::Map<String, Value>;

/// Partition key field, caller convention.
pub const PARTITION_KEY: &str = "PK";
/// Sort key field, caller convention.
pub const SORT_KEY: &str = "SK";
/// Partition key field on lower-cased tables.
pub const PARTITION_KEY_LOWER: &str = "pk";
/// Sort key field on lower-cased tables.
pub const SORT_KEY_LOWER: &str = "sk";
/// Field distinguishing logical record types within one table.
pub const ENTITY_MARKER: &str = "entityType";

/// Whether a tenant's data lives in the shared table or a dedicated one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudTier {
    #[default]
    Public,
    Private,
}

impl std::fmt::Display for CloudTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloudTier::Public => write!(f, "public"),
            CloudTier::Private => write!(f, "private"),
        }
    }
}

/// Identifies which table and credentials a request needs.
///
/// Built per request by the caller; never persisted by this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantAwsConfig {
    /// Logical tenant (console account) id.
    pub tenant_account_id: String,
    /// Cloud account whose role is assumed.
    pub cloud_account_id: String,
    /// Shared or dedicated table.
    #[serde(default)]
    pub cloud_tier: CloudTier,
    /// Region override for this tenant's client.
    #[serde(default)]
    pub region: Option<String>,
}

impl TenantAwsConfig {
    pub fn new(
        tenant_account_id: impl Into<String>,
        cloud_account_id: impl Into<String>,
        cloud_tier: CloudTier,
    ) -> Self {
        Self {
            tenant_account_id: tenant_account_id.into(),
            cloud_account_id: cloud_account_id.into(),
            cloud_tier,
            region: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

/// Partition key value of an item, whichever casing it was stored with.
pub fn partition_key(item: &Item) -> Option<&Value> {
    item.get(PARTITION_KEY)
        .or_else(|| item.get(PARTITION_KEY_LOWER))
}

/// Sort key value of an item, whichever casing it was stored with.
pub fn sort_key(item: &Item) -> Option<&Value> {
    item.get(SORT_KEY).or_else(|| item.get(SORT_KEY_LOWER))
}

/// True if `field` names the partition or sort key in either casing.
pub fn is_key_field(field: &str) -> bool {
    matches!(
        field,
        PARTITION_KEY | SORT_KEY | PARTITION_KEY_LOWER | SORT_KEY_LOWER
    )
}

/// Render a scalar value the way it appears inside a composite key.
///
/// Strings are used verbatim; other values use their JSON form.
pub fn key_component(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
