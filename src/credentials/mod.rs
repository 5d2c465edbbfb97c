//! Cross-account credential broker.
//!
//! Exchanges the process's base identity for short-lived credentials scoped
//! to a tenant's cloud account, caches them per `(cloud account, tenant)`,
//! and hands out store clients built from them.
//!
//! Cache policy:
//! - an entry is served only while `expiration > now` (UTC)
//! - expired entries are replaced in place by the next assumption, never
//!   evicted proactively
//! - concurrent misses for the same key may both assume; the later write
//!   wins and both results are valid
//!
//! When the base identity can never assume a role (root credentials in local
//! development), the tenant is pinned in the [`FallbackRegistry`] and served
//! with a client built from the direct credentials from then on.

mod fallback;
#[cfg(feature = "dynamo")]
mod sts;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::AssumeRoleConfig;
use crate::error::{AccessError, Result};
use crate::interfaces::{
    AssumeRoleFailure, AssumeRoleRequest, ClientFactory, RoleAssumer, StoreClient,
};
use crate::item::TenantAwsConfig;

pub use fallback::FallbackRegistry;
#[cfg(feature = "dynamo")]
pub use sts::{classify_assume_failure, StsRoleAssumer};

/// Maximum session name length accepted by STS.
const MAX_SESSION_NAME_LEN: usize = 64;

/// Time-boxed credentials obtained by role assumption.
#[derive(Clone, PartialEq, Eq)]
pub struct AssumedCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: DateTime<Utc>,
}

impl AssumedCredentials {
    /// True once `expiration <= now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration <= now
    }
}

impl std::fmt::Debug for AssumedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssumedCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Cache key: (cloud account id, tenant account id).
type CacheKey = (String, String);

/// Cached credentials and the client built from them.
#[derive(Clone)]
struct CredentialCacheEntry {
    credentials: AssumedCredentials,
    client: StoreClient,
}

/// Exchanges tenant identities for scoped store clients.
pub struct CredentialBroker {
    assumer: Arc<dyn RoleAssumer>,
    clients: Arc<dyn ClientFactory>,
    settings: AssumeRoleConfig,
    default_region: Option<String>,
    cache: Mutex<HashMap<CacheKey, CredentialCacheEntry>>,
    direct_clients: Mutex<HashMap<Option<String>, StoreClient>>,
    fallback: Arc<FallbackRegistry>,
}

impl CredentialBroker {
    pub fn new(
        assumer: Arc<dyn RoleAssumer>,
        clients: Arc<dyn ClientFactory>,
        settings: AssumeRoleConfig,
        fallback: Arc<FallbackRegistry>,
    ) -> Self {
        Self {
            assumer,
            clients,
            settings,
            default_region: None,
            cache: Mutex::new(HashMap::new()),
            direct_clients: Mutex::new(HashMap::new()),
            fallback,
        }
    }

    /// Region used when a tenant config does not name one.
    pub fn with_default_region(mut self, region: Option<String>) -> Self {
        self.default_region = region;
        self
    }

    /// Registry shared with the table resolver.
    pub fn fallback_registry(&self) -> &Arc<FallbackRegistry> {
        &self.fallback
    }

    /// Assume the tenant's role in its cloud account. Always calls the provider.
    pub async fn assume(
        &self,
        cloud_account_id: &str,
        tenant_account_id: &str,
    ) -> Result<AssumedCredentials> {
        let request = AssumeRoleRequest {
            role_arn: self.settings.role_arn(cloud_account_id, tenant_account_id),
            session_name: session_name(tenant_account_id, Utc::now()),
            // Validated to 900..=43200 at config load.
            duration_seconds: i32::try_from(self.settings.session_duration_secs)
                .unwrap_or(i32::MAX),
        };

        debug!(
            tenant = %tenant_account_id,
            role_arn = %request.role_arn,
            session = %request.session_name,
            "Assuming role"
        );

        match self.assumer.assume_role(request).await {
            Ok(credentials) => Ok(credentials),
            Err(AssumeRoleFailure::Incapable(message)) => Err(AccessError::AssumptionIncapable {
                cloud_account_id: cloud_account_id.to_string(),
                tenant: tenant_account_id.to_string(),
                message,
            }),
            Err(AssumeRoleFailure::Transient(message)) => Err(AccessError::Assumption {
                cloud_account_id: cloud_account_id.to_string(),
                tenant: tenant_account_id.to_string(),
                message,
            }),
        }
    }

    /// Store client for a tenant.
    ///
    /// Serves from cache while fresh, otherwise assumes exactly once. An
    /// incapable identity pins the tenant to fallback and yields a
    /// direct-credential client; transient failures are returned.
    pub async fn get_client(&self, tenant: &TenantAwsConfig) -> Result<StoreClient> {
        validate_tenant(tenant)?;
        let tenant_id = tenant.tenant_account_id.as_str();
        let region = tenant.region.as_deref().or(self.default_region.as_deref());

        if self.fallback.contains(tenant_id) {
            debug!(tenant = %tenant_id, "Tenant pinned to local fallback, using direct client");
            return Ok(self.direct_client(region));
        }

        let key = (tenant.cloud_account_id.clone(), tenant.tenant_account_id.clone());
        if let Some(client) = self.cached_client(&key, Utc::now()) {
            debug!(tenant = %tenant_id, "Credential cache hit");
            return Ok(client);
        }

        match self.assume(&tenant.cloud_account_id, tenant_id).await {
            Ok(credentials) => {
                let client = self.clients.build(Some(&credentials), region);
                info!(
                    tenant = %tenant_id,
                    cloud_account = %tenant.cloud_account_id,
                    expires = %credentials.expiration,
                    "Assumed tenant role"
                );
                self.lock_cache().insert(
                    key,
                    CredentialCacheEntry {
                        credentials,
                        client: client.clone(),
                    },
                );
                Ok(client)
            }
            Err(AccessError::AssumptionIncapable { message, .. }) => {
                if self.fallback.mark(tenant_id) {
                    warn!(
                        tenant = %tenant_id,
                        cloud_account = %tenant.cloud_account_id,
                        error = %message,
                        "Identity cannot assume roles, pinning tenant to local fallback"
                    );
                }
                Ok(self.direct_client(region))
            }
            Err(e) => Err(e),
        }
    }

    /// Client built from the process's own credentials.
    pub fn direct_client(&self, region: Option<&str>) -> StoreClient {
        let mut direct = self
            .direct_clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        direct
            .entry(region.map(str::to_string))
            .or_insert_with(|| self.clients.build(None, region))
            .clone()
    }

    /// Expiration of every cached entry, for diagnostics.
    pub fn cached_entries(&self) -> Vec<(String, String, DateTime<Utc>)> {
        let mut entries: Vec<_> = self
            .lock_cache()
            .iter()
            .map(|((account, tenant), entry)| {
                (account.clone(), tenant.clone(), entry.credentials.expiration)
            })
            .collect();
        entries.sort();
        entries
    }

    fn cached_client(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<StoreClient> {
        let cache = self.lock_cache();
        let entry = cache.get(key)?;
        if entry.credentials.is_expired_at(now) {
            debug!(tenant = %key.1, "Cached credentials expired");
            return None;
        }
        Some(entry.client.clone())
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, CredentialCacheEntry>> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub(crate) fn validate_tenant(tenant: &TenantAwsConfig) -> Result<()> {
    if tenant.tenant_account_id.trim().is_empty() {
        return Err(AccessError::InvalidTenant("tenant_account_id is empty".into()));
    }
    if tenant.cloud_account_id.trim().is_empty() {
        return Err(AccessError::InvalidTenant(format!(
            "cloud_account_id is empty for tenant {}",
            tenant.tenant_account_id
        )));
    }
    Ok(())
}

/// Session name `{tenant}-{unix millis}` restricted to STS-legal characters.
pub fn session_name(tenant_account_id: &str, now: DateTime<Utc>) -> String {
    let suffix = format!("-{}", now.timestamp_millis());
    let budget = MAX_SESSION_NAME_LEN.saturating_sub(suffix.len());
    let tenant: String = tenant_account_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || "+=,.@_-".contains(c) {
                c
            } else {
                '-'
            }
        })
        .take(budget)
        .collect();
    format!("{}{}", tenant, suffix)
}

#[cfg(test)]
mod tests;
