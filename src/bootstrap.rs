//! Bootstrap utilities for services embedding the access layer.

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{AccessConfig, LOG_ENV_VAR};
use crate::error::Result;
use crate::store::{ItemStore, LocalStore};

/// Initialize tracing with the ACCESS_LOG environment variable.
///
/// Defaults to "info" level if ACCESS_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Load configuration from the environment and connect.
pub async fn connect_from_env() -> Result<ItemStore> {
    let config = AccessConfig::load(None)?;
    connect(&config).await
}

/// Build the item store described by `config`.
///
/// Unless `skip_connectivity_check` is set, the shared public table must be
/// reachable with the process's own credentials before this returns.
pub async fn connect(config: &AccessConfig) -> Result<ItemStore> {
    let store = if config.use_local_store {
        warn!("Using in-memory local store, nothing is persisted");
        ItemStore::local(Arc::new(LocalStore::new()), config.tables.clone())
    } else {
        connect_cloud(config).await?
    };

    if config.skip_connectivity_check {
        info!("Skipping store connectivity check");
    } else {
        store.check_connectivity().await?;
    }

    info!(
        public_table = %config.tables.public_table,
        fallback_table = %config.tables.fallback_table,
        local = store.is_local(),
        "Access layer ready"
    );
    Ok(store)
}

#[cfg(feature = "dynamo")]
async fn connect_cloud(config: &AccessConfig) -> Result<ItemStore> {
    use aws_config::{BehaviorVersion, Region};

    use crate::credentials::{CredentialBroker, FallbackRegistry, StsRoleAssumer};
    use crate::store::dynamo::DynamoClientFactory;

    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = &config.region {
        loader = loader.region(Region::new(region.clone()));
    }
    let sdk_config = loader.load().await;

    let assumer = Arc::new(StsRoleAssumer::new(&sdk_config));
    let clients = Arc::new(
        DynamoClientFactory::new(sdk_config)
            .with_endpoint(config.endpoint_url.clone())
            .with_timeout_ms(config.timeout_ms),
    );
    let broker = CredentialBroker::new(
        assumer,
        clients,
        config.assume_role.clone(),
        Arc::new(FallbackRegistry::new()),
    )
    .with_default_region(config.region.clone());

    info!(
        region = ?config.region,
        endpoint = ?config.endpoint_url,
        role = %config.assume_role.role_name,
        "Connecting to DynamoDB"
    );
    Ok(ItemStore::brokered(Arc::new(broker), config.tables.clone()))
}

#[cfg(not(feature = "dynamo"))]
async fn connect_cloud(_config: &AccessConfig) -> Result<ItemStore> {
    Err(crate::config::ConfigError::Invalid(
        "built without the dynamo feature, set use_local_store".into(),
    )
    .into())
}
