//! Shared helpers for access layer integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::Value;
use tenant_access::config::TableConfig;
use tenant_access::test_utils::{LocalClientFactory, ScriptedRoleAssumer};
use tenant_access::{
    CloudTier, CredentialBroker, FallbackRegistry, Item, ItemStore, LocalStore, TenantAwsConfig,
};

pub const CLOUD_ACCOUNT: &str = "123456789012";

/// A brokered store whose clients all point at one in-memory backend.
pub struct Fixture {
    pub store: ItemStore,
    pub backend: Arc<LocalStore>,
    pub assumer: Arc<ScriptedRoleAssumer>,
    pub factory: Arc<LocalClientFactory>,
    pub broker: Arc<CredentialBroker>,
}

pub fn fixture(assumer: ScriptedRoleAssumer) -> Fixture {
    let backend = Arc::new(LocalStore::new());
    let assumer = Arc::new(assumer);
    let factory = Arc::new(LocalClientFactory::new(backend.clone()));
    let broker = Arc::new(CredentialBroker::new(
        assumer.clone(),
        factory.clone(),
        Default::default(),
        Arc::new(FallbackRegistry::new()),
    ));
    let store = ItemStore::brokered(broker.clone(), TableConfig::default());

    Fixture {
        store,
        backend,
        assumer,
        factory,
        broker,
    }
}

pub fn tenant(id: &str, tier: CloudTier) -> TenantAwsConfig {
    TenantAwsConfig::new(id, CLOUD_ACCOUNT, tier)
}

pub fn item(value: Value) -> Item {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}
