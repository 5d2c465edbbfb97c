//! Credential caching and local-fallback behavior.

#[path = "../common/mod.rs"]
mod common;

use chrono::{Duration, Utc};
use common::{fixture, item, tenant};
use serde_json::json;
use tenant_access::interfaces::AssumeRoleFailure;
use tenant_access::test_utils::{credentials_expiring_at, ScriptedRoleAssumer};
use tenant_access::{CloudTier, KeyCasing};

const ROOT_DENIED: &str = "Roles may not be assumed by root accounts.";

/// An identity that can never assume a role pins the tenant on first
/// failure; later requests skip assumption entirely.
#[tokio::test]
async fn test_incapable_identity_falls_back_permanently() {
    let f = fixture(
        ScriptedRoleAssumer::new()
            .then_failure(AssumeRoleFailure::Incapable(ROOT_DENIED.into()))
            .then_failure(AssumeRoleFailure::Incapable(ROOT_DENIED.into())),
    );
    let t3 = tenant("T3", CloudTier::Private);

    f.broker.get_client(&t3).await.unwrap();
    assert!(f.broker.fallback_registry().contains("T3"));
    assert_eq!(f.assumer.calls(), 1);

    f.broker.get_client(&t3).await.unwrap();
    assert_eq!(f.assumer.calls(), 1);

    let resolved = f.store.resolver().resolve("T3", CloudTier::Private);
    assert_eq!(resolved.table_name, "ops-console-admin");
    assert_eq!(resolved.casing, KeyCasing::Upper);
}

/// Fallback tenants are served from the shared administrative table.
#[tokio::test]
async fn test_fallback_tenant_data_lands_in_admin_table() {
    let f = fixture(
        ScriptedRoleAssumer::new().then_failure(AssumeRoleFailure::Incapable(ROOT_DENIED.into())),
    );
    let t3 = tenant("T3", CloudTier::Private);

    f.store
        .put(&t3, item(json!({"PK": "X", "SK": "Y"})))
        .await
        .unwrap();
    let fetched = f
        .store
        .get(&t3, item(json!({"PK": "X", "SK": "Y"})))
        .await
        .unwrap();

    assert!(fetched.is_some());
    assert_eq!(f.backend.item_count("ops-console-admin").await, 1);
    assert_eq!(f.factory.direct_builds(), 1);
}

/// Two concurrent requests for an uncached tenant both get a client.
#[tokio::test]
async fn test_concurrent_first_requests() {
    let f = fixture(ScriptedRoleAssumer::new());
    let t4 = tenant("T4", CloudTier::Public);

    let (a, b) = tokio::join!(
        f.store.put(&t4, item(json!({"PK": "A", "SK": "1"}))),
        f.store.put(&t4, item(json!({"PK": "A", "SK": "2"}))),
    );
    a.unwrap();
    b.unwrap();

    let entries = f.broker.cached_entries();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].2 > Utc::now());
    assert_eq!(f.backend.item_count("ops-console").await, 2);
}

/// Expired credentials are replaced by exactly one new assumption.
#[tokio::test]
async fn test_expired_credentials_are_refreshed() {
    let f = fixture(
        ScriptedRoleAssumer::new()
            .then_credentials(credentials_expiring_at(Utc::now() - Duration::minutes(5), 0)),
    );
    let t5 = tenant("T5", CloudTier::Public);

    f.store
        .get(&t5, item(json!({"PK": "A", "SK": "B"})))
        .await
        .unwrap();
    f.store
        .get(&t5, item(json!({"PK": "A", "SK": "B"})))
        .await
        .unwrap();
    f.store
        .get(&t5, item(json!({"PK": "A", "SK": "B"})))
        .await
        .unwrap();

    assert_eq!(f.assumer.calls(), 2);
    assert_eq!(f.factory.assumed_builds().len(), 2);
}

/// Transient assumption failures are not retried and do not pin the tenant.
#[tokio::test]
async fn test_transient_failure_is_returned() {
    let f = fixture(
        ScriptedRoleAssumer::new()
            .then_failure(AssumeRoleFailure::Transient("ThrottlingException".into())),
    );
    let t6 = tenant("T6", CloudTier::Private);

    let err = f
        .store
        .get(&t6, item(json!({"PK": "A", "SK": "B"})))
        .await
        .unwrap_err();

    assert!(err.is_transient());
    assert!(f.broker.fallback_registry().is_empty());
    assert_eq!(f.assumer.calls(), 1);
}
