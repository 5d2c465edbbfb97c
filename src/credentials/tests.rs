use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use super::*;
use crate::item::CloudTier;
use crate::store::LocalStore;
use crate::test_utils::{credentials_expiring_at, LocalClientFactory, ScriptedRoleAssumer};

const ROOT_DENIED: &str = "Roles may not be assumed by root accounts.";

struct Harness {
    assumer: Arc<ScriptedRoleAssumer>,
    factory: Arc<LocalClientFactory>,
    broker: CredentialBroker,
}

fn harness(assumer: ScriptedRoleAssumer) -> Harness {
    let assumer = Arc::new(assumer);
    let factory = Arc::new(LocalClientFactory::new(Arc::new(LocalStore::new())));
    let broker = CredentialBroker::new(
        assumer.clone(),
        factory.clone(),
        AssumeRoleConfig::default(),
        Arc::new(FallbackRegistry::new()),
    );
    Harness {
        assumer,
        factory,
        broker,
    }
}

fn tenant(id: &str) -> TenantAwsConfig {
    TenantAwsConfig::new(id, "123456789012", CloudTier::Public)
}

#[tokio::test]
async fn test_fresh_entry_is_served_from_cache() {
    let h = harness(ScriptedRoleAssumer::new());

    h.broker.get_client(&tenant("T1")).await.unwrap();
    h.broker.get_client(&tenant("T1")).await.unwrap();

    assert_eq!(h.assumer.calls(), 1);
    assert_eq!(h.factory.assumed_builds().len(), 1);
}

#[tokio::test]
async fn test_cache_is_keyed_by_account_and_tenant() {
    let h = harness(ScriptedRoleAssumer::new());

    h.broker.get_client(&tenant("T1")).await.unwrap();
    h.broker.get_client(&tenant("T2")).await.unwrap();
    h.broker
        .get_client(&TenantAwsConfig::new("T1", "210987654321", CloudTier::Public))
        .await
        .unwrap();

    assert_eq!(h.assumer.calls(), 3);
    assert_eq!(h.broker.cached_entries().len(), 3);
}

#[tokio::test]
async fn test_expired_entry_triggers_exactly_one_reassumption() {
    let expired = credentials_expiring_at(Utc::now() - Duration::seconds(1), 0);
    let h = harness(ScriptedRoleAssumer::new().then_credentials(expired));

    h.broker.get_client(&tenant("T1")).await.unwrap();
    assert_eq!(h.assumer.calls(), 1);

    h.broker.get_client(&tenant("T1")).await.unwrap();
    assert_eq!(h.assumer.calls(), 2);

    // The refreshed entry replaced the expired one in place.
    let entries = h.broker.cached_entries();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].2 > Utc::now());

    h.broker.get_client(&tenant("T1")).await.unwrap();
    assert_eq!(h.assumer.calls(), 2);
}

#[test]
fn test_expiration_equal_to_now_counts_as_expired() {
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let credentials = credentials_expiring_at(now, 1);

    assert!(credentials.is_expired_at(now));
    assert!(credentials.is_expired_at(now + Duration::milliseconds(1)));
    assert!(!credentials.is_expired_at(now - Duration::milliseconds(1)));
}

#[tokio::test]
async fn test_incapable_identity_pins_tenant_to_fallback() {
    let h = harness(
        ScriptedRoleAssumer::new()
            .then_failure(AssumeRoleFailure::Incapable(ROOT_DENIED.into()))
            .then_failure(AssumeRoleFailure::Incapable(ROOT_DENIED.into())),
    );

    h.broker.get_client(&tenant("T3")).await.unwrap();
    assert!(h.broker.fallback_registry().contains("T3"));
    assert_eq!(h.assumer.calls(), 1);

    // Second call goes straight to the direct client.
    h.broker.get_client(&tenant("T3")).await.unwrap();
    assert_eq!(h.assumer.calls(), 1);
    assert_eq!(h.factory.direct_builds(), 1);
    assert!(h.broker.cached_entries().is_empty());
}

#[tokio::test]
async fn test_transient_failure_surfaces_without_fallback() {
    let h = harness(
        ScriptedRoleAssumer::new()
            .then_failure(AssumeRoleFailure::Transient("Throttling: Rate exceeded".into())),
    );

    let err = h.broker.get_client(&tenant("T4")).await.err().unwrap();
    assert!(matches!(err, AccessError::Assumption { ref tenant, .. } if tenant == "T4"));
    assert!(err.is_transient());
    assert!(!h.broker.fallback_registry().contains("T4"));

    // No retry happened inside the broker; the next call assumes again.
    assert_eq!(h.assumer.calls(), 1);
    h.broker.get_client(&tenant("T4")).await.unwrap();
    assert_eq!(h.assumer.calls(), 2);
}

#[tokio::test]
async fn test_assume_reports_incapability_to_direct_callers() {
    let h = harness(
        ScriptedRoleAssumer::new().then_failure(AssumeRoleFailure::Incapable(ROOT_DENIED.into())),
    );

    let err = h.broker.assume("123456789012", "T5").await.unwrap_err();
    assert!(matches!(err, AccessError::AssumptionIncapable { .. }));
    // Only get_client records fallback.
    assert!(h.broker.fallback_registry().is_empty());
}

#[tokio::test]
async fn test_concurrent_misses_both_succeed() {
    let h = harness(ScriptedRoleAssumer::new());
    let t6 = tenant("T6");

    let (a, b) = tokio::join!(h.broker.get_client(&t6), h.broker.get_client(&t6));
    assert!(a.is_ok());
    assert!(b.is_ok());

    let calls = h.assumer.calls();
    assert!((1..=2).contains(&calls));

    let entries = h.broker.cached_entries();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].2 > Utc::now());
}

#[tokio::test]
async fn test_assume_request_shape() {
    let h = harness(ScriptedRoleAssumer::new());

    h.broker.get_client(&tenant("acct-42")).await.unwrap();

    let requests = h.assumer.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].role_arn,
        "arn:aws:iam::123456789012:role/OpsConsoleCrossAccountAccess"
    );
    assert!(requests[0].session_name.starts_with("acct-42-"));
    assert_eq!(requests[0].duration_seconds, 3600);
}

#[tokio::test]
async fn test_empty_ids_are_rejected() {
    let h = harness(ScriptedRoleAssumer::new());

    let no_tenant = TenantAwsConfig::new("", "123456789012", CloudTier::Public);
    assert!(matches!(
        h.broker.get_client(&no_tenant).await,
        Err(AccessError::InvalidTenant(_))
    ));

    let no_account = TenantAwsConfig::new("T7", "  ", CloudTier::Private);
    assert!(matches!(
        h.broker.get_client(&no_account).await,
        Err(AccessError::InvalidTenant(_))
    ));
    assert_eq!(h.assumer.calls(), 0);
}

#[tokio::test]
async fn test_direct_clients_are_reused_per_region() {
    let h = harness(ScriptedRoleAssumer::new());

    h.broker.direct_client(None);
    h.broker.direct_client(None);
    h.broker.direct_client(Some("eu-west-1"));

    assert_eq!(h.factory.direct_builds(), 2);
}

#[test]
fn test_session_name_format() {
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    assert_eq!(
        session_name("tenant_1", now),
        format!("tenant_1-{}", now.timestamp_millis())
    );
}

#[test]
fn test_session_name_sanitized_and_bounded() {
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

    let name = session_name("acme corp/ops", now);
    assert!(name.starts_with("acme-corp-ops-"));

    let long = "t".repeat(200);
    let name = session_name(&long, now);
    assert_eq!(name.len(), MAX_SESSION_NAME_LEN);
    assert!(name.ends_with(&now.timestamp_millis().to_string()));
}

#[test]
fn test_credentials_debug_redacts_secrets() {
    let credentials = credentials_expiring_at(Utc::now(), 9);
    let printed = format!("{:?}", credentials);
    assert!(printed.contains("ASIATEST0009"));
    assert!(!printed.contains("secret-9"));
    assert!(!printed.contains("token-9"));
}
