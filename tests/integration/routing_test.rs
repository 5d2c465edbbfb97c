//! Table routing and key casing through the public API.

#[path = "../common/mod.rs"]
mod common;

use common::{fixture, item, tenant};
use serde_json::json;
use tenant_access::test_utils::ScriptedRoleAssumer;
use tenant_access::{AccessError, BackendError, CloudTier, KeyCasing, ResolvedTable};

/// Public tenants share the public table with upper-case keys.
#[tokio::test]
async fn test_public_tenant_resolution() {
    let f = fixture(ScriptedRoleAssumer::new());

    assert_eq!(
        f.store.resolver().resolve("T1", CloudTier::Public),
        ResolvedTable {
            table_name: "ops-console".to_string(),
            casing: KeyCasing::Upper,
        }
    );
}

/// Private tenants get their own lower-cased table.
#[tokio::test]
async fn test_private_tenant_put_is_stored_lower_case() {
    let f = fixture(ScriptedRoleAssumer::new());
    let t2 = tenant("T2", CloudTier::Private);

    assert_eq!(
        f.store.resolver().resolve("T2", CloudTier::Private),
        ResolvedTable {
            table_name: "tenant-T2-private".to_string(),
            casing: KeyCasing::Lower,
        }
    );

    f.store
        .put(&t2, item(json!({"PK": "X", "SK": "Y", "entityType": "widget"})))
        .await
        .unwrap();

    let raw = f.backend.raw_items("tenant-T2-private").await;
    assert_eq!(raw.len(), 1);
    assert_eq!(raw[0]["pk"], json!("X"));
    assert_eq!(raw[0]["sk"], json!("Y"));
    assert_eq!(raw[0]["entityType"], json!("widget"));
    assert!(f.backend.raw_items("ops-console").await.is_empty());
}

/// Every verb round-trips in the caller's `PK`/`SK` convention.
#[tokio::test]
async fn test_crud_round_trip_on_private_table() {
    let f = fixture(ScriptedRoleAssumer::new());
    let t2 = tenant("T2", CloudTier::Private);

    for (sk, status) in [("BUILD#1", "passed"), ("BUILD#2", "failed"), ("META", "n/a")] {
        f.store
            .put(&t2, item(json!({"PK": "PIPE#p1", "SK": sk, "status": status})))
            .await
            .unwrap();
    }

    let builds = f
        .store
        .query(
            &t2,
            "PK = :pk AND begins_with(SK, :prefix)",
            item(json!({":pk": "PIPE#p1", ":prefix": "BUILD#"})),
        )
        .await
        .unwrap();
    assert_eq!(builds.len(), 2);
    assert!(builds.iter().all(|b| b.contains_key("PK") && b.contains_key("SK")));

    let updated = f
        .store
        .update(
            &t2,
            item(json!({"PK": "PIPE#p1", "SK": "BUILD#2"})),
            "SET #s = :s",
            item(json!({":s": "passed"})),
            Some([("#s".to_string(), "status".to_string())].into()),
        )
        .await
        .unwrap();
    assert_eq!(updated["status"], json!("passed"));

    f.store
        .delete(&t2, item(json!({"PK": "PIPE#p1", "SK": "META"})))
        .await
        .unwrap();
    let gone = f
        .store
        .get(&t2, item(json!({"PK": "PIPE#p1", "SK": "META"})))
        .await
        .unwrap();
    assert!(gone.is_none());

    let all = f.store.scan(&t2, None, Default::default()).await.unwrap();
    assert_eq!(all.len(), 2);
}

/// Store failures carry the operation and tenant.
#[tokio::test]
async fn test_store_failure_is_wrapped() {
    let f = fixture(ScriptedRoleAssumer::new());
    let t1 = tenant("T1", CloudTier::Public);

    let err = f
        .store
        .query(&t1, "begins_with(SK, :p)", item(json!({":p": "X"})))
        .await
        .unwrap_err();

    match err {
        AccessError::StoreOperation {
            operation,
            tenant,
            source: BackendError::Unsupported(_),
        } => {
            assert_eq!(operation, "query");
            assert_eq!(tenant, "T1");
        }
        other => panic!("unexpected error: {other}"),
    }
}

/// Renaming is write-then-delete.
#[tokio::test]
async fn test_rename_moves_record() {
    let f = fixture(ScriptedRoleAssumer::new());
    let t1 = tenant("T1", CloudTier::Public);

    f.store
        .put(&t1, item(json!({"PK": "ACCOUNT#1", "SK": "TEAM#blue", "size": 3})))
        .await
        .unwrap();
    f.store
        .rename(
            &t1,
            item(json!({"PK": "ACCOUNT#1", "SK": "TEAM#blue"})),
            item(json!({"PK": "ACCOUNT#1", "SK": "TEAM#navy", "size": 3})),
        )
        .await
        .unwrap();

    let teams = f
        .store
        .query(&t1, "PK = :pk", item(json!({":pk": "ACCOUNT#1"})))
        .await
        .unwrap();
    assert_eq!(teams.len(), 1);
    assert_eq!(teams[0]["SK"], json!("TEAM#navy"));
}
