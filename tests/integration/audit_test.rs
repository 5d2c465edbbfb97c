//! Audit columns on writes issued through the item store.

#[path = "../common/mod.rs"]
mod common;

use common::{fixture, item, tenant};
use serde_json::json;
use tenant_access::interfaces::{PutRequest, UpdateRequest};
use tenant_access::store::WriteOptions;
use tenant_access::test_utils::ScriptedRoleAssumer;
use tenant_access::{current_context, with_context, AuditContext, CloudTier};

#[tokio::test]
async fn test_writes_carry_request_actor() {
    let f = fixture(ScriptedRoleAssumer::new());
    let t1 = tenant("T1", CloudTier::Public);
    let ctx = AuditContext::for_actor("u-1")
        .with_name("Ada")
        .with_email("ada@example.com");

    with_context(ctx, async {
        f.store
            .put(&t1, item(json!({"PK": "DOC#1", "SK": "META", "title": "a"})))
            .await
            .unwrap();
    })
    .await;

    let stored = f
        .store
        .get(&t1, item(json!({"PK": "DOC#1", "SK": "META"})))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored["createdBy"], json!("u-1"));
    assert_eq!(stored["updatedBy"], json!("u-1"));

    // Outside the request scope the actor is "system".
    let updated = f
        .store
        .update(
            &t1,
            item(json!({"PK": "DOC#1", "SK": "META"})),
            "SET title = :t",
            item(json!({":t": "b"})),
            None,
        )
        .await
        .unwrap();
    assert_eq!(updated["createdBy"], json!("u-1"));
    assert_eq!(updated["updatedBy"], json!("system"));
    assert_eq!(updated["title"], json!("b"));
}

#[tokio::test]
async fn test_concurrent_requests_keep_their_own_actor() {
    let f = fixture(ScriptedRoleAssumer::new());
    let t2 = tenant("T2", CloudTier::Private);

    let store = &f.store;
    let t2 = &t2;
    let write = move |actor: &'static str, sk: &'static str| {
        with_context(AuditContext::for_actor(actor), async move {
            tokio::task::yield_now().await;
            assert_eq!(current_context().actor(), actor);
            store
                .put(t2, item(json!({"PK": "P", "SK": sk})))
                .await
                .unwrap()
        })
    };

    let (a, b) = tokio::join!(write("alice", "A"), write("bob", "B"));
    assert_eq!(a["createdBy"], json!("alice"));
    assert_eq!(b["createdBy"], json!("bob"));
}

#[tokio::test]
async fn test_bookkeeping_writes_opt_out() {
    let f = fixture(ScriptedRoleAssumer::new());
    let t1 = tenant("T1", CloudTier::Public);

    with_context(AuditContext::for_actor("u-1"), async {
        f.store
            .put_with(
                &t1,
                PutRequest::new(item(json!({"PK": "EMAIL#ada", "SK": "LOOKUP", "user": "u-1"}))),
                WriteOptions::without_audit(),
            )
            .await
            .unwrap();
        f.store
            .update_with(
                &t1,
                item(json!({"PK": "EMAIL#ada", "SK": "LOOKUP"})),
                UpdateRequest::new("SET hits = :one").value(":one", json!(1)),
                WriteOptions::without_audit(),
            )
            .await
            .unwrap();
    })
    .await;

    let raw = f.backend.raw_items("ops-console").await;
    assert_eq!(raw.len(), 1);
    for field in ["createdBy", "createdAt", "updatedBy", "updatedAt"] {
        assert!(!raw[0].contains_key(field), "{field} should be absent");
    }
    assert_eq!(raw[0]["hits"], json!(1));
}
