use serde_json::json;

use super::*;

fn no_names() -> AttributeNames {
    AttributeNames::new()
}

fn item_with_key() -> Item {
    let mut item = Item::new();
    item.insert("PK".to_string(), json!("PIPELINE#p1"));
    item.insert("SK".to_string(), json!("META"));
    item
}

#[test]
fn test_current_context_empty_outside_scope() {
    assert_eq!(current_context(), AuditContext::default());
}

#[tokio::test]
async fn test_with_context_binds_and_restores() {
    let ctx = AuditContext::for_actor("u-1").with_name("Ada");

    let seen = with_context(ctx.clone(), async { current_context() }).await;
    assert_eq!(seen, ctx);
    assert_eq!(current_context(), AuditContext::default());
}

#[tokio::test]
async fn test_nested_context_restores_outer() {
    let outer = AuditContext::for_actor("outer");
    let inner = AuditContext::for_actor("inner");

    let (during, after) = with_context(outer.clone(), async {
        let during = with_context(inner.clone(), async { current_context() }).await;
        (during, current_context())
    })
    .await;

    assert_eq!(during, inner);
    assert_eq!(after, outer);
}

#[tokio::test]
async fn test_concurrent_requests_are_isolated() {
    let request = |actor: &'static str| async move {
        with_context(AuditContext::for_actor(actor), async move {
            for _ in 0..10 {
                tokio::task::yield_now().await;
                assert_eq!(current_context().actor(), actor);
            }
            current_context().actor().to_string()
        })
        .await
    };

    let (a, b) = tokio::join!(
        tokio::spawn(request("alice")),
        tokio::spawn(request("bob"))
    );
    assert_eq!(a.unwrap(), "alice");
    assert_eq!(b.unwrap(), "bob");
}

#[tokio::test]
async fn test_spawned_task_does_not_inherit_context() {
    let seen = with_context(AuditContext::for_actor("u-1"), async {
        tokio::spawn(async { current_context() }).await.unwrap()
    })
    .await;
    assert_eq!(seen, AuditContext::default());
}

#[test]
fn test_actor_precedence() {
    assert_eq!(AuditContext::for_actor("id").with_name("name").actor(), "id");
    let named = AuditContext {
        actor_name: Some("name".to_string()),
        ..Default::default()
    };
    assert_eq!(named.actor(), "name");
    let blank_id = AuditContext {
        actor_id: Some("  ".to_string()),
        actor_email: Some("a@example.com".to_string()),
        ..Default::default()
    };
    assert_eq!(blank_id.actor(), SYSTEM_ACTOR);
}

#[test]
fn test_augment_for_create_without_context_uses_system() {
    let item = augment_for_create(item_with_key());
    assert_eq!(item[CREATED_BY], json!("system"));
    assert_eq!(item[UPDATED_BY], json!("system"));
    assert!(item[CREATED_AT].as_str().is_some_and(|s| !s.is_empty()));
    assert_eq!(item[CREATED_AT], item[UPDATED_AT]);
    // Original fields kept
    assert_eq!(item["PK"], json!("PIPELINE#p1"));
}

#[tokio::test]
async fn test_augment_for_create_uses_bound_actor() {
    let item = with_context(AuditContext::for_actor("u-42"), async {
        augment_for_create(item_with_key())
    })
    .await;
    assert_eq!(item[CREATED_BY], json!("u-42"));
    assert_eq!(item[UPDATED_BY], json!("u-42"));
}

#[test]
fn test_augment_for_update_prepends_into_existing_set() {
    let mut values = Item::new();
    values.insert(":name".to_string(), json!("build-7"));

    let (expr, values) = augment_for_update("SET #name = :name", values, &no_names());
    assert_eq!(
        expr,
        "SET updatedBy = :audit_updated_by, updatedAt = :audit_updated_at, #name = :name"
    );
    assert_eq!(values[":name"], json!("build-7"));
    assert_eq!(values[UPDATED_BY_PLACEHOLDER], json!("system"));
    assert!(values.contains_key(UPDATED_AT_PLACEHOLDER));
}

#[test]
fn test_augment_for_update_creates_set_clause() {
    let (expr, _) = augment_for_update("REMOVE staleField", Item::new(), &no_names());
    assert_eq!(
        expr,
        "SET updatedBy = :audit_updated_by, updatedAt = :audit_updated_at REMOVE staleField"
    );

    let (expr, _) = augment_for_update("", Item::new(), &no_names());
    assert_eq!(
        expr,
        "SET updatedBy = :audit_updated_by, updatedAt = :audit_updated_at"
    );
}

#[test]
fn test_augment_for_update_finds_later_set_clause() {
    let (expr, _) = augment_for_update("REMOVE old set a = :a", Item::new(), &no_names());
    assert_eq!(
        expr,
        "REMOVE old set updatedBy = :audit_updated_by, updatedAt = :audit_updated_at, a = :a"
    );
}

#[test]
fn test_augment_for_update_is_idempotent() {
    let (once, values) = augment_for_update("SET a = :a", Item::new(), &no_names());
    let (twice, values_twice) = augment_for_update(&once, values.clone(), &no_names());
    assert_eq!(once, twice);
    assert_eq!(values, values_twice);
}

#[test]
fn test_augment_for_update_keeps_caller_assignment() {
    let (expr, values) = augment_for_update("SET updatedBy = :who", Item::new(), &no_names());
    assert_eq!(
        expr,
        "SET updatedAt = :audit_updated_at, updatedBy = :who"
    );
    assert!(!values.contains_key(UPDATED_BY_PLACEHOLDER));
}

#[test]
fn test_augment_for_update_ignores_right_hand_references() {
    let (expr, values) = augment_for_update(
        "SET previousEditor = updatedBy, title = :t",
        Item::new(),
        &no_names(),
    );
    assert_eq!(
        expr,
        "SET updatedBy = :audit_updated_by, updatedAt = :audit_updated_at, \
         previousEditor = updatedBy, title = :t"
    );
    assert_eq!(values[UPDATED_BY_PLACEHOLDER], json!("system"));
}

#[test]
fn test_augment_for_update_replaces_removal_of_audit_column() {
    let (expr, values) = augment_for_update("REMOVE updatedAt, draft", Item::new(), &no_names());
    assert_eq!(
        expr,
        "SET updatedBy = :audit_updated_by, updatedAt = :audit_updated_at REMOVE draft"
    );
    assert!(values.contains_key(UPDATED_AT_PLACEHOLDER));

    let (expr, _) = augment_for_update("SET a = :a REMOVE updatedBy", Item::new(), &no_names());
    assert_eq!(
        expr,
        "SET updatedBy = :audit_updated_by, updatedAt = :audit_updated_at, a = :a"
    );
}

#[test]
fn test_augment_for_update_resolves_name_placeholders() {
    let names: AttributeNames = [("#ub".to_string(), UPDATED_BY.to_string())].into();
    let (expr, values) = augment_for_update("SET #ub = :who", Item::new(), &names);
    assert_eq!(expr, "SET updatedAt = :audit_updated_at, #ub = :who");
    assert!(!values.contains_key(UPDATED_BY_PLACEHOLDER));
}

#[test]
fn test_augment_for_update_keeps_function_arguments_together() {
    let (expr, _) = augment_for_update(
        "SET tags = list_append(tags, :t)",
        Item::new(),
        &no_names(),
    );
    assert_eq!(
        expr,
        "SET updatedBy = :audit_updated_by, updatedAt = :audit_updated_at, \
         tags = list_append(tags, :t)"
    );
}

#[test]
fn test_tokens_treat_placeholders_as_single_tokens() {
    let found: Vec<&str> = tokens("SET #a = :a, b=:b").map(|(_, t)| t).collect();
    assert_eq!(found, vec!["SET", "#a", ":a", "b", ":b"]);
}
