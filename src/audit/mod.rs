//! Request-scoped audit context.
//!
//! The request framework binds an [`AuditContext`] once near the top of each
//! inbound request with [`with_context`]; every write issued through the
//! `ItemStore` while that future runs is stamped with the acting user. The
//! binding is a tokio task-local, so concurrent requests never see each
//! other's actor and tasks spawned from a request do not inherit it.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;

use crate::interfaces::item_backend::AttributeNames;
use crate::item::Item;
use crate::tables::TOKEN_RE;

pub const CREATED_BY: &str = "createdBy";
pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_BY: &str = "updatedBy";
pub const UPDATED_AT: &str = "updatedAt";

/// Value placeholders added to update expressions.
pub const UPDATED_BY_PLACEHOLDER: &str = ":audit_updated_by";
pub const UPDATED_AT_PLACEHOLDER: &str = ":audit_updated_at";

/// Actor recorded when no context is bound.
pub const SYSTEM_ACTOR: &str = "system";

tokio::task_local! {
    static AUDIT_CONTEXT: AuditContext;
}

/// Identity of the user acting in the current request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub actor_id: Option<String>,
    pub actor_name: Option<String>,
    pub actor_email: Option<String>,
}

impl AuditContext {
    pub fn for_actor(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: Some(actor_id.into()),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.actor_name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.actor_email = Some(email.into());
        self
    }

    /// Actor id, else actor name, else `"system"`. Empty values count as absent.
    pub fn actor(&self) -> &str {
        [&self.actor_id, &self.actor_name]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .unwrap_or(SYSTEM_ACTOR)
    }
}

/// Run `fut` with `ctx` bound as the current audit context.
///
/// The previous binding (or its absence) is visible again once `fut`
/// completes, including when it is nested inside another `with_context`.
pub async fn with_context<F>(ctx: AuditContext, fut: F) -> F::Output
where
    F: Future,
{
    AUDIT_CONTEXT.scope(ctx, fut).await
}

/// The bound audit context, or an empty one outside any request scope.
pub fn current_context() -> AuditContext {
    AUDIT_CONTEXT
        .try_with(|ctx| ctx.clone())
        .unwrap_or_default()
}

/// Stamp a new item with creator and updater identity and timestamps.
pub fn augment_for_create(mut item: Item) -> Item {
    let ctx = current_context();
    let actor = Value::String(ctx.actor().to_string());
    let now = Value::String(Utc::now().to_rfc3339());

    item.insert(CREATED_BY.to_string(), actor.clone());
    item.insert(CREATED_AT.to_string(), now.clone());
    item.insert(UPDATED_BY.to_string(), actor);
    item.insert(UPDATED_AT.to_string(), now);
    item
}

/// Add `updatedBy`/`updatedAt` assignments to an update expression.
///
/// The assignments go first in the SET clause; a SET clause is created when
/// the expression has none. An attribute already targeted by a SET
/// assignment, directly or through a `#name` placeholder in `names`, is left
/// alone, so applying this twice changes nothing the second time. Removals
/// of a stamped attribute are dropped since the stamp replaces them.
pub fn augment_for_update(
    expression: &str,
    values: Item,
    names: &AttributeNames,
) -> (String, Item) {
    let ctx = current_context();
    let Some(mut clauses) = parse_clauses(expression) else {
        // Text precedes the first clause keyword.
        let (audit, values) = stamp(&ctx, &[], values);
        return (format!("SET {} {}", audit.join(", "), expression.trim()), values);
    };

    let assigned: Vec<String> = clauses
        .iter()
        .filter(|clause| clause.is("SET"))
        .flat_map(|clause| clause.actions.iter())
        .filter_map(|action| action.split_once('='))
        .map(|(target, _)| resolve_name(target.trim(), names))
        .collect();

    let (audit, values) = stamp(&ctx, &assigned, values);
    if audit.is_empty() {
        return (expression.to_string(), values);
    }

    let stamped = [UPDATED_BY, UPDATED_AT];
    for clause in clauses.iter_mut().filter(|clause| clause.is("REMOVE")) {
        clause.actions.retain(|action| {
            let field = resolve_name(action, names);
            !stamped.contains(&field.as_str()) || assigned.contains(&field)
        });
    }
    clauses.retain(|clause| !clause.actions.is_empty());

    match clauses.iter_mut().find(|clause| clause.is("SET")) {
        Some(set) => {
            let rest = std::mem::take(&mut set.actions);
            set.actions = audit.into_iter().chain(rest).collect();
        }
        None => clauses.insert(
            0,
            UpdateClause {
                keyword: "SET".to_string(),
                actions: audit,
            },
        ),
    }

    let expression = clauses
        .iter()
        .map(|clause| format!("{} {}", clause.keyword, clause.actions.join(", ")))
        .collect::<Vec<_>>()
        .join(" ");
    (expression, values)
}

/// Audit assignments for the fields not in `assigned`, with their values bound.
fn stamp(ctx: &AuditContext, assigned: &[String], mut values: Item) -> (Vec<String>, Item) {
    let mut audit = Vec::new();
    let stamps = [
        (UPDATED_BY, UPDATED_BY_PLACEHOLDER, ctx.actor().to_string()),
        (UPDATED_AT, UPDATED_AT_PLACEHOLDER, Utc::now().to_rfc3339()),
    ];
    for (field, placeholder, value) in stamps {
        if assigned.iter().any(|target| target == field) {
            continue;
        }
        audit.push(format!("{} = {}", field, placeholder));
        values.insert(placeholder.to_string(), Value::String(value));
    }
    (audit, values)
}

/// One `SET`/`REMOVE`/`ADD`/`DELETE` clause with its comma-separated actions.
#[derive(Debug, Clone, PartialEq)]
struct UpdateClause {
    keyword: String,
    actions: Vec<String>,
}

impl UpdateClause {
    fn is(&self, keyword: &str) -> bool {
        self.keyword.eq_ignore_ascii_case(keyword)
    }
}

const CLAUSE_KEYWORDS: [&str; 4] = ["SET", "REMOVE", "ADD", "DELETE"];

/// Split an update expression into clauses. `None` when text precedes the
/// first clause keyword. Keywords are reserved words in DynamoDB, so a bare
/// token can only be a keyword.
fn parse_clauses(expression: &str) -> Option<Vec<UpdateClause>> {
    let keywords: Vec<(usize, usize, &str)> = tokens(expression)
        .filter(|(_, token)| CLAUSE_KEYWORDS.iter().any(|k| token.eq_ignore_ascii_case(k)))
        .map(|(offset, token)| (offset, offset + token.len(), token))
        .collect();

    let first = keywords.first().map_or(expression.len(), |(start, _, _)| *start);
    if !expression[..first].trim().is_empty() {
        return None;
    }

    let clauses = keywords
        .iter()
        .enumerate()
        .map(|(i, (_, body_start, keyword))| {
            let body_end = keywords
                .get(i + 1)
                .map_or(expression.len(), |(start, _, _)| *start);
            UpdateClause {
                keyword: keyword.to_string(),
                actions: split_actions(&expression[*body_start..body_end]),
            }
        })
        .collect();
    Some(clauses)
}

/// Split a clause body on commas outside parentheses.
fn split_actions(body: &str) -> Vec<String> {
    let mut actions = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                actions.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    actions.push(&body[start..]);
    actions
        .into_iter()
        .map(str::trim)
        .filter(|action| !action.is_empty())
        .map(str::to_string)
        .collect()
}

fn resolve_name(token: &str, names: &AttributeNames) -> String {
    names
        .get(token)
        .cloned()
        .unwrap_or_else(|| token.to_string())
}

/// Identifier tokens with their byte offsets. `#name`/`:value` placeholders
/// are single tokens.
fn tokens(expression: &str) -> impl Iterator<Item = (usize, &str)> {
    TOKEN_RE
        .find_iter(expression)
        .map(|m| (m.start(), m.as_str()))
}

#[cfg(test)]
mod tests;
