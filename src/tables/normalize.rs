//! Key casing normalization.
//!
//! Callers always write `PK`/`SK`. Before a request reaches a lower-cased
//! table the reserved key fields are renamed in items, keys, attribute-name
//! maps and expressions; items read back are renamed to `PK`/`SK` again.
//!
//! Expressions are rewritten per token, never by substring, so `GSI1PK`,
//! `PKEY`, `#PK` and `:SK` are left alone. Neither are nested document path
//! components such as `meta.PK`.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::KeyCasing;
use crate::error::{AccessError, Result};
use crate::interfaces::item_backend::AttributeNames;
use crate::item::{Item, PARTITION_KEY, PARTITION_KEY_LOWER, SORT_KEY, SORT_KEY_LOWER};

/// Identifier-like tokens, including `#name` and `:value` placeholders.
pub(crate) static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[#:]?[A-Za-z0-9_]+").expect("valid regex"));

/// Field name as it must appear on a table with `casing`.
fn rename_field(field: &str, casing: KeyCasing) -> Option<&'static str> {
    match (casing, field) {
        (KeyCasing::Lower, PARTITION_KEY) => Some(PARTITION_KEY_LOWER),
        (KeyCasing::Lower, SORT_KEY) => Some(SORT_KEY_LOWER),
        (KeyCasing::Upper, PARTITION_KEY_LOWER) => Some(PARTITION_KEY),
        (KeyCasing::Upper, SORT_KEY_LOWER) => Some(SORT_KEY),
        _ => None,
    }
}

/// Rename the reserved key fields of an item to `casing`.
///
/// Other fields and every value pass through unchanged; field order is kept.
pub fn normalize_item(item: Item, casing: KeyCasing) -> Item {
    item.into_iter()
        .map(|(field, value)| match rename_field(&field, casing) {
            Some(renamed) => (renamed.to_string(), value),
            None => (field, value),
        })
        .collect()
}

/// Rename an item read from the store back to the caller convention.
pub fn denormalize_item(item: Item) -> Item {
    normalize_item(item, KeyCasing::Upper)
}

/// Normalize a primary key.
///
/// The key must carry a partition key and must not carry the same key field
/// in both casings.
pub fn normalize_key(key: Item, casing: KeyCasing) -> Result<Item> {
    let has_upper_pk = key.contains_key(PARTITION_KEY);
    let has_lower_pk = key.contains_key(PARTITION_KEY_LOWER);
    if !has_upper_pk && !has_lower_pk {
        return Err(AccessError::normalization(format!(
            "key has no partition key field: {:?}",
            key.keys().collect::<Vec<_>>()
        )));
    }
    if (has_upper_pk && has_lower_pk)
        || (key.contains_key(SORT_KEY) && key.contains_key(SORT_KEY_LOWER))
    {
        return Err(AccessError::normalization(
            "key names the same key field in both casings",
        ));
    }
    Ok(normalize_item(key, casing))
}

/// Rewrite standalone top-level `PK`/`SK` tokens of a key, filter, condition
/// or update expression for a table with `casing`.
pub fn normalize_expression(expression: &str, casing: KeyCasing) -> Result<String> {
    if expression.trim().is_empty() {
        return Err(AccessError::normalization("expression is empty"));
    }

    let rewritten = TOKEN_RE.replace_all(expression, |caps: &Captures<'_>| {
        let token = &caps[0];
        let nested = caps
            .get(0)
            .is_some_and(|m| expression[..m.start()].ends_with('.'));
        if nested {
            return token.to_string();
        }
        rename_field(token, casing)
            .map(str::to_string)
            .unwrap_or_else(|| token.to_string())
    });
    Ok(rewritten.into_owned())
}

/// Rewrite attribute-name map targets that name a reserved key field.
pub fn normalize_names(names: AttributeNames, casing: KeyCasing) -> AttributeNames {
    names
        .into_iter()
        .map(|(placeholder, field)| match rename_field(&field, casing) {
            Some(renamed) => (placeholder, renamed.to_string()),
            None => (placeholder, field),
        })
        .collect()
}
