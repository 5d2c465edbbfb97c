//! Approximate expression evaluation for the in-memory store.
//!
//! Recognizes a fixed set of clause shapes joined by `AND`:
//! - `attr = :v`, `attr <> :v`, `attr < :v` (and `<=`, `>`, `>=`)
//! - `begins_with(attr, :v)`, `contains(attr, :v)`
//! - `attribute_exists(attr)`, `attribute_not_exists(attr)`
//!
//! Anything else parses as [`Clause::Unrecognized`]; callers decide whether
//! that is an error (key conditions) or ignorable (filters).

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::BackendError;
use crate::interfaces::item_backend::AttributeNames;
use crate::item::Item;

type Result<T> = std::result::Result<T, BackendError>;

static AND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+AND\s+").expect("valid regex"));
static COMPARE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([#\w]+)\s*(<>|<=|>=|=|<|>)\s*(:\w+)$").expect("valid regex")
});
static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)(begins_with|contains)\s*\(\s*([#\w]+)\s*,\s*(:\w+)\s*\)$")
        .expect("valid regex")
});
static EXISTS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)(attribute_exists|attribute_not_exists)\s*\(\s*([#\w]+)\s*\)$")
        .expect("valid regex")
});
static UPDATE_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|\s)(SET|REMOVE|ADD|DELETE)\s").expect("valid regex")
});
static IF_NOT_EXISTS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)if_not_exists\s*\(\s*([#\w]+)\s*,\s*(:\w+)\s*\)$").expect("valid regex")
});
static ARITHMETIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([#\w]+)\s*([+-])\s*(:\w+)$").expect("valid regex"));

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// One conjunct of a condition, with placeholders resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Compare(String, Comparison, Value),
    BeginsWith(String, Value),
    Contains(String, Value),
    Exists(String),
    NotExists(String),
    Unrecognized(String),
}

impl Clause {
    /// Evaluate against an item. Unrecognized clauses hold.
    pub fn matches(&self, item: &Item) -> bool {
        match self {
            Clause::Compare(field, op, expected) => item
                .get(field)
                .and_then(|actual| compare(actual, expected))
                .is_some_and(|ordering| match op {
                    Comparison::Eq => ordering == Ordering::Equal,
                    Comparison::Ne => ordering != Ordering::Equal,
                    Comparison::Lt => ordering == Ordering::Less,
                    Comparison::Le => ordering != Ordering::Greater,
                    Comparison::Gt => ordering == Ordering::Greater,
                    Comparison::Ge => ordering != Ordering::Less,
                }),
            Clause::BeginsWith(field, prefix) => match (item.get(field), prefix) {
                (Some(Value::String(actual)), Value::String(prefix)) => actual.starts_with(prefix),
                _ => false,
            },
            Clause::Contains(field, needle) => match (item.get(field), needle) {
                (Some(Value::String(actual)), Value::String(needle)) => actual.contains(needle),
                (Some(Value::Array(actual)), needle) => actual.contains(needle),
                _ => false,
            },
            Clause::Exists(field) => item.contains_key(field),
            Clause::NotExists(field) => !item.contains_key(field),
            Clause::Unrecognized(_) => true,
        }
    }

    /// Field the clause tests, if recognized.
    pub fn field(&self) -> Option<&str> {
        match self {
            Clause::Compare(field, _, _)
            | Clause::BeginsWith(field, _)
            | Clause::Contains(field, _)
            | Clause::Exists(field)
            | Clause::NotExists(field) => Some(field),
            Clause::Unrecognized(_) => None,
        }
    }
}

/// Order two scalar values of the same kind.
fn compare(actual: &Value, expected: &Value) -> Option<Ordering> {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (a, b) => (a == b).then_some(Ordering::Equal),
    }
}

/// Resolve a `#name` placeholder to its field; plain names pass through.
fn resolve_name(token: &str, names: &AttributeNames) -> Result<String> {
    if token.starts_with('#') {
        names
            .get(token)
            .cloned()
            .ok_or_else(|| BackendError::invalid_item(format!("unbound name placeholder {}", token)))
    } else {
        Ok(token.to_string())
    }
}

/// Resolve a `:value` placeholder.
fn resolve_value(token: &str, values: &Item) -> Result<Value> {
    values
        .get(token)
        .cloned()
        .ok_or_else(|| BackendError::invalid_item(format!("unbound value placeholder {}", token)))
}

/// Parse a condition into conjuncts.
pub fn parse_condition(
    expression: &str,
    names: &AttributeNames,
    values: &Item,
) -> Result<Vec<Clause>> {
    AND_RE
        .split(expression.trim())
        .filter(|part| !part.trim().is_empty())
        .map(|part| parse_clause(part.trim(), names, values))
        .collect()
}

fn parse_clause(clause: &str, names: &AttributeNames, values: &Item) -> Result<Clause> {
    if let Some(caps) = COMPARE_RE.captures(clause) {
        let op = match &caps[2] {
            "=" => Comparison::Eq,
            "<>" => Comparison::Ne,
            "<" => Comparison::Lt,
            "<=" => Comparison::Le,
            ">" => Comparison::Gt,
            _ => Comparison::Ge,
        };
        return Ok(Clause::Compare(
            resolve_name(&caps[1], names)?,
            op,
            resolve_value(&caps[3], values)?,
        ));
    }
    if let Some(caps) = FUNCTION_RE.captures(clause) {
        let field = resolve_name(&caps[2], names)?;
        let value = resolve_value(&caps[3], values)?;
        return Ok(if caps[1].eq_ignore_ascii_case("begins_with") {
            Clause::BeginsWith(field, value)
        } else {
            Clause::Contains(field, value)
        });
    }
    if let Some(caps) = EXISTS_RE.captures(clause) {
        let field = resolve_name(&caps[2], names)?;
        return Ok(if caps[1].eq_ignore_ascii_case("attribute_exists") {
            Clause::Exists(field)
        } else {
            Clause::NotExists(field)
        });
    }
    Ok(Clause::Unrecognized(clause.to_string()))
}

/// One parsed update action.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction {
    Set(String, Value),
    /// `target = if_not_exists(source, :v)`
    SetIfNotExists {
        target: String,
        source: String,
        fallback: Value,
    },
    /// `target = source + :delta`, or `-` when `negate`
    Arithmetic {
        target: String,
        source: String,
        delta: Value,
        negate: bool,
    },
    Remove(String),
}

/// Parse a `SET ... REMOVE ...` update expression.
pub fn parse_update(
    expression: &str,
    names: &AttributeNames,
    values: &Item,
) -> Result<Vec<UpdateAction>> {
    let expression = format!(" {}", expression.trim());
    let keywords: Vec<(usize, usize, String)> = UPDATE_KEYWORD_RE
        .captures_iter(&expression)
        .filter_map(|caps| caps.get(1))
        .map(|m| (m.start(), m.end(), m.as_str().to_ascii_uppercase()))
        .collect();

    if keywords.is_empty() {
        return Err(BackendError::invalid_item(format!(
            "update expression has no clause: {}",
            expression.trim()
        )));
    }

    let mut actions = Vec::new();
    for (i, (_, body_start, keyword)) in keywords.iter().enumerate() {
        let body_end = keywords
            .get(i + 1)
            .map(|(start, _, _)| *start)
            .unwrap_or(expression.len());
        let body = &expression[*body_start..body_end];

        for part in split_top_level(body) {
            match keyword.as_str() {
                "SET" => actions.push(parse_set(part, names, values)?),
                "REMOVE" => actions.push(UpdateAction::Remove(resolve_name(part, names)?)),
                other => {
                    return Err(BackendError::unsupported(format!(
                        "{} clauses are not supported by the local store",
                        other
                    )))
                }
            }
        }
    }
    Ok(actions)
}

fn parse_set(assignment: &str, names: &AttributeNames, values: &Item) -> Result<UpdateAction> {
    let (target, source) = assignment.split_once('=').ok_or_else(|| {
        BackendError::invalid_item(format!("malformed SET assignment: {}", assignment))
    })?;
    let field = resolve_name(target.trim(), names)?;
    let source = source.trim();

    if source.starts_with(':') {
        return Ok(UpdateAction::Set(field, resolve_value(source, values)?));
    }
    if let Some(caps) = IF_NOT_EXISTS_RE.captures(source) {
        return Ok(UpdateAction::SetIfNotExists {
            target: field,
            source: resolve_name(&caps[1], names)?,
            fallback: resolve_value(&caps[2], values)?,
        });
    }
    if let Some(caps) = ARITHMETIC_RE.captures(source) {
        return Ok(UpdateAction::Arithmetic {
            target: field,
            source: resolve_name(&caps[1], names)?,
            delta: resolve_value(&caps[3], values)?,
            negate: &caps[2] == "-",
        });
    }
    Err(BackendError::unsupported(format!(
        "SET operand not supported by the local store: {}",
        source
    )))
}

/// Split on commas that are not inside parentheses; trims and drops empties.
fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Apply parsed actions to an item.
pub fn apply_update(item: &mut Item, actions: Vec<UpdateAction>) -> Result<()> {
    for action in actions {
        match action {
            UpdateAction::Set(field, value) => {
                item.insert(field, value);
            }
            UpdateAction::SetIfNotExists {
                target,
                source,
                fallback,
            } => {
                let value = item.get(&source).cloned().unwrap_or(fallback);
                item.insert(target, value);
            }
            UpdateAction::Arithmetic {
                target,
                source,
                delta,
                negate,
            } => {
                let current = item.get(&source).cloned().unwrap_or(Value::from(0));
                item.insert(target, add_numbers(&current, &delta, negate)?);
            }
            UpdateAction::Remove(field) => {
                item.shift_remove(&field);
            }
        }
    }
    Ok(())
}

fn add_numbers(current: &Value, delta: &Value, negate: bool) -> Result<Value> {
    match (current.as_i64(), delta.as_i64()) {
        (Some(a), Some(b)) => {
            let result = if negate { a.checked_sub(b) } else { a.checked_add(b) };
            result
                .map(Value::from)
                .ok_or_else(|| BackendError::invalid_item("arithmetic overflows a 64-bit integer"))
        }
        _ => {
            let a = current
                .as_f64()
                .ok_or_else(|| BackendError::invalid_item("arithmetic on a non-number"))?;
            let b = delta
                .as_f64()
                .ok_or_else(|| BackendError::invalid_item("arithmetic on a non-number"))?;
            Ok(Value::from(if negate { a - b } else { a + b }))
        }
    }
}
