//! Command-line filter syntax.
//!
//! `--where` takes `column OP value` with `OP` one of `=`, `!=`, `<`, `<=`,
//! `>`, `>=`, or `~` (LIKE). Values are read as JSON when they parse, and as
//! text otherwise, so `score>=0.5` compares a number and `model=gpt-4` a string.
//! Repeated `--where` terms are ANDed together with an optional `--filter`
//! JSON condition tree.

use thiserror::Error;
use tscribe_query::{Condition, ConditionValue, Operator, ScalarValue};

/// Errors in command-line filter input.
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("invalid --where '{0}': expected COLUMN OP VALUE with OP one of = != < <= > >= ~")]
    InvalidWhere(String),

    #[error("invalid --filter JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

// Two-character operators first so `>=` is not read as `>`.
const OPERATORS: [(&str, Operator); 7] = [
    ("!=", Operator::Ne),
    ("<=", Operator::Le),
    (">=", Operator::Ge),
    ("=", Operator::Eq),
    ("<", Operator::Lt),
    (">", Operator::Gt),
    ("~", Operator::Like),
];

fn parse_value(raw: &str) -> ScalarValue {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) if !value.is_object() && !value.is_array() => ScalarValue::from_json(&value),
        _ => ScalarValue::Text(raw.to_string()),
    }
}

/// Parse one `--where` term.
pub fn parse_where(expr: &str) -> Result<Condition, FilterError> {
    let (pos, symbol, operator) = OPERATORS
        .iter()
        .filter_map(|(symbol, op)| expr.find(symbol).map(|pos| (pos, *symbol, *op)))
        .min_by_key(|(pos, symbol, _)| (*pos, std::cmp::Reverse(symbol.len())))
        .ok_or_else(|| FilterError::InvalidWhere(expr.to_string()))?;

    let column = expr[..pos].trim();
    let raw = expr[pos + symbol.len()..].trim();
    if column.is_empty() || raw.is_empty() {
        return Err(FilterError::InvalidWhere(expr.to_string()));
    }
    let value = if operator == Operator::Like {
        ScalarValue::Text(raw.to_string())
    } else {
        parse_value(raw)
    };
    Ok(Condition::simple(column, operator, ConditionValue::Scalar(value)))
}

/// Combine `--where` terms and an optional JSON tree into one condition.
pub fn build_filter(wheres: &[String], json: Option<&str>) -> Result<Option<Condition>, FilterError> {
    let mut terms = wheres
        .iter()
        .map(|w| parse_where(w))
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(json) = json {
        terms.push(serde_json::from_str(json)?);
    }
    Ok(terms.into_iter().reduce(|acc, term| acc & term))
}
