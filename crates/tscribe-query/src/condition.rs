//! Filter condition trees.
//!
//! A [`Condition`] is either a simple `(column, operator, value)` comparison
//! or a compound AND/OR/NOT over other conditions. Trees are built with
//! [`Column`] and combined with `&`, `|` and `!`:
//!
//! ```
//! use tscribe_query::Column;
//!
//! let filter = Column::new("model").eq("gpt-4")
//!     & (Column::new("score").gt(0.5) | !Column::new("success").eq(true));
//! ```
//!
//! Trees serialize to JSON so they can cross a process boundary unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value::ScalarValue;

/// Comparison operator of a simple condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "NOT IN")]
    NotIn,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "NOT LIKE")]
    NotLike,
    #[serde(rename = "ILIKE")]
    ILike,
    #[serde(rename = "NOT ILIKE")]
    NotILike,
    #[serde(rename = "IS NULL")]
    IsNull,
    #[serde(rename = "IS NOT NULL")]
    IsNotNull,
    #[serde(rename = "BETWEEN")]
    Between,
    #[serde(rename = "NOT BETWEEN")]
    NotBetween,
}

impl Operator {
    /// Pattern-match operators compare text and never take a typed cast.
    pub fn is_pattern(self) -> bool {
        matches!(
            self,
            Operator::Like | Operator::NotLike | Operator::ILike | Operator::NotILike
        )
    }

    /// Null checks take no value.
    pub fn is_null_check(self) -> bool {
        matches!(self, Operator::IsNull | Operator::IsNotNull)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::ILike => "ILIKE",
            Operator::NotILike => "NOT ILIKE",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
            Operator::Between => "BETWEEN",
            Operator::NotBetween => "NOT BETWEEN",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical operator of a compound condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    And,
    Or,
    Not,
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOperator::And => write!(f, "AND"),
            LogicalOperator::Or => write!(f, "OR"),
            LogicalOperator::Not => write!(f, "NOT"),
        }
    }
}

/// Right-hand side of a simple condition.
///
/// `IN`/`NOT IN` take a list; `BETWEEN` takes a two-element list; null checks
/// ignore the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    List(Vec<ScalarValue>),
    Scalar(ScalarValue),
}

impl Default for ConditionValue {
    fn default() -> Self {
        ConditionValue::Scalar(ScalarValue::Null)
    }
}

impl ConditionValue {
    /// First non-null value, used to pick a cast for JSON-extracted operands.
    pub fn hint(&self) -> Option<&ScalarValue> {
        match self {
            ConditionValue::Scalar(v) => Some(v).filter(|v| !v.is_null()),
            ConditionValue::List(values) => values.iter().find(|v| !v.is_null()),
        }
    }
}

/// `(column, operator, value)` leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleCondition {
    pub column: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: ConditionValue,
}

/// AND/OR over two conditions, or NOT over one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundCondition {
    pub operator: LogicalOperator,
    pub left: Box<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<Box<Condition>>,
}

/// A filter tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    Compound(CompoundCondition),
    Simple(SimpleCondition),
}

impl Condition {
    pub fn simple(column: impl Into<String>, operator: Operator, value: ConditionValue) -> Self {
        Condition::Simple(SimpleCondition {
            column: column.into(),
            operator,
            value,
        })
    }

    pub fn and(left: Condition, right: Condition) -> Self {
        Condition::Compound(CompoundCondition {
            operator: LogicalOperator::And,
            left: Box::new(left),
            right: Some(Box::new(right)),
        })
    }

    pub fn or(left: Condition, right: Condition) -> Self {
        Condition::Compound(CompoundCondition {
            operator: LogicalOperator::Or,
            left: Box::new(left),
            right: Some(Box::new(right)),
        })
    }

    pub fn negate(inner: Condition) -> Self {
        Condition::Compound(CompoundCondition {
            operator: LogicalOperator::Not,
            left: Box::new(inner),
            right: None,
        })
    }

    /// AND together every condition; `None` for an empty input.
    pub fn all(conditions: impl IntoIterator<Item = Condition>) -> Option<Condition> {
        conditions.into_iter().reduce(Condition::and)
    }

    /// OR together every condition; `None` for an empty input.
    pub fn any(conditions: impl IntoIterator<Item = Condition>) -> Option<Condition> {
        conditions.into_iter().reduce(Condition::or)
    }

    /// A predicate that matches nothing, expressed as `column IN ()`.
    pub fn never(column: impl Into<String>) -> Self {
        Condition::simple(column, Operator::In, ConditionValue::List(Vec::new()))
    }
}

impl std::ops::BitAnd for Condition {
    type Output = Condition;

    fn bitand(self, rhs: Condition) -> Condition {
        Condition::and(self, rhs)
    }
}

impl std::ops::BitOr for Condition {
    type Output = Condition;

    fn bitor(self, rhs: Condition) -> Condition {
        Condition::or(self, rhs)
    }
}

impl std::ops::Not for Condition {
    type Output = Condition;

    fn not(self) -> Condition {
        Condition::negate(self)
    }
}

/// Builder for simple conditions on one column (or column path).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column(String);

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Column(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    fn scalar(&self, operator: Operator, value: impl Into<ScalarValue>) -> Condition {
        Condition::simple(self.0.clone(), operator, ConditionValue::Scalar(value.into()))
    }

    fn list<V: Into<ScalarValue>>(
        &self,
        operator: Operator,
        values: impl IntoIterator<Item = V>,
    ) -> Condition {
        Condition::simple(
            self.0.clone(),
            operator,
            ConditionValue::List(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn eq(&self, value: impl Into<ScalarValue>) -> Condition {
        self.scalar(Operator::Eq, value)
    }

    pub fn ne(&self, value: impl Into<ScalarValue>) -> Condition {
        self.scalar(Operator::Ne, value)
    }

    pub fn lt(&self, value: impl Into<ScalarValue>) -> Condition {
        self.scalar(Operator::Lt, value)
    }

    pub fn le(&self, value: impl Into<ScalarValue>) -> Condition {
        self.scalar(Operator::Le, value)
    }

    pub fn gt(&self, value: impl Into<ScalarValue>) -> Condition {
        self.scalar(Operator::Gt, value)
    }

    pub fn ge(&self, value: impl Into<ScalarValue>) -> Condition {
        self.scalar(Operator::Ge, value)
    }

    pub fn is_in<V: Into<ScalarValue>>(&self, values: impl IntoIterator<Item = V>) -> Condition {
        self.list(Operator::In, values)
    }

    pub fn not_in<V: Into<ScalarValue>>(&self, values: impl IntoIterator<Item = V>) -> Condition {
        self.list(Operator::NotIn, values)
    }

    pub fn like(&self, pattern: impl Into<String>) -> Condition {
        self.scalar(Operator::Like, pattern.into())
    }

    pub fn not_like(&self, pattern: impl Into<String>) -> Condition {
        self.scalar(Operator::NotLike, pattern.into())
    }

    pub fn ilike(&self, pattern: impl Into<String>) -> Condition {
        self.scalar(Operator::ILike, pattern.into())
    }

    pub fn not_ilike(&self, pattern: impl Into<String>) -> Condition {
        self.scalar(Operator::NotILike, pattern.into())
    }

    pub fn is_null(&self) -> Condition {
        self.scalar(Operator::IsNull, ScalarValue::Null)
    }

    pub fn is_not_null(&self) -> Condition {
        self.scalar(Operator::IsNotNull, ScalarValue::Null)
    }

    pub fn between(&self, low: impl Into<ScalarValue>, high: impl Into<ScalarValue>) -> Condition {
        self.list(Operator::Between, [low.into(), high.into()])
    }

    pub fn not_between(
        &self,
        low: impl Into<ScalarValue>,
        high: impl Into<ScalarValue>,
    ) -> Condition {
        self.list(Operator::NotBetween, [low.into(), high.into()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operator_composition() {
        let c = Column::new("a").eq(1) & !Column::new("b").is_null();
        match c {
            Condition::Compound(CompoundCondition {
                operator: LogicalOperator::And,
                right: Some(right),
                ..
            }) => match *right {
                Condition::Compound(CompoundCondition {
                    operator: LogicalOperator::Not,
                    right: None,
                    ..
                }) => {}
                other => panic!("unexpected right side {other:?}"),
            },
            other => panic!("unexpected tree {other:?}"),
        }
    }

    #[test]
    fn test_json_shape() {
        let c = Column::new("model").is_in(["a", "b"]) | Column::new("score").ge(0.5);
        let value = serde_json::to_value(&c).unwrap();
        assert_eq!(
            value,
            json!({
                "operator": "OR",
                "left": {"column": "model", "operator": "IN", "value": ["a", "b"]},
                "right": {"column": "score", "operator": ">=", "value": 0.5}
            })
        );
        let back: Condition = serde_json::from_value(value).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_null_check_deserializes_without_value() {
        let c: Condition =
            serde_json::from_value(json!({"column": "error", "operator": "IS NULL"})).unwrap();
        assert_eq!(c, Column::new("error").is_null());
    }

    #[test]
    fn test_hint_skips_nulls() {
        let value = ConditionValue::List(vec![ScalarValue::Null, ScalarValue::Int(3)]);
        assert_eq!(value.hint(), Some(&ScalarValue::Int(3)));
        assert_eq!(ConditionValue::default().hint(), None);
    }

    #[test]
    fn test_all_and_any() {
        assert!(Condition::all(Vec::new()).is_none());
        let single = Condition::all([Column::new("a").eq(1)]).unwrap();
        assert_eq!(single, Column::new("a").eq(1));
        assert!(Condition::any([Column::new("a").eq(1), Column::new("a").eq(2)]).is_some());
    }
}
