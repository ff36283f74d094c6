//! Condition → parameterized SQL.

use std::collections::HashSet;

use crate::condition::{CompoundCondition, Condition, ConditionValue, LogicalOperator, Operator, SimpleCondition};
use crate::dialect::Dialect;
use crate::error::{QueryError, Result};
use crate::path::parse_column_path;
use crate::value::ScalarValue;

/// SQL text plus its parameters in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    pub sql: String,
    pub params: Vec<ScalarValue>,
}

impl CompiledFilter {
    /// `WHERE <sql>`, or an empty string when there is nothing to filter.
    pub fn where_clause(&self) -> String {
        if self.sql.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.sql)
        }
    }
}

/// Column names present in the queried table, matched ignoring ASCII case.
///
/// A filter compiled against a known set reads any column outside it as
/// `NULL`. Without this, SQLite would resolve an unknown double-quoted name
/// as a string literal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownColumns(HashSet<String>);

impl KnownColumns {
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(&name.to_ascii_lowercase())
    }
}

impl<S: AsRef<str>> FromIterator<S> for KnownColumns {
    fn from_iter<I: IntoIterator<Item = S>>(names: I) -> Self {
        KnownColumns(
            names
                .into_iter()
                .map(|name| name.as_ref().to_ascii_lowercase())
                .collect(),
        )
    }
}

/// Compile a condition tree for `dialect`, numbering placeholders from 1.
pub fn compile(condition: &Condition, dialect: Dialect) -> Result<CompiledFilter> {
    compile_scoped(condition, dialect, 0, None)
}

/// Compile against the columns of a concrete table; see [`KnownColumns`].
pub fn compile_for(condition: &Condition, dialect: Dialect, known: &KnownColumns) -> Result<CompiledFilter> {
    compile_scoped(condition, dialect, 0, Some(known))
}

/// Compile with `offset` parameters already bound ahead of this condition.
///
/// Only numbered placeholders depend on the offset; a right subtree starts
/// after every parameter its left sibling consumed.
pub fn compile_at(condition: &Condition, dialect: Dialect, offset: usize) -> Result<CompiledFilter> {
    compile_scoped(condition, dialect, offset, None)
}

fn compile_scoped(
    condition: &Condition,
    dialect: Dialect,
    offset: usize,
    known: Option<&KnownColumns>,
) -> Result<CompiledFilter> {
    match condition {
        Condition::Simple(simple) => compile_simple(simple, dialect, offset, known),
        Condition::Compound(compound) => compile_compound(compound, dialect, offset, known),
    }
}

fn compile_compound(
    compound: &CompoundCondition,
    dialect: Dialect,
    offset: usize,
    known: Option<&KnownColumns>,
) -> Result<CompiledFilter> {
    let left = compile_scoped(&compound.left, dialect, offset, known)?;
    match compound.operator {
        LogicalOperator::Not => Ok(CompiledFilter {
            sql: format!("NOT ({})", left.sql),
            params: left.params,
        }),
        LogicalOperator::And | LogicalOperator::Or => {
            let right = compound
                .right
                .as_deref()
                .ok_or_else(|| QueryError::MissingOperand {
                    operator: compound.operator.to_string(),
                })?;
            let right = compile_scoped(right, dialect, offset + left.params.len(), known)?;
            let mut params = left.params;
            params.extend(right.params);
            Ok(CompiledFilter {
                sql: format!("({} {} {})", left.sql, compound.operator, right.sql),
                params,
            })
        }
    }
}

struct Binder {
    dialect: Dialect,
    offset: usize,
    params: Vec<ScalarValue>,
}

impl Binder {
    fn bind(&mut self, value: ScalarValue) -> String {
        self.params.push(value);
        self.dialect.placeholder(self.offset + self.params.len())
    }

    fn finish(self, sql: String) -> CompiledFilter {
        CompiledFilter {
            sql,
            params: self.params,
        }
    }
}

fn invalid(operator: Operator, reason: &str) -> QueryError {
    QueryError::InvalidValue {
        operator: operator.to_string(),
        reason: reason.to_string(),
    }
}

fn scalar_of(simple: &SimpleCondition) -> Result<&ScalarValue> {
    match &simple.value {
        ConditionValue::Scalar(value) => Ok(value),
        ConditionValue::List(_) => Err(invalid(simple.operator, "takes a single value, not a list")),
    }
}

fn non_null_scalar(simple: &SimpleCondition) -> Result<ScalarValue> {
    let value = scalar_of(simple)?;
    if value.is_null() {
        return Err(invalid(simple.operator, "requires a non-null value"));
    }
    Ok(value.clone())
}

fn compile_simple(
    simple: &SimpleCondition,
    dialect: Dialect,
    offset: usize,
    known: Option<&KnownColumns>,
) -> Result<CompiledFilter> {
    let op = simple.operator;
    let path = parse_column_path(&simple.column)?;
    let cast = if op.is_pattern() || op.is_null_check() {
        None
    } else {
        simple.value.hint().and_then(ScalarValue::cast_hint)
    };
    let expr = match known {
        Some(known) if !known.contains(&path.base) => "NULL".to_string(),
        _ => dialect.column_expr(&path, cast, op.is_pattern()),
    };
    let mut binder = Binder {
        dialect,
        offset,
        params: Vec::new(),
    };

    let sql = match op {
        Operator::IsNull => format!("{expr} IS NULL"),
        Operator::IsNotNull => format!("{expr} IS NOT NULL"),
        Operator::Eq | Operator::Ne => {
            let value = scalar_of(simple)?;
            match (op, value.is_null()) {
                (Operator::Eq, true) => format!("{expr} IS NULL"),
                (_, true) => format!("{expr} IS NOT NULL"),
                (Operator::Eq, false) => format!("{expr} = {}", binder.bind(value.clone())),
                (_, false) => format!("{expr} <> {}", binder.bind(value.clone())),
            }
        }
        Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge => {
            let value = non_null_scalar(simple)?;
            format!("{expr} {} {}", op.as_str(), binder.bind(value))
        }
        Operator::Like | Operator::NotLike => {
            let value = non_null_scalar(simple)?;
            let not = if op == Operator::NotLike { "NOT " } else { "" };
            format!("{expr} {not}LIKE {}", binder.bind(value))
        }
        Operator::ILike | Operator::NotILike => {
            let value = non_null_scalar(simple)?;
            let placeholder = binder.bind(value);
            dialect.ilike(&expr, &placeholder, op == Operator::NotILike)
        }
        Operator::In | Operator::NotIn => {
            let values: Vec<ScalarValue> = match &simple.value {
                ConditionValue::List(values) => values.clone(),
                ConditionValue::Scalar(value) => vec![value.clone()],
            };
            membership(&mut binder, &expr, op == Operator::NotIn, values)
        }
        Operator::Between | Operator::NotBetween => {
            let (low, high) = match &simple.value {
                ConditionValue::List(values) if values.len() == 2 => {
                    (values[0].clone(), values[1].clone())
                }
                _ => return Err(invalid(op, "requires exactly two bounds")),
            };
            if low.is_null() || high.is_null() {
                return Err(invalid(op, "bounds must be non-null"));
            }
            let not = if op == Operator::NotBetween { "NOT " } else { "" };
            let low = binder.bind(low);
            let high = binder.bind(high);
            format!("{expr} {not}BETWEEN {low} AND {high}")
        }
    };

    Ok(binder.finish(sql))
}

/// `IN` / `NOT IN` with three-valued handling of nulls in the list.
///
/// `x IN (1, NULL)` becomes `(x IN (1) OR x IS NULL)` and
/// `x NOT IN (1, NULL)` becomes `(x NOT IN (1) AND x IS NOT NULL)`.
fn membership(binder: &mut Binder, expr: &str, negated: bool, values: Vec<ScalarValue>) -> String {
    let has_null = values.iter().any(ScalarValue::is_null);
    let non_null: Vec<ScalarValue> = values.into_iter().filter(|v| !v.is_null()).collect();

    if non_null.is_empty() {
        return match (negated, has_null) {
            (false, false) => binder.dialect.false_predicate().to_string(),
            (true, false) => binder.dialect.true_predicate().to_string(),
            (false, true) => format!("{expr} IS NULL"),
            (true, true) => format!("{expr} IS NOT NULL"),
        };
    }

    let placeholders: Vec<String> = non_null.into_iter().map(|v| binder.bind(v)).collect();
    let list = placeholders.join(", ");
    match (negated, has_null) {
        (false, false) => format!("{expr} IN ({list})"),
        (true, false) => format!("{expr} NOT IN ({list})"),
        (false, true) => format!("({expr} IN ({list}) OR {expr} IS NULL)"),
        (true, true) => format!("({expr} NOT IN ({list}) AND {expr} IS NOT NULL)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Column;

    fn sql(condition: &Condition, dialect: Dialect) -> (String, Vec<ScalarValue>) {
        let compiled = compile(condition, dialect).unwrap();
        (compiled.sql, compiled.params)
    }

    #[test]
    fn test_simple_equality() {
        let (text, params) = sql(&Column::new("model").eq("gpt-4"), Dialect::Sqlite);
        assert_eq!(text, "\"model\" = ?");
        assert_eq!(params, vec![ScalarValue::Text("gpt-4".to_string())]);
    }

    #[test]
    fn test_eq_null_becomes_is_null() {
        let (text, params) = sql(&Column::new("error").eq(ScalarValue::Null), Dialect::DuckDb);
        assert_eq!(text, "\"error\" IS NULL");
        assert!(params.is_empty());
        let (text, _) = sql(&Column::new("error").ne(ScalarValue::Null), Dialect::DuckDb);
        assert_eq!(text, "\"error\" IS NOT NULL");
    }

    #[test]
    fn test_postgres_numbering_continues_into_right_subtree() {
        let condition = (Column::new("a").is_in([1, 2]) & Column::new("b").between(3, 4))
            | Column::new("c").eq("x");
        let (text, params) = sql(&condition, Dialect::Postgres);
        assert_eq!(
            text,
            "((\"a\" IN ($1, $2) AND \"b\" BETWEEN $3 AND $4) OR \"c\" = $5)"
        );
        assert_eq!(params.len(), 5);
        assert_eq!(params[4], ScalarValue::Text("x".to_string()));
    }

    #[test]
    fn test_positional_dialects_repeat_marker() {
        let condition = Column::new("a").eq(1) & Column::new("b").eq(2);
        let (text, _) = sql(&condition, Dialect::DuckDb);
        assert_eq!(text, "(\"a\" = ? AND \"b\" = ?)");
    }

    #[test]
    fn test_unknown_column_reads_as_null() {
        let known: KnownColumns = ["transcript_id", "Model", "metadata"].into_iter().collect();
        let condition = Column::new("model").eq("x")
            & Column::new("task").eq("task")
            & Column::new("metadata.task").is_null();
        let compiled = compile_for(&condition, Dialect::Sqlite, &known).unwrap();
        assert_eq!(
            compiled.sql,
            "((\"model\" = ? AND NULL = ?) AND json_extract(\"metadata\", '$.task') IS NULL)"
        );
        assert_eq!(compiled.params.len(), 2);
    }

    #[test]
    fn test_not_wraps() {
        let (text, _) = sql(&!Column::new("success").eq(true), Dialect::Sqlite);
        assert_eq!(text, "NOT (\"success\" = ?)");
    }

    #[test]
    fn test_in_with_null_splits() {
        let values = [ScalarValue::Int(1), ScalarValue::Null];
        let (text, params) = sql(&Column::new("x").is_in(values.clone()), Dialect::Sqlite);
        assert_eq!(text, "(\"x\" IN (?) OR \"x\" IS NULL)");
        assert_eq!(params, vec![ScalarValue::Int(1)]);

        let (text, _) = sql(&Column::new("x").not_in(values), Dialect::Postgres);
        assert_eq!(text, "(\"x\" NOT IN ($1) AND \"x\" IS NOT NULL)");
    }

    #[test]
    fn test_empty_in_lists_are_well_formed() {
        let empty: Vec<ScalarValue> = Vec::new();
        let (text, params) = sql(&Column::new("x").is_in(empty.clone()), Dialect::Sqlite);
        assert_eq!(text, "1 = 0");
        assert!(params.is_empty());
        let (text, _) = sql(&Column::new("x").not_in(empty), Dialect::Sqlite);
        assert_eq!(text, "1 = 1");
        let (text, _) = sql(&Column::new("x").is_in([ScalarValue::Null]), Dialect::Sqlite);
        assert_eq!(text, "\"x\" IS NULL");
    }

    #[test]
    fn test_nested_path_cast_from_hint() {
        let condition = Column::new("metadata.config.temperature").gt(0.5);
        assert_eq!(
            sql(&condition, Dialect::DuckDb).0,
            "CAST(json_extract_string(\"metadata\", '$.config.temperature') AS DOUBLE) > ?"
        );
        assert_eq!(
            sql(&condition, Dialect::Postgres).0,
            "(\"metadata\"->'config'->>'temperature')::double precision > $1"
        );
        assert_eq!(
            sql(&condition, Dialect::Sqlite).0,
            "json_extract(\"metadata\", '$.config.temperature') > ?"
        );
    }

    #[test]
    fn test_pattern_ops_skip_casts() {
        let condition = Column::new("metadata.name").ilike("%bot%");
        assert_eq!(
            sql(&condition, Dialect::DuckDb).0,
            "CAST(json_extract_string(\"metadata\", '$.name') AS VARCHAR) ILIKE ?"
        );
        assert_eq!(
            sql(&condition, Dialect::Sqlite).0,
            "LOWER(json_extract(\"metadata\", '$.name')) LIKE LOWER(?)"
        );
        assert_eq!(
            sql(&Column::new("model").not_ilike("a%"), Dialect::Postgres).0,
            "\"model\" NOT ILIKE $1"
        );
    }

    #[test]
    fn test_null_checks_on_paths_take_no_cast() {
        let condition = Column::new("metadata.n").is_not_null();
        assert_eq!(
            sql(&condition, Dialect::Postgres).0,
            "\"metadata\"->>'n' IS NOT NULL"
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(compile(&Column::new("x").gt(ScalarValue::Null), Dialect::Sqlite).is_err());
        assert!(compile(&Column::new("x").between(1, ScalarValue::Null), Dialect::Sqlite).is_err());
        let bad = Condition::simple(
            "x",
            Operator::Between,
            ConditionValue::List(vec![ScalarValue::Int(1)]),
        );
        assert!(compile(&bad, Dialect::Sqlite).is_err());
        let bad = Condition::Compound(CompoundCondition {
            operator: LogicalOperator::And,
            left: Box::new(Column::new("x").eq(1)),
            right: None,
        });
        assert!(matches!(
            compile(&bad, Dialect::Sqlite),
            Err(QueryError::MissingOperand { .. })
        ));
    }

    #[test]
    fn test_offset_shifts_numbering() {
        let compiled = compile_at(&Column::new("a").eq(1), Dialect::Postgres, 3).unwrap();
        assert_eq!(compiled.sql, "\"a\" = $4");
    }
}
