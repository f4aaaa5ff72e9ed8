//! Query conditions over planned aliases.
//!
//! Conditions name their column as `"alias.field"` (or a bare `"field"` of the
//! root alias); the reference is resolved against the [`AliasTree`] when the
//! statement is assembled, so the same condition works for any plan that has
//! the alias.

use super::builder::SqlBuilder;
use crate::config::Dialect;
use crate::error::{OrmError, OrmResult};
use crate::plan::{AliasTree, ColumnRef, Fragment, resolve_markers, resolve_reference};
use crate::value::Value;

/// Query operator for building conditions.
///
/// # Example
/// ```ignore
/// use relmap::Op;
///
/// Op::eq("value");
/// Op::gt(100);
/// Op::ilike("%pattern%");
/// Op::<i32>::is_null();
/// Op::in_list(vec![1, 2, 3]);
/// Op::between(10, 20);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Op<T> {
    /// Equal: column = value
    Eq(T),
    /// Not equal: column != value
    Ne(T),
    /// Greater than: column > value
    Gt(T),
    /// Greater than or equal: column >= value
    Gte(T),
    /// Less than: column < value
    Lt(T),
    /// Less than or equal: column <= value
    Lte(T),
    /// LIKE pattern match
    Like(T),
    /// Case-insensitive LIKE
    Ilike(T),
    /// NOT LIKE pattern match
    NotLike(T),
    /// Case-insensitive NOT LIKE
    NotIlike(T),
    /// IS NULL
    IsNull,
    /// IS NOT NULL
    IsNotNull,
    /// IN (list)
    In(Vec<T>),
    /// NOT IN (list)
    NotIn(Vec<T>),
    /// BETWEEN a AND b
    Between(T, T),
    /// NOT BETWEEN a AND b
    NotBetween(T, T),
}

impl<T> Op<T> {
    pub fn eq(val: T) -> Self {
        Op::Eq(val)
    }

    pub fn ne(val: T) -> Self {
        Op::Ne(val)
    }

    pub fn gt(val: T) -> Self {
        Op::Gt(val)
    }

    pub fn gte(val: T) -> Self {
        Op::Gte(val)
    }

    pub fn lt(val: T) -> Self {
        Op::Lt(val)
    }

    pub fn lte(val: T) -> Self {
        Op::Lte(val)
    }

    pub fn like(val: T) -> Self {
        Op::Like(val)
    }

    pub fn ilike(val: T) -> Self {
        Op::Ilike(val)
    }

    pub fn not_like(val: T) -> Self {
        Op::NotLike(val)
    }

    pub fn not_ilike(val: T) -> Self {
        Op::NotIlike(val)
    }

    pub fn is_null() -> Self {
        Op::IsNull
    }

    pub fn is_not_null() -> Self {
        Op::IsNotNull
    }

    pub fn in_list(vals: Vec<T>) -> Self {
        Op::In(vals)
    }

    pub fn not_in(vals: Vec<T>) -> Self {
        Op::NotIn(vals)
    }

    pub fn between(from: T, to: T) -> Self {
        Op::Between(from, to)
    }

    pub fn not_between(from: T, to: T) -> Self {
        Op::NotBetween(from, to)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ConditionValue {
    Single(Value),
    Pair(Value, Value),
    List(Vec<Value>),
    None,
}

#[derive(Debug, Clone, PartialEq)]
enum ConditionInner {
    /// Raw SQL with `{alias.field}` markers and `?` placeholders.
    Raw { template: String, params: Vec<Value> },
    Expr {
        target: String,
        operator: &'static str,
        value: ConditionValue,
    },
    Group {
        joiner: &'static str,
        items: Vec<Condition>,
    },
    Not(Box<Condition>),
}

/// A WHERE clause primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition(ConditionInner);

impl Condition {
    /// Create a structured condition on `"alias.field"`.
    pub fn new<T: Into<Value>>(target: impl Into<String>, op: Op<T>) -> Self {
        let single = |v: T| ConditionValue::Single(v.into());
        let pair = |a: T, b: T| ConditionValue::Pair(a.into(), b.into());
        let list = |vs: Vec<T>| ConditionValue::List(vs.into_iter().map(Into::into).collect());

        let (operator, value) = match op {
            Op::Eq(v) => ("=", single(v)),
            Op::Ne(v) => ("!=", single(v)),
            Op::Gt(v) => (">", single(v)),
            Op::Gte(v) => (">=", single(v)),
            Op::Lt(v) => ("<", single(v)),
            Op::Lte(v) => ("<=", single(v)),
            Op::Like(v) => ("LIKE", single(v)),
            Op::Ilike(v) => ("ILIKE", single(v)),
            Op::NotLike(v) => ("NOT LIKE", single(v)),
            Op::NotIlike(v) => ("NOT ILIKE", single(v)),
            Op::IsNull => ("IS NULL", ConditionValue::None),
            Op::IsNotNull => ("IS NOT NULL", ConditionValue::None),
            Op::In(vs) => ("IN", list(vs)),
            Op::NotIn(vs) => ("NOT IN", list(vs)),
            Op::Between(a, b) => ("BETWEEN", pair(a, b)),
            Op::NotBetween(a, b) => ("NOT BETWEEN", pair(a, b)),
        };

        Condition(ConditionInner::Expr {
            target: target.into(),
            operator,
            value,
        })
    }

    /// Raw SQL condition. Markers are resolved, but the text is otherwise
    /// trusted.
    pub fn raw(template: impl Into<String>) -> Self {
        Self::raw_with(template, Vec::new())
    }

    /// Raw SQL condition with one parameter per `?`.
    pub fn raw_with(template: impl Into<String>, params: Vec<Value>) -> Self {
        Condition(ConditionInner::Raw {
            template: template.into(),
            params,
        })
    }

    /// All conditions hold. An empty list is always true.
    pub fn and(items: Vec<Condition>) -> Self {
        Condition(ConditionInner::Group {
            joiner: " AND ",
            items,
        })
    }

    /// Any condition holds. An empty list is always false.
    pub fn or(items: Vec<Condition>) -> Self {
        Condition(ConditionInner::Group {
            joiner: " OR ",
            items,
        })
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(condition: Condition) -> Self {
        Condition(ConditionInner::Not(Box::new(condition)))
    }

    // ==================== Convenience constructors ====================

    pub fn eq(target: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(target, Op::Eq(value.into()))
    }

    pub fn ne(target: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(target, Op::Ne(value.into()))
    }

    pub fn gt(target: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(target, Op::Gt(value.into()))
    }

    pub fn gte(target: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(target, Op::Gte(value.into()))
    }

    pub fn lt(target: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(target, Op::Lt(value.into()))
    }

    pub fn lte(target: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(target, Op::Lte(value.into()))
    }

    pub fn like(target: impl Into<String>, pattern: impl Into<Value>) -> Self {
        Self::new(target, Op::Like(pattern.into()))
    }

    pub fn ilike(target: impl Into<String>, pattern: impl Into<Value>) -> Self {
        Self::new(target, Op::Ilike(pattern.into()))
    }

    pub fn is_null(target: impl Into<String>) -> Self {
        Self::new(target, Op::<Value>::IsNull)
    }

    pub fn is_not_null(target: impl Into<String>) -> Self {
        Self::new(target, Op::<Value>::IsNotNull)
    }

    pub fn in_list<T: Into<Value>>(target: impl Into<String>, values: Vec<T>) -> Self {
        Self::new(target, Op::In(values))
    }

    pub fn not_in<T: Into<Value>>(target: impl Into<String>, values: Vec<T>) -> Self {
        Self::new(target, Op::NotIn(values))
    }

    pub fn between(
        target: impl Into<String>,
        from: impl Into<Value>,
        to: impl Into<Value>,
    ) -> Self {
        Self::new(target, Op::Between(from.into(), to.into()))
    }

    pub(crate) fn is_raw(&self) -> bool {
        matches!(self.0, ConditionInner::Raw { .. })
    }

    /// Append this condition, resolving alias references against `tree`.
    pub fn append_to(&self, sql: &mut SqlBuilder, tree: &AliasTree) -> OrmResult<()> {
        match &self.0 {
            ConditionInner::Raw { template, params } => {
                let fragments = resolve_markers(template, Some(tree.root_alias()), |n| tree.alias(n))?;
                let mut params = params.iter().cloned();
                sql.push_fragments(&fragments, &mut params)?;
                if params.next().is_some() {
                    return Err(OrmError::validation(
                        "raw condition has more parameters than `?` placeholders",
                    ));
                }
            }
            ConditionInner::Expr {
                target,
                operator,
                value,
            } => {
                let column = resolve_target(tree, target)?;
                append_expr(sql, &column, operator, value);
            }
            ConditionInner::Group { joiner, items } => {
                if items.is_empty() {
                    sql.push(if *joiner == " AND " { "1=1" } else { "1=0" });
                    return Ok(());
                }
                sql.push("(");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        sql.push(joiner);
                    }
                    item.append_to(sql, tree)?;
                }
                sql.push(")");
            }
            ConditionInner::Not(inner) => {
                sql.push("NOT (");
                inner.append_to(sql, tree)?;
                sql.push(")");
            }
        }
        Ok(())
    }
}

fn append_expr(sql: &mut SqlBuilder, column: &ColumnRef, operator: &str, value: &ConditionValue) {
    // MySQL has no ILIKE.
    let case_fold = sql.dialect() == Dialect::MySql && operator.ends_with("ILIKE");
    let operator = match (case_fold, operator) {
        (true, "ILIKE") => "LIKE",
        (true, _) => "NOT LIKE",
        (false, op) => op,
    };

    match value {
        ConditionValue::List(vals) if vals.is_empty() => {
            sql.push(if operator == "IN" { "1=0" } else { "1=1" });
        }
        ConditionValue::Single(v) => {
            if case_fold {
                sql.push("LOWER(")
                    .push_column(&column.table_alias, &column.column)
                    .push(") ")
                    .push(operator)
                    .push(" LOWER(")
                    .push_bind(v.clone())
                    .push(")");
            } else {
                sql.push_column(&column.table_alias, &column.column)
                    .push(" ")
                    .push(operator)
                    .push(" ")
                    .push_bind(v.clone());
            }
        }
        ConditionValue::Pair(a, b) => {
            sql.push_column(&column.table_alias, &column.column)
                .push(" ")
                .push(operator)
                .push(" ")
                .push_bind(a.clone())
                .push(" AND ")
                .push_bind(b.clone());
        }
        ConditionValue::List(vals) => {
            sql.push_column(&column.table_alias, &column.column)
                .push(" ")
                .push(operator)
                .push(" (")
                .push_bind_list(vals.iter().cloned())
                .push(")");
        }
        ConditionValue::None => {
            sql.push_column(&column.table_alias, &column.column)
                .push(" ")
                .push(operator);
        }
    }
}

/// Resolve `"alias.field"` (or a root `"field"`) to its column.
pub(crate) fn resolve_target(tree: &AliasTree, target: &str) -> OrmResult<ColumnRef> {
    let name = if target.contains('.') {
        target.to_string()
    } else {
        format!("this.{target}")
    };
    match resolve_reference(&name, Some(tree.root_alias()), &|n: &str| tree.alias(n))? {
        Fragment::Column(column) => Ok(column),
        _ => Err(OrmError::validation(format!(
            "'{target}' names an alias, not a field"
        ))),
    }
}
