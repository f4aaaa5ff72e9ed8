//! SELECT assembly from an alias tree.

use super::builder::{SqlBuilder, Statement};
use super::condition::Condition;
use crate::config::DialectContext;
use crate::error::{OrmError, OrmResult};
use crate::plan::{Alias, AliasTree, JoinCondition, marker_names, resolve_markers};
use crate::value::Value;

/// Filters, grouping, ordering and pagination applied to a planned SELECT.
///
/// `group_by` and `order_by` entries are SQL fragments that may use
/// `{alias}`, `{alias.field}` and `{this.field}` markers (`this` is the
/// root alias).
///
/// # Example
/// ```ignore
/// let query = SelectQuery::new()
///     .filter(Condition::eq("lineItems.quantity", 2))
///     .order_by("{this.orderNumber} DESC")
///     .limit(10);
/// let stmt = to_select_statement(&tree, &query, &DialectContext::default())?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    pub wheres: Vec<Condition>,
    pub group_by: Vec<String>,
    pub order_by: Vec<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition; all conditions are combined with AND.
    pub fn filter(mut self, condition: Condition) -> Self {
        self.wheres.push(condition);
        self
    }

    pub fn group_by(mut self, fragment: impl Into<String>) -> Self {
        self.group_by.push(fragment.into());
        self
    }

    pub fn order_by(mut self, fragment: impl Into<String>) -> Self {
        self.order_by.push(fragment.into());
        self
    }

    /// Limit the number of result rows (not root entities).
    pub fn limit(mut self, n: i64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: i64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Page-based pagination. Page numbers start at 1.
    pub fn page(self, page: i64, per_page: i64) -> OrmResult<Self> {
        if page < 1 {
            return Err(OrmError::validation(format!(
                "page must be >= 1, got {page}"
            )));
        }
        Ok(self.limit(per_page).offset((page - 1) * per_page))
    }
}

/// Assemble the SELECT for a planned tree.
pub fn to_select_statement(
    tree: &AliasTree,
    query: &SelectQuery,
    ctx: &DialectContext,
) -> OrmResult<Statement> {
    let mut sql = SqlBuilder::new(ctx.dialect);
    append_select(&mut sql, tree, query, &[])?;
    sql.build()
}

/// Assemble a SELECT whose rows arrive grouped by root identity.
///
/// The root identifying columns are appended to ORDER BY; ordering by any
/// other alias would interleave roots and is rejected, whether it is named
/// through a `{alias.field}` marker or a quoted table alias in raw SQL.
pub fn to_streaming_select_statement(
    tree: &AliasTree,
    query: &SelectQuery,
    ctx: &DialectContext,
) -> OrmResult<Statement> {
    let root = tree.root_alias();
    if root.id_fields.is_empty() {
        return Err(OrmError::mapping(
            tree.root_type(),
            "streaming requires identifying fields on the root",
        ));
    }

    let child_tables: Vec<String> = tree
        .joins()
        .iter()
        .map(|join| join.table.alias.as_str())
        .filter(|name| {
            let owner = tree.alias(name).or_else(|| {
                name.rsplit_once("__")
                    .and_then(|(alias, _)| tree.alias(alias))
            });
            !owner.is_some_and(|alias| on_root_row(tree, alias))
        })
        .map(|name| format!("{}.", ctx.dialect.quote_ident(name)))
        .collect();

    for fragment in &query.order_by {
        for name in marker_names(fragment) {
            let alias = tree.alias(name).or_else(|| {
                name.rsplit_once('.')
                    .and_then(|(alias, _)| tree.alias(alias))
            });
            // `this` and unknown names are left to marker resolution.
            if alias.is_some_and(|alias| !on_root_row(tree, alias)) {
                return Err(OrmError::validation(format!(
                    "streaming ORDER BY may only reference the root alias, found {{{name}}}"
                )));
            }
        }
        if let Some(table) = child_tables.iter().find(|t| fragment.contains(t.as_str())) {
            return Err(OrmError::validation(format!(
                "streaming ORDER BY may only reference the root alias, found {}",
                table.trim_end_matches('.')
            )));
        }
    }

    let id_order: Vec<String> = root
        .id_fields
        .iter()
        .map(|id| format!("{{this.{id}}}"))
        .collect();

    let mut sql = SqlBuilder::new(ctx.dialect);
    append_select(&mut sql, tree, query, &id_order)?;
    sql.build()
}

/// Whether an alias yields at most one value per root row.
fn on_root_row(tree: &AliasTree, alias: &Alias) -> bool {
    let root = tree.root_alias();
    // Embedded values live on the root row.
    tree.base_of(alias).name == root.name || alias.table_alias == root.table_alias
}

fn append_select(
    sql: &mut SqlBuilder,
    tree: &AliasTree,
    query: &SelectQuery,
    extra_order: &[String],
) -> OrmResult<()> {
    sql.push("SELECT ");
    for (i, select) in tree.selects().iter().enumerate() {
        if i > 0 {
            sql.push(", ");
        }
        sql.push_column(&select.column.table_alias, &select.column.column)
            .push(" AS ")
            .push_ident(&select.key);
    }

    let from = tree.from();
    sql.push(" FROM ")
        .push_table(from.schema.as_deref(), &from.table)
        .push(" AS ")
        .push_ident(&from.alias);

    for join in tree.joins() {
        sql.push(" ")
            .push(join.kind.as_sql())
            .push(" ")
            .push_table(join.table.schema.as_deref(), &join.table.table)
            .push(" AS ")
            .push_ident(&join.table.alias)
            .push(" ON ");
        match &join.condition {
            JoinCondition::Equals(pairs) => {
                for (i, (left, right)) in pairs.iter().enumerate() {
                    if i > 0 {
                        sql.push(" AND ");
                    }
                    sql.push_column(&left.table_alias, &left.column)
                        .push(" = ")
                        .push_column(&right.table_alias, &right.column);
                }
            }
            JoinCondition::Custom(fragments) => {
                sql.push_fragments(fragments, &mut std::iter::empty())?;
            }
        }
    }

    let filter = tree.discriminator_filter();
    let predicates = query.wheres.len() + usize::from(filter.is_some());
    if predicates > 0 {
        sql.push(" WHERE ");
        for (i, condition) in query.wheres.iter().enumerate() {
            if i > 0 {
                sql.push(" AND ");
            }
            if predicates > 1 && condition.is_raw() {
                sql.push("(");
                condition.append_to(sql, tree)?;
                sql.push(")");
            } else {
                condition.append_to(sql, tree)?;
            }
        }
        if let Some(filter) = filter {
            if !query.wheres.is_empty() {
                sql.push(" AND ");
            }
            sql.push_column(&filter.column.table_alias, &filter.column.column)
                .push(" IN (")
                .push_bind_list(filter.params())
                .push(")");
        }
    }

    append_fragment_list(sql, tree, " GROUP BY ", query.group_by.iter())?;
    append_fragment_list(
        sql,
        tree,
        " ORDER BY ",
        query.order_by.iter().chain(extra_order),
    )?;

    if let Some(limit) = query.limit {
        sql.push(" LIMIT ").push_bind(limit);
    }
    if let Some(offset) = query.offset {
        sql.push(" OFFSET ").push_bind(offset);
    }
    Ok(())
}

fn append_fragment_list<'q>(
    sql: &mut SqlBuilder,
    tree: &AliasTree,
    keyword: &str,
    items: impl Iterator<Item = &'q String>,
) -> OrmResult<()> {
    for (i, item) in items.enumerate() {
        sql.push(if i == 0 { keyword } else { ", " });
        let fragments = resolve_markers(item, Some(tree.root_alias()), |n| tree.alias(n))?;
        sql.push_fragments(&fragments, &mut std::iter::empty())?;
    }
    Ok(())
}

/// Equality condition on the root's single identifying field.
pub fn build_identity_condition(
    tree: &AliasTree,
    id: impl Into<Value>,
) -> OrmResult<Vec<Condition>> {
    let root = tree.root_alias();
    match root.id_fields.as_slice() {
        [field] => Ok(vec![Condition::eq(format!("this.{field}"), id)]),
        fields => Err(OrmError::mapping(
            tree.root_type(),
            format!(
                "expected exactly one identifying field, found {}",
                fields.len()
            ),
        )),
    }
}

/// Equality conditions on every identifying field of the root, in
/// declaration order.
pub fn build_identity_conditions(tree: &AliasTree, ids: &[Value]) -> OrmResult<Vec<Condition>> {
    let root = tree.root_alias();
    if root.id_fields.is_empty() || root.id_fields.len() != ids.len() {
        return Err(OrmError::mapping(
            tree.root_type(),
            format!(
                "expected {} identifying values, got {}",
                root.id_fields.len(),
                ids.len()
            ),
        ));
    }
    Ok(root
        .id_fields
        .iter()
        .zip(ids)
        .map(|(field, id)| Condition::eq(format!("this.{field}"), id.clone()))
        .collect())
}
