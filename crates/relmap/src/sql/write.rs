//! INSERT / UPDATE / DELETE / upsert statements for one entity.
//!
//! An entity of a joined hierarchy is written one statement per table, root
//! table first (last for deletes). Sub tables repeat the identifying columns.
//! Only the entity's own row is written: single references contribute their
//! foreign key, embedded values their prefixed columns, and collections are
//! left alone.

use super::builder::{SqlBuilder, Statement};
use crate::config::{Dialect, DialectContext};
use crate::entity::{Entity, FieldValue};
use crate::error::{OrmError, OrmResult};
use crate::mapping::{TableMapping, all_fields, type_chain};
use crate::meta::{FieldKind, FieldModel, TypeSource};
use crate::value::Value;

#[derive(Debug, Clone)]
struct ColumnValue {
    column: String,
    value: Value,
    id: bool,
}

/// The columns of one table row, ids first.
#[derive(Debug)]
struct TableRow<'m> {
    mapping: &'m TableMapping,
    columns: Vec<ColumnValue>,
}

impl TableRow<'_> {
    fn ids(&self) -> impl Iterator<Item = &ColumnValue> {
        self.columns.iter().filter(|c| c.id)
    }

    fn data(&self) -> impl Iterator<Item = &ColumnValue> {
        self.columns.iter().filter(|c| !c.id)
    }

    fn require_ids(&self, type_name: &str) -> OrmResult<()> {
        if self.ids().next().is_none() {
            return Err(OrmError::mapping(
                type_name,
                format!("table '{}' has no identifying columns", self.mapping.table),
            ));
        }
        if let Some(missing) = self.ids().find(|c| c.value.is_null()) {
            return Err(OrmError::validation(format!(
                "identifying column '{}' of {type_name} is not set",
                missing.column
            )));
        }
        Ok(())
    }
}

/// INSERT statements, root table first.
///
/// On Postgres the root table statement returns the identifying columns. Sub
/// table statements need the ids to be set on the entity already; use
/// `Session::insert` to have generated ids carried over.
pub fn insert_statements<S: TypeSource + ?Sized>(
    source: &S,
    entity: &Entity,
    ctx: &DialectContext,
) -> OrmResult<Vec<Statement>> {
    let mappings = source.table_mappings(entity.type_name())?;
    (0..mappings.len())
        .map(|idx| insert_table_statement(source, entity, &mappings, idx, ctx))
        .collect()
}

/// INSERT for one table of the entity's hierarchy.
pub(crate) fn insert_table_statement<S: TypeSource + ?Sized>(
    source: &S,
    entity: &Entity,
    mappings: &[TableMapping],
    idx: usize,
    ctx: &DialectContext,
) -> OrmResult<Statement> {
    let row = table_row(source, entity, mappings, idx)?;
    if idx > 0 {
        row.require_ids(entity.type_name())?;
    }

    // Unset generated ids are left to the database.
    let columns: Vec<&ColumnValue> = row
        .columns
        .iter()
        .filter(|c| !(c.id && c.value.is_null()))
        .collect();

    let mut sql = SqlBuilder::new(ctx.dialect);
    append_insert_head(&mut sql, &row, &columns);

    let id_columns: Vec<&str> = row.mapping.id_fields().map(|f| f.column_name()).collect();
    if idx == 0 && ctx.dialect.supports_returning() && !id_columns.is_empty() {
        sql.push(" RETURNING ");
        for (i, column) in id_columns.iter().enumerate() {
            if i > 0 {
                sql.push(", ");
            }
            sql.push_ident(column);
        }
    }
    sql.build()
}

/// UPDATE statements keyed by the identifying columns, root table first.
///
/// Tables with nothing but identifying columns are skipped.
pub fn update_statements<S: TypeSource + ?Sized>(
    source: &S,
    entity: &Entity,
    ctx: &DialectContext,
) -> OrmResult<Vec<Statement>> {
    let mappings = source.table_mappings(entity.type_name())?;
    let mut statements = Vec::with_capacity(mappings.len());

    for idx in 0..mappings.len() {
        let row = table_row(source, entity, &mappings, idx)?;
        row.require_ids(entity.type_name())?;
        if row.data().next().is_none() {
            continue;
        }

        let mut sql = SqlBuilder::new(ctx.dialect);
        sql.push("UPDATE ")
            .push_table(row.mapping.schema.as_deref(), &row.mapping.table)
            .push(" SET ");
        for (i, c) in row.data().enumerate() {
            if i > 0 {
                sql.push(", ");
            }
            sql.push_ident(&c.column).push(" = ").push_bind(c.value.clone());
        }
        append_id_where(&mut sql, &row);
        statements.push(sql.build()?);
    }
    Ok(statements)
}

/// DELETE statements keyed by the identifying columns, sub tables first.
pub fn delete_statements<S: TypeSource + ?Sized>(
    source: &S,
    entity: &Entity,
    ctx: &DialectContext,
) -> OrmResult<Vec<Statement>> {
    let mappings = source.table_mappings(entity.type_name())?;
    let mut statements = Vec::with_capacity(mappings.len());

    for idx in (0..mappings.len()).rev() {
        let row = table_row(source, entity, &mappings, idx)?;
        row.require_ids(entity.type_name())?;

        let mut sql = SqlBuilder::new(ctx.dialect);
        sql.push("DELETE FROM ")
            .push_table(row.mapping.schema.as_deref(), &row.mapping.table);
        append_id_where(&mut sql, &row);
        statements.push(sql.build()?);
    }
    Ok(statements)
}

/// Insert-or-update statements, root table first.
///
/// # Example
/// ```ignore
/// // Postgres
/// // INSERT INTO "customer" ("id", "name") VALUES ($1, $2)
/// //   ON CONFLICT ("id") DO UPDATE SET "name" = EXCLUDED."name"
/// let stmts = upsert_statements(&registry, &customer, &ctx)?;
/// ```
pub fn upsert_statements<S: TypeSource + ?Sized>(
    source: &S,
    entity: &Entity,
    ctx: &DialectContext,
) -> OrmResult<Vec<Statement>> {
    let mappings = source.table_mappings(entity.type_name())?;
    let mut statements = Vec::with_capacity(mappings.len());

    for idx in 0..mappings.len() {
        let row = table_row(source, entity, &mappings, idx)?;
        row.require_ids(entity.type_name())?;

        let columns: Vec<&ColumnValue> = row.columns.iter().collect();
        let mut sql = SqlBuilder::new(ctx.dialect);
        append_insert_head(&mut sql, &row, &columns);

        match ctx.dialect {
            Dialect::Postgres => {
                sql.push(" ON CONFLICT (");
                for (i, c) in row.ids().enumerate() {
                    if i > 0 {
                        sql.push(", ");
                    }
                    sql.push_ident(&c.column);
                }
                sql.push(")");
                if row.data().next().is_none() {
                    sql.push(" DO NOTHING");
                } else {
                    sql.push(" DO UPDATE SET ");
                    for (i, c) in row.data().enumerate() {
                        if i > 0 {
                            sql.push(", ");
                        }
                        sql.push_ident(&c.column)
                            .push(" = EXCLUDED.")
                            .push_ident(&c.column);
                    }
                }
            }
            Dialect::MySql => {
                sql.push(" ON DUPLICATE KEY UPDATE ");
                let data: Vec<&ColumnValue> = row.data().collect();
                // MySQL has no DO NOTHING; a self-assignment keeps the row.
                let targets = if data.is_empty() {
                    row.ids().take(1).collect()
                } else {
                    data
                };
                for (i, c) in targets.iter().enumerate() {
                    if i > 0 {
                        sql.push(", ");
                    }
                    sql.push_ident(&c.column)
                        .push(" = VALUES(")
                        .push_ident(&c.column)
                        .push(")");
                }
            }
        }
        statements.push(sql.build()?);
    }
    Ok(statements)
}

fn append_insert_head(sql: &mut SqlBuilder, row: &TableRow<'_>, columns: &[&ColumnValue]) {
    sql.push("INSERT INTO ")
        .push_table(row.mapping.schema.as_deref(), &row.mapping.table);

    if columns.is_empty() {
        match sql.dialect() {
            Dialect::Postgres => sql.push(" DEFAULT VALUES"),
            Dialect::MySql => sql.push(" () VALUES ()"),
        };
        return;
    }

    sql.push(" (");
    for (i, c) in columns.iter().enumerate() {
        if i > 0 {
            sql.push(", ");
        }
        sql.push_ident(&c.column);
    }
    sql.push(") VALUES (");
    for (i, c) in columns.iter().enumerate() {
        if i > 0 {
            sql.push(", ");
        }
        sql.push_bind(c.value.clone());
    }
    sql.push(")");
}

fn append_id_where(sql: &mut SqlBuilder, row: &TableRow<'_>) {
    sql.push(" WHERE ");
    for (i, c) in row.ids().enumerate() {
        if i > 0 {
            sql.push(" AND ");
        }
        sql.push_ident(&c.column).push(" = ").push_bind(c.value.clone());
    }
}

/// Collect the column values of table `idx` from the entity.
fn table_row<'m, S: TypeSource + ?Sized>(
    source: &S,
    entity: &Entity,
    mappings: &'m [TableMapping],
    idx: usize,
) -> OrmResult<TableRow<'m>> {
    let mapping = &mappings[idx];
    let mut columns = Vec::new();

    // Sub tables share the identity of the root-most table holding the ids.
    if mapping.id_fields().next().is_none() {
        let id_fields = mappings.iter().flat_map(TableMapping::id_fields);
        for field in id_fields {
            columns.push(ColumnValue {
                column: field.column_name().to_string(),
                value: entity.value(&field.name).cloned().unwrap_or_default(),
                id: true,
            });
        }
    }

    collect_columns(source, entity, &mapping.fields, "", true, &mut columns)?;

    if let Some((column, value)) = discriminator(source, entity.type_name(), mappings, idx)? {
        if !columns.iter().any(|c| c.column == column) {
            columns.push(ColumnValue {
                column,
                value,
                id: false,
            });
        }
    }

    columns.sort_by_key(|c| !c.id);
    Ok(TableRow { mapping, columns })
}

fn collect_columns<S: TypeSource + ?Sized>(
    source: &S,
    entity: &Entity,
    fields: &[FieldModel],
    prefix: &str,
    top_level: bool,
    out: &mut Vec<ColumnValue>,
) -> OrmResult<()> {
    for field in fields.iter().filter(|f| f.is_persistent()) {
        let Some(kind) = field.kind() else {
            continue;
        };
        match kind {
            FieldKind::Scalar(_) => {
                if let Some(FieldValue::Value(v)) = entity.get(&field.name) {
                    out.push(ColumnValue {
                        column: format!("{prefix}{}", field.column_name()),
                        value: v.clone(),
                        id: top_level && field.id,
                    });
                } else if top_level && field.id {
                    out.push(ColumnValue {
                        column: field.column_name().to_string(),
                        value: Value::Null,
                        id: true,
                    });
                }
            }
            FieldKind::Reference(target) => {
                let value = match entity.get(&field.name) {
                    Some(FieldValue::Entity(referenced)) => reference_id(source, target, referenced)?,
                    Some(FieldValue::Value(v)) => v.clone(),
                    _ => continue,
                };
                let fk = field
                    .link
                    .as_ref()
                    .and_then(|l| l.link_field.clone())
                    .or_else(|| field.column.clone())
                    .unwrap_or_else(|| format!("{}_id", field.name));
                out.push(ColumnValue {
                    column: format!("{prefix}{fk}"),
                    value,
                    id: false,
                });
            }
            FieldKind::Embedded(target) => {
                let Some(embedded) = entity.entity(&field.name) else {
                    continue;
                };
                let inner_prefix = format!(
                    "{prefix}{}",
                    field.embedded_prefix().unwrap_or_default()
                );
                let inner_fields = all_fields(source, target)?;
                collect_columns(source, embedded, &inner_fields, &inner_prefix, false, out)?;
            }
            FieldKind::Collection(_) | FieldKind::ValueCollection(_) | FieldKind::Other => {}
        }
    }
    Ok(())
}

/// Identifying value of a referenced entity.
fn reference_id<S: TypeSource + ?Sized>(
    source: &S,
    target: &str,
    referenced: &Entity,
) -> OrmResult<Value> {
    let fields = all_fields(source, target)?;
    let ids: Vec<&FieldModel> = fields.iter().filter(|f| f.id).collect();
    match ids.as_slice() {
        [id] => Ok(referenced.value(&id.name).cloned().unwrap_or_default()),
        _ => Err(OrmError::mapping(
            target,
            format!(
                "exactly one identifying field is required to be referenced, found {}",
                ids.len()
            ),
        )),
    }
}

/// Discriminator column and value written into table `idx`, if any.
fn discriminator<S: TypeSource + ?Sized>(
    source: &S,
    type_name: &str,
    mappings: &[TableMapping],
    idx: usize,
) -> OrmResult<Option<(String, Value)>> {
    let chain = type_chain(source, type_name)?;
    let Some(declaring) = chain.iter().find(|m| m.discriminator_column.is_some()) else {
        return Ok(None);
    };
    let holder = mappings
        .iter()
        .position(|m| m.owning_type == declaring.qualified_name)
        .unwrap_or(0);
    if holder != idx {
        return Ok(None);
    }
    Ok(declaring.discriminator_column.clone().map(|column| {
        let value = Value::from(chain[0].discriminator_value_or_default());
        (column, declaring.discriminator_type.coerce(value))
    }))
}
