//! Repository-style operations.
//!
//! [`Orm`] owns the type source, the dialect context and a plan cache; a
//! [`Session`] pairs it with an [`Executor`] for the duration of a unit of
//! work. Multi-table writes issue one statement per table, so pass a
//! transaction as the executor when they must be atomic.
//!
//! # Example
//! ```ignore
//! let orm = Orm::new(registry);
//! let session = orm.session(&client);
//!
//! let open = SelectQuery::new()
//!     .filter(Condition::eq("status", "OPEN"))
//!     .order_by("{this.id}");
//! let orders = session.find_all("shop::Order", &open).await?;
//! ```

use crate::client::Executor;
use crate::config::{DialectContext, default_context};
use crate::entity::Entity;
use crate::error::{OrmError, OrmResult};
use crate::meta::{Mapped, TypeRegistry, TypeSource};
use crate::plan::{AliasTree, plan_query};
use crate::reconstruct::{FlatRow, StreamingReconstructor, reconstruct};
use crate::sql::{
    SelectQuery, Statement, build_identity_condition, delete_statements, insert_table_statement,
    to_select_statement, to_streaming_select_statement, update_statements, upsert_statements,
};
use crate::value::Value;
use futures_util::TryStreamExt;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::Level;

/// Dispatch a tracing event at a runtime-determined level.
macro_rules! emit_at_level {
    ($level:expr, $($field:tt)*) => {
        match $level {
            Level::ERROR => tracing::error!($($field)*),
            Level::WARN  => tracing::warn!($($field)*),
            Level::INFO  => tracing::info!($($field)*),
            Level::DEBUG => tracing::debug!($($field)*),
            Level::TRACE => tracing::trace!($($field)*),
        }
    };
}

/// Type metadata, dialect and cached plans.
#[derive(Debug)]
pub struct Orm<S = TypeRegistry> {
    source: S,
    ctx: Arc<DialectContext>,
    plans: RwLock<HashMap<String, Arc<AliasTree>>>,
}

impl<S: TypeSource> Orm<S> {
    /// Create an ORM over `source` using the process-wide default context.
    pub fn new(source: S) -> Self {
        Self {
            source,
            ctx: default_context(),
            plans: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_context(mut self, ctx: DialectContext) -> Self {
        self.ctx = Arc::new(ctx);
        self
    }

    pub fn context(&self) -> &DialectContext {
        &self.ctx
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// The alias tree of a root type, planned once and shared afterwards.
    pub fn plan(&self, type_name: &str) -> OrmResult<Arc<AliasTree>> {
        if let Some(tree) = self
            .plans
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_name)
        {
            return Ok(Arc::clone(tree));
        }

        let tree = Arc::new(plan_query(&self.source, type_name)?);
        let mut plans = self.plans.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have planned the same type meanwhile; keep the first.
        let tree = plans.entry(type_name.to_string()).or_insert(tree);
        Ok(Arc::clone(tree))
    }

    /// Number of cached plans.
    pub fn cached_plans(&self) -> usize {
        self.plans
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn session<'a, E: Executor>(&'a self, executor: &'a E) -> Session<'a, S, E> {
        Session {
            orm: self,
            executor,
        }
    }
}

/// An [`Orm`] bound to one executor.
#[derive(Debug)]
pub struct Session<'a, S, E> {
    orm: &'a Orm<S>,
    executor: &'a E,
}

impl<S: TypeSource, E: Executor> Session<'_, S, E> {
    // ==================== Reads ====================

    /// All roots of `type_name` matching `query`.
    pub async fn find_all(&self, type_name: &str, query: &SelectQuery) -> OrmResult<Vec<Entity>> {
        let tree = self.orm.plan(type_name)?;
        let stmt = to_select_statement(&tree, query, &self.orm.ctx)?;
        let rows = self.fetch(&stmt, "select").await?;
        Ok(reconstruct(&tree, &rows))
    }

    /// [`find_all`](Self::find_all) deserialised into `T`.
    pub async fn find_all_as<T>(&self, query: &SelectQuery) -> OrmResult<Vec<T>>
    where
        T: Mapped + DeserializeOwned,
    {
        self.find_all(T::TYPE_NAME, query)
            .await?
            .iter()
            .map(Entity::deserialize)
            .collect()
    }

    /// The root with the given identifying value, if any.
    pub async fn find_by_id(
        &self,
        type_name: &str,
        id: impl Into<Value>,
    ) -> OrmResult<Option<Entity>> {
        let tree = self.orm.plan(type_name)?;
        let query = build_identity_condition(&tree, id)?
            .into_iter()
            .fold(SelectQuery::new(), SelectQuery::filter);
        let stmt = to_select_statement(&tree, &query, &self.orm.ctx)?;
        let rows = self.fetch(&stmt, "select").await?;
        Ok(reconstruct(&tree, &rows).into_iter().next())
    }

    pub async fn find_by_id_as<T>(&self, id: impl Into<Value>) -> OrmResult<Option<T>>
    where
        T: Mapped + DeserializeOwned,
    {
        self.find_by_id(T::TYPE_NAME, id)
            .await?
            .map(|e| e.deserialize())
            .transpose()
    }

    /// Stream roots of `type_name` one at a time.
    ///
    /// Rows are ordered by root identity and each root is handed to
    /// `on_entity` as soon as its last row has been read. Returns the number
    /// of roots emitted.
    pub async fn stream<F>(
        &self,
        type_name: &str,
        query: &SelectQuery,
        mut on_entity: F,
    ) -> OrmResult<usize>
    where
        F: FnMut(Entity),
    {
        let tree = self.orm.plan(type_name)?;
        let stmt = to_streaming_select_statement(&tree, query, &self.orm.ctx)?;
        self.log(&stmt, "stream");

        let mut rows = self.executor.query_stream(&stmt.sql, &stmt.params).await?;
        let mut handler = StreamingReconstructor::new(&tree);
        let mut emitted = 0;
        while let Some(row) = rows.try_next().await? {
            if let Some(entity) = handler.push(&row) {
                emitted += 1;
                on_entity(entity);
            }
        }
        if let Some(entity) = handler.finish() {
            emitted += 1;
            on_entity(entity);
        }
        Ok(emitted)
    }

    // ==================== Writes ====================

    /// Insert an entity, one statement per table of its hierarchy.
    ///
    /// Returns the entity with database-generated identifying values filled
    /// in (Postgres); other dialects need the ids set beforehand when the
    /// type spans several tables.
    pub async fn insert(&self, entity: &Entity) -> OrmResult<Entity> {
        let source = &self.orm.source;
        let ctx = &self.orm.ctx;
        let mappings = source.table_mappings(entity.type_name())?;
        let mut stored = entity.clone();

        for idx in 0..mappings.len() {
            let stmt = insert_table_statement(source, &stored, &mappings, idx, ctx)?;
            let returning = idx == 0 && ctx.dialect.supports_returning();
            let has_ids = mappings[idx].id_fields().next().is_some();
            if !(returning && has_ids) {
                self.run(&stmt, "insert").await?;
                continue;
            }

            let rows = self.fetch(&stmt, "insert").await?;
            let row = rows
                .first()
                .ok_or_else(|| OrmError::not_found("INSERT returned no row"))?;
            for field in mappings[idx].id_fields() {
                if let Some(value) = row.get(field.column_name()) {
                    field.set_value(&mut stored, value.clone());
                }
            }
        }
        Ok(stored)
    }

    /// Update the entity's own row(s). Returns the affected row count.
    pub async fn update(&self, entity: &Entity) -> OrmResult<u64> {
        let stmts = update_statements(&self.orm.source, entity, &self.orm.ctx)?;
        self.run_all(&stmts, "update").await
    }

    /// Delete the entity's own row(s), sub tables first.
    pub async fn delete(&self, entity: &Entity) -> OrmResult<u64> {
        let stmts = delete_statements(&self.orm.source, entity, &self.orm.ctx)?;
        self.run_all(&stmts, "delete").await
    }

    /// Insert the entity or update it when its identity already exists.
    pub async fn upsert(&self, entity: &Entity) -> OrmResult<u64> {
        let stmts = upsert_statements(&self.orm.source, entity, &self.orm.ctx)?;
        self.run_all(&stmts, "upsert").await
    }

    // ==================== Execution ====================

    async fn fetch(&self, stmt: &Statement, kind: &'static str) -> OrmResult<Vec<FlatRow>> {
        self.log(stmt, kind);
        self.executor.query(&stmt.sql, &stmt.params).await
    }

    async fn run(&self, stmt: &Statement, kind: &'static str) -> OrmResult<u64> {
        self.log(stmt, kind);
        self.executor.execute(&stmt.sql, &stmt.params).await
    }

    async fn run_all(&self, stmts: &[Statement], kind: &'static str) -> OrmResult<u64> {
        let mut affected = 0;
        for stmt in stmts {
            affected += self.run(stmt, kind).await?;
        }
        Ok(affected)
    }

    fn log(&self, stmt: &Statement, kind: &'static str) {
        let ctx = &self.orm.ctx;
        let sql = ctx.truncate_sql(&stmt.sql);
        emit_at_level!(
            ctx.sql_log_level,
            target: "relmap.sql",
            kind,
            param_count = stmt.params.len(),
            sql = %sql,
        );
    }
}
