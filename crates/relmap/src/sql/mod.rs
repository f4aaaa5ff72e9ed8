//! SQL statement assembly.
//!
//! - [`SqlBuilder`]: parameter-safe builder; placeholders are numbered (or
//!   not) per dialect when the statement is built
//! - [`Condition`] / [`Op`]: WHERE primitives over `alias.field` references
//! - [`to_select_statement`]: the SELECT of a planned [`AliasTree`](crate::plan::AliasTree)
//! - [`insert_statements`] and friends: single-entity writes
//!
//! # Example
//!
//! ```ignore
//! use relmap::sql::{Condition, SelectQuery, to_select_statement};
//!
//! let tree = relmap::plan_query(&registry, "shop::Order")?;
//! let query = SelectQuery::new()
//!     .filter(Condition::eq("orderNumber", "A-1"))
//!     .order_by("{lineItems.quantity} DESC");
//! let stmt = to_select_statement(&tree, &query, &DialectContext::default())?;
//! // SELECT "order"."id" AS "order.id", ... FROM "order" AS "order"
//! //   LEFT JOIN "line_item" AS "lineItems" ON "order"."id" = "lineItems"."order_id"
//! //   WHERE "order"."order_number" = $1 ORDER BY "lineItems"."quantity" DESC
//! ```

mod builder;
mod condition;
mod select;
mod write;

#[cfg(test)]
mod tests;

pub use builder::{SqlBuilder, Statement};
pub use condition::{Condition, Op};
pub use select::{
    SelectQuery, build_identity_condition, build_identity_conditions, to_select_statement,
    to_streaming_select_statement,
};
pub use write::{delete_statements, insert_statements, update_statements, upsert_statements};

pub(crate) use write::insert_table_statement;
