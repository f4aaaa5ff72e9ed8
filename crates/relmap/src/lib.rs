//! # relmap
//!
//! Object-relational mapping that fetches whole object graphs with a single
//! joined SELECT.
//!
//! ## Pipeline
//!
//! - **Metadata** ([`meta`]): types, fields and their annotations, held in a
//!   [`TypeRegistry`].
//! - **Table mappings** ([`mapping`]): which tables and columns hold a type,
//!   including joined super tables.
//! - **Planning** ([`plan`]): an immutable [`AliasTree`] per root type, with
//!   one alias per nested entity, collection, embedded value and subclass.
//! - **SQL** ([`sql`]): SELECT assembly with `{alias.field}` markers and
//!   bound parameters, plus per-table INSERT / UPDATE / DELETE / upsert.
//! - **Reconstruction** ([`reconstruct`]): flat rows back into deduplicated
//!   [`Entity`] graphs, either all at once or streamed one root at a time.
//! - **Session** ([`session`]): plan caching and execution through any
//!   [`Executor`] (a `tokio_postgres` client or transaction out of the box).
//!
//! ## Example
//!
//! ```ignore
//! use relmap::{Condition, FieldModel, Orm, ScalarType, SelectQuery, TypeModel, TypeRegistry};
//!
//! let registry = TypeRegistry::new()
//!     .with(
//!         TypeModel::new("shop::Order")
//!             .table("order")
//!             .field(FieldModel::id("id", ScalarType::Int64))
//!             .field(FieldModel::collection("lineItems", "shop::LineItem")),
//!     )
//!     .with(
//!         TypeModel::new("shop::LineItem")
//!             .table("line_item")
//!             .field(FieldModel::id("id", ScalarType::Int64))
//!             .field(FieldModel::scalar("quantity", ScalarType::Int32)),
//!     );
//!
//! let orm = Orm::new(registry);
//! let session = orm.session(&client);
//! let orders = session
//!     .find_all(
//!         "shop::Order",
//!         &SelectQuery::new().filter(Condition::gt("lineItems.quantity", 1)),
//!     )
//!     .await?;
//! ```

pub mod client;
pub mod config;
pub mod entity;
pub mod error;
pub mod mapping;
pub mod meta;
pub mod plan;
pub mod reconstruct;
pub mod session;
pub mod sql;
pub mod value;

#[cfg(test)]
mod fixtures;

pub use client::{Executor, RowStream};
pub use config::{Dialect, DialectContext, default_context, set_default_context};
pub use entity::{Entity, FieldValue};
pub use error::{OrmError, OrmResult};
pub use mapping::TableMapping;
pub use meta::{
    EnumModel, FieldModel, FieldType, LinkSpec, Mapped, ScalarType, TypeModel, TypeRegistry,
    TypeSource,
};
pub use plan::{AliasTree, plan_query};
pub use reconstruct::{FlatRow, StreamingReconstructor, reconstruct, reconstruct_streaming};
pub use session::{Orm, Session};
pub use sql::{Condition, Op, SelectQuery, Statement};
pub use value::Value;
