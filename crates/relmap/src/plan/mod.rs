//! Alias tree planning.
//!
//! The planner walks a root type's fields depth-first and produces an
//! [`AliasTree`]: one named alias per nested entity, collection, value
//! collection, embedded value and polymorphic variant, together with the
//! joins and the selection list the SQL assembler emits. Row keys of the
//! generated SELECT (`"<alias>.<field>"`) are exactly the keys
//! reconstruction groups on.
//!
//! Alias naming:
//!
//! ```text
//! order                      root (its own table name)
//! lineItems                  child of the root: just the field name
//! lineItems.product          deeper: parent path + "." + field
//! lineItems.product__link    many-to-many link table (SQL alias only)
//! order__base                joined super table (SQL alias only)
//! vehicle#Car                table-per-subclass variant
//! ```

mod alias;
mod markers;
mod planner;


pub use alias::{
    Alias, AliasTree, CollectionField, ColumnBinding, ColumnRef, DiscriminatorFilter,
    EntityShape, Fragment, Join, JoinCondition, JoinKind, LINKED_VALUE_KEY, SelectField,
    SingleTableInheritance, TableRef,
};
pub(crate) use markers::resolve_reference;
pub use markers::{has_markers, marker_names, resolve_markers};
pub use planner::{Planner, plan_query};
