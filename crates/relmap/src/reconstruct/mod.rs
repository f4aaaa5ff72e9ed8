//! Rebuilding entity graphs from flat rows.
//!
//! Each row of a planned SELECT carries `"<alias>.<field>"` keys. Rows are
//! grouped by alias, every alias with a non-null group yields (or reuses) one
//! entity per identity, and children are attached to the entity their parent
//! alias resolved to in the same row. Collections are deduplicated by
//! identity and keep first-seen order.
//!
//! [`reconstruct`] works over any row order and returns all roots at once.
//! [`StreamingReconstructor`] needs rows grouped by root and holds only the
//! current root's graph.

mod engine;
mod identity;
mod row;
mod streaming;


pub use crate::entity::{Entity, FieldValue};
pub use engine::reconstruct;
pub use identity::IdentityKey;
pub use row::{AliasValues, FlatRow, KeyGroups};
pub use streaming::{StreamingReconstructor, reconstruct_streaming};
