//! One-root-at-a-time reconstruction over rows ordered by root identity.

use super::engine::{Arena, NodeId};
use super::identity::IdentityKey;
use super::row::{FlatRow, KeyGroups};
use crate::entity::Entity;
use crate::plan::AliasTree;
use std::borrow::Borrow;

/// Incremental reconstruction that emits each root once its rows end.
///
/// Rows must arrive grouped by root identity (see
/// [`to_streaming_select_statement`](crate::sql::to_streaming_select_statement)).
/// Only the entities reachable from the current root are held; the arena and
/// identity cache are cleared whenever a root is emitted.
///
/// # Example
/// ```ignore
/// let mut handler = StreamingReconstructor::new(&tree);
/// for row in rows {
///     if let Some(order) = handler.push(&row) {
///         process(order);
///     }
/// }
/// if let Some(order) = handler.finish() {
///     process(order);
/// }
/// ```
#[derive(Debug)]
pub struct StreamingReconstructor<'t> {
    keys: KeyGroups<'t>,
    arena: Arena<'t>,
    current: Option<(IdentityKey, NodeId)>,
    rows: usize,
    emitted: usize,
}

impl<'t> StreamingReconstructor<'t> {
    pub fn new(tree: &'t AliasTree) -> Self {
        Self {
            keys: KeyGroups::new(tree),
            arena: Arena::new(tree),
            current: None,
            rows: 0,
            emitted: 0,
        }
    }

    /// Feed one row. Returns the previous root when this row starts a new one.
    pub fn push(&mut self, row: &FlatRow) -> Option<Entity> {
        self.rows += 1;
        let groups = self.keys.group(row);
        let key = self.arena.root_key(&groups)?;

        let boundary = self
            .current
            .as_ref()
            .is_some_and(|(current, _)| *current != key);
        let finished = if boundary { self.flush() } else { None };

        if let Some((root, _)) = self.arena.apply(&groups) {
            if self.current.is_none() {
                self.current = Some((key, root));
            }
        }
        finished
    }

    /// Emit the last root, if any.
    pub fn finish(mut self) -> Option<Entity> {
        let last = self.flush();
        tracing::debug!(
            target: "relmap.reconstruct",
            rows = self.rows,
            entities = self.emitted,
            "finished streaming reconstruction"
        );
        last
    }

    /// Roots emitted so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    fn flush(&mut self) -> Option<Entity> {
        let (_, root) = self.current.take()?;
        let entity = self.arena.materialize(root);
        self.arena.clear();
        self.emitted += 1;
        Some(entity)
    }
}

/// Drive a [`StreamingReconstructor`] over `rows`, handing each completed
/// root to `on_entity`. Returns the number of roots emitted.
pub fn reconstruct_streaming<R, I, F>(tree: &AliasTree, rows: I, mut on_entity: F) -> usize
where
    R: Borrow<FlatRow>,
    I: IntoIterator<Item = R>,
    F: FnMut(Entity),
{
    let mut handler = StreamingReconstructor::new(tree);
    let mut emitted = 0;
    for row in rows {
        if let Some(entity) = handler.push(row.borrow()) {
            emitted += 1;
            on_entity(entity);
        }
    }
    if let Some(entity) = handler.finish() {
        emitted += 1;
        on_entity(entity);
    }
    emitted
}
