use super::identity::IdentityKey;
use super::row::{AliasValues, FlatRow, KeyGroups};
use crate::entity::{Entity, FieldValue};
use crate::plan::{Alias, AliasTree, EntityShape, LINKED_VALUE_KEY};
use crate::value::Value;
use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};

pub(crate) type NodeId = usize;

#[derive(Debug, Clone)]
enum Slot {
    Field(FieldValue),
    One(NodeId),
    Many(Vec<NodeId>),
    Values(Vec<Value>),
}

#[derive(Debug)]
struct Node {
    type_name: String,
    fields: BTreeMap<String, Slot>,
}

/// The values and concrete shape of one entity alias in one row.
struct Resolved<'t> {
    values: AliasValues,
    type_name: &'t str,
    /// Base (or single-table variant) shape first, then present subclass shapes.
    shapes: Vec<&'t EntityShape>,
}

/// Entities of one execution, addressed by index, plus the identity map.
#[derive(Debug)]
pub(crate) struct Arena<'t> {
    tree: &'t AliasTree,
    nodes: Vec<Node>,
    identities: HashMap<IdentityKey, NodeId>,
}

impl<'t> Arena<'t> {
    pub(crate) fn new(tree: &'t AliasTree) -> Self {
        Self {
            tree,
            nodes: Vec::new(),
            identities: HashMap::new(),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.identities.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Identity of the root entity of a grouped row; `None` when the root
    /// alias is absent.
    pub(crate) fn root_key(&self, groups: &[AliasValues]) -> Option<IdentityKey> {
        let resolved = self.resolve_values(0, groups)?;
        Some(IdentityKey::of(self.tree.root_alias(), None, &resolved.values))
    }

    /// Fold one grouped row into the arena.
    ///
    /// Returns the root node and whether this row created it. Rows without
    /// a root contribute nothing.
    pub(crate) fn apply(&mut self, groups: &[AliasValues]) -> Option<(NodeId, bool)> {
        let tree = self.tree;
        let aliases = tree.aliases();
        let root = self.entity(0, None, groups)?;

        let mut row_nodes: Vec<Option<NodeId>> = vec![None; aliases.len()];
        row_nodes[0] = Some(root.0);

        for (idx, alias) in aliases.iter().enumerate().skip(1) {
            // Folded into the base alias.
            if alias.is_a_sub_class {
                continue;
            }
            let (Some(parent), Some(field)) = (
                self.parent_node(alias, &row_nodes),
                alias.link_field.as_deref(),
            ) else {
                continue;
            };

            if alias.is_linked_value {
                if let Some(value) = groups[idx].get(LINKED_VALUE_KEY) {
                    let value = match &alias.value_type {
                        Some(ty) => ty.coerce(value.clone()),
                        None => value.clone(),
                    };
                    self.push_value(parent, field, value);
                }
                continue;
            }

            let node = match self.entity(idx, Some(parent), groups) {
                Some((node, _)) => Some(node),
                // An embedded value with null scalars still holds present references.
                None if alias.is_embedded && self.has_present_descendant(idx, groups) => {
                    Some(self.empty_embedded(alias, parent))
                }
                None => None,
            };
            if let Some(node) = node {
                row_nodes[idx] = Some(node);
                self.attach(parent, field, node, alias.link_is_collection);
            }
        }
        Some(root)
    }

    /// Node of the entity an alias's parent resolved to in this row.
    fn parent_node(&self, alias: &Alias, row_nodes: &[Option<NodeId>]) -> Option<NodeId> {
        let tree = self.tree;
        let parent = alias.parent.as_deref().and_then(|p| tree.alias(p))?;
        let base = tree.base_of(parent);
        row_nodes[tree.alias_index(&base.name)?]
    }

    /// Whether any alias nested under alias `idx` has values in this row.
    fn has_present_descendant(&self, idx: usize, groups: &[AliasValues]) -> bool {
        let tree = self.tree;
        let name = tree.aliases()[idx].name.as_str();
        tree.aliases()
            .iter()
            .enumerate()
            .skip(idx + 1)
            .any(|(i, alias)| !groups[i].is_empty() && self.descends_from(alias, name))
    }

    fn descends_from(&self, alias: &Alias, ancestor: &str) -> bool {
        let tree = self.tree;
        let mut current = alias.parent.as_deref();
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            current = tree.alias(name).and_then(|a| a.parent.as_deref());
        }
        false
    }

    /// The embedded value of `alias` under `owner` when it has no values of
    /// its own.
    fn empty_embedded(&mut self, alias: &'t Alias, owner: NodeId) -> NodeId {
        let resolved = Resolved {
            values: AliasValues::new(),
            type_name: alias.result_type.as_str(),
            shapes: vec![&alias.shape],
        };
        let key = IdentityKey::of(alias, Some(owner), &resolved.values);
        if let Some(&node) = self.identities.get(&key) {
            return node;
        }
        let node = self.build(alias, &resolved);
        self.identities.insert(key, node);
        node
    }

    /// Find or build the entity of alias `idx` in this row.
    fn entity(
        &mut self,
        idx: usize,
        owner: Option<NodeId>,
        groups: &[AliasValues],
    ) -> Option<(NodeId, bool)> {
        let tree = self.tree;
        let alias = &tree.aliases()[idx];
        let resolved = self.resolve_values(idx, groups)?;
        let key = IdentityKey::of(alias, owner, &resolved.values);
        if let Some(&node) = self.identities.get(&key) {
            return Some((node, false));
        }

        let node = self.build(alias, &resolved);
        self.identities.insert(key, node);
        Some((node, true))
    }

    /// Merge subclass groups into the alias's values and pick the concrete
    /// type.
    fn resolve_values(&self, idx: usize, groups: &[AliasValues]) -> Option<Resolved<'t>> {
        let tree = self.tree;
        let alias = &tree.aliases()[idx];
        let mut values = groups[idx].clone();
        let mut type_name = alias.result_type.as_str();
        let mut sub_shapes = Vec::new();

        let mut pending: Vec<&str> = alias.sub_class_aliases.iter().map(String::as_str).collect();
        while let Some(name) = pending.pop() {
            let (Some(sub_idx), Some(sub)) = (tree.alias_index(name), tree.alias(name)) else {
                continue;
            };
            let group = &groups[sub_idx];
            if group.is_empty() {
                continue;
            }
            for (field, value) in group {
                match values.get_mut(field) {
                    Some(existing) if !existing.is_null() => {}
                    Some(existing) => *existing = value.clone(),
                    None => {
                        values.insert(field.clone(), value.clone());
                    }
                }
            }
            type_name = sub.result_type.as_str();
            sub_shapes.push(&sub.shape);
            pending.extend(sub.sub_class_aliases.iter().map(String::as_str));
        }

        if values.is_empty() {
            return None;
        }

        let mut base = &alias.shape;
        if let Some(sti) = &alias.single_table {
            let variant = values
                .get(&sti.column)
                .filter(|v| !v.is_null())
                .and_then(|v| sti.variants.get(&discriminator_label(v)));
            match variant {
                Some(shape) => {
                    base = shape;
                    type_name = shape.type_name.as_str();
                }
                None => tracing::trace!(
                    target: "relmap.reconstruct",
                    alias = %alias.name,
                    value = ?values.get(&sti.column),
                    "unknown discriminator, using base type"
                ),
            }
        }

        let mut shapes = Vec::with_capacity(sub_shapes.len() + 1);
        shapes.push(base);
        shapes.extend(sub_shapes);
        Some(Resolved {
            values,
            type_name,
            shapes,
        })
    }

    fn build(&mut self, alias: &Alias, resolved: &Resolved<'_>) -> NodeId {
        let mut fields = BTreeMap::new();
        let mut other_field = None;

        for shape in &resolved.shapes {
            for collection in &shape.collections {
                let empty = if collection.values {
                    Slot::Values(Vec::new())
                } else {
                    Slot::Many(Vec::new())
                };
                fields.entry(collection.field.clone()).or_insert(empty);
            }
            for binding in &shape.columns {
                if let Some(value) = resolved.values.get(&binding.field) {
                    let value = binding.ty.coerce(value.clone());
                    fields.insert(binding.field.clone(), Slot::Field(FieldValue::Value(value)));
                }
            }
            if shape.other_field.is_some() {
                other_field = shape.other_field.as_deref();
            }
        }

        if let Some(other) = other_field {
            let residual: BTreeMap<String, Value> = resolved
                .values
                .iter()
                .filter(|(key, _)| !self.is_known_key(alias, key))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            fields.insert(other.to_string(), Slot::Field(FieldValue::Map(residual)));
        }

        tracing::trace!(
            target: "relmap.reconstruct",
            alias = %alias.name,
            type_name = resolved.type_name,
            "built entity"
        );

        self.nodes.push(Node {
            type_name: resolved.type_name.to_string(),
            fields,
        });
        self.nodes.len() - 1
    }

    /// Whether a key is consumed by the alias or any of its subclass aliases.
    fn is_known_key(&self, alias: &Alias, key: &str) -> bool {
        if alias.is_known_key(key) {
            return true;
        }
        alias
            .sub_class_aliases
            .iter()
            .filter_map(|name| self.tree.alias(name))
            .any(|sub| self.is_known_key(sub, key))
    }

    fn attach(&mut self, parent: NodeId, field: &str, child: NodeId, collection: bool) {
        let fields = &mut self.nodes[parent].fields;
        if !collection {
            fields.insert(field.to_string(), Slot::One(child));
            return;
        }
        match fields.get_mut(field) {
            Some(Slot::Many(children)) => {
                if !children.contains(&child) {
                    children.push(child);
                }
            }
            _ => {
                fields.insert(field.to_string(), Slot::Many(vec![child]));
            }
        }
    }

    fn push_value(&mut self, parent: NodeId, field: &str, value: Value) {
        let fields = &mut self.nodes[parent].fields;
        match fields.get_mut(field) {
            Some(Slot::Values(values)) => {
                if !values.contains(&value) {
                    values.push(value);
                }
            }
            _ => {
                fields.insert(field.to_string(), Slot::Values(vec![value]));
            }
        }
    }

    /// Build the owned entity tree rooted at `node`.
    pub(crate) fn materialize(&self, node: NodeId) -> Entity {
        let node = &self.nodes[node];
        let mut entity = Entity::new(&node.type_name);
        for (field, slot) in &node.fields {
            match slot {
                Slot::Field(value) => entity.set(field, value.clone()),
                Slot::One(child) => entity.set(field, self.materialize(*child)),
                Slot::Many(children) => entity.set(
                    field,
                    children
                        .iter()
                        .map(|c| self.materialize(*c))
                        .collect::<Vec<_>>(),
                ),
                Slot::Values(values) => entity.set(field, values.clone()),
            }
        }
        entity
    }
}

fn discriminator_label(value: &Value) -> String {
    match value {
        Value::Text(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Rebuild deduplicated root entities from flat rows.
///
/// Roots come back in first-seen order; collections keep the first-seen order
/// of their distinct members. Rows need not be ordered.
///
/// # Example
/// ```ignore
/// let tree = plan_query(&registry, "shop::Order")?;
/// let orders = reconstruct(&tree, &rows);
/// assert_eq!(orders[0].list("lineItems").map(<[_]>::len), Some(2));
/// ```
pub fn reconstruct<R, I>(tree: &AliasTree, rows: I) -> Vec<Entity>
where
    R: Borrow<FlatRow>,
    I: IntoIterator<Item = R>,
{
    let mut keys = KeyGroups::new(tree);
    let mut arena = Arena::new(tree);
    let mut roots = Vec::new();
    let mut row_count = 0usize;

    for row in rows {
        row_count += 1;
        let groups = keys.group(row.borrow());
        if let Some((root, true)) = arena.apply(&groups) {
            roots.push(root);
        }
    }

    let entities: Vec<Entity> = roots.into_iter().map(|r| arena.materialize(r)).collect();
    tracing::debug!(
        target: "relmap.reconstruct",
        root_type = tree.root_type(),
        rows = row_count,
        entities = entities.len(),
        nodes = arena.len(),
        "reconstructed rows"
    );
    entities
}
