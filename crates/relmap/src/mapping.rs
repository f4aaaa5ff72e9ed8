//! Table mapping resolution.
//!
//! A type hierarchy maps onto one or more tables. Every type in the superclass
//! chain that carries a table starts a [`TableMapping`]; ancestors without a
//! table lend their fields to the nearest annotated descendant, and subtypes
//! without a table (single-table inheritance) lend theirs to the nearest
//! annotated ancestor.
//!
//! ```text
//! Entity (no table: id, created)      ┐
//! Animal (table animal: name)         ┘→ animal: id, created, name
//! Dog    (table dog: breed)           ┐
//! Puppy  (no table: toy)              ┘→ dog: breed, toy
//! ```

use crate::error::{OrmError, OrmResult};
use crate::meta::{FieldModel, TypeModel, TypeSource};
use std::collections::HashSet;

/// One table bound to one link of a type's inheritance chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMapping {
    pub schema: Option<String>,
    pub table: String,
    /// Qualified name of the type that declares the table.
    pub owning_type: String,
    /// Persistent fields stored in this table, ancestors first.
    pub fields: Vec<FieldModel>,
}

impl TableMapping {
    /// Identifying fields stored in this table.
    pub fn id_fields(&self) -> impl Iterator<Item = &FieldModel> {
        self.fields.iter().filter(|f| f.id)
    }
}

/// The superclass chain of a type, the type itself first.
pub fn type_chain<'a, S: TypeSource + ?Sized>(
    source: &'a S,
    type_name: &str,
) -> OrmResult<Vec<&'a TypeModel>> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut next = Some(type_name.to_string());

    while let Some(name) = next {
        if !seen.insert(name.clone()) {
            return Err(OrmError::mapping(
                type_name,
                format!("superclass chain revisits '{name}'"),
            ));
        }
        let model = source.type_model(&name)?;
        next = model.superclass.clone();
        chain.push(model);
    }
    Ok(chain)
}

/// Resolve the tables of a type, root-most table first.
pub fn resolve_table_mappings<S: TypeSource + ?Sized>(
    source: &S,
    type_name: &str,
) -> OrmResult<Vec<TableMapping>> {
    let chain = type_chain(source, type_name)?;

    let mut mappings: Vec<TableMapping> = Vec::new();
    let mut pending: Vec<FieldModel> = Vec::new();

    for model in chain {
        let own = persistent_fields(model);
        match &model.table {
            Some(table) => {
                let mut fields = own;
                fields.append(&mut pending);
                mappings.push(TableMapping {
                    schema: table.schema.clone(),
                    table: table.name.clone(),
                    owning_type: model.qualified_name.clone(),
                    fields,
                });
            }
            None => match mappings.last_mut() {
                Some(current) => {
                    let below = std::mem::replace(&mut current.fields, own);
                    current.fields.extend(below);
                }
                None => {
                    let below = std::mem::replace(&mut pending, own);
                    pending.extend(below);
                }
            },
        }
    }

    if mappings.is_empty() {
        return Err(OrmError::mapping(type_name, "no table in type hierarchy"));
    }

    mappings.reverse();
    tracing::trace!(
        target: "relmap.plan",
        type_name,
        tables = ?mappings.iter().map(|m| m.table.as_str()).collect::<Vec<_>>(),
        "resolved table mappings"
    );
    Ok(mappings)
}

/// Every persistent field of a type, inherited ones first.
pub fn all_fields<S: TypeSource + ?Sized>(
    source: &S,
    type_name: &str,
) -> OrmResult<Vec<FieldModel>> {
    let chain = type_chain(source, type_name)?;
    Ok(chain.iter().rev().flat_map(|m| persistent_fields(m)).collect())
}

fn persistent_fields(model: &TypeModel) -> Vec<FieldModel> {
    model
        .fields
        .iter()
        .filter(|f| f.is_persistent())
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{ScalarType, TypeRegistry};

    fn names(m: &TableMapping) -> Vec<&str> {
        m.fields.iter().map(|f| f.name.as_str()).collect()
    }

    fn zoo() -> TypeRegistry {
        TypeRegistry::new()
            .with(
                TypeModel::new("zoo::Entity")
                    .field(FieldModel::id("id", ScalarType::Int64))
                    .field(FieldModel::scalar("created", ScalarType::Timestamp)),
            )
            .with(
                TypeModel::new("zoo::Animal")
                    .extends("zoo::Entity")
                    .table("animal")
                    .field(FieldModel::scalar("name", ScalarType::Text))
                    .field(FieldModel::scalar("cache", ScalarType::Text).transient()),
            )
            .with(
                TypeModel::new("zoo::Dog")
                    .extends("zoo::Animal")
                    .table_in("pets", "dog")
                    .field(FieldModel::scalar("breed", ScalarType::Text)),
            )
            .with(
                TypeModel::new("zoo::Puppy")
                    .extends("zoo::Dog")
                    .field(FieldModel::scalar("toy", ScalarType::Text)),
            )
    }

    #[test]
    fn test_joined_hierarchy_root_first() {
        let reg = zoo();
        let mappings = resolve_table_mappings(&reg, "zoo::Puppy").unwrap();
        assert_eq!(mappings.len(), 2);

        assert_eq!(mappings[0].table, "animal");
        assert_eq!(mappings[0].owning_type, "zoo::Animal");
        assert_eq!(names(&mappings[0]), ["id", "created", "name"]);

        assert_eq!(mappings[1].table, "dog");
        assert_eq!(mappings[1].schema.as_deref(), Some("pets"));
        assert_eq!(names(&mappings[1]), ["breed", "toy"]);
    }

    #[test]
    fn test_id_fields_follow_untabled_ancestor() {
        let reg = zoo();
        let mappings = resolve_table_mappings(&reg, "zoo::Animal").unwrap();
        let ids: Vec<_> = mappings[0].id_fields().map(|f| f.name.as_str()).collect();
        assert_eq!(ids, ["id"]);
    }

    #[test]
    fn test_missing_table_names_type() {
        let reg = zoo();
        let err = resolve_table_mappings(&reg, "zoo::Entity").unwrap_err();
        assert!(err.is_mapping());
        assert!(err.to_string().contains("zoo::Entity"));
    }

    #[test]
    fn test_superclass_loop_is_rejected() {
        let reg = TypeRegistry::new()
            .with(TypeModel::new("A").table("a").extends("B"))
            .with(TypeModel::new("B").table("b").extends("A"));
        assert!(resolve_table_mappings(&reg, "A").unwrap_err().is_mapping());
    }

    #[test]
    fn test_all_fields_inherited_first() {
        let reg = zoo();
        let fields = all_fields(&reg, "zoo::Dog").unwrap();
        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["id", "created", "name", "breed"]);
    }
}
