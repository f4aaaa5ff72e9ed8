use super::alias::{
    Alias, AliasTree, CollectionField, ColumnBinding, ColumnRef, DiscriminatorFilter,
    EntityShape, Join, JoinCondition, JoinKind, LINKED_VALUE_KEY, SelectField,
    SingleTableInheritance, TableRef,
};
use super::markers::resolve_markers;
use crate::error::{OrmError, OrmResult};
use crate::mapping::{TableMapping, all_fields, type_chain};
use crate::meta::{FieldKind, FieldModel, LinkSpec, ScalarType, TypeModel, TypeSource};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Plan the alias tree of a root type.
///
/// # Example
/// ```ignore
/// let tree = relmap::plan_query(&registry, "shop::Order")?;
/// assert_eq!(tree.root(), "order");
/// assert!(tree.alias("lineItems").is_some());
/// ```
pub fn plan_query<S: TypeSource + ?Sized>(source: &S, root_type: &str) -> OrmResult<AliasTree> {
    Planner::new(source).plan(root_type)
}

/// Identity columns of a planned entity alias.
#[derive(Debug, Clone)]
struct EntityIds {
    /// Id columns on the alias's primary table.
    columns: Vec<ColumnRef>,
    /// Table owning the id field, used for conventional foreign key names.
    id_table: Option<String>,
}

/// Where the fields currently being planned live.
#[derive(Debug, Clone)]
struct Scope {
    alias: usize,
    table_alias: String,
    prefix: String,
}

struct EntitySpec {
    name: String,
    type_name: String,
    parent: Option<String>,
    link_field: Option<String>,
    link_is_collection: bool,
}

/// Depth-first alias tree builder.
///
/// One planner builds one tree; use [`plan_query`] unless the intermediate
/// state is of interest.
pub struct Planner<'s, S: ?Sized> {
    source: &'s S,
    aliases: Vec<Alias>,
    index: HashMap<String, usize>,
    ids: HashMap<usize, EntityIds>,
    joins: Vec<Join>,
    selects: Vec<SelectField>,
    selected: HashSet<String>,
    /// Types on the path from the root to the alias being planned.
    path: Vec<String>,
}

impl<'s, S: TypeSource + ?Sized> Planner<'s, S> {
    pub fn new(source: &'s S) -> Self {
        Self {
            source,
            aliases: Vec::new(),
            index: HashMap::new(),
            ids: HashMap::new(),
            joins: Vec::new(),
            selects: Vec::new(),
            selected: HashSet::new(),
            path: Vec::new(),
        }
    }

    pub fn plan(mut self, root_type: &str) -> OrmResult<AliasTree> {
        let source = self.source;
        let mappings = source.table_mappings(root_type)?;
        let primary = primary_table(&mappings, root_type)?;
        let root = primary.table.clone();
        let from = TableRef {
            schema: primary.schema.clone(),
            table: primary.table.clone(),
            alias: root.clone(),
        };

        self.path.push(root_type.to_string());
        self.plan_entity(
            EntitySpec {
                name: root.clone(),
                type_name: root_type.to_string(),
                parent: None,
                link_field: None,
                link_is_collection: false,
            },
            &mappings,
        )?;
        self.path.pop();

        let discriminator_filter = self.discriminator_filter(root_type, &mappings)?;

        tracing::debug!(
            target: "relmap.plan",
            root_type,
            root = %root,
            aliases = self.aliases.len(),
            joins = self.joins.len(),
            selects = self.selects.len(),
            "planned query"
        );

        Ok(AliasTree {
            root,
            from,
            aliases: self.aliases,
            index: self.index,
            joins: self.joins,
            selects: self.selects,
            discriminator_filter,
        })
    }

    // ==================== Entities ====================

    fn plan_entity(&mut self, spec: EntitySpec, mappings: &[TableMapping]) -> OrmResult<usize> {
        let source = self.source;
        let model = source.type_model(&spec.type_name)?;
        let is_root = spec.parent.is_none();
        let last = mappings.len().saturating_sub(1);

        let table_aliases: Vec<String> = mappings
            .iter()
            .enumerate()
            .map(|(i, m)| {
                if i == last {
                    spec.name.clone()
                } else {
                    format!("{}__{}", spec.name, m.table)
                }
            })
            .collect();

        let id_fields: Vec<(&FieldModel, &TableMapping)> = mappings
            .iter()
            .flat_map(|m| m.id_fields().map(move |f| (f, m)))
            .collect();

        if mappings.len() > 1 && id_fields.is_empty() {
            return Err(OrmError::mapping(
                &spec.type_name,
                "joined tables need an identifying field",
            ));
        }

        let kind = if is_root {
            JoinKind::Inner
        } else {
            JoinKind::Left
        };
        for (m, table_alias) in mappings.iter().zip(&table_aliases).take(last) {
            let pairs = id_fields
                .iter()
                .map(|(f, _)| {
                    (
                        ColumnRef::new(&spec.name, f.column_name()),
                        ColumnRef::new(table_alias, f.column_name()),
                    )
                })
                .collect();
            self.joins.push(Join {
                kind,
                table: TableRef {
                    schema: m.schema.clone(),
                    table: m.table.clone(),
                    alias: table_alias.clone(),
                },
                condition: JoinCondition::Equals(pairs),
            });
        }

        let entity_ids = EntityIds {
            columns: id_fields
                .iter()
                .map(|(f, _)| ColumnRef::new(&spec.name, f.column_name()))
                .collect(),
            id_table: id_fields.first().map(|(_, m)| m.table.clone()),
        };

        let idx = self.push_alias(Alias {
            id_fields: id_fields.iter().map(|(f, _)| f.name.clone()).collect(),
            table_alias: spec.name.clone(),
            shape: EntityShape::new(&spec.type_name),
            ..new_alias(spec)
        })?;
        self.ids.insert(idx, entity_ids);

        for (m, table_alias) in mappings.iter().zip(&table_aliases) {
            let scope = Scope {
                alias: idx,
                table_alias: table_alias.clone(),
                prefix: String::new(),
            };
            for field in &m.fields {
                self.plan_field(&scope, field)?;
            }
        }

        self.plan_subclasses(idx, model, mappings)?;
        Ok(idx)
    }

    fn plan_field(&mut self, scope: &Scope, field: &FieldModel) -> OrmResult<()> {
        let Some(kind) = field.kind() else {
            return Err(OrmError::mapping(
                self.owner_type(scope),
                format!("field '{}' has an unsupported type", field.name),
            ));
        };

        match kind {
            FieldKind::Scalar(ty) => {
                self.bind_scalar(scope, field, ty.clone());
                Ok(())
            }
            FieldKind::Other => {
                self.aliases[scope.alias].shape.other_field = Some(field.name.clone());
                Ok(())
            }
            FieldKind::Embedded(target) => self.plan_embedded(scope, field, target),
            FieldKind::Reference(target) => self.plan_reference(scope, field, target),
            FieldKind::Collection(target) => {
                match field.link.as_ref().and_then(|l| l.link_table.as_deref()) {
                    Some(link_table) => self.plan_many_to_many(scope, field, target, link_table),
                    None => self.plan_one_to_many(scope, field, target),
                }
            }
            FieldKind::ValueCollection(ty) => self.plan_value_collection(scope, field, ty),
        }
    }

    fn bind_scalar(&mut self, scope: &Scope, field: &FieldModel, ty: ScalarType) {
        let column = ColumnRef::new(
            &scope.table_alias,
            format!("{}{}", scope.prefix, field.column_name()),
        );
        let alias = &mut self.aliases[scope.alias];
        let key = format!("{}.{}", alias.name, field.name);
        alias.shape.columns.push(ColumnBinding {
            field: field.name.clone(),
            column: column.clone(),
            ty,
        });
        self.push_select(key, column);
    }

    // ==================== Relations ====================

    fn plan_reference(&mut self, scope: &Scope, field: &FieldModel, target: &str) -> OrmResult<()> {
        self.check_cycle(target)?;
        let source = self.source;
        let mappings = source.table_mappings(target)?;
        let primary = primary_table(&mappings, target)?;
        let name = self.child_name(scope.alias, &field.name);
        let link = field.link.as_ref();

        let condition = match custom_condition(link) {
            Some(_) => JoinCondition::Custom(Vec::new()),
            None => {
                let (child_id, _) = single_id(&mappings, target)?;
                let fk = link
                    .and_then(|l| l.link_field.clone())
                    .or_else(|| field.column.clone())
                    .unwrap_or_else(|| format!("{}_id", field.name));
                JoinCondition::Equals(vec![(
                    ColumnRef::new(&scope.table_alias, format!("{}{fk}", scope.prefix)),
                    ColumnRef::new(&name, child_id),
                )])
            }
        };
        let join = self.push_join(primary, &name, condition);

        let parent = self.aliases[scope.alias].name.clone();
        let child = self.plan_child(
            EntitySpec {
                name,
                type_name: target.to_string(),
                parent: Some(parent),
                link_field: Some(field.name.clone()),
                link_is_collection: false,
            },
            &mappings,
        )?;
        self.finish_custom_condition(join, child, link)
    }

    fn plan_one_to_many(&mut self, scope: &Scope, field: &FieldModel, target: &str) -> OrmResult<()> {
        self.reject_in_embedded(scope, field)?;
        self.check_cycle(target)?;
        let source = self.source;
        let mappings = source.table_mappings(target)?;
        let primary = primary_table(&mappings, target)?;
        let name = self.child_name(scope.alias, &field.name);
        let link = field.link.as_ref();

        let condition = match custom_condition(link) {
            Some(_) => JoinCondition::Custom(Vec::new()),
            None => {
                let (parent_id, parent_table) = self.parent_key(scope.alias)?;
                let fk = link
                    .and_then(|l| l.foreign_link_field.clone())
                    .unwrap_or_else(|| format!("{parent_table}_id"));
                JoinCondition::Equals(vec![(parent_id, ColumnRef::new(&name, fk))])
            }
        };
        let join = self.push_join(primary, &name, condition);
        self.add_collection(scope.alias, field, false);

        let parent = self.aliases[scope.alias].name.clone();
        let child = self.plan_child(
            EntitySpec {
                name,
                type_name: target.to_string(),
                parent: Some(parent),
                link_field: Some(field.name.clone()),
                link_is_collection: true,
            },
            &mappings,
        )?;
        self.finish_custom_condition(join, child, link)
    }

    fn plan_many_to_many(
        &mut self,
        scope: &Scope,
        field: &FieldModel,
        target: &str,
        link_table: &str,
    ) -> OrmResult<()> {
        self.reject_in_embedded(scope, field)?;
        self.check_cycle(target)?;
        let source = self.source;
        let mappings = source.table_mappings(target)?;
        let primary = primary_table(&mappings, target)?;
        let name = self.child_name(scope.alias, &field.name);
        let link = field.link.as_ref();

        let (parent_id, parent_table) = self.parent_key(scope.alias)?;
        let link_alias = format!("{name}__link");
        let owner_column = link
            .and_then(|l| l.owner_column.clone())
            .unwrap_or_else(|| format!("{parent_table}_id"));
        self.joins.push(Join {
            kind: JoinKind::Left,
            table: TableRef {
                schema: None,
                table: link_table.to_string(),
                alias: link_alias.clone(),
            },
            condition: JoinCondition::Equals(vec![(
                parent_id,
                ColumnRef::new(&link_alias, owner_column),
            )]),
        });

        let condition = match custom_condition(link) {
            Some(_) => JoinCondition::Custom(Vec::new()),
            None => {
                let (child_id, child_table) = single_id(&mappings, target)?;
                let foreign_column = link
                    .and_then(|l| l.foreign_column.clone())
                    .unwrap_or_else(|| format!("{child_table}_id"));
                JoinCondition::Equals(vec![(
                    ColumnRef::new(&link_alias, foreign_column),
                    ColumnRef::new(&name, child_id),
                )])
            }
        };
        let join = self.push_join(primary, &name, condition);
        self.add_collection(scope.alias, field, false);

        let parent = self.aliases[scope.alias].name.clone();
        let child = self.plan_child(
            EntitySpec {
                name,
                type_name: target.to_string(),
                parent: Some(parent),
                link_field: Some(field.name.clone()),
                link_is_collection: true,
            },
            &mappings,
        )?;
        self.finish_custom_condition(join, child, link)
    }

    fn plan_value_collection(
        &mut self,
        scope: &Scope,
        field: &FieldModel,
        ty: &ScalarType,
    ) -> OrmResult<()> {
        self.reject_in_embedded(scope, field)?;
        let link = field.link.as_ref();
        let Some(link_table) = link.and_then(|l| l.link_table.clone()) else {
            return Err(OrmError::mapping(
                self.owner_type(scope),
                format!("value collection '{}' needs a link table", field.name),
            ));
        };
        let fetch_column = link
            .and_then(|l| l.fetch_column.clone())
            .unwrap_or_else(|| field.column_name().to_string());
        let name = self.child_name(scope.alias, &field.name);

        let condition = match custom_condition(link) {
            Some(_) => JoinCondition::Custom(Vec::new()),
            None => {
                let (parent_id, parent_table) = self.parent_key(scope.alias)?;
                let owner_column = link
                    .and_then(|l| l.owner_column.clone())
                    .unwrap_or_else(|| format!("{parent_table}_id"));
                JoinCondition::Equals(vec![(parent_id, ColumnRef::new(&name, owner_column))])
            }
        };
        self.joins.push(Join {
            kind: JoinKind::Left,
            table: TableRef {
                schema: None,
                table: link_table,
                alias: name.clone(),
            },
            condition,
        });
        let join = self.joins.len() - 1;
        self.add_collection(scope.alias, field, true);

        let parent = self.aliases[scope.alias].name.clone();
        let idx = self.push_alias(Alias {
            table_alias: name.clone(),
            shape: EntityShape::new(ty.name()),
            is_linked_value: true,
            value_type: Some(ty.clone()),
            ..new_alias(EntitySpec {
                name: name.clone(),
                type_name: ty.name().to_string(),
                parent: Some(parent),
                link_field: Some(field.name.clone()),
                link_is_collection: true,
            })
        })?;
        self.push_select(
            format!("{name}.{LINKED_VALUE_KEY}"),
            ColumnRef::new(&name, fetch_column),
        );
        self.finish_custom_condition(join, idx, link)
    }

    fn plan_embedded(&mut self, scope: &Scope, field: &FieldModel, target: &str) -> OrmResult<()> {
        self.check_cycle(target)?;
        let source = self.source;
        let fields = all_fields(source, target)?;
        let name = self.child_name(scope.alias, &field.name);
        let prefix = format!(
            "{}{}",
            scope.prefix,
            field.embedded_prefix().unwrap_or_default()
        );

        let parent = self.aliases[scope.alias].name.clone();
        let idx = self.push_alias(Alias {
            id_fields: fields.iter().filter(|f| f.id).map(|f| f.name.clone()).collect(),
            table_alias: scope.table_alias.clone(),
            shape: EntityShape::new(target),
            is_embedded: true,
            ..new_alias(EntitySpec {
                name,
                type_name: target.to_string(),
                parent: Some(parent),
                link_field: Some(field.name.clone()),
                link_is_collection: false,
            })
        })?;

        let inner = Scope {
            alias: idx,
            table_alias: scope.table_alias.clone(),
            prefix,
        };
        self.path.push(target.to_string());
        for f in &fields {
            self.plan_field(&inner, f)?;
        }
        self.path.pop();
        Ok(())
    }

    fn plan_child(&mut self, spec: EntitySpec, mappings: &[TableMapping]) -> OrmResult<usize> {
        self.path.push(spec.type_name.clone());
        let idx = self.plan_entity(spec, mappings)?;
        self.path.pop();
        Ok(idx)
    }

    // ==================== Polymorphism ====================

    fn plan_subclasses(
        &mut self,
        idx: usize,
        model: &TypeModel,
        mappings: &[TableMapping],
    ) -> OrmResult<()> {
        let source = self.source;
        let discriminator = self.discriminator_of(&model.qualified_name)?;

        if let Some((column, declaring)) = &discriminator {
            let table_alias = self.table_alias_of(idx, mappings, declaring);
            let key = format!("{}.{column}", self.aliases[idx].name);
            self.push_select(key, ColumnRef::new(table_alias, column.as_str()));
            self.aliases[idx].single_table = Some(SingleTableInheritance {
                column: column.clone(),
                variants: BTreeMap::new(),
            });
        }

        for sub_name in &model.subclasses {
            let sub = source.type_model(sub_name)?;
            if sub.superclass.as_deref() != Some(model.qualified_name.as_str()) {
                return Err(OrmError::mapping(
                    sub_name,
                    format!("listed as a subclass of '{}' but does not extend it", model.qualified_name),
                ));
            }
            let sub_mappings = source.table_mappings(sub_name)?;
            if sub.table.is_some() {
                self.plan_joined_subclass(idx, sub, &sub_mappings, mappings.len())?;
            } else if discriminator.is_some() {
                self.plan_single_table_variant(idx, sub, &sub_mappings)?;
            } else {
                return Err(OrmError::mapping(
                    sub_name,
                    "a subclass without its own table needs a discriminator column on its base",
                ));
            }
        }
        Ok(())
    }

    fn plan_single_table_variant(
        &mut self,
        idx: usize,
        sub: &TypeModel,
        sub_mappings: &[TableMapping],
    ) -> OrmResult<()> {
        let source = self.source;
        let alias_name = self.aliases[idx].name.clone();
        let mut shape = self.aliases[idx].shape.clone();
        shape.type_name = sub.qualified_name.clone();

        if let Some(primary) = sub_mappings.last() {
            for field in &primary.fields {
                if shape.binding(&field.name).is_some() {
                    continue;
                }
                match field.kind() {
                    Some(FieldKind::Scalar(ty)) => {
                        let column = ColumnRef::new(&alias_name, field.column_name());
                        shape.columns.push(ColumnBinding {
                            field: field.name.clone(),
                            column: column.clone(),
                            ty: ty.clone(),
                        });
                        self.push_select(format!("{alias_name}.{}", field.name), column);
                    }
                    Some(FieldKind::Other) => shape.other_field = Some(field.name.clone()),
                    _ => tracing::trace!(
                        target: "relmap.plan",
                        subtype = %sub.qualified_name,
                        field = %field.name,
                        "single-table subtype relation is not fetched"
                    ),
                }
            }
        }

        if let Some(sti) = self.aliases[idx].single_table.as_mut() {
            sti.variants
                .insert(sub.discriminator_value_or_default().to_string(), shape);
        }

        for nested in &sub.subclasses {
            let nested_model = source.type_model(nested)?;
            if nested_model.superclass.as_deref() != Some(sub.qualified_name.as_str()) {
                return Err(OrmError::mapping(
                    nested,
                    format!("listed as a subclass of '{}' but does not extend it", sub.qualified_name),
                ));
            }
            if nested_model.table.is_some() {
                return Err(OrmError::mapping(
                    nested,
                    "a table-per-subclass type cannot extend a single-table subtype",
                ));
            }
            let nested_mappings = source.table_mappings(nested)?;
            self.plan_single_table_variant(idx, nested_model, &nested_mappings)?;
        }
        Ok(())
    }

    fn plan_joined_subclass(
        &mut self,
        base: usize,
        sub: &TypeModel,
        sub_mappings: &[TableMapping],
        base_len: usize,
    ) -> OrmResult<()> {
        let base_alias = self.aliases[base].name.clone();
        let base_ids = self.ids.get(&base).cloned().unwrap_or(EntityIds {
            columns: Vec::new(),
            id_table: None,
        });
        if base_ids.columns.is_empty() {
            return Err(OrmError::mapping(
                &sub.qualified_name,
                "table-per-subclass needs an identifying field on the base",
            ));
        }

        let name = format!("{base_alias}#{}", sub.simple_name);
        let extra = sub_mappings.get(base_len..).unwrap_or_default();
        let last = extra.len().saturating_sub(1);
        let table_aliases: Vec<String> = extra
            .iter()
            .enumerate()
            .map(|(i, m)| {
                if i == last {
                    name.clone()
                } else {
                    format!("{name}__{}", m.table)
                }
            })
            .collect();

        for (m, table_alias) in extra.iter().zip(&table_aliases) {
            let pairs = base_ids
                .columns
                .iter()
                .map(|c| (c.clone(), ColumnRef::new(table_alias, &c.column)))
                .collect();
            self.joins.push(Join {
                kind: JoinKind::Left,
                table: TableRef {
                    schema: m.schema.clone(),
                    table: m.table.clone(),
                    alias: table_alias.clone(),
                },
                condition: JoinCondition::Equals(pairs),
            });
        }

        let id_fields = self.aliases[base].id_fields.clone();
        let base_shape = &self.aliases[base].shape;
        let id_bindings: Vec<ColumnBinding> = id_fields
            .iter()
            .filter_map(|f| base_shape.binding(f))
            .zip(&base_ids.columns)
            .map(|(b, c)| ColumnBinding {
                field: b.field.clone(),
                column: ColumnRef::new(&name, &c.column),
                ty: b.ty.clone(),
            })
            .collect();
        let mut shape = EntityShape::new(&sub.qualified_name);
        shape.other_field = base_shape.other_field.clone();

        let idx = self.push_alias(Alias {
            id_fields,
            table_alias: name.clone(),
            shape,
            is_a_sub_class: true,
            ..new_alias(EntitySpec {
                name: name.clone(),
                type_name: sub.qualified_name.clone(),
                parent: Some(base_alias),
                link_field: None,
                link_is_collection: false,
            })
        })?;
        self.aliases[base].sub_class_aliases.push(name.clone());
        self.ids.insert(
            idx,
            EntityIds {
                columns: base_ids
                    .columns
                    .iter()
                    .map(|c| ColumnRef::new(&name, &c.column))
                    .collect(),
                id_table: base_ids.id_table.clone(),
            },
        );

        for binding in id_bindings {
            let key = format!("{name}.{}", binding.field);
            self.push_select(key, binding.column.clone());
            self.aliases[idx].shape.columns.push(binding);
        }

        self.path.push(sub.qualified_name.clone());
        for (m, table_alias) in extra.iter().zip(&table_aliases) {
            let scope = Scope {
                alias: idx,
                table_alias: table_alias.clone(),
                prefix: String::new(),
            };
            for field in &m.fields {
                if self.aliases[idx].shape.binding(&field.name).is_some() {
                    continue;
                }
                self.plan_field(&scope, field)?;
            }
        }
        self.plan_subclasses(idx, sub, sub_mappings)?;
        self.path.pop();
        Ok(())
    }

    /// Discriminator column and the type declaring it, searching ancestors.
    fn discriminator_of(&self, type_name: &str) -> OrmResult<Option<(String, String)>> {
        Ok(type_chain(self.source, type_name)?.into_iter().find_map(|m| {
            m.discriminator_column
                .clone()
                .map(|c| (c, m.qualified_name.clone()))
        }))
    }

    fn discriminator_filter(
        &self,
        root_type: &str,
        mappings: &[TableMapping],
    ) -> OrmResult<Option<DiscriminatorFilter>> {
        let source = self.source;
        let model = source.type_model(root_type)?;
        if model.table.is_some() {
            return Ok(None);
        }
        let Some((column, declaring)) = self.discriminator_of(root_type)? else {
            return Ok(None);
        };
        let table_alias = self.table_alias_of(0, mappings, &declaring);
        let ty = source.type_model(&declaring)?.discriminator_type.clone();

        let mut values = vec![model.discriminator_value_or_default().to_string()];
        let mut stack: Vec<&str> = model.subclasses.iter().map(String::as_str).collect();
        let mut seen = HashSet::new();
        while let Some(name) = stack.pop() {
            if !seen.insert(name) {
                continue;
            }
            let sub = source.type_model(name)?;
            if sub.table.is_none() {
                values.push(sub.discriminator_value_or_default().to_string());
                stack.extend(sub.subclasses.iter().map(String::as_str));
            }
        }

        Ok(Some(DiscriminatorFilter {
            column: ColumnRef::new(table_alias, column),
            values,
            ty,
        }))
    }

    // ==================== Bookkeeping ====================

    fn push_alias(&mut self, alias: Alias) -> OrmResult<usize> {
        if self.index.contains_key(&alias.name) {
            return Err(OrmError::mapping(
                &alias.result_type,
                format!("alias '{}' is planned twice", alias.name),
            ));
        }
        let idx = self.aliases.len();
        self.index.insert(alias.name.clone(), idx);
        self.aliases.push(alias);
        Ok(idx)
    }

    fn push_select(&mut self, key: String, column: ColumnRef) {
        if self.selected.insert(key.clone()) {
            self.selects.push(SelectField { column, key });
        }
    }

    fn push_join(&mut self, table: &TableMapping, alias: &str, condition: JoinCondition) -> usize {
        self.joins.push(Join {
            kind: JoinKind::Left,
            table: TableRef {
                schema: table.schema.clone(),
                table: table.table.clone(),
                alias: alias.to_string(),
            },
            condition,
        });
        self.joins.len() - 1
    }

    fn add_collection(&mut self, idx: usize, field: &FieldModel, values: bool) {
        self.aliases[idx].shape.collections.push(CollectionField {
            field: field.name.clone(),
            values,
        });
    }

    fn finish_custom_condition(
        &mut self,
        join: usize,
        this: usize,
        link: Option<&LinkSpec>,
    ) -> OrmResult<()> {
        let Some(template) = custom_condition(link) else {
            return Ok(());
        };
        let fragments = {
            let lookup = |name: &str| self.index.get(name).map(|&i| &self.aliases[i]);
            resolve_markers(template, Some(&self.aliases[this]), lookup)?
        };
        self.joins[join].condition = JoinCondition::Custom(fragments);
        Ok(())
    }

    /// `field` under the root, `parent.field` below it.
    fn child_name(&self, parent: usize, field: &str) -> String {
        let parent = &self.aliases[parent];
        if parent.is_root() {
            field.to_string()
        } else {
            format!("{}.{field}", parent.name)
        }
    }

    fn check_cycle(&self, target: &str) -> OrmResult<()> {
        if self.path.iter().any(|t| t == target) {
            let mut chain = self.path.clone();
            chain.push(target.to_string());
            return Err(OrmError::cycle(chain));
        }
        Ok(())
    }

    fn reject_in_embedded(&self, scope: &Scope, field: &FieldModel) -> OrmResult<()> {
        if self.aliases[scope.alias].is_embedded {
            return Err(OrmError::mapping(
                self.owner_type(scope),
                format!(
                    "collection '{}' inside an embedded value is not supported",
                    field.name
                ),
            ));
        }
        Ok(())
    }

    /// The single id column of an entity alias and the table owning it.
    fn parent_key(&self, idx: usize) -> OrmResult<(ColumnRef, String)> {
        let alias = &self.aliases[idx];
        match self.ids.get(&idx) {
            Some(EntityIds {
                columns,
                id_table: Some(table),
            }) if columns.len() == 1 => Ok((columns[0].clone(), table.clone())),
            other => Err(OrmError::mapping(
                &alias.result_type,
                format!(
                    "exactly one identifying field is required to join collections, found {}",
                    other.map_or(0, |ids| ids.columns.len())
                ),
            )),
        }
    }

    fn owner_type(&self, scope: &Scope) -> &str {
        &self.aliases[scope.alias].result_type
    }

    fn table_alias_of(&self, idx: usize, mappings: &[TableMapping], owning_type: &str) -> String {
        let name = &self.aliases[idx].name;
        let last = mappings.len().saturating_sub(1);
        match mappings.iter().position(|m| m.owning_type == owning_type) {
            Some(i) if i != last => format!("{name}__{}", mappings[i].table),
            _ => name.clone(),
        }
    }
}

fn new_alias(spec: EntitySpec) -> Alias {
    Alias {
        name: spec.name.clone(),
        result_type: spec.type_name,
        parent: spec.parent,
        link_field: spec.link_field,
        link_is_collection: spec.link_is_collection,
        id_fields: Vec::new(),
        table_alias: spec.name,
        shape: EntityShape::new(String::new()),
        is_linked_value: false,
        value_type: None,
        is_a_sub_class: false,
        is_embedded: false,
        single_table: None,
        sub_class_aliases: Vec::new(),
    }
}

fn primary_table<'m>(mappings: &'m [TableMapping], type_name: &str) -> OrmResult<&'m TableMapping> {
    mappings
        .last()
        .ok_or_else(|| OrmError::mapping(type_name, "no table in type hierarchy"))
}

fn custom_condition(link: Option<&LinkSpec>) -> Option<&str> {
    link.and_then(|l| l.condition.as_deref())
}

/// Column of the single identifying field and the table declaring it.
fn single_id(mappings: &[TableMapping], type_name: &str) -> OrmResult<(String, String)> {
    let ids: Vec<(&FieldModel, &TableMapping)> = mappings
        .iter()
        .flat_map(|m| m.id_fields().map(move |f| (f, m)))
        .collect();
    match ids.as_slice() {
        [(field, mapping)] => Ok((field.column_name().to_string(), mapping.table.clone())),
        _ => Err(OrmError::mapping(
            type_name,
            format!(
                "exactly one identifying field is required to join it, found {}",
                ids.len()
            ),
        )),
    }
}
