//! Field metadata.

use super::scalar::ScalarType;
use crate::entity::{Entity, FieldValue};
use crate::value::Value;

/// The declared type of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// A plain column.
    Scalar(ScalarType),
    /// A single instance of another mapped (or embeddable) type.
    Entity(String),
    /// A collection of entities or scalar values.
    Collection(Box<FieldType>),
    /// Catch-all map receiving columns no declared field consumed.
    Other,
}

/// How a field participates in planning, derived from its type and annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind<'a> {
    Scalar(&'a ScalarType),
    Embedded(&'a str),
    Reference(&'a str),
    Collection(&'a str),
    ValueCollection(&'a ScalarType),
    Other,
}

/// Value-object inlining (`@Embedded`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbeddedSpec {
    /// Column prefix; `None` means `<field>_`.
    pub prefix: Option<String>,
}

/// Relationship overrides (`@Link`).
///
/// Every attribute is optional; the planner infers conventional names for
/// whatever is left unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSpec {
    /// Foreign key column on the owning table for a single reference (default `<field>_id`).
    pub link_field: Option<String>,
    /// Foreign key column on the child table for one-to-many (default `<parentTable>_id`).
    pub foreign_link_field: Option<String>,
    /// Link table for many-to-many and value collections.
    pub link_table: Option<String>,
    /// Link table column referencing the owner (default `<parentTable>_id`).
    pub owner_column: Option<String>,
    /// Link table column referencing the foreign entity (default `<childTable>_id`).
    pub foreign_column: Option<String>,
    /// Link table column fetched directly as the collection value.
    pub fetch_column: Option<String>,
    /// Custom join condition with `{this}` / `{alias.field}` markers.
    pub condition: Option<String>,
}

impl LinkSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link_field(mut self, column: impl Into<String>) -> Self {
        self.link_field = Some(column.into());
        self
    }

    pub fn foreign_link_field(mut self, column: impl Into<String>) -> Self {
        self.foreign_link_field = Some(column.into());
        self
    }

    pub fn link_table(mut self, table: impl Into<String>) -> Self {
        self.link_table = Some(table.into());
        self
    }

    pub fn owner_column(mut self, column: impl Into<String>) -> Self {
        self.owner_column = Some(column.into());
        self
    }

    pub fn foreign_column(mut self, column: impl Into<String>) -> Self {
        self.foreign_column = Some(column.into());
        self
    }

    pub fn fetch_column(mut self, column: impl Into<String>) -> Self {
        self.fetch_column = Some(column.into());
        self
    }

    pub fn condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

/// One declared field of a [`TypeModel`](super::TypeModel).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldModel {
    pub name: String,
    pub ty: FieldType,
    /// Column name override (`@Column(name)`).
    pub column: Option<String>,
    pub id: bool,
    pub transient: bool,
    pub is_static: bool,
    pub embedded: Option<EmbeddedSpec>,
    pub link: Option<LinkSpec>,
}

impl FieldModel {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            column: None,
            id: false,
            transient: false,
            is_static: false,
            embedded: None,
            link: None,
        }
    }

    /// An identifying scalar field.
    pub fn id(name: impl Into<String>, ty: ScalarType) -> Self {
        let mut field = Self::new(name, FieldType::Scalar(ty));
        field.id = true;
        field
    }

    pub fn scalar(name: impl Into<String>, ty: ScalarType) -> Self {
        Self::new(name, FieldType::Scalar(ty))
    }

    /// A single reference to another mapped type.
    pub fn reference(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Entity(type_name.into()))
    }

    /// A collection of another mapped type (one-to-many, or many-to-many with a link table).
    pub fn collection(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldType::Collection(Box::new(FieldType::Entity(type_name.into()))),
        )
    }

    /// A collection of scalar values read from a link table column.
    pub fn value_collection(
        name: impl Into<String>,
        ty: ScalarType,
        link_table: impl Into<String>,
        fetch_column: impl Into<String>,
    ) -> Self {
        let mut field = Self::new(
            name,
            FieldType::Collection(Box::new(FieldType::Scalar(ty))),
        );
        field.link = Some(
            LinkSpec::new()
                .link_table(link_table)
                .fetch_column(fetch_column),
        );
        field
    }

    /// An embedded value object stored in the owner's row.
    pub fn embedded(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let mut field = Self::new(name, FieldType::Entity(type_name.into()));
        field.embedded = Some(EmbeddedSpec::default());
        field
    }

    /// A catch-all field for residual columns.
    pub fn other(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Other)
    }

    // ==================== Builder modifiers ====================

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    pub fn static_field(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn link(mut self, link: LinkSpec) -> Self {
        self.link = Some(link);
        self
    }

    /// Override the embedded column prefix.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.embedded = Some(EmbeddedSpec {
            prefix: Some(prefix.into()),
        });
        self
    }

    // ==================== Queries ====================

    /// Column name (override or field name).
    pub fn column_name(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }

    /// Whether the field is read from and written to the database.
    pub fn is_persistent(&self) -> bool {
        !self.transient && !self.is_static
    }

    pub fn is_collection(&self) -> bool {
        matches!(self.ty, FieldType::Collection(_))
    }

    /// Column prefix applied to an embedded field's columns.
    pub fn embedded_prefix(&self) -> Option<String> {
        self.embedded.as_ref().map(|spec| {
            spec.prefix
                .clone()
                .unwrap_or_else(|| format!("{}_", self.name))
        })
    }

    /// Classify the field for planning. `None` for unsupported shapes
    /// (nested collections, collections of catch-alls).
    pub fn kind(&self) -> Option<FieldKind<'_>> {
        match &self.ty {
            FieldType::Scalar(ty) => Some(FieldKind::Scalar(ty)),
            FieldType::Other => Some(FieldKind::Other),
            FieldType::Entity(name) if self.embedded.is_some() => Some(FieldKind::Embedded(name)),
            FieldType::Entity(name) => Some(FieldKind::Reference(name)),
            FieldType::Collection(inner) => match inner.as_ref() {
                FieldType::Entity(name) => Some(FieldKind::Collection(name)),
                FieldType::Scalar(ty) => Some(FieldKind::ValueCollection(ty)),
                _ => None,
            },
        }
    }

    /// Whether the field needs its own alias (join or embedded recursion).
    pub fn is_relational(&self) -> bool {
        !matches!(
            self.kind(),
            Some(FieldKind::Scalar(_)) | Some(FieldKind::Other) | None
        )
    }

    // ==================== Access ====================

    pub fn get<'e>(&self, entity: &'e Entity) -> Option<&'e FieldValue> {
        entity.get(&self.name)
    }

    pub fn set(&self, entity: &mut Entity, value: impl Into<FieldValue>) {
        entity.set(&self.name, value);
    }

    /// Set a raw column value, coercing it to the field's scalar type.
    pub fn set_value(&self, entity: &mut Entity, value: Value) {
        let value = match &self.ty {
            FieldType::Scalar(ty) => ty.coerce(value),
            _ => value,
        };
        entity.set(&self.name, FieldValue::Value(value));
    }
}
