//! Type and field metadata.
//!
//! Everything the planner knows about a mapped type comes from a
//! [`TypeModel`]: its table, its declared fields, its supertype and its
//! polymorphic subtypes. How the metadata is produced (hand-written, generated,
//! loaded from configuration) is left to the [`TypeSource`] implementation;
//! [`TypeRegistry`] is the in-memory one.
//!
//! # Example
//!
//! ```ignore
//! use relmap::meta::{FieldModel, ScalarType, TypeModel, TypeRegistry};
//!
//! let mut registry = TypeRegistry::new();
//! registry.add(
//!     TypeModel::new("shop::Order")
//!         .table("order")
//!         .field(FieldModel::id("id", ScalarType::Int64))
//!         .field(FieldModel::scalar("orderNumber", ScalarType::Text))
//!         .field(FieldModel::collection("lineItems", "shop::LineItem")),
//! );
//! ```

mod field;
mod registry;
mod scalar;

pub use field::{EmbeddedSpec, FieldKind, FieldModel, FieldType, LinkSpec};
pub use registry::{Mapped, TypeRegistry, TypeSource};
pub use scalar::{EnumModel, ScalarType};

/// Table annotation (`@Table(schema, name)`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub schema: Option<String>,
    pub name: String,
}

/// Metadata for one mapped type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeModel {
    pub qualified_name: String,
    pub simple_name: String,
    pub table: Option<TableSpec>,
    pub superclass: Option<String>,
    /// Declared (not inherited) fields, in declaration order.
    pub fields: Vec<FieldModel>,
    /// Declared polymorphic subtypes.
    pub subclasses: Vec<String>,
    /// Discriminator column; set on the base of a single-table hierarchy.
    pub discriminator_column: Option<String>,
    /// Column type of the discriminator (default: text).
    pub discriminator_type: ScalarType,
    /// Discriminator value of this type (default: simple name).
    pub discriminator_value: Option<String>,
}

impl TypeModel {
    /// Create a type with no table and no fields.
    ///
    /// The simple name is the last `::` or `.` separated segment.
    pub fn new(qualified_name: impl Into<String>) -> Self {
        let qualified_name = qualified_name.into();
        let simple_name = qualified_name
            .rsplit(|c: char| c == ':' || c == '.')
            .next()
            .unwrap_or(&qualified_name)
            .to_string();
        Self {
            qualified_name,
            simple_name,
            table: None,
            superclass: None,
            fields: Vec::new(),
            subclasses: Vec::new(),
            discriminator_column: None,
            discriminator_type: ScalarType::Text,
            discriminator_value: None,
        }
    }

    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table = Some(TableSpec {
            schema: None,
            name: name.into(),
        });
        self
    }

    pub fn table_in(mut self, schema: impl Into<String>, name: impl Into<String>) -> Self {
        self.table = Some(TableSpec {
            schema: Some(schema.into()),
            name: name.into(),
        });
        self
    }

    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn field(mut self, field: FieldModel) -> Self {
        self.fields.push(field);
        self
    }

    pub fn subclass(mut self, name: impl Into<String>) -> Self {
        self.subclasses.push(name.into());
        self
    }

    pub fn discriminator(mut self, column: impl Into<String>) -> Self {
        self.discriminator_column = Some(column.into());
        self
    }

    /// Declare a non-text discriminator column, e.g. an integer type code.
    pub fn discriminator_type(mut self, ty: ScalarType) -> Self {
        self.discriminator_type = ty;
        self
    }

    pub fn discriminator_value(mut self, value: impl Into<String>) -> Self {
        self.discriminator_value = Some(value.into());
        self
    }

    /// Two models describe the same type when their qualified names match.
    pub fn is_same_type(&self, other: &TypeModel) -> bool {
        self.qualified_name == other.qualified_name
    }

    pub fn discriminator_value_or_default(&self) -> &str {
        self.discriminator_value
            .as_deref()
            .unwrap_or(&self.simple_name)
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldModel> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The declared catch-all field, if any.
    pub fn other_field(&self) -> Option<&FieldModel> {
        self.fields
            .iter()
            .find(|f| matches!(f.ty, FieldType::Other) && f.is_persistent())
    }
}
