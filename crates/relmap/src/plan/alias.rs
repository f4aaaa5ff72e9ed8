//! Alias tree types.

use crate::meta::ScalarType;
use crate::value::Value;
use std::collections::{BTreeMap, HashMap};

/// Join type emitted for an alias or one of its tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    pub fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
        }
    }
}

/// A column of one SQL table alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub table_alias: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table_alias: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table_alias: table_alias.into(),
            column: column.into(),
        }
    }
}

/// A piece of a SQL fragment whose identifiers are quoted at assembly time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Raw(String),
    Column(ColumnRef),
    Table(String),
}

/// The `ON` clause of a join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinCondition {
    /// `l1 = r1 AND l2 = r2 ...`
    Equals(Vec<(ColumnRef, ColumnRef)>),
    /// User-supplied condition with markers already resolved.
    Custom(Vec<Fragment>),
}

/// A table in the `FROM` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: Option<String>,
    pub table: String,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: TableRef,
    pub condition: JoinCondition,
}

/// One selected expression, emitted as `<column> AS "<key>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectField {
    pub column: ColumnRef,
    /// Row key, `<alias>.<field>`.
    pub key: String,
}

/// A scalar field read from one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBinding {
    pub field: String,
    pub column: ColumnRef,
    pub ty: ScalarType,
}

/// A declared collection field, initialised empty on construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionField {
    pub field: String,
    /// Scalar values rather than entities.
    pub values: bool,
}

/// What reconstruction needs to know about one concrete type at one alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityShape {
    pub type_name: String,
    pub columns: Vec<ColumnBinding>,
    pub collections: Vec<CollectionField>,
    /// Catch-all field receiving residual columns.
    pub other_field: Option<String>,
}

impl EntityShape {
    pub(crate) fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            columns: Vec::new(),
            collections: Vec::new(),
            other_field: None,
        }
    }

    pub fn binding(&self, field: &str) -> Option<&ColumnBinding> {
        self.columns.iter().find(|c| c.field == field)
    }
}

/// Discriminator-based resolution of a single-table hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleTableInheritance {
    /// Discriminator column, also its key within the alias.
    pub column: String,
    /// Discriminator value to subtype shape.
    pub variants: BTreeMap<String, EntityShape>,
}

/// One node of the query plan and the reconstruction key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    pub name: String,
    pub result_type: String,
    /// `None` for the root.
    pub parent: Option<String>,
    /// Field of the parent this alias fills.
    pub link_field: Option<String>,
    pub link_is_collection: bool,
    /// Identifying field names, also their keys within the alias.
    pub id_fields: Vec<String>,
    /// SQL alias of the primary table holding this alias's identity.
    pub table_alias: String,
    pub shape: EntityShape,
    /// Scalar value collection; the single key is `value`.
    pub is_linked_value: bool,
    pub value_type: Option<ScalarType>,
    /// Table-per-subclass variant, folded into its parent.
    pub is_a_sub_class: bool,
    /// Value object stored in the parent's row.
    pub is_embedded: bool,
    pub single_table: Option<SingleTableInheritance>,
    pub sub_class_aliases: Vec<String>,
}

impl Alias {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Whether `key` (the column part of a row key) belongs to a declared
    /// binding of this alias, in any of its variants.
    pub(crate) fn is_known_key(&self, key: &str) -> bool {
        if self.is_linked_value {
            return key == LINKED_VALUE_KEY;
        }
        if self.shape.binding(key).is_some() {
            return true;
        }
        match &self.single_table {
            Some(sti) => {
                sti.column == key || sti.variants.values().any(|v| v.binding(key).is_some())
            }
            None => false,
        }
    }

    /// Column bound to a field, searching single-table variants too.
    pub fn column_of(&self, field: &str) -> Option<&ColumnRef> {
        if let Some(binding) = self.shape.binding(field) {
            return Some(&binding.column);
        }
        self.single_table.as_ref().and_then(|sti| {
            sti.variants
                .values()
                .find_map(|v| v.binding(field).map(|b| &b.column))
        })
    }
}

/// Restriction applied when the root type is a single-table subtype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscriminatorFilter {
    pub column: ColumnRef,
    /// Discriminator values of the root type and its table-less subtypes.
    pub values: Vec<String>,
    pub ty: ScalarType,
}

impl DiscriminatorFilter {
    /// The values as parameters of the column's type.
    pub fn params(&self) -> impl Iterator<Item = Value> + '_ {
        self.values
            .iter()
            .map(|v| self.ty.coerce(Value::from(v.as_str())))
    }
}

/// Key of the fetched column of a linked-value alias.
pub const LINKED_VALUE_KEY: &str = "value";

/// The complete, immutable plan for one root type.
///
/// Built once by [`plan_query`](super::plan_query) and shared freely between
/// executions; reconstruction state lives elsewhere.
#[derive(Debug, Clone)]
pub struct AliasTree {
    pub(crate) root: String,
    pub(crate) from: TableRef,
    pub(crate) aliases: Vec<Alias>,
    pub(crate) index: HashMap<String, usize>,
    pub(crate) joins: Vec<Join>,
    pub(crate) selects: Vec<SelectField>,
    pub(crate) discriminator_filter: Option<DiscriminatorFilter>,
}

impl AliasTree {
    /// Name of the root alias.
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn root_alias(&self) -> &Alias {
        &self.aliases[0]
    }

    /// Qualified name of the root type.
    pub fn root_type(&self) -> &str {
        &self.aliases[0].result_type
    }

    pub fn from(&self) -> &TableRef {
        &self.from
    }

    /// All aliases, parents before children.
    pub fn aliases(&self) -> &[Alias] {
        &self.aliases
    }

    pub fn alias(&self, name: &str) -> Option<&Alias> {
        self.index.get(name).map(|&i| &self.aliases[i])
    }

    pub(crate) fn alias_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn selects(&self) -> &[SelectField] {
        &self.selects
    }

    pub fn discriminator_filter(&self) -> Option<&DiscriminatorFilter> {
        self.discriminator_filter.as_ref()
    }

    /// Row keys in selection order.
    pub fn select_keys(&self) -> impl Iterator<Item = &str> {
        self.selects.iter().map(|s| s.key.as_str())
    }

    /// The alias a table-per-subclass alias folds into.
    pub(crate) fn base_of<'a>(&'a self, alias: &'a Alias) -> &'a Alias {
        let mut current = alias;
        while current.is_a_sub_class {
            match current.parent.as_deref().and_then(|p| self.alias(p)) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        current
    }
}
