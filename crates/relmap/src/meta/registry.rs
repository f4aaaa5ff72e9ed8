use super::TypeModel;
use crate::error::{OrmError, OrmResult};
use crate::mapping::{TableMapping, resolve_table_mappings};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Source of type metadata for the resolver and the planner.
pub trait TypeSource {
    /// Look up a type by qualified name.
    ///
    /// Unknown names are a mapping error naming the type.
    fn type_model(&self, name: &str) -> OrmResult<&TypeModel>;

    /// Table mappings of a type, root-most table first.
    ///
    /// The default resolves on every call; implementations may cache.
    fn table_mappings(&self, name: &str) -> OrmResult<Arc<Vec<TableMapping>>> {
        resolve_table_mappings(self, name).map(Arc::new)
    }
}

/// A Rust type that describes its own mapping.
///
/// # Example
/// ```ignore
/// #[derive(serde::Deserialize)]
/// struct Tag { id: i64, label: String }
///
/// impl Mapped for Tag {
///     const TYPE_NAME: &'static str = "blog::Tag";
///
///     fn type_model() -> TypeModel {
///         TypeModel::new(Self::TYPE_NAME)
///             .table("tag")
///             .field(FieldModel::id("id", ScalarType::Int64))
///             .field(FieldModel::scalar("label", ScalarType::Text))
///     }
/// }
/// ```
pub trait Mapped {
    const TYPE_NAME: &'static str;

    fn type_model() -> TypeModel;
}

/// In-memory [`TypeSource`] with a table-mapping cache.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<String, TypeModel>,
    mappings: RwLock<HashMap<String, Arc<Vec<TableMapping>>>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a type (builder form).
    pub fn with(mut self, model: TypeModel) -> Self {
        self.add(model);
        self
    }

    /// Add or replace a type. Cached table mappings are dropped.
    pub fn add(&mut self, model: TypeModel) -> &mut Self {
        self.types.insert(model.qualified_name.clone(), model);
        self.mappings
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self
    }

    /// Add the model of a [`Mapped`] type.
    pub fn register<T: Mapped>(&mut self) -> &mut Self {
        self.add(T::type_model())
    }

    pub fn get(&self, name: &str) -> Option<&TypeModel> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeModel> {
        self.types.values()
    }
}

impl TypeSource for TypeRegistry {
    fn type_model(&self, name: &str) -> OrmResult<&TypeModel> {
        self.types
            .get(name)
            .ok_or_else(|| OrmError::mapping(name, "type is not registered"))
    }

    fn table_mappings(&self, name: &str) -> OrmResult<Arc<Vec<TableMapping>>> {
        if let Some(cached) = self
            .mappings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Ok(Arc::clone(cached));
        }

        let resolved = Arc::new(resolve_table_mappings(self, name)?);
        let mut cache = self.mappings.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(cache.entry(name.to_string()).or_insert(resolved)))
    }
}
