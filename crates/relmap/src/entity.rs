//! Reconstructed entities.
//!
//! An [`Entity`] is the in-memory object produced for one identity: a type name
//! plus named field values. Nested entities are owned; two parents sharing one
//! child identity each hold an equal copy of it.

use crate::error::OrmResult;
use crate::value::Value;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

/// The value stored in one entity field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// A scalar column value (possibly `Null`).
    Value(Value),
    /// A single linked or embedded entity.
    Entity(Box<Entity>),
    /// A collection of linked entities in first-seen order.
    List(Vec<Entity>),
    /// A collection of scalar values fetched through a link table.
    Values(Vec<Value>),
    /// Residual columns no declared field consumed.
    Map(BTreeMap<String, Value>),
}

impl FieldValue {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Value(v) => v.to_json(),
            FieldValue::Entity(e) => e.to_json(),
            FieldValue::List(items) => {
                serde_json::Value::Array(items.iter().map(Entity::to_json).collect())
            }
            FieldValue::Values(values) => {
                serde_json::Value::Array(values.iter().map(Value::to_json).collect())
            }
            FieldValue::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(v: Value) -> Self {
        FieldValue::Value(v)
    }
}

impl From<Entity> for FieldValue {
    fn from(e: Entity) -> Self {
        FieldValue::Entity(Box::new(e))
    }
}

impl From<Vec<Entity>> for FieldValue {
    fn from(items: Vec<Entity>) -> Self {
        FieldValue::List(items)
    }
}

impl From<Vec<Value>> for FieldValue {
    fn from(values: Vec<Value>) -> Self {
        FieldValue::Values(values)
    }
}

/// A reconstructed (or hand-built) object of a mapped type.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    type_name: String,
    fields: BTreeMap<String, FieldValue>,
}

impl Entity {
    /// Create an empty entity of the given qualified type name.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Set a field (builder form).
    pub fn with(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.set(field, value);
        self
    }

    /// Set a scalar field (builder form).
    pub fn with_value(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.set(field, FieldValue::Value(value.into()));
        self
    }

    pub fn set(&mut self, field: &str, value: impl Into<FieldValue>) {
        self.fields.insert(field.to_string(), value.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<FieldValue> {
        self.fields.remove(field)
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Scalar value of a field, if the field holds one.
    pub fn value(&self, field: &str) -> Option<&Value> {
        match self.fields.get(field) {
            Some(FieldValue::Value(v)) => Some(v),
            _ => None,
        }
    }

    /// Linked or embedded entity of a field, if present.
    pub fn entity(&self, field: &str) -> Option<&Entity> {
        match self.fields.get(field) {
            Some(FieldValue::Entity(e)) => Some(e),
            _ => None,
        }
    }

    /// Entity collection of a field, if initialised.
    pub fn list(&self, field: &str) -> Option<&[Entity]> {
        match self.fields.get(field) {
            Some(FieldValue::List(items)) => Some(items),
            _ => None,
        }
    }

    /// Value collection of a field, if initialised.
    pub fn values(&self, field: &str) -> Option<&[Value]> {
        match self.fields.get(field) {
            Some(FieldValue::Values(values)) => Some(values),
            _ => None,
        }
    }

    /// Residual column map of a catch-all field.
    pub fn map(&self, field: &str) -> Option<&BTreeMap<String, Value>> {
        match self.fields.get(field) {
            Some(FieldValue::Map(map)) => Some(map),
            _ => None,
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Render as a JSON object keyed by field name.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// Deserialize into a typed struct through its JSON form.
    ///
    /// # Example
    /// ```ignore
    /// #[derive(serde::Deserialize)]
    /// struct Order { id: i64, order_number: String }
    ///
    /// let order: Order = entity.deserialize()?;
    /// ```
    pub fn deserialize<T: DeserializeOwned>(&self) -> OrmResult<T> {
        Ok(serde_json::from_value(self.to_json())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: i64,
        name: String,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Basket {
        id: i64,
        items: Vec<Item>,
        tags: Vec<String>,
    }

    #[test]
    fn test_deserialize_nested_entity() {
        let basket = Entity::new("Basket")
            .with_value("id", 1i64)
            .with(
                "items",
                vec![Entity::new("Item")
                    .with_value("id", 10i64)
                    .with_value("name", "Widget")],
            )
            .with("tags", vec![Value::from("new")]);

        let typed: Basket = basket.deserialize().unwrap();
        assert_eq!(
            typed,
            Basket {
                id: 1,
                items: vec![Item {
                    id: 10,
                    name: "Widget".into()
                }],
                tags: vec!["new".into()],
            }
        );
    }

    #[test]
    fn test_accessors_match_variant() {
        let e = Entity::new("T").with_value("a", 1i32);
        assert_eq!(e.value("a"), Some(&Value::Int(1)));
        assert!(e.entity("a").is_none());
        assert!(e.list("missing").is_none());
    }
}
