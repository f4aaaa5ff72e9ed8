//! Flat result rows and their grouping by alias.

use crate::plan::AliasTree;
use crate::value::Value;
use std::collections::{BTreeMap, HashMap};

/// One flattened result row: `"alias.field"` keys in column order.
///
/// # Example
/// ```ignore
/// let row: FlatRow = [
///     ("order.id", Value::Int(1)),
///     ("lineItems.id", Value::Null),
/// ]
/// .into_iter()
/// .collect();
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatRow {
    columns: Vec<(String, Value)>,
}

impl FlatRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            columns: Vec::with_capacity(capacity),
        }
    }

    /// Add a column (builder form).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set a column, replacing an existing one with the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.columns.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for FlatRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = FlatRow::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

/// Values of one alias within one row, keyed by field (or column) name.
pub type AliasValues = BTreeMap<String, Value>;

/// Splits row keys into `(alias, field)` once per distinct key.
///
/// Keys split on their last dot, so `lineItems.product.name` belongs to the
/// alias `lineItems.product`. Keys naming no planned alias are dropped.
#[derive(Debug, Clone)]
pub struct KeyGroups<'t> {
    tree: &'t AliasTree,
    split: HashMap<String, Option<(usize, String)>>,
}

impl<'t> KeyGroups<'t> {
    pub fn new(tree: &'t AliasTree) -> Self {
        Self {
            tree,
            split: HashMap::new(),
        }
    }

    /// Alias name and field of a row key, if it belongs to a planned alias.
    pub fn resolve(&mut self, key: &str) -> Option<(&'t str, &str)> {
        let tree = self.tree;
        self.split_key(key)
            .as_ref()
            .map(|(idx, field)| (tree.aliases()[*idx].name.as_str(), field.as_str()))
    }

    fn split_key(&mut self, key: &str) -> &Option<(usize, String)> {
        if !self.split.contains_key(key) {
            let computed = key.rsplit_once('.').and_then(|(alias, field)| {
                self.tree
                    .alias_index(alias)
                    .map(|idx| (idx, field.to_string()))
            });
            self.split.insert(key.to_string(), computed);
        }
        &self.split[key]
    }

    /// Distinct keys seen so far.
    pub fn len(&self) -> usize {
        self.split.len()
    }

    pub fn is_empty(&self) -> bool {
        self.split.is_empty()
    }

    /// Per-alias values of a row, indexed like [`AliasTree::aliases`].
    ///
    /// An alias whose values are all null (or which has no columns in the
    /// row) comes back empty.
    pub fn group(&mut self, row: &FlatRow) -> Vec<AliasValues> {
        let mut groups = vec![AliasValues::new(); self.tree.aliases().len()];

        for (key, value) in row.iter() {
            if let Some((idx, field)) = self.split_key(key) {
                groups[*idx].insert(field.clone(), value.clone());
            }
        }

        for group in &mut groups {
            if group.values().all(Value::is_null) {
                group.clear();
            }
        }
        groups
    }
}
