use super::row::AliasValues;
use crate::plan::Alias;
use crate::value::Value;

/// Identity of one entity within one alias.
///
/// Ids compare element-wise, so `(1, 23)` and `(12, 3)` never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    /// An alias with identifying fields.
    Ids { alias: String, ids: Vec<Value> },
    /// An alias without identifying fields (embedded values): the value
    /// map within its owning entity is the identity.
    Values {
        alias: String,
        owner: Option<usize>,
        values: AliasValues,
    },
}

impl IdentityKey {
    /// Key of `alias` for the values of one row.
    ///
    /// `owner` is the arena node of the enclosing entity; it only scopes
    /// aliases without identifying fields, so equal embedded values of two
    /// different parents stay distinct.
    pub fn of(alias: &Alias, owner: Option<usize>, values: &AliasValues) -> Self {
        if alias.id_fields.is_empty() {
            return IdentityKey::Values {
                alias: alias.name.clone(),
                owner,
                values: values.clone(),
            };
        }
        IdentityKey::Ids {
            alias: alias.name.clone(),
            ids: alias
                .id_fields
                .iter()
                .map(|f| values.get(f).cloned().unwrap_or_default())
                .collect(),
        }
    }

    pub fn alias(&self) -> &str {
        match self {
            IdentityKey::Ids { alias, .. } | IdentityKey::Values { alias, .. } => alias,
        }
    }
}
