//! `{alias.field}` marker resolution.
//!
//! User fragments (join conditions, WHERE/ORDER BY/GROUP BY text) refer to
//! planned aliases with markers:
//!
//! - `{this}` / `{this.field}`: the alias being processed
//! - `{alias}`: the SQL table alias of a planned alias
//! - `{alias.field}`: the column bound to a field of a planned alias
//!
//! A field with no binding falls back to a column of the same name on the
//! alias's primary table.

use super::alias::{Alias, ColumnRef, Fragment};
use crate::error::{OrmError, OrmResult};
use regex::Regex;
use std::sync::OnceLock;

const THIS: &str = "this";

fn marker_re() -> &'static Regex {
    static MARKER_RE: OnceLock<Regex> = OnceLock::new();
    MARKER_RE.get_or_init(|| {
        Regex::new(r"\{([A-Za-z_][A-Za-z0-9_.#]*)\}").expect("invalid built-in marker regex")
    })
}

/// Whether `template` contains any marker.
pub fn has_markers(template: &str) -> bool {
    marker_re().is_match(template)
}

/// Names referenced by the markers of `template`, in order.
pub fn marker_names(template: &str) -> impl Iterator<Item = &str> {
    marker_re()
        .captures_iter(template)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
}

/// Split `template` into raw text and resolved identifiers.
pub fn resolve_markers<'a, F>(
    template: &str,
    this: Option<&'a Alias>,
    lookup: F,
) -> OrmResult<Vec<Fragment>>
where
    F: Fn(&str) -> Option<&'a Alias>,
{
    let mut fragments = Vec::new();
    let mut last = 0;

    for caps in marker_re().captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > last {
            fragments.push(Fragment::Raw(template[last..whole.start()].to_string()));
        }
        fragments.push(resolve_reference(name.as_str(), this, &lookup)?);
        last = whole.end();
    }
    if last < template.len() {
        fragments.push(Fragment::Raw(template[last..].to_string()));
    }
    Ok(fragments)
}

/// Resolve one marker name (without braces).
pub(crate) fn resolve_reference<'a, F>(
    name: &str,
    this: Option<&'a Alias>,
    lookup: &F,
) -> OrmResult<Fragment>
where
    F: Fn(&str) -> Option<&'a Alias>,
{
    let find = |alias_name: &str| {
        if alias_name == THIS {
            this
        } else {
            lookup(alias_name)
        }
    };

    if let Some(alias) = find(name) {
        return Ok(Fragment::Table(alias.table_alias.clone()));
    }

    if let Some((alias_name, field)) = name.rsplit_once('.') {
        if let Some(alias) = find(alias_name) {
            let column = alias
                .column_of(field)
                .cloned()
                .unwrap_or_else(|| ColumnRef::new(alias.table_alias.clone(), field));
            return Ok(Fragment::Column(column));
        }
    }

    Err(OrmError::validation(format!(
        "marker {{{name}}} does not name a planned alias"
    )))
}
