//! Dialect context.
//!
//! Every planner, assembler and session call takes a [`DialectContext`]
//! explicitly. A process-wide default exists for callers that do not thread
//! one through; it is expected to be set once at startup and is swapped
//! last-writer-wins.
//!
//! # Example
//!
//! ```ignore
//! use relmap::config::{Dialect, DialectContext, set_default_context};
//!
//! set_default_context(DialectContext::new().with_dialect(Dialect::MySql));
//! ```

use std::borrow::Cow;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tracing::Level;

/// SQL dialect: identifier quoting and placeholder style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// `"ident"` quoting and `$1, $2, ...` placeholders.
    #[default]
    Postgres,
    /// `` `ident` `` quoting and `?` placeholders.
    MySql,
}

impl Dialect {
    pub fn quote_char(self) -> char {
        match self {
            Dialect::Postgres => '"',
            Dialect::MySql => '`',
        }
    }

    /// Append a quoted identifier, doubling embedded quote characters.
    pub fn write_ident(self, out: &mut String, name: &str) {
        let q = self.quote_char();
        out.push(q);
        for ch in name.chars() {
            if ch == q {
                out.push(q);
            }
            out.push(ch);
        }
        out.push(q);
    }

    pub fn quote_ident(self, name: &str) -> String {
        let mut out = String::with_capacity(name.len() + 2);
        self.write_ident(&mut out, name);
        out
    }

    /// Append the placeholder for the 1-based parameter `index`.
    pub fn write_placeholder(self, out: &mut String, index: usize) {
        match self {
            Dialect::Postgres => {
                out.push('$');
                out.push_str(&index.to_string());
            }
            Dialect::MySql => out.push('?'),
        }
    }

    /// Whether `INSERT ... RETURNING` is available.
    pub fn supports_returning(self) -> bool {
        matches!(self, Dialect::Postgres)
    }
}

/// Configuration threaded through planning, assembly and execution.
#[derive(Debug, Clone)]
pub struct DialectContext {
    pub dialect: Dialect,
    /// Truncate logged SQL (in bytes). `None` logs the full statement.
    pub max_sql_log_length: Option<usize>,
    /// Level of the per-statement `relmap.sql` event.
    pub sql_log_level: Level,
}

impl Default for DialectContext {
    fn default() -> Self {
        Self {
            dialect: Dialect::Postgres,
            max_sql_log_length: Some(200),
            sql_log_level: Level::DEBUG,
        }
    }
}

impl DialectContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Set maximum SQL length to log.
    pub fn max_sql_log_length(mut self, len: usize) -> Self {
        self.max_sql_log_length = Some(len);
        self
    }

    /// Disable SQL truncation in logs.
    pub fn no_truncate(mut self) -> Self {
        self.max_sql_log_length = None;
        self
    }

    pub fn sql_log_level(mut self, level: Level) -> Self {
        self.sql_log_level = level;
        self
    }

    pub(crate) fn truncate_sql<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        match self.max_sql_log_length {
            Some(max) if sql.len() > max => {
                let mut end = max;
                while end > 0 && !sql.is_char_boundary(end) {
                    end -= 1;
                }
                Cow::Owned(format!("{}...", &sql[..end]))
            }
            _ => Cow::Borrowed(sql),
        }
    }
}

fn default_slot() -> &'static RwLock<Arc<DialectContext>> {
    static DEFAULT: OnceLock<RwLock<Arc<DialectContext>>> = OnceLock::new();
    DEFAULT.get_or_init(|| RwLock::new(Arc::new(DialectContext::default())))
}

/// The current process-wide default context.
pub fn default_context() -> Arc<DialectContext> {
    Arc::clone(&default_slot().read().unwrap_or_else(PoisonError::into_inner))
}

/// Replace the process-wide default context.
///
/// Operations already holding the previous context keep using it.
pub fn set_default_context(context: DialectContext) {
    *default_slot().write().unwrap_or_else(PoisonError::into_inner) = Arc::new(context);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoting_per_dialect() {
        assert_eq!(Dialect::Postgres.quote_ident("order"), "\"order\"");
        assert_eq!(Dialect::MySql.quote_ident("order"), "`order`");
        assert_eq!(Dialect::Postgres.quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_placeholders_per_dialect() {
        let mut pg = String::new();
        Dialect::Postgres.write_placeholder(&mut pg, 12);
        assert_eq!(pg, "$12");

        let mut my = String::new();
        Dialect::MySql.write_placeholder(&mut my, 12);
        assert_eq!(my, "?");
    }

    #[test]
    fn test_truncates_on_char_boundary() {
        let ctx = DialectContext::new().max_sql_log_length(4);
        assert_eq!(ctx.truncate_sql("SELÉCT"), "SEL...");
        assert_eq!(ctx.truncate_sql("SEL"), "SEL");
        assert_eq!(DialectContext::new().no_truncate().truncate_sql("SELECT 1"), "SELECT 1");
    }
}
