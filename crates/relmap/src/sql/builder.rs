use crate::config::Dialect;
use crate::error::{OrmError, OrmResult};
use crate::plan::Fragment;
use crate::value::Value;

#[derive(Debug, Clone)]
enum SqlPart {
    Raw(String),
    Param,
}

/// A built statement: SQL text plus positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// A parameter-safe SQL builder for one dialect.
///
/// Stores SQL pieces and parameters separately; placeholders (`$1, $2, ...`
/// or `?`) are generated when the statement is built.
///
/// # Example
/// ```ignore
/// let mut sql = SqlBuilder::new(Dialect::Postgres);
/// sql.push("SELECT * FROM ").push_ident("order").push(" WHERE ");
/// sql.push_ident("id").push(" = ").push_bind(1i64);
/// let stmt = sql.build()?;
/// assert_eq!(stmt.sql, r#"SELECT * FROM "order" WHERE "id" = $1"#);
/// ```
#[must_use]
#[derive(Debug, Clone)]
pub struct SqlBuilder {
    dialect: Dialect,
    parts: Vec<SqlPart>,
    params: Vec<Value>,
}

impl SqlBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            parts: Vec::new(),
            params: Vec::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Append raw SQL (no parameters).
    pub fn push(&mut self, sql: &str) -> &mut Self {
        if sql.is_empty() {
            return self;
        }
        match self.parts.last_mut() {
            Some(SqlPart::Raw(last)) => last.push_str(sql),
            _ => self.parts.push(SqlPart::Raw(sql.to_string())),
        }
        self
    }

    /// Append a parameter placeholder and bind its value.
    pub fn push_bind(&mut self, value: impl Into<Value>) -> &mut Self {
        self.parts.push(SqlPart::Param);
        self.params.push(value.into());
        self
    }

    /// Append a comma-separated list of placeholders.
    ///
    /// An empty list appends `NULL`.
    pub fn push_bind_list<I>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let mut iter = values.into_iter();
        let Some(first) = iter.next() else {
            return self.push("NULL");
        };
        self.push_bind(first);
        for v in iter {
            self.push(", ");
            self.push_bind(v);
        }
        self
    }

    /// Append a quoted identifier.
    pub fn push_ident(&mut self, name: &str) -> &mut Self {
        let dialect = self.dialect;
        let mut quoted = String::with_capacity(name.len() + 2);
        dialect.write_ident(&mut quoted, name);
        self.push(&quoted)
    }

    /// Append `"table_alias"."column"`.
    pub fn push_column(&mut self, table_alias: &str, column: &str) -> &mut Self {
        self.push_ident(table_alias).push(".").push_ident(column)
    }

    /// Append an optionally schema-qualified table name.
    pub fn push_table(&mut self, schema: Option<&str>, table: &str) -> &mut Self {
        if let Some(schema) = schema {
            self.push_ident(schema).push(".");
        }
        self.push_ident(table)
    }

    /// Append resolved fragments, binding one parameter per `?` in raw text.
    pub(crate) fn push_fragments(
        &mut self,
        fragments: &[Fragment],
        params: &mut impl Iterator<Item = Value>,
    ) -> OrmResult<&mut Self> {
        for fragment in fragments {
            match fragment {
                Fragment::Raw(text) => {
                    let mut pieces = text.split('?');
                    if let Some(first) = pieces.next() {
                        self.push(first);
                    }
                    for piece in pieces {
                        let value = params.next().ok_or_else(|| {
                            OrmError::validation("fragment has more `?` placeholders than parameters")
                        })?;
                        self.push_bind(value);
                        self.push(piece);
                    }
                }
                Fragment::Column(c) => {
                    self.push_column(&c.table_alias, &c.column);
                }
                Fragment::Table(alias) => {
                    self.push_ident(alias);
                }
            }
        }
        Ok(self)
    }

    /// Append another builder, consuming it.
    pub fn push_sql(&mut self, mut other: SqlBuilder) -> &mut Self {
        self.parts.append(&mut other.parts);
        self.params.append(&mut other.params);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Render SQL with dialect placeholders.
    pub fn to_sql(&self) -> String {
        let cap = self
            .parts
            .iter()
            .map(|p| match p {
                SqlPart::Raw(s) => s.len(),
                SqlPart::Param => 4,
            })
            .sum();
        let mut out = String::with_capacity(cap);
        let mut idx = 0;
        for part in &self.parts {
            match part {
                SqlPart::Raw(s) => out.push_str(s),
                SqlPart::Param => {
                    idx += 1;
                    self.dialect.write_placeholder(&mut out, idx);
                }
            }
        }
        out
    }

    fn validate(&self) -> OrmResult<()> {
        let placeholder_count = self
            .parts
            .iter()
            .filter(|p| matches!(p, SqlPart::Param))
            .count();

        if placeholder_count != self.params.len() {
            let params_len = self.params.len();
            return Err(OrmError::Validation(format!(
                "SqlBuilder: placeholders({placeholder_count}) != params({params_len})"
            )));
        }
        Ok(())
    }

    /// Finish into a [`Statement`].
    pub fn build(self) -> OrmResult<Statement> {
        self.validate()?;
        Ok(Statement {
            sql: self.to_sql(),
            params: self.params,
        })
    }
}
