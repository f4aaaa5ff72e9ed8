//! Execution collaborator.
//!
//! The session never talks to a driver directly: it hands SQL text and
//! [`Value`] parameters to an [`Executor`] and gets [`FlatRow`]s back, keyed
//! by the column labels of the statement (`"order.id"`, ...). Implementations
//! are provided for `tokio_postgres::Client` and `Transaction`; tests plug in
//! an in-memory executor.

use crate::error::{OrmError, OrmResult};
use crate::reconstruct::FlatRow;
use crate::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures_core::Stream;
use futures_util::StreamExt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_postgres::Row;
use tokio_postgres::types::{FromSql, Kind, ToSql, Type};
use uuid::Uuid;

/// Runs statements on behalf of a session.
pub trait Executor: Send + Sync {
    /// Execute a query and return all rows.
    fn query(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = OrmResult<Vec<FlatRow>>> + Send;

    /// Execute a statement and return the number of affected rows.
    fn execute(&self, sql: &str, params: &[Value]) -> impl Future<Output = OrmResult<u64>> + Send;

    /// Execute a query and return its rows incrementally.
    ///
    /// The default implementation buffers [`Executor::query`].
    fn query_stream(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = OrmResult<RowStream>> + Send {
        async move {
            let rows = self.query(sql, params).await?;
            Ok(RowStream::new(futures_util::stream::iter(
                rows.into_iter().map(Ok),
            )))
        }
    }
}

/// A stream of decoded rows.
#[must_use]
pub struct RowStream {
    inner: Pin<Box<dyn Stream<Item = OrmResult<FlatRow>> + Send>>,
}

impl RowStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = OrmResult<FlatRow>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }
}

impl Stream for RowStream {
    type Item = OrmResult<FlatRow>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for RowStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStream").finish_non_exhaustive()
    }
}

fn param_refs(params: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

fn decode_rows(rows: Vec<Row>) -> OrmResult<Vec<FlatRow>> {
    rows.iter().map(decode_row).collect()
}

impl Executor for tokio_postgres::Client {
    async fn query(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<FlatRow>> {
        let rows = tokio_postgres::Client::query(self, sql, &param_refs(params))
            .await
            .map_err(OrmError::from_db_error)?;
        decode_rows(rows)
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        tokio_postgres::Client::execute(self, sql, &param_refs(params))
            .await
            .map_err(OrmError::from_db_error)
    }

    async fn query_stream(&self, sql: &str, params: &[Value]) -> OrmResult<RowStream> {
        let stream = tokio_postgres::Client::query_raw(self, sql, param_refs(params))
            .await
            .map_err(OrmError::from_db_error)?;
        Ok(decoded_stream(stream))
    }
}

impl Executor for tokio_postgres::Transaction<'_> {
    async fn query(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<FlatRow>> {
        let rows = tokio_postgres::Transaction::query(self, sql, &param_refs(params))
            .await
            .map_err(OrmError::from_db_error)?;
        decode_rows(rows)
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        tokio_postgres::Transaction::execute(self, sql, &param_refs(params))
            .await
            .map_err(OrmError::from_db_error)
    }

    async fn query_stream(&self, sql: &str, params: &[Value]) -> OrmResult<RowStream> {
        let stream = tokio_postgres::Transaction::query_raw(self, sql, param_refs(params))
            .await
            .map_err(OrmError::from_db_error)?;
        Ok(decoded_stream(stream))
    }
}

fn decoded_stream(stream: tokio_postgres::RowStream) -> RowStream {
    RowStream::new(stream.map(|row| {
        row.map_err(OrmError::from_db_error)
            .and_then(|row| decode_row(&row))
    }))
}

/// Decode a driver row into a [`FlatRow`] keyed by column label.
pub fn decode_row(row: &Row) -> OrmResult<FlatRow> {
    let mut flat = FlatRow::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode_column(row, idx, column.type_())
            .map_err(|e| OrmError::decode(column.name(), e.to_string()))?;
        flat.insert(column.name(), value);
    }
    Ok(flat)
}

fn decode_column(row: &Row, idx: usize, ty: &Type) -> Result<Value, tokio_postgres::Error> {
    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.into(),
        Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.into(),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.into(),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.into(),
        Type::OID => row.try_get::<_, Option<u32>>(idx)?.into(),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx)?.into(),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.into(),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            row.try_get::<_, Option<String>>(idx)?.into()
        }
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(idx)?.into(),
        Type::UUID => row.try_get::<_, Option<Uuid>>(idx)?.into(),
        Type::DATE => row.try_get::<_, Option<NaiveDate>>(idx)?.into(),
        Type::TIME => row.try_get::<_, Option<NaiveTime>>(idx)?.into(),
        Type::TIMESTAMP => row.try_get::<_, Option<NaiveDateTime>>(idx)?.into(),
        Type::TIMESTAMPTZ => row.try_get::<_, Option<DateTime<Utc>>>(idx)?.into(),
        Type::JSON | Type::JSONB => row.try_get::<_, Option<serde_json::Value>>(idx)?.into(),
        _ => row
            .try_get::<_, Option<RawColumn>>(idx)?
            .map_or(Value::Null, |raw| raw.0),
    };
    Ok(value)
}

/// Fallback decoding for enum labels and types without a dedicated variant.
///
/// Enum labels arrive as UTF-8 text; anything else is kept as raw bytes.
struct RawColumn(Value);

impl<'a> FromSql<'a> for RawColumn {
    fn from_sql(
        ty: &Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        let value = match (ty.kind(), std::str::from_utf8(raw)) {
            (Kind::Enum(_), Ok(label)) => Value::Text(label.to_string()),
            (Kind::Enum(_), Err(e)) => return Err(Box::new(e)),
            _ => Value::Bytes(raw.to_vec()),
        };
        Ok(Self(value))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;

    struct Fixed(Vec<FlatRow>);

    impl Executor for Fixed {
        async fn query(&self, _sql: &str, _params: &[Value]) -> OrmResult<Vec<FlatRow>> {
            Ok(self.0.clone())
        }

        async fn execute(&self, _sql: &str, _params: &[Value]) -> OrmResult<u64> {
            Ok(self.0.len() as u64)
        }
    }

    #[tokio::test]
    async fn test_default_stream_buffers_query() {
        let rows = vec![
            FlatRow::new().with("order.id", 1i64),
            FlatRow::new().with("order.id", 2i64),
        ];
        let exec = Fixed(rows.clone());

        let streamed: Vec<FlatRow> = exec
            .query_stream("SELECT 1", &[])
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(streamed, rows);
    }

    #[test]
    fn test_enum_labels_decode_as_text() {
        let ty = Type::new(
            "status".into(),
            0,
            Kind::Enum(vec!["OPEN".into()]),
            "public".into(),
        );
        let raw = RawColumn::from_sql(&ty, b"OPEN").unwrap();
        assert_eq!(raw.0, Value::Text("OPEN".into()));

        let raw = RawColumn::from_sql(&Type::NUMERIC, &[0, 1]).unwrap();
        assert_eq!(raw.0, Value::Bytes(vec![0, 1]));
    }
}
