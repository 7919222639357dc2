//! PostgreSQL database provider
//!
//! Concrete implementation using a deadpool-postgres pool over tokio-postgres.

use crate::config::{ConnectionConfig, PoolOptions, SslMode};
use crate::db::Database;
use crate::db::types::{CellValue, ColumnInfo, DataType, Record, to_record};
use crate::error::{DbError, DbResult};
use async_trait::async_trait;
use deadpool_postgres::{Object, Pool, Runtime};
use rust_decimal::Decimal;
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::{CancelToken, Client, NoTls, Row};

/// Pooled PostgreSQL database provider
pub struct PostgresDatabase {
    pool: Pool,
    /// SSL mode (needed to cancel over the right transport)
    ssl_mode: SslMode,
}

impl PostgresDatabase {
    /// Create the pool and check out one connection to prove it works.
    ///
    /// deadpool connects lazily, so without the probe a bad URL would only
    /// surface on the first request.
    pub async fn connect(config: &ConnectionConfig, options: &PoolOptions) -> DbResult<Self> {
        let pg_config = config.pool_config(options);
        let pool = match config.ssl_mode {
            SslMode::Disable => pg_config.create_pool(Some(Runtime::Tokio1), NoTls),
            SslMode::Prefer | SslMode::Require => {
                let tls = tokio_postgres_rustls::MakeRustlsConnect::new(make_tls_config());
                pg_config.create_pool(Some(Runtime::Tokio1), tls)
            }
        }
        .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        let client = pool
            .get()
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
        drop(client);

        Ok(Self {
            pool,
            ssl_mode: config.ssl_mode,
        })
    }

    /// Stop handing out connections and close idle ones
    pub fn close(&self) {
        self.pool.close();
    }

    async fn checkout(&self) -> DbResult<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| DbError::Pool(e.to_string()))
    }
}

#[async_trait]
impl Database for PostgresDatabase {
    async fn list_tables(&self) -> DbResult<Vec<String>> {
        let client = self.checkout().await?;
        let rows = client
            .query(
                "SELECT table_name::text FROM information_schema.tables \
                 WHERE table_schema = 'public' AND table_type = 'BASE TABLE' \
                 ORDER BY table_name",
                &[],
            )
            .await
            .map_err(|e| DbError::SchemaLoadFailed(e.to_string()))?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    async fn table_columns(&self, table: &str) -> DbResult<Vec<ColumnInfo>> {
        let client = self.checkout().await?;
        let rows = client
            .query(
                "SELECT column_name::text, data_type::text, is_nullable::text \
                 FROM information_schema.columns \
                 WHERE table_schema = 'public' AND table_name = $1 \
                 ORDER BY ordinal_position",
                &[&table],
            )
            .await
            .map_err(|e| DbError::SchemaLoadFailed(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|r| {
                let nullable: String = r.get(2);
                ColumnInfo {
                    name: r.get(0),
                    data_type: r.get(1),
                    nullable: nullable == "YES",
                }
            })
            .collect())
    }

    async fn fetch_records(&self, sql: &str) -> DbResult<Vec<Record>> {
        let client = self.checkout().await?;
        let mut guard = InFlightQuery::new(client, self.ssl_mode);
        let result = run_read_only(guard.client_mut()?, sql).await;
        guard.complete();
        result
    }
}

/// Run one statement inside a READ ONLY transaction.
///
/// Preparing the statement also rejects multi-statement input: the
/// extended protocol accepts exactly one command.
async fn run_read_only(client: &mut Client, sql: &str) -> DbResult<Vec<Record>> {
    let tx = client
        .build_transaction()
        .read_only(true)
        .start()
        .await
        .map_err(query_error)?;

    let stmt = tx.prepare(sql).await.map_err(query_error)?;
    let names: Vec<&str> = stmt.columns().iter().map(|c| c.name()).collect();
    let types: Vec<DataType> = stmt
        .columns()
        .iter()
        .map(|c| pg_type_to_datatype(c.type_()))
        .collect();

    let rows = tx.query(&stmt, &[]).await.map_err(query_error)?;

    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
        let values = types
            .iter()
            .enumerate()
            .map(|(i, data_type)| extract_cell_value(row, i, data_type))
            .collect();
        records.push(to_record(names.iter().copied(), values));
    }

    tx.commit().await.map_err(query_error)?;
    Ok(records)
}

/// Keep the engine's own message (e.g. `syntax error at or near "SELEC"`)
/// rather than tokio-postgres' wrapper text.
fn query_error(e: tokio_postgres::Error) -> DbError {
    match e.as_db_error() {
        Some(db) => DbError::QueryFailed(db.message().to_string()),
        None => DbError::QueryFailed(e.to_string()),
    }
}

/// A checked-out connection with a query in flight.
///
/// If the request future is dropped before [`InFlightQuery::complete`],
/// the connection is detached from the pool and a cancel request is sent
/// for the running statement. Detaching means the cancel can never land
/// on another request's query after the connection is reused.
struct InFlightQuery {
    client: Option<Object>,
    cancel_token: CancelToken,
    ssl_mode: SslMode,
    armed: bool,
}

impl InFlightQuery {
    fn new(client: Object, ssl_mode: SslMode) -> Self {
        let cancel_token = client.cancel_token();
        Self {
            client: Some(client),
            cancel_token,
            ssl_mode,
            armed: true,
        }
    }

    fn client_mut(&mut self) -> DbResult<&mut Client> {
        match self.client.as_mut() {
            Some(object) => Ok(&mut ***object),
            None => Err(DbError::Pool("connection already released".to_string())),
        }
    }

    fn complete(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlightQuery {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(object) = self.client.take() {
            drop(Object::take(object));
        }
        // No runtime means the process is shutting down; the server will
        // notice the closed socket on its own.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let token = self.cancel_token.clone();
        let ssl_mode = self.ssl_mode;
        handle.spawn(async move {
            match cancel_query(&token, ssl_mode).await {
                Ok(()) => tracing::debug!("cancelled abandoned query"),
                Err(e) => tracing::warn!("failed to cancel abandoned query: {}", e),
            }
        });
    }
}

/// Send a cancel request for the statement running on the token's backend.
async fn cancel_query(token: &CancelToken, ssl_mode: SslMode) -> DbResult<()> {
    match ssl_mode {
        SslMode::Disable => token.cancel_query(NoTls).await,
        SslMode::Prefer | SslMode::Require => {
            let tls = tokio_postgres_rustls::MakeRustlsConnect::new(make_tls_config());
            token.cancel_query(tls).await
        }
    }
    .map_err(|e| DbError::QueryFailed(format!("Cancel failed: {}", e)))
}

/// Map tokio_postgres Type to our DataType enum
fn pg_type_to_datatype(pg_type: &Type) -> DataType {
    match *pg_type {
        Type::INT2 => DataType::SmallInt,
        Type::INT4 => DataType::Integer,
        Type::INT8 => DataType::BigInt,
        Type::FLOAT4 => DataType::Real,
        Type::FLOAT8 => DataType::Double,
        Type::NUMERIC => DataType::Numeric,
        Type::TEXT | Type::NAME => DataType::Text,
        Type::VARCHAR => DataType::Varchar,
        Type::CHAR | Type::BPCHAR => DataType::Char,
        Type::BOOL => DataType::Boolean,
        Type::DATE => DataType::Date,
        Type::TIME => DataType::Time,
        Type::TIMESTAMP => DataType::Timestamp,
        Type::TIMESTAMPTZ => DataType::TimestampTz,
        Type::INTERVAL => DataType::Interval,
        Type::JSON => DataType::Json,
        Type::JSONB => DataType::Jsonb,
        Type::BYTEA => DataType::Bytea,
        Type::UUID => DataType::Uuid,
        // Array types
        Type::BOOL_ARRAY => DataType::Array(Box::new(DataType::Boolean)),
        Type::INT2_ARRAY => DataType::Array(Box::new(DataType::SmallInt)),
        Type::INT4_ARRAY => DataType::Array(Box::new(DataType::Integer)),
        Type::INT8_ARRAY => DataType::Array(Box::new(DataType::BigInt)),
        Type::FLOAT4_ARRAY => DataType::Array(Box::new(DataType::Real)),
        Type::FLOAT8_ARRAY => DataType::Array(Box::new(DataType::Double)),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY | Type::NAME_ARRAY => {
            DataType::Array(Box::new(DataType::Text))
        }
        Type::UUID_ARRAY => DataType::Array(Box::new(DataType::Uuid)),
        Type::JSONB_ARRAY => DataType::Array(Box::new(DataType::Jsonb)),
        Type::JSON_ARRAY => DataType::Array(Box::new(DataType::Json)),
        Type::NUMERIC_ARRAY => DataType::Array(Box::new(DataType::Numeric)),
        _ => DataType::Unknown(pg_type.name().to_string()),
    }
}

/// Build a rustls ClientConfig that trusts OS certificates (with Mozilla roots as fallback)
fn make_tls_config() -> rustls::ClientConfig {
    let mut root_store = rustls::RootCertStore::empty();

    let native_certs = rustls_native_certs::load_native_certs();
    let mut loaded = 0;
    for cert in native_certs.certs {
        if root_store.add(cert).is_ok() {
            loaded += 1;
        }
    }
    if loaded == 0 {
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}

/// Decode one cell according to its column type.
///
/// A type mismatch falls back to the text representation; `Null` is only
/// returned for actual NULLs.
fn extract_cell_value(row: &Row, idx: usize, data_type: &DataType) -> CellValue {
    use CellValue as C;
    match data_type {
        DataType::SmallInt => decode(row, idx, |v: i16| C::Integer(v.into())),
        DataType::Integer => decode(row, idx, |v: i32| C::Integer(v.into())),
        DataType::BigInt => decode(row, idx, C::Integer),
        DataType::Real => decode(row, idx, |v: f32| C::Float(v.into())),
        DataType::Double => decode(row, idx, C::Float),
        // Text keeps every digit on the way to JSON
        DataType::Numeric => decode(row, idx, |v: Decimal| C::Text(v.to_string())),
        DataType::Boolean => decode(row, idx, C::Boolean),
        DataType::Json | DataType::Jsonb => decode(row, idx, C::Json),
        DataType::Bytea => decode(row, idx, C::Binary),
        DataType::Uuid => decode(row, idx, |v: uuid::Uuid| C::Uuid(v.to_string())),
        DataType::Date => decode(row, idx, |v: chrono::NaiveDate| C::DateTime(v.to_string())),
        DataType::Time => decode(row, idx, |v: chrono::NaiveTime| C::DateTime(v.to_string())),
        DataType::Timestamp => {
            decode(row, idx, |v: chrono::NaiveDateTime| C::DateTime(v.to_string()))
        }
        DataType::TimestampTz => decode(row, idx, |v: chrono::DateTime<chrono::Utc>| {
            C::DateTime(v.to_rfc3339())
        }),
        DataType::Array(inner) => extract_array_value(row, idx, inner),
        // Text types, interval and unknown types
        _ => try_as_string(row, idx),
    }
}

/// Decode an array column element-wise; unmapped element types use text.
fn extract_array_value(row: &Row, idx: usize, inner: &DataType) -> CellValue {
    use CellValue as C;
    match inner {
        DataType::Text | DataType::Varchar | DataType::Char => decode_array(row, idx, C::Text),
        DataType::SmallInt => decode_array(row, idx, |v: i16| C::Integer(v.into())),
        DataType::Integer => decode_array(row, idx, |v: i32| C::Integer(v.into())),
        DataType::BigInt => decode_array(row, idx, C::Integer),
        DataType::Real => decode_array(row, idx, |v: f32| C::Float(v.into())),
        DataType::Double => decode_array(row, idx, C::Float),
        DataType::Numeric => decode_array(row, idx, |v: Decimal| C::Text(v.to_string())),
        DataType::Boolean => decode_array(row, idx, C::Boolean),
        DataType::Json | DataType::Jsonb => decode_array(row, idx, C::Json),
        DataType::Uuid => decode_array(row, idx, |v: uuid::Uuid| C::Uuid(v.to_string())),
        _ => try_as_string(row, idx),
    }
}

fn decode<'a, T, F>(row: &'a Row, idx: usize, wrap: F) -> CellValue
where
    T: FromSql<'a>,
    F: FnOnce(T) -> CellValue,
{
    match row.try_get::<_, Option<T>>(idx) {
        Ok(Some(v)) => wrap(v),
        Ok(None) => CellValue::Null,
        Err(_) => try_as_string(row, idx),
    }
}

fn decode_array<'a, T, F>(row: &'a Row, idx: usize, wrap: F) -> CellValue
where
    T: FromSql<'a>,
    F: Fn(T) -> CellValue,
{
    decode(row, idx, |values: Vec<T>| {
        CellValue::Array(values.into_iter().map(wrap).collect())
    })
}

/// Try to extract a value as a string (fallback for type mismatches).
///
/// When even the string fallback fails, includes the postgres type name
/// in the value so the caller knows what type couldn't be decoded.
fn try_as_string(row: &Row, idx: usize) -> CellValue {
    match row.try_get::<_, Option<String>>(idx) {
        Ok(Some(v)) => CellValue::Text(v),
        Ok(None) => CellValue::Null,
        Err(_) => {
            let type_name = row
                .columns()
                .get(idx)
                .map_or("unknown", |c| c.type_().name());
            CellValue::Text(format!("<unable to decode: {}>", type_name))
        }
    }
}
