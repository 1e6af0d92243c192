// PostgreSQL backend over a sqlx connection pool

use crate::connection::{Connection, RowStream};
use crate::error::{Result, StorageError};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value as JsonValue;
use sqlx::pool::PoolConnection;
use sqlx::postgres::types::{PgInterval, PgTimeTz};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow, PgValueFormat, Postgres};
use sqlx::types::chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::ipnetwork::IpNetwork;
use sqlx::types::BigDecimal;
use sqlx::{Column as _, Executor as _, Row as _, Statement as _, TypeInfo as _, ValueRef as _};
use std::time::Duration;
use tabula_core::config::DatabaseConfig;
use tabula_core::{Row, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const TABLE_EXISTS_SQL: &str =
    "SELECT EXISTS (SELECT FROM information_schema.tables WHERE table_name = $1)";

/// Rows buffered between the fetch task and the consumer.
const ROW_BUFFER: usize = 64;

pub struct PgConnection {
    pool: PgPool,
}

impl PgConnection {
    /// Open a pool sized by `config`.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(&config.url)
            .await
            .map_err(StorageError::from_sqlx)?;
        info!(
            max_connections = config.max_connections,
            "Database connection pool established"
        );
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Connection for PgConnection {
    async fn query<'a>(&'a self, sql: &'a str, timeout: Option<Duration>) -> Result<RowStream<'a>> {
        let mut conn = self.pool.acquire().await.map_err(StorageError::from_sqlx)?;

        // The server aborts the statement itself once the limit passes.
        let armed = match timeout {
            Some(limit) => {
                (&mut *conn)
                    .execute(statement_timeout_sql(limit).as_str())
                    .await
                    .map_err(StorageError::from_sqlx)?;
                true
            }
            None => false,
        };

        // Preparing first gives us the column list even for empty results.
        let prepared = (&mut *conn).prepare(sql).await.map(|statement| {
            statement
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect::<Vec<String>>()
        });
        let columns = match prepared {
            Ok(columns) => columns,
            Err(e) => {
                release(conn, armed).await;
                return Err(StorageError::from_sqlx(e));
            }
        };
        debug!(columns = columns.len(), armed, "Prepared ad-hoc statement");

        let (tx, rx) = mpsc::channel(ROW_BUFFER);
        tokio::spawn(fetch_rows(conn, sql.to_string(), armed, tx));

        let rows = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed();
        Ok(RowStream::new(columns, rows))
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        let done = (&self.pool)
            .execute(sql)
            .await
            .map_err(StorageError::from_sqlx)?;
        Ok(done.rows_affected())
    }

    async fn table_exists(&self, name: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(TABLE_EXISTS_SQL)
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::from_sqlx)?;
        Ok(exists)
    }
}

fn statement_timeout_sql(limit: Duration) -> String {
    // Zero would disable the server-side limit.
    format!("SET statement_timeout = {}", limit.as_millis().max(1))
}

/// Drive the cursor on its own pooled connection and forward decoded rows.
async fn fetch_rows(
    mut conn: PoolConnection<Postgres>,
    sql: String,
    armed: bool,
    tx: mpsc::Sender<Result<Row>>,
) {
    {
        let mut rows = sqlx::query(&sql).fetch(&mut *conn);
        while let Some(fetched) = rows.next().await {
            let item = fetched
                .map_err(StorageError::from_sqlx)
                .and_then(|row| decode_row(&row));
            let failed = item.is_err();
            if tx.send(item).await.is_err() {
                debug!("Row consumer went away; abandoning cursor");
                break;
            }
            if failed {
                break;
            }
        }
    }
    release(conn, armed).await;
}

/// Return a connection to the pool with the session timeout cleared.
async fn release(mut conn: PoolConnection<Postgres>, armed: bool) {
    if !armed {
        return;
    }
    if let Err(e) = (&mut *conn).execute("RESET statement_timeout").await {
        warn!(error = %e, "Failed to reset statement timeout; discarding connection");
        drop(conn.detach());
    }
}

/// Decode every cell of a row by its backend type name.
pub fn decode_row(row: &PgRow) -> Result<Row> {
    let mut values = Vec::with_capacity(row.columns().len());
    for (idx, column) in row.columns().iter().enumerate() {
        let type_name = column.type_info().name();
        let value = decode_cell(row, idx, type_name).map_err(|e| StorageError::Decode {
            column: column.name().to_string(),
            type_name: type_name.to_string(),
            message: e.to_string(),
        })?;
        values.push(value);
    }
    Ok(Row::new(values))
}

fn decode_cell(row: &PgRow, idx: usize, type_name: &str) -> std::result::Result<Value, sqlx::Error> {
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(idx)?.into(),
        "INT2" => row.try_get::<Option<i16>, _>(idx)?.map(i64::from).into(),
        "INT4" => row.try_get::<Option<i32>, _>(idx)?.map(i64::from).into(),
        "INT8" => row.try_get::<Option<i64>, _>(idx)?.into(),
        "OID" => row
            .try_get::<Option<sqlx::postgres::types::Oid>, _>(idx)?
            .map(|oid| i64::from(oid.0))
            .into(),
        "FLOAT4" => row.try_get::<Option<f32>, _>(idx)?.map(f64::from).into(),
        "FLOAT8" => row.try_get::<Option<f64>, _>(idx)?.into(),
        "NUMERIC" => decode_numeric(row, idx)?,
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" | "CITEXT" => {
            row.try_get::<Option<String>, _>(idx)?.into()
        }
        "UUID" => row
            .try_get::<Option<uuid::Uuid>, _>(idx)?
            .map(|u| u.to_string())
            .into(),
        "JSON" | "JSONB" => row
            .try_get::<Option<JsonValue>, _>(idx)?
            .map(Value::Json)
            .unwrap_or(Value::Null),
        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(idx)?
            .map(Value::Bytes)
            .unwrap_or(Value::Null),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(idx)?
            .map(Value::Date)
            .unwrap_or(Value::Null),
        "TIME" => row
            .try_get::<Option<NaiveTime>, _>(idx)?
            .map(|t| t.to_string())
            .into(),
        "TIMETZ" => row
            .try_get::<Option<PgTimeTz<NaiveTime, FixedOffset>>, _>(idx)?
            .map(|t| format!("{}{}", t.time, t.offset))
            .into(),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)?
            .map(Value::Timestamp)
            .unwrap_or(Value::Null),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)?
            .map(Value::TimestampTz)
            .unwrap_or(Value::Null),
        "INTERVAL" => row
            .try_get::<Option<PgInterval>, _>(idx)?
            .map(|i| format_interval(&i))
            .into(),
        "INET" | "CIDR" => row
            .try_get::<Option<IpNetwork>, _>(idx)?
            .map(|n| format_network(&n, type_name == "CIDR"))
            .into(),
        array if array.ends_with("[]") => {
            let element = &array[..array.len() - 2];
            decode_array(row, idx, element).or_else(|_| decode_raw(row, idx))?
        }
        _ => decode_raw(row, idx)?,
    };
    Ok(value)
}

/// NUMERIC goes through `BigDecimal`, except the special values it cannot hold.
fn decode_numeric(row: &PgRow, idx: usize) -> std::result::Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    if matches!(raw.format(), PgValueFormat::Text) {
        let text = raw.as_str().map_err(sqlx::Error::Decode)?;
        return Ok(Value::Text(text.to_string()));
    }
    let bytes = raw.as_bytes().map_err(sqlx::Error::Decode)?;
    if let Some(special) = numeric_special(bytes) {
        return Ok(Value::Text(special.to_string()));
    }
    Ok(row
        .try_get::<Option<BigDecimal>, _>(idx)?
        .map(|d| d.to_string())
        .into())
}

/// Binary NUMERIC header: ndigits, weight, sign, dscale (all 16-bit).
fn numeric_special(bytes: &[u8]) -> Option<&'static str> {
    let sign = bytes.get(4..6)?;
    match u16::from_be_bytes([sign[0], sign[1]]) {
        0xC000 => Some("NaN"),
        0xD000 => Some("Infinity"),
        0xF000 => Some("-Infinity"),
        _ => None,
    }
}

fn decode_array(row: &PgRow, idx: usize, element: &str) -> std::result::Result<Value, sqlx::Error> {
    match element {
        "BOOL" => array::<bool, _>(row, idx, JsonValue::from),
        "INT2" => array::<i16, _>(row, idx, JsonValue::from),
        "INT4" => array::<i32, _>(row, idx, JsonValue::from),
        "INT8" => array::<i64, _>(row, idx, JsonValue::from),
        "FLOAT4" => array::<f32, _>(row, idx, JsonValue::from),
        "FLOAT8" => array::<f64, _>(row, idx, JsonValue::from),
        "NUMERIC" => array::<BigDecimal, _>(row, idx, |d| JsonValue::from(d.to_string())),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => array::<String, _>(row, idx, JsonValue::from),
        "UUID" => array::<uuid::Uuid, _>(row, idx, |u| JsonValue::from(u.to_string())),
        "JSON" | "JSONB" => array::<JsonValue, _>(row, idx, |v| v),
        "DATE" => array::<NaiveDate, _>(row, idx, |d| JsonValue::from(d.to_string())),
        "TIMESTAMP" => array::<NaiveDateTime, _>(row, idx, |t| JsonValue::from(t.to_string())),
        "TIMESTAMPTZ" => array::<DateTime<Utc>, _>(row, idx, |t| JsonValue::from(t.to_rfc3339())),
        other => Err(sqlx::Error::Decode(
            format!("no array decoder for element type {}", other).into(),
        )),
    }
}

/// One-dimensional array as a JSON array, NULL elements kept.
fn array<T, F>(row: &PgRow, idx: usize, to_json: F) -> std::result::Result<Value, sqlx::Error>
where
    Vec<Option<T>>: for<'r> sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
    F: Fn(T) -> JsonValue,
{
    let items = row.try_get::<Option<Vec<Option<T>>>, _>(idx)?;
    Ok(match items {
        None => Value::Null,
        Some(items) => Value::Json(JsonValue::Array(
            items
                .into_iter()
                .map(|item| item.map_or(JsonValue::Null, &to_json))
                .collect(),
        )),
    })
}

/// Types without a dedicated decoder: text when the payload reads as text,
/// raw bytes otherwise.
fn decode_raw(row: &PgRow, idx: usize) -> std::result::Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let bytes = raw.as_bytes().map_err(sqlx::Error::Decode)?;
    Ok(match std::str::from_utf8(bytes) {
        Ok(text) if !text.chars().any(|c| c.is_control() && !c.is_whitespace()) => {
            Value::Text(text.to_string())
        }
        _ => Value::Bytes(bytes.to_vec()),
    })
}

/// Render an interval the way PostgreSQL's default output style does.
fn format_interval(interval: &PgInterval) -> String {
    fn unit(n: i64, name: &str) -> String {
        if n == 1 {
            format!("{} {}", n, name)
        } else {
            format!("{} {}s", n, name)
        }
    }

    let mut parts = Vec::new();
    let years = i64::from(interval.months / 12);
    let months = i64::from(interval.months % 12);
    if years != 0 {
        parts.push(unit(years, "year"));
    }
    if months != 0 {
        parts.push(unit(months, "mon"));
    }
    if interval.days != 0 {
        parts.push(unit(i64::from(interval.days), "day"));
    }
    if interval.microseconds != 0 || parts.is_empty() {
        let sign = if interval.microseconds < 0 { "-" } else { "" };
        let micros = interval.microseconds.unsigned_abs();
        let secs = micros / 1_000_000;
        let mut time = format!(
            "{}{:02}:{:02}:{:02}",
            sign,
            secs / 3600,
            secs / 60 % 60,
            secs % 60
        );
        let fraction = micros % 1_000_000;
        if fraction != 0 {
            let digits = format!("{:06}", fraction);
            time.push('.');
            time.push_str(digits.trim_end_matches('0'));
        }
        parts.push(time);
    }
    parts.join(" ")
}

/// INET hides a full-length prefix; CIDR always shows it.
fn format_network(network: &IpNetwork, cidr: bool) -> String {
    let host_prefix = if network.is_ipv4() { 32 } else { 128 };
    if !cidr && network.prefix() == host_prefix {
        network.ip().to_string()
    } else {
        network.to_string()
    }
}
