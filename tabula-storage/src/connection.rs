use crate::error::Result;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::time::Duration;
use tabula_core::Row;

/// Open cursor over a result set.
///
/// `columns` is known before the first row is fetched, so an empty result
/// still reports its shape. Rows arrive in backend cursor order.
pub struct RowStream<'a> {
    pub columns: Vec<String>,
    pub rows: BoxStream<'a, Result<Row>>,
}

impl<'a> RowStream<'a> {
    pub fn new(columns: Vec<String>, rows: BoxStream<'a, Result<Row>>) -> Self {
        Self { columns, rows }
    }

    /// A result with a shape but no rows.
    pub fn empty(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: futures::stream::empty().boxed(),
        }
    }
}

impl std::fmt::Debug for RowStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStream")
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

/// The relational backend as seen by the engine.
///
/// Implementations own pooling and connection-level concurrency. Every call
/// is a single round trip (or, for `query`, one cursor) and is cancelled by
/// dropping its future.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Run a row-returning statement and open a cursor on it.
    ///
    /// With a `timeout` the backend must stop the statement on its side once
    /// the limit passes, not just stop reading from it.
    async fn query<'a>(&'a self, sql: &'a str, timeout: Option<Duration>) -> Result<RowStream<'a>>;

    /// Run a statement for its effect; returns rows affected.
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Probe the catalog for a table with exactly this name.
    async fn table_exists(&self, name: &str) -> Result<bool>;

    /// Cheap liveness check.
    async fn ping(&self) -> Result<()> {
        let mut stream = self.query("SELECT 1", None).await?;
        while let Some(row) = stream.rows.next().await {
            row?;
        }
        Ok(())
    }
}
