use crate::validator::QueryValidator;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Duration;
use tabula_core::{Error, QueryRequest, QueryResult, Result, Row};
use tabula_storage::{Connection, RowStream, StorageError};
use tokio::time::Instant;
use tracing::debug;

/// Lazily fetched result set.
pub struct QueryStream<'a> {
    pub columns: Vec<String>,
    pub rows: BoxStream<'a, Result<Row>>,
}

impl std::fmt::Debug for QueryStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryStream")
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run a query and buffer every row.
    async fn execute(&self, request: &QueryRequest) -> Result<QueryResult>;

    /// Run a query and hand back its rows one at a time. The request timeout
    /// bounds the whole life of the stream.
    async fn execute_stream<'a>(&'a self, request: &'a QueryRequest) -> Result<QueryStream<'a>>;
}

pub struct AdHocExecutor {
    connection: Arc<dyn Connection>,
    validator: Arc<dyn QueryValidator>,
}

impl AdHocExecutor {
    pub fn new(connection: Arc<dyn Connection>, validator: Arc<dyn QueryValidator>) -> Self {
        Self {
            connection,
            validator,
        }
    }
}

#[async_trait]
impl QueryExecutor for AdHocExecutor {
    async fn execute(&self, request: &QueryRequest) -> Result<QueryResult> {
        let started = Instant::now();
        let QueryStream { columns, rows } = self.execute_stream(request).await?;
        let rows: Vec<Row> = rows.try_collect().await?;
        Ok(QueryResult::new(columns, rows, started.elapsed()))
    }

    async fn execute_stream<'a>(&'a self, request: &'a QueryRequest) -> Result<QueryStream<'a>> {
        self.validator.validate(&request.query)?;
        debug!(query = %request.query, "Query passed safety policy");

        let deadline = request
            .timeout
            .filter(|t| !t.is_zero())
            .map(|limit| (Instant::now() + limit, limit));

        let limit = deadline.map(|(_, limit)| limit);
        let open = self.connection.query(&request.query, limit);
        let opened = match deadline {
            Some((at, limit)) => tokio::time::timeout_at(at, open)
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => open.await,
        };
        let RowStream { columns, rows } =
            opened.map_err(|e| storage_failure(e, "Query execution failed", limit))?;

        let width = columns.len();
        let rows = stream::unfold((rows, false), move |(mut rows, finished)| async move {
            if finished {
                return None;
            }
            let next = match deadline {
                Some((at, limit)) => match tokio::time::timeout_at(at, rows.next()).await {
                    Ok(next) => next,
                    Err(_) => return Some((Err(Error::Timeout(limit)), (rows, true))),
                },
                None => rows.next().await,
            };
            let Some(fetched) = next else {
                return None;
            };
            let item = scan(fetched, width, limit);
            let failed = item.is_err();
            Some((item, (rows, failed)))
        })
        .boxed();

        Ok(QueryStream { columns, rows })
    }
}

fn scan(fetched: tabula_storage::Result<Row>, width: usize, limit: Option<Duration>) -> Result<Row> {
    match fetched {
        Ok(row) if row.len() == width => Ok(row),
        Ok(row) => Err(StorageError::RowWidth {
            expected: width,
            actual: row.len(),
        }
        .into_internal("Failed to scan row")),
        Err(e @ StorageError::Decode { .. }) => Err(e.into_internal("Failed to scan row")),
        Err(e) => Err(storage_failure(e, "Error during row iteration", limit)),
    }
}

/// A backend cancellation under a limit is that limit expiring server-side.
fn storage_failure(err: StorageError, context: &str, limit: Option<Duration>) -> Error {
    match (err, limit) {
        (StorageError::QueryCanceled(_), Some(limit)) => Error::Timeout(limit),
        (err, _) => err.into_internal(context),
    }
}

/// Effective timeout for a request: its own, else `default`, never above `max`.
pub fn resolve_timeout(
    requested: Option<Duration>,
    default: Option<Duration>,
    max: Duration,
) -> Option<Duration> {
    requested
        .filter(|t| !t.is_zero())
        .or(default)
        .map(|t| t.min(max))
}
