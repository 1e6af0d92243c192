// In-memory scripted backend.
// Serves canned result sets by exact SQL text and tracks CREATE TABLE / COMMENT
// statements, so the engine can be exercised without a database.

use crate::connection::{Connection, RowStream};
use crate::error::{Result, StorageError};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tabula_core::Row;
use tracing::debug;

/// Canned response for one SQL text.
#[derive(Debug, Clone)]
pub struct ScriptedResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Yield an error after this many rows have been produced.
    pub fail_after: Option<usize>,
    /// Yield a statement-cancelled error after this many rows.
    pub cancel_after: Option<usize>,
    /// Sleep before each row, to exercise timeouts.
    pub row_delay: Option<Duration>,
}

impl ScriptedResult {
    pub fn new(columns: Vec<&str>, rows: Vec<Row>) -> Self {
        Self {
            columns: columns.into_iter().map(String::from).collect(),
            rows,
            fail_after: None,
            cancel_after: None,
            row_delay: None,
        }
    }

    pub fn fail_after(mut self, rows: usize) -> Self {
        self.fail_after = Some(rows);
        self
    }

    pub fn cancel_after(mut self, rows: usize) -> Self {
        self.cancel_after = Some(rows);
        self
    }

    pub fn row_delay(mut self, delay: Duration) -> Self {
        self.row_delay = Some(delay);
        self
    }
}

#[derive(Default)]
struct MemoryState {
    tables: HashSet<String>,
    comments: HashMap<String, String>,
    results: HashMap<String, ScriptedResult>,
    executed: Vec<String>,
    /// Successful executes still allowed before the injected failure.
    execute_failure: Option<(usize, StorageError)>,
    fail_next_probe: Option<StorageError>,
}

#[derive(Clone, Default)]
pub struct InMemoryConnection {
    state: Arc<RwLock<MemoryState>>,
    queries: Arc<Mutex<Vec<(String, Option<Duration>)>>>,
    calls: Arc<AtomicUsize>,
}

impl InMemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, name: &str) -> Self {
        self.state.write().tables.insert(name.to_string());
        self
    }

    /// Register the result returned for `sql`.
    pub fn script(&self, sql: &str, result: ScriptedResult) {
        self.state.write().results.insert(sql.to_string(), result);
    }

    /// Make the next `execute` call fail with `err`.
    pub fn fail_next_execute(&self, err: StorageError) {
        self.fail_execute_after(0, err);
    }

    /// Let `succeed` more `execute` calls through, then fail the next with `err`.
    pub fn fail_execute_after(&self, succeed: usize, err: StorageError) {
        self.state.write().execute_failure = Some((succeed, err));
    }

    /// Make the next `table_exists` call fail with `err`.
    pub fn fail_next_probe(&self, err: StorageError) {
        self.state.write().fail_next_probe = Some(err);
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.state.read().tables.contains(name)
    }

    pub fn comment_for(&self, table: &str) -> Option<String> {
        self.state.read().comments.get(table).cloned()
    }

    /// Statements passed to `execute`, in order.
    pub fn executed(&self) -> Vec<String> {
        self.state.read().executed.clone()
    }

    /// Statements passed to `query`, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().iter().map(|(sql, _)| sql.clone()).collect()
    }

    /// Timeouts handed to `query`, in call order.
    pub fn query_timeouts(&self) -> Vec<Option<Duration>> {
        self.queries.lock().iter().map(|(_, timeout)| *timeout).collect()
    }

    /// Total round trips of any kind.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn apply_ddl(state: &mut MemoryState, sql: &str) -> Result<()> {
        let mut words = sql.split_whitespace();
        match (words.next(), words.next()) {
            (Some(w1), Some(w2))
                if w1.eq_ignore_ascii_case("CREATE") && w2.eq_ignore_ascii_case("TABLE") =>
            {
                let name = words
                    .next()
                    .map(|n| n.trim_end_matches('(').to_string())
                    .ok_or_else(|| StorageError::Backend("syntax error at end of input".into()))?;
                if !state.tables.insert(name.clone()) {
                    return Err(StorageError::DuplicateObject(format!(
                        "relation \"{}\" already exists",
                        name
                    )));
                }
            }
            (Some(w1), Some(w2))
                if w1.eq_ignore_ascii_case("COMMENT") && w2.eq_ignore_ascii_case("ON") =>
            {
                // COMMENT ON TABLE <name> IS '<text>'
                let rest: Vec<&str> = words.collect();
                let name = rest
                    .get(1)
                    .ok_or_else(|| StorageError::Backend("syntax error in COMMENT".into()))?;
                if !state.tables.contains(*name) {
                    return Err(StorageError::Backend(format!(
                        "relation \"{}\" does not exist",
                        name
                    )));
                }
                let text = sql
                    .split_once(" IS '")
                    .map(|(_, t)| t.strip_suffix('\'').unwrap_or(t).replace("''", "'"))
                    .unwrap_or_default();
                state.comments.insert(name.to_string(), text);
            }
            _ => {}
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for InMemoryConnection {
    async fn query<'a>(&'a self, sql: &'a str, timeout: Option<Duration>) -> Result<RowStream<'a>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().push((sql.to_string(), timeout));

        let scripted = self
            .state
            .read()
            .results
            .get(sql)
            .cloned()
            .ok_or_else(|| StorageError::Backend(format!("no scripted result for: {}", sql)))?;
        debug!(rows = scripted.rows.len(), "Serving scripted result");

        let ScriptedResult {
            columns,
            rows,
            fail_after,
            cancel_after,
            row_delay,
        } = scripted;
        let stream = futures::stream::iter(rows.into_iter().enumerate()).then(move |(i, row)| async move {
            if let Some(delay) = row_delay {
                tokio::time::sleep(delay).await;
            }
            if cancel_after.is_some_and(|limit| i >= limit) {
                return Err(StorageError::QueryCanceled(
                    "canceling statement due to statement timeout".into(),
                ));
            }
            match fail_after {
                Some(limit) if i >= limit => {
                    Err(StorageError::Backend("connection reset during fetch".into()))
                }
                _ => Ok(row),
            }
        });
        Ok(RowStream::new(columns, stream.boxed()))
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.write();
        match state.execute_failure.take() {
            Some((0, err)) => return Err(err),
            Some((n, err)) => state.execute_failure = Some((n - 1, err)),
            None => {}
        }
        Self::apply_ddl(&mut state, sql)?;
        state.executed.push(sql.to_string());
        Ok(0)
    }

    async fn table_exists(&self, name: &str) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.write();
        if let Some(err) = state.fail_next_probe.take() {
            return Err(err);
        }
        Ok(state.tables.contains(name))
    }
}
