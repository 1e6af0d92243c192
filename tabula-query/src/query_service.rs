use crate::executor::{resolve_timeout, QueryExecutor};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tabula_core::config::QueryConfig;
use tabula_core::{QueryRequest, QueryResult, Result};
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

#[async_trait]
pub trait QueryExecutionService: Send + Sync {
    async fn execute_query(&self, request: QueryRequest) -> Result<QueryResult>;
}

/// Applies configured timeout limits before handing requests to an executor.
pub struct DefaultQueryService {
    executor: Arc<dyn QueryExecutor>,
    default_timeout: Option<Duration>,
    max_timeout: Duration,
}

impl DefaultQueryService {
    pub fn new(executor: Arc<dyn QueryExecutor>, config: &QueryConfig) -> Self {
        Self {
            executor,
            default_timeout: config.default_timeout(),
            max_timeout: config.max_timeout(),
        }
    }
}

#[async_trait]
impl QueryExecutionService for DefaultQueryService {
    async fn execute_query(&self, mut request: QueryRequest) -> Result<QueryResult> {
        request.timeout = resolve_timeout(request.timeout, self.default_timeout, self.max_timeout);

        let execution_id = Uuid::new_v4();
        let span = info_span!("query", %execution_id);
        async {
            debug!(timeout = ?request.timeout, "Executing ad-hoc query");
            match self.executor.execute(&request).await {
                Ok(result) => {
                    info!(
                        rows = result.row_count,
                        elapsed_ms = result.execution_time.as_millis() as u64,
                        "Query completed"
                    );
                    Ok(result)
                }
                Err(e) => {
                    if e.is_validation() {
                        info!(error = %e, "Query rejected");
                    } else {
                        error!(error = %e, "Query failed");
                    }
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }
}
