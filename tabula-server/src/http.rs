// HTTP routes for table definition and ad-hoc queries

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tabula_core::config::QueryConfig;
use tabula_core::{Error, ErrorKind, QueryRequest, TableDef};
use tabula_query::{
    AdHocExecutor, DefaultQueryService, DefaultTableService, KeywordPolicy,
    QueryExecutionService, TableDefinitionService,
};
use tabula_storage::Connection;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

#[derive(Clone)]
pub struct ApiState {
    pub tables: Arc<dyn TableDefinitionService>,
    pub queries: Arc<dyn QueryExecutionService>,
    pub connection: Arc<dyn Connection>,
}

impl ApiState {
    /// Wire the default services over one shared connection.
    pub fn new(connection: Arc<dyn Connection>, config: &QueryConfig) -> Self {
        let policy = Arc::new(KeywordPolicy::from_config(config));
        let executor = Arc::new(AdHocExecutor::new(connection.clone(), policy));
        Self {
            tables: Arc::new(DefaultTableService::new(connection.clone())),
            queries: Arc::new(DefaultQueryService::new(executor, config)),
            connection,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct TableCreatedResponse {
    pub message: String,
    pub table: TableDef,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Engine error rendered as `{error, code}`.
///
/// Internal failures only expose their context; the cause goes to the log.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = match kind {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &self.0 {
            Error::Internal { context, .. } => {
                error!(error = %self.0, "Request failed");
                context.clone()
            }
            other => other.to_string(),
        };
        let body = Json(ErrorResponse {
            error: message,
            code: kind.code().to_string(),
        });
        (status, body).into_response()
    }
}

fn invalid_body(rejection: JsonRejection) -> Response {
    warn!(reason = %rejection.body_text(), "Rejected request body");
    let body = Json(ErrorResponse {
        error: "Invalid request body".to_string(),
        code: ErrorKind::Validation.code().to_string(),
    });
    (StatusCode::BAD_REQUEST, body).into_response()
}

/// Create HTTP router with all API routes
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/health/db", get(db_health_handler))
        .route("/api/v1/tables", post(create_table_handler))
        .route("/api/v1/query", post(execute_query_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        error: None,
    })
}

async fn db_health_handler(State(state): State<ApiState>) -> Response {
    match state.connection.ping().await {
        Ok(()) => Json(HealthResponse {
            status: "ok".to_string(),
            error: None,
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, "Database health check failed");
            let body = Json(HealthResponse {
                status: "unavailable".to_string(),
                error: Some("Database health check failed".to_string()),
            });
            (StatusCode::SERVICE_UNAVAILABLE, body).into_response()
        }
    }
}

async fn create_table_handler(
    State(state): State<ApiState>,
    payload: Result<Json<TableDef>, JsonRejection>,
) -> Response {
    let Json(table) = match payload {
        Ok(table) => table,
        Err(rejection) => return invalid_body(rejection),
    };

    match state.tables.create_table(&table).await {
        Ok(created) => {
            let body = Json(TableCreatedResponse {
                message: "Table created successfully".to_string(),
                table: created.to_def(),
            });
            (StatusCode::CREATED, body).into_response()
        }
        Err(e) => ApiError(e).into_response(),
    }
}

async fn execute_query_handler(
    State(state): State<ApiState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(request) => request,
        Err(rejection) => return invalid_body(rejection),
    };

    match state.queries.execute_query(request).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}
