use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tabula_core::config::{MatchMode, QueryConfig};
use tabula_core::{Row, Value};
use tabula_server::{create_router, ApiState};
use tabula_storage::{InMemoryConnection, ScriptedResult};
use tower::ServiceExt;

fn app(conn: &InMemoryConnection, config: &QueryConfig) -> Router {
    create_router(ApiState::new(Arc::new(conn.clone()), config))
}

async fn post(app: Router, uri: &str, body: JsonValue) -> (StatusCode, JsonValue) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_create_then_query() {
    let conn = InMemoryConnection::new();
    let config = QueryConfig::default();

    let (status, body) = post(
        app(&conn, &config),
        "/api/v1/tables",
        json!({
            "name": "accounts",
            "columns": [
                {"name": "id", "type": "INT", "primary_key": true, "auto_increment": true},
                {"name": "email", "type": "VARCHAR", "length": 255, "not_null": true, "unique": true}
            ]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["table"]["columns"][0]["auto_increment"], true);
    assert_eq!(
        conn.executed(),
        vec!["CREATE TABLE accounts (\n  id SERIAL PRIMARY KEY,\n  email varchar(255) NOT NULL UNIQUE\n)"]
    );

    conn.script(
        "SELECT id, email FROM accounts",
        ScriptedResult::new(
            vec!["id", "email"],
            vec![Row::new(vec![Value::Int(1), Value::Text("a@example.com".into())])],
        ),
    );
    let (status, body) = post(
        app(&conn, &config),
        "/api/v1/query",
        json!({"query": "SELECT id, email FROM accounts", "timeout": 5_000_000_000u64}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rowCount"], 1);
    assert_eq!(body["rows"][0][1], "a@example.com");
}

#[tokio::test]
async fn test_unknown_column_type_is_bad_request() {
    let conn = InMemoryConnection::new();
    let (status, body) = post(
        app(&conn, &QueryConfig::default()),
        "/api/v1/tables",
        json!({
            "name": "accounts",
            "columns": [{"name": "id", "type": "SERIAL", "primary_key": true}]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request body");
    assert_eq!(conn.call_count(), 0);
}

#[tokio::test]
async fn test_validation_error_body() {
    let conn = InMemoryConnection::new();
    let (status, body) = post(
        app(&conn, &QueryConfig::default()),
        "/api/v1/tables",
        json!({"name": "accounts", "columns": []}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({"error": "At least one column is required", "code": "VALIDATION"})
    );
}

#[tokio::test]
async fn test_configured_policy_is_used() {
    let conn = InMemoryConnection::new();
    let sql = "SELECT updated_at FROM accounts";
    conn.script(sql, ScriptedResult::new(vec!["updated_at"], vec![]));

    let (status, _) = post(
        app(&conn, &QueryConfig::default()),
        "/api/v1/query",
        json!({"query": sql}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let token_config = QueryConfig {
        match_mode: MatchMode::Token,
        ..QueryConfig::default()
    };
    let (status, body) = post(app(&conn, &token_config), "/api/v1/query", json!({"query": sql})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["columns"], json!(["updated_at"]));
    assert_eq!(body["rows"], json!([]));
}

#[tokio::test]
async fn test_backend_failure_is_internal() {
    let conn = InMemoryConnection::new();
    let (status, body) = post(
        app(&conn, &QueryConfig::default()),
        "/api/v1/query",
        json!({"query": "SELECT * FROM nowhere"}),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Query execution failed");
    assert_eq!(body["code"], "INTERNAL");
}
