//! Runs against a live PostgreSQL when `TABULA_TEST_DATABASE_URL` is set;
//! every test returns early otherwise.

use futures::TryStreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tabula_core::config::DatabaseConfig;
use tabula_core::{ColumnDef, ColumnType, Error, QueryRequest, Row, TableDef, Value};
use tabula_query::{
    AdHocExecutor, DefaultTableService, KeywordPolicy, QueryExecutor, TableDefinitionService,
};
use tabula_storage::{Connection, PgConnection};

const DATABASE_URL_VAR: &str = "TABULA_TEST_DATABASE_URL";

async fn connect(max_connections: u32) -> Option<Arc<PgConnection>> {
    let Ok(url) = std::env::var(DATABASE_URL_VAR) else {
        eprintln!("{} not set, skipping", DATABASE_URL_VAR);
        return None;
    };
    let config = DatabaseConfig {
        url,
        max_connections,
        min_connections: 1,
        ..DatabaseConfig::default()
    };
    Some(Arc::new(PgConnection::connect(&config).await.unwrap()))
}

fn executor(conn: &Arc<PgConnection>) -> AdHocExecutor {
    AdHocExecutor::new(conn.clone(), Arc::new(KeywordPolicy::default()))
}

/// First cell of the first row, read straight off the connection.
async fn single_value(conn: &PgConnection, sql: &str) -> Value {
    let stream = conn.query(sql, None).await.unwrap();
    let rows: Vec<Row> = stream.rows.try_collect().await.unwrap();
    rows[0].get(0).cloned().unwrap()
}

#[tokio::test]
async fn test_decodes_backend_types() {
    let Some(conn) = connect(2).await else { return };

    let sql = "SELECT \
        1::int2 AS small, 2::int8 AS big, 1.5::float8 AS ratio, true AS flag, \
        'x'::text AS label, NULL::int4 AS missing, \
        '1 day'::interval AS span, '127.0.0.1'::inet AS host, '10.0.0.0/8'::cidr AS net, \
        ARRAY[1, NULL, 3] AS ints, ARRAY['a', 'b'] AS words, '12:00+02'::timetz AS noon, \
        'NaN'::numeric AS not_a_number, 1e40::numeric AS huge, 1.5::numeric AS exact, \
        '{\"a\": 1}'::jsonb AS doc, '2024-01-02'::date AS day, \
        'a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11'::uuid AS id, '\\x0102'::bytea AS blob, \
        '<a/>'::xml AS markup, '(1,2)'::point AS spot";
    let result = executor(&conn).execute(&QueryRequest::new(sql)).await.unwrap();
    assert_eq!(result.row_count, 1);

    let row = &result.rows[0];
    let cell = |name: &str| {
        let idx = result.columns.iter().position(|c| c == name).unwrap();
        row.get(idx).cloned().unwrap()
    };

    assert_eq!(cell("small"), Value::Int(1));
    assert_eq!(cell("big"), Value::Int(2));
    assert_eq!(cell("ratio"), Value::Float(1.5));
    assert_eq!(cell("flag"), Value::Bool(true));
    assert_eq!(cell("label"), Value::Text("x".into()));
    assert_eq!(cell("missing"), Value::Null);
    assert_eq!(cell("span"), Value::Text("1 day".into()));
    assert_eq!(cell("host"), Value::Text("127.0.0.1".into()));
    assert_eq!(cell("net"), Value::Text("10.0.0.0/8".into()));
    assert_eq!(cell("ints"), Value::Json(json!([1, null, 3])));
    assert_eq!(cell("words"), Value::Json(json!(["a", "b"])));
    assert_eq!(cell("noon"), Value::Text("12:00:00+02:00".into()));
    assert_eq!(cell("not_a_number"), Value::Text("NaN".into()));
    match cell("huge") {
        Value::Text(text) => assert_eq!(text.parse::<f64>().unwrap(), 1e40),
        other => panic!("unexpected huge numeric: {:?}", other),
    }
    assert_eq!(cell("exact"), Value::Text("1.5".into()));
    assert_eq!(cell("doc"), Value::Json(json!({"a": 1})));
    assert!(matches!(cell("day"), Value::Date(_)));
    assert_eq!(
        cell("id"),
        Value::Text("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11".into())
    );
    assert_eq!(cell("blob"), Value::Bytes(vec![1, 2]));
    assert_eq!(cell("markup"), Value::Text("<a/>".into()));
    assert!(matches!(cell("spot"), Value::Bytes(b) if b.len() == 16));
}

#[tokio::test]
async fn test_zero_rows_report_columns() {
    let Some(conn) = connect(2).await else { return };
    let result = executor(&conn)
        .execute(&QueryRequest::new(
            "SELECT 1 AS one, 'x'::text AS label WHERE false",
        ))
        .await
        .unwrap();
    assert_eq!(result.columns, vec!["one", "label"]);
    assert!(result.rows.is_empty());
}

#[tokio::test]
async fn test_duplicate_table_is_conflict() {
    let Some(conn) = connect(2).await else { return };
    conn.execute("DROP TABLE IF EXISTS pg_dup_accounts").await.unwrap();

    let service = DefaultTableService::new(conn.clone());
    let table = TableDef::new(
        "pg_dup_accounts",
        vec![ColumnDef::new("id", ColumnType::Int).primary_key().auto_increment()],
    );
    service.create_table(&table).await.unwrap();
    assert!(conn.table_exists("pg_dup_accounts").await.unwrap());

    let err = service.create_table(&table).await.unwrap_err();
    assert!(matches!(err, Error::TableExists(name) if name == "pg_dup_accounts"));

    conn.execute("DROP TABLE pg_dup_accounts").await.unwrap();
}

#[tokio::test]
async fn test_mixed_case_duplicate_is_conflict() {
    let Some(conn) = connect(2).await else { return };
    conn.execute("DROP TABLE IF EXISTS ledgeracc").await.unwrap();

    let service = DefaultTableService::new(conn.clone());
    let table = TableDef::new(
        "LedgerAcc",
        vec![ColumnDef::new("id", ColumnType::Int).primary_key()],
    )
    .with_description("Mixed case name");
    service.create_table(&table).await.unwrap();

    // The catalog stores the folded name, so the existence check misses and the
    // CREATE itself reports the duplicate.
    assert!(!conn.table_exists("LedgerAcc").await.unwrap());
    let err = service.create_table(&table).await.unwrap_err();
    assert!(matches!(err, Error::TableExists(name) if name == "LedgerAcc"));

    conn.execute("DROP TABLE ledgeracc").await.unwrap();
}

#[tokio::test]
async fn test_timeout_stops_statement_on_server() {
    // One pooled connection, so the follow-up queries reuse the timed-out one.
    let Some(conn) = connect(1).await else { return };

    let limit = Duration::from_millis(300);
    let err = executor(&conn)
        .execute(&QueryRequest::new("SELECT pg_sleep(4)").with_timeout(limit))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(t) if t == limit));

    tokio::time::sleep(Duration::from_millis(500)).await;
    let still_running = single_value(
        &conn,
        "SELECT count(*) FROM pg_stat_activity \
         WHERE state = 'active' AND query LIKE 'SELECT pg_sleep(4)%'",
    )
    .await;
    assert_eq!(still_running, Value::Int(0));

    let setting = single_value(&conn, "SHOW statement_timeout").await;
    assert_ne!(setting, Value::Text("300ms".into()));
}
