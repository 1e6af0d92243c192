use crate::row::Row;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// An ad-hoc query submitted by a caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    /// Named parameters. Accepted and carried, not bound yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<HashMap<String, serde_json::Value>>,
    /// Bound on the execution round trip, in nanoseconds on the wire.
    /// Zero or absent means no per-request bound.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "nanos::option"
    )]
    pub timeout: Option<Duration>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            params: None,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A fully buffered, schema-free result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    #[serde(rename = "rowCount")]
    pub row_count: u64,
    #[serde(rename = "executionTime", with = "nanos")]
    pub execution_time: Duration,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Row>, execution_time: Duration) -> Self {
        let row_count = rows.len() as u64;
        Self {
            columns,
            rows,
            row_count,
            execution_time,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// `Duration` as an integer count of nanoseconds.
mod nanos {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_nanos(u64::deserialize(d)?))
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
            match d {
                Some(d) => super::serialize(d, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
            Ok(Option::<u64>::deserialize(d)?
                .filter(|n| *n > 0)
                .map(Duration::from_nanos))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::Value;

    #[test]
    fn test_request_wire_format() {
        let req: QueryRequest =
            serde_json::from_str(r#"{"query": "SELECT 1", "timeout": 5000000000}"#).unwrap();
        assert_eq!(req.query, "SELECT 1");
        assert_eq!(req.timeout, Some(Duration::from_secs(5)));
        assert!(req.params.is_none());

        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"query":"SELECT 1","timeout":5000000000}"#);
    }

    #[test]
    fn test_zero_timeout_means_none() {
        let req: QueryRequest =
            serde_json::from_str(r#"{"query": "SELECT 1", "timeout": 0}"#).unwrap();
        assert_eq!(req.timeout, None);
    }

    #[test]
    fn test_params_are_carried() {
        let req: QueryRequest = serde_json::from_str(
            r#"{"query": "SELECT * FROM t WHERE id = :id", "params": {"id": 7}}"#,
        )
        .unwrap();
        let params = req.params.as_ref().unwrap();
        assert_eq!(params["id"], serde_json::json!(7));
        let back: QueryRequest =
            serde_json::from_str(&serde_json::to_string(&req).unwrap()).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn test_result_wire_format() {
        let result = QueryResult::new(
            vec!["id".to_string(), "email".to_string()],
            vec![Row::new(vec![Value::Int(1), Value::from("a@b.c")])],
            Duration::from_millis(3),
        );
        assert_eq!(result.row_count, 1);
        assert_eq!(result.column_index("email"), Some(1));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["rowCount"], 1);
        assert_eq!(json["executionTime"], 3_000_000);
        assert_eq!(json["rows"][0][1], "a@b.c");

        let back: QueryResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }
}
