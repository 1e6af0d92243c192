use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

const IDENTIFIER_PATTERN: &str = "^[A-Za-z][A-Za-z0-9_]*$";

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(IDENTIFIER_PATTERN).expect("identifier pattern compiles"))
}

/// Why a string was refused as an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    Empty,
    Invalid(String),
}

impl fmt::Display for IdentifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentifierError::Empty => write!(f, "identifier is empty"),
            IdentifierError::Invalid(s) => write!(f, "invalid identifier: {}", s),
        }
    }
}

impl std::error::Error for IdentifierError {}

/// A table or column name known to match `^[A-Za-z][A-Za-z0-9_]*$`.
///
/// The only way to obtain one is [`Identifier::parse`], so anything holding an
/// `Identifier` can splice it into SQL text unquoted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub fn parse(name: &str) -> Result<Self, IdentifierError> {
        if name.is_empty() {
            return Err(IdentifierError::Empty);
        }
        if !identifier_regex().is_match(name) {
            return Err(IdentifierError::Invalid(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Identifier::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Logical column type accepted in table definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ColumnType {
    Varchar,
    Text,
    Int,
    BigInt,
    Float,
    Double,
    Boolean,
    Date,
    Timestamp,
    Json,
}

impl ColumnType {
    pub const ALL: [ColumnType; 10] = [
        ColumnType::Varchar,
        ColumnType::Text,
        ColumnType::Int,
        ColumnType::BigInt,
        ColumnType::Float,
        ColumnType::Double,
        ColumnType::Boolean,
        ColumnType::Date,
        ColumnType::Timestamp,
        ColumnType::Json,
    ];

    /// Backend (PostgreSQL) type token used in DDL.
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Varchar => "varchar",
            ColumnType::Text => "text",
            ColumnType::Int => "integer",
            ColumnType::BigInt => "bigint",
            ColumnType::Float => "float",
            ColumnType::Double => "double precision",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Json => "jsonb",
        }
    }

    pub fn logical_name(&self) -> &'static str {
        match self {
            ColumnType::Varchar => "VARCHAR",
            ColumnType::Text => "TEXT",
            ColumnType::Int => "INT",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Float => "FLOAT",
            ColumnType::Double => "DOUBLE",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Date => "DATE",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Json => "JSON",
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, ColumnType::Int | ColumnType::BigInt)
    }

    /// Whether a declared length is emitted as `(<length>)`.
    pub fn takes_length(&self) -> bool {
        matches!(self, ColumnType::Varchar)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.logical_name())
    }
}

impl FromStr for ColumnType {
    type Err = String;

    /// Accepts the logical name in any case, or the backend token itself.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        ColumnType::ALL
            .into_iter()
            .find(|t| {
                t.logical_name().eq_ignore_ascii_case(needle)
                    || t.sql_type().eq_ignore_ascii_case(needle)
            })
            .ok_or_else(|| format!("Unknown column type: {}", s))
    }
}

impl TryFrom<String> for ColumnType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ColumnType> for String {
    fn from(value: ColumnType) -> Self {
        value.logical_name().to_string()
    }
}
