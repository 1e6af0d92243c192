pub mod types;
pub mod error;
pub mod schema;
pub mod row;
pub mod query;
pub mod config;

pub use error::{BoxError, Error, ErrorKind, QueryValidationError, Result};
pub use schema::{ColumnDef, TableDef, ValidatedColumn, ValidatedTable};
pub use types::{ColumnType, Identifier, IdentifierError};
pub use row::{Row, Value};
pub use query::{QueryRequest, QueryResult};
pub use config::{ConfigError, MatchMode, TabulaConfig};
