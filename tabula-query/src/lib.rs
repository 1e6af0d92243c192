pub mod ddl;
pub mod executor;
pub mod query_service;
pub mod table_service;
pub mod validator;

pub use ddl::{DdlStatements, DdlSynthesizer};
pub use executor::{AdHocExecutor, QueryExecutor, QueryStream};
pub use query_service::{DefaultQueryService, QueryExecutionService};
pub use table_service::{DefaultTableService, TableDefinitionService};
pub use validator::{KeywordPolicy, QueryValidator};
