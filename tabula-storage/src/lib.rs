pub mod error;
pub mod connection;
pub mod postgres;
pub mod memory;

pub use connection::{Connection, RowStream};
pub use error::{Result, StorageError};
pub use memory::{InMemoryConnection, ScriptedResult};
pub use postgres::PgConnection;
