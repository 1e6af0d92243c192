use crate::ddl::DdlSynthesizer;
use async_trait::async_trait;
use std::sync::Arc;
use tabula_core::{Error, Result, TableDef, ValidatedTable};
use tabula_storage::Connection;
use tracing::{debug, info, warn};

#[async_trait]
pub trait TableDefinitionService: Send + Sync {
    /// Validate a definition and create the table it describes.
    async fn create_table(&self, table: &TableDef) -> Result<ValidatedTable>;
}

/// Creates tables through the shared connection.
///
/// The steps (existence probe, CREATE, COMMENT) are separate round trips and
/// no transaction spans them. A CREATE that loses a race with a concurrent
/// creator reports the same conflict as the probe would have.
pub struct DefaultTableService {
    connection: Arc<dyn Connection>,
}

impl DefaultTableService {
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl TableDefinitionService for DefaultTableService {
    async fn create_table(&self, table: &TableDef) -> Result<ValidatedTable> {
        let validated = table.validate()?;
        let name = validated.name().as_str();

        let exists = self
            .connection
            .table_exists(name)
            .await
            .map_err(|e| e.into_internal("Failed to check table existence"))?;
        if exists {
            debug!(table = name, "Table already present");
            return Err(Error::TableExists(name.to_string()));
        }

        let ddl = DdlSynthesizer::synthesize(&validated);
        debug!(sql = %ddl.create_table, "Creating table");

        if let Err(e) = self.connection.execute(&ddl.create_table).await {
            if e.is_duplicate_object() {
                warn!(table = name, "Table created concurrently");
                return Err(Error::TableExists(name.to_string()));
            }
            return Err(e.into_internal("Failed to create table"));
        }

        if let Some(comment) = &ddl.comment {
            self.connection
                .execute(comment)
                .await
                .map_err(|e| e.into_internal("Failed to add table comment"))?;
        }

        info!(
            table = name,
            columns = validated.columns().len(),
            "Table created"
        );
        Ok(validated)
    }
}
