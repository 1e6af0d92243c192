use crate::error::{Error, Result};
use crate::types::{ColumnType, Identifier, IdentifierError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One column of a table definition, as received from a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default)]
    pub not_null: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub auto_increment: bool,
    #[serde(default)]
    pub unique: bool,
    /// Literal spliced verbatim after `DEFAULT`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            length: None,
            not_null: false,
            primary_key: false,
            auto_increment: false,
            unique: false,
            default: None,
        }
    }

    pub fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_value(mut self, literal: impl Into<String>) -> Self {
        self.default = Some(literal.into());
        self
    }
}

/// A logical table description. Column order is the physical column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TableDef {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.into(),
            columns,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Check the definition without touching any backend.
    ///
    /// Checks run in a fixed order and the first violation is returned:
    /// table name, column presence, each column's name and uniqueness, then
    /// primary key presence.
    pub fn validate(&self) -> Result<ValidatedTable> {
        let name = Identifier::parse(&self.name).map_err(|e| match e {
            IdentifierError::Empty => Error::validation("Table name is required"),
            IdentifierError::Invalid(_) => Error::validation(
                "Table name must start with a letter and contain only letters, numbers, and underscores",
            ),
        })?;

        if self.columns.is_empty() {
            return Err(Error::validation("At least one column is required"));
        }

        let mut seen = HashSet::with_capacity(self.columns.len());
        let mut columns = Vec::with_capacity(self.columns.len());
        for col in &self.columns {
            let col_name = Identifier::parse(&col.name).map_err(|e| match e {
                IdentifierError::Empty => Error::validation("Column name is required"),
                IdentifierError::Invalid(n) => {
                    Error::validation(format!("Invalid column name: {}", n))
                }
            })?;
            if !seen.insert(col.name.as_str()) {
                return Err(Error::validation(format!(
                    "Duplicate column name: {}",
                    col.name
                )));
            }
            columns.push(ValidatedColumn {
                name: col_name,
                column_type: col.column_type,
                length: col.length,
                not_null: col.not_null,
                primary_key: col.primary_key,
                auto_increment: col.auto_increment,
                unique: col.unique,
                default: col.default.clone(),
            });
        }

        if !columns.iter().any(|c| c.primary_key) {
            return Err(Error::validation(
                "Table must have at least one primary key column",
            ));
        }

        Ok(ValidatedTable {
            name,
            columns,
            description: self.description.clone().filter(|d| !d.is_empty()),
        })
    }
}

/// A column whose name has passed identifier validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedColumn {
    pub name: Identifier,
    pub column_type: ColumnType,
    pub length: Option<u32>,
    pub not_null: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub unique: bool,
    pub default: Option<String>,
}

impl ValidatedColumn {
    /// Auto-increment only takes effect on an integer primary key.
    pub fn is_serial(&self) -> bool {
        self.primary_key && self.auto_increment && self.column_type.is_integer()
    }
}

/// Output of [`TableDef::validate`]; the only input DDL synthesis accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTable {
    name: Identifier,
    columns: Vec<ValidatedColumn>,
    description: Option<String>,
}

impl ValidatedTable {
    pub fn name(&self) -> &Identifier {
        &self.name
    }

    pub fn columns(&self) -> &[ValidatedColumn] {
        &self.columns
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn primary_key_columns(&self) -> impl Iterator<Item = &ValidatedColumn> {
        self.columns.iter().filter(|c| c.primary_key)
    }

    /// Back to the wire representation.
    pub fn to_def(&self) -> TableDef {
        TableDef {
            name: self.name.to_string(),
            columns: self
                .columns
                .iter()
                .map(|c| ColumnDef {
                    name: c.name.to_string(),
                    column_type: c.column_type,
                    length: c.length,
                    not_null: c.not_null,
                    primary_key: c.primary_key,
                    auto_increment: c.auto_increment,
                    unique: c.unique,
                    default: c.default.clone(),
                })
                .collect(),
            description: self.description.clone(),
        }
    }
}
