// Schema-creation statement synthesis

use tabula_core::{ColumnType, Identifier, ValidatedColumn, ValidatedTable};

/// Statements produced for one table definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DdlStatements {
    pub create_table: String,
    /// `COMMENT ON TABLE`, present only when the table has a description.
    pub comment: Option<String>,
}

/// Builds PostgreSQL DDL from validated table definitions.
///
/// Identifiers are emitted unquoted; `Identifier` guarantees they match
/// `^[A-Za-z][A-Za-z0-9_]*$`. Default literals are emitted verbatim.
pub struct DdlSynthesizer;

impl DdlSynthesizer {
    pub fn synthesize(table: &ValidatedTable) -> DdlStatements {
        DdlStatements {
            create_table: Self::create_table(table),
            comment: table
                .description()
                .map(|d| Self::comment(table.name(), d)),
        }
    }

    pub fn create_table(table: &ValidatedTable) -> String {
        let defs: Vec<String> = table.columns().iter().map(Self::column).collect();
        format!("CREATE TABLE {} (\n  {}\n)", table.name(), defs.join(",\n  "))
    }

    pub fn column(col: &ValidatedColumn) -> String {
        // Serial primary keys replace the whole fragment.
        if col.is_serial() {
            let serial = match col.column_type {
                ColumnType::BigInt => "BIGSERIAL",
                _ => "SERIAL",
            };
            return format!("{} {} PRIMARY KEY", col.name, serial);
        }

        let mut def = format!("{} {}", col.name, col.column_type.sql_type());

        if let Some(length) = col.length.filter(|_| col.column_type.takes_length()) {
            def.push_str(&format!("({})", length));
        }

        if col.not_null {
            def.push_str(" NOT NULL");
        }

        if col.primary_key {
            def.push_str(" PRIMARY KEY");
        } else if col.unique {
            def.push_str(" UNIQUE");
        }

        if let Some(default) = col.default.as_deref() {
            def.push_str(" DEFAULT ");
            def.push_str(default);
        }

        def
    }

    pub fn comment(table: &Identifier, description: &str) -> String {
        format!(
            "COMMENT ON TABLE {} IS '{}'",
            table,
            description.replace('\'', "''")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_core::{ColumnDef, TableDef};

    fn column_sql(col: ColumnDef) -> String {
        let table = TableDef::new("t", vec![col.primary_key()]);
        let validated = table.validate().unwrap();
        DdlSynthesizer::column(&validated.columns()[0])
    }

    fn plain_column_sql(col: ColumnDef) -> String {
        let table = TableDef::new(
            "t",
            vec![ColumnDef::new("pk", ColumnType::Int).primary_key(), col],
        );
        let validated = table.validate().unwrap();
        DdlSynthesizer::column(&validated.columns()[1])
    }

    #[test]
    fn test_accounts_scenario() {
        let table = TableDef::new(
            "accounts",
            vec![
                ColumnDef::new("id", ColumnType::Int).primary_key().auto_increment(),
                ColumnDef::new("email", ColumnType::Varchar)
                    .length(255)
                    .not_null()
                    .unique(),
            ],
        );
        let ddl = DdlSynthesizer::synthesize(&table.validate().unwrap());
        assert_eq!(
            ddl.create_table,
            "CREATE TABLE accounts (\n  id SERIAL PRIMARY KEY,\n  email varchar(255) NOT NULL UNIQUE\n)"
        );
        assert_eq!(ddl.comment, None);
    }

    #[test]
    fn test_serial_drops_other_fragments() {
        let col = ColumnDef::new("id", ColumnType::Int)
            .auto_increment()
            .not_null()
            .unique()
            .length(10)
            .default_value("0");
        assert_eq!(column_sql(col), "id SERIAL PRIMARY KEY");
    }

    #[test]
    fn test_bigserial() {
        let col = ColumnDef::new("id", ColumnType::BigInt).auto_increment();
        assert_eq!(column_sql(col), "id BIGSERIAL PRIMARY KEY");
    }

    #[test]
    fn test_auto_increment_ignored_for_non_integer() {
        let col = ColumnDef::new("code", ColumnType::Varchar).length(8).auto_increment();
        assert_eq!(column_sql(col), "code varchar(8) PRIMARY KEY");
    }

    #[test]
    fn test_primary_key_implies_unique() {
        let col = ColumnDef::new("id", ColumnType::BigInt).unique().not_null();
        assert_eq!(column_sql(col), "id bigint NOT NULL PRIMARY KEY");
    }

    #[test]
    fn test_length_only_for_varchar() {
        let col = ColumnDef::new("body", ColumnType::Text).length(100);
        assert_eq!(plain_column_sql(col), "body text");
    }

    #[test]
    fn test_default_verbatim() {
        let col = ColumnDef::new("created_at", ColumnType::Timestamp)
            .not_null()
            .default_value("CURRENT_TIMESTAMP");
        assert_eq!(
            plain_column_sql(col),
            "created_at timestamp NOT NULL DEFAULT CURRENT_TIMESTAMP"
        );

        let col = ColumnDef::new("status", ColumnType::Varchar)
            .length(16)
            .unique()
            .default_value("'new'");
        assert_eq!(plain_column_sql(col), "status varchar(16) UNIQUE DEFAULT 'new'");
    }

    #[test]
    fn test_supplied_empty_default_is_kept() {
        // Left for the backend to reject rather than dropped.
        let col = ColumnDef::new("note", ColumnType::Text).default_value("");
        assert_eq!(plain_column_sql(col), "note text DEFAULT ");
    }

    #[test]
    fn test_type_tokens() {
        assert_eq!(plain_column_sql(ColumnDef::new("d", ColumnType::Double)), "d double precision");
        assert_eq!(plain_column_sql(ColumnDef::new("j", ColumnType::Json)), "j jsonb");
        assert_eq!(plain_column_sql(ColumnDef::new("b", ColumnType::Boolean)), "b boolean");
        assert_eq!(plain_column_sql(ColumnDef::new("v", ColumnType::Varchar)), "v varchar");
    }

    #[test]
    fn test_comment_escapes_quotes() {
        let table = TableDef::new("notes", vec![ColumnDef::new("id", ColumnType::Int).primary_key()])
            .with_description("Bob's notes, 'quoted'");
        let ddl = DdlSynthesizer::synthesize(&table.validate().unwrap());
        assert_eq!(
            ddl.comment.as_deref(),
            Some("COMMENT ON TABLE notes IS 'Bob''s notes, ''quoted'''")
        );
    }

    #[test]
    fn test_deterministic() {
        let table = TableDef::new(
            "events",
            vec![
                ColumnDef::new("id", ColumnType::BigInt).primary_key().auto_increment(),
                ColumnDef::new("payload", ColumnType::Json).not_null(),
                ColumnDef::new("at", ColumnType::Timestamp),
            ],
        )
        .validate()
        .unwrap();
        assert_eq!(DdlSynthesizer::synthesize(&table), DdlSynthesizer::synthesize(&table));
        assert_eq!(
            DdlSynthesizer::create_table(&table),
            "CREATE TABLE events (\n  id BIGSERIAL PRIMARY KEY,\n  payload jsonb NOT NULL,\n  at timestamp\n)"
        );
    }
}
