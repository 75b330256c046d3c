//! The tracker's built-in schema.
//!
//! Every import targets this schema unless the caller supplies a reference
//! database instead.

use crate::error::Result;
use crate::migration::MigrationError;
use crate::schema::{Column, ColumnType, Schema, Table};
use rusqlite::Connection;
use tracing::info;

/// Build a catalog table: an autoincrement id, a required name, then the
/// given nullable text columns.
fn tracker_table(name: &str, extra: &[(&str, ColumnType)]) -> Table {
    let table = Table::new(name)
        .with_column(
            Column::new("id", ColumnType::Integer)
                .primary_key()
                .auto_increment(),
        )
        .with_column(Column::new("name", ColumnType::Text).not_null());

    extra.iter().fold(table, |table, (column, column_type)| {
        table.with_column(Column::new(*column, *column_type))
    })
}

/// The schema the application works with.
pub fn tracker_schema() -> Schema {
    use ColumnType::{Integer, Text};

    Schema::new()
        .with_table(tracker_table(
            "builds",
            &[
                ("manifest_id", Text),
                ("year", Integer),
                ("season", Text),
                ("crack_type", Text),
                ("link", Text),
                ("md5", Text),
                ("description", Text),
            ],
        ))
        .with_table(tracker_table(
            "tools",
            &[("version", Text), ("link", Text), ("description", Text)],
        ))
        .with_table(tracker_table(
            "cheats",
            &[("type", Text), ("link", Text), ("description", Text)],
        ))
        .with_table(tracker_table(
            "downloaders",
            &[("link", Text), ("description", Text)],
        ))
        .with_table(tracker_table(
            "preserved",
            &[("link", Text), ("description", Text)],
        ))
}

/// Create any missing catalog table in one transaction.
pub fn initialize(conn: &mut Connection) -> Result<()> {
    let schema = tracker_schema();
    let tx = conn
        .transaction()
        .map_err(|e| MigrationError::storage("opening initialization transaction", e))?;

    for table in &schema.tables {
        tx.execute_batch(&table.create_if_missing_sql())
            .map_err(|e| MigrationError::storage(format!("creating {}", table.name), e))?;
    }

    tx.commit().map_err(|e| MigrationError::TransactionCommit {
        reason: e.to_string(),
    })?;

    info!(tables = schema.tables.len(), "initialized tracker schema");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspect::inspect;

    #[test]
    fn test_tracker_schema_is_valid() {
        let schema = tracker_schema();
        schema.validate().unwrap();
        assert_eq!(
            schema.table_names(),
            vec!["builds", "tools", "cheats", "downloaders", "preserved"]
        );

        for table in &schema.tables {
            let id = table.primary_key().unwrap();
            assert_eq!(id.name, "id");
            assert!(id.auto_increment);
            assert!(!table.column("name").unwrap().nullable);
        }
    }

    #[test]
    fn test_initialize_matches_catalog() {
        let mut conn = Connection::open_in_memory().unwrap();
        initialize(&mut conn).unwrap();

        let inspected = inspect(&conn, "fresh").unwrap();
        assert_eq!(inspected, tracker_schema());
        assert_eq!(inspected.fingerprint(), tracker_schema().fingerprint());

        // Idempotent.
        initialize(&mut conn).unwrap();
        assert_eq!(inspect(&conn, "fresh").unwrap(), tracker_schema());
    }
}
