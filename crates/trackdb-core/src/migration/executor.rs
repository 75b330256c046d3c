//! Migration executor - applies a plan inside one transaction.
//!
//! Every table operation of an import runs in a single `BEGIN IMMEDIATE`
//! transaction. Any failure drops the transaction, which rolls back every
//! change made so far, so either all tables are migrated or none are.

use super::error::MigrationError;
use super::plan::{MigrationPlan, Projection, TableOperation, TablePlan};
use super::state::ImportProgress;
use crate::config::DEFAULT_TEMP_SUFFIX;
use crate::schema::quote_ident;
use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};
use tracing::{debug, info, instrument, warn};

/// Migration executor configuration.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Suffix appended to a table name to build its temporary rebuild table.
    pub temp_suffix: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            temp_suffix: DEFAULT_TEMP_SUFFIX.to_string(),
        }
    }
}

/// Applies migration plans to a live database.
pub struct MigrationExecutor<'c> {
    conn: &'c mut Connection,
    config: MigrationConfig,
}

impl<'c> MigrationExecutor<'c> {
    /// Create an executor over an exclusively borrowed connection.
    pub fn new(conn: &'c mut Connection, config: MigrationConfig) -> Self {
        Self { conn, config }
    }

    /// Execute `plan`, moving `progress` from `Validated` through
    /// `Executing` to `Committed` or `RolledBack`.
    #[instrument(skip_all, fields(tables = plan.tables.len(), grade = ?plan.grade.overall_grade))]
    pub fn execute(
        &mut self,
        plan: &MigrationPlan,
        progress: &mut ImportProgress,
    ) -> Result<(), MigrationError> {
        progress.begin()?;

        match self.run(plan, progress) {
            Ok(()) => {
                progress.commit()?;
                info!(
                    changed = plan.change_count(),
                    rows_copied = progress.rows_copied(),
                    "migration committed"
                );
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "migration rolled back");
                progress.roll_back(e.to_string())?;
                Err(e)
            }
        }
    }

    fn run(&mut self, plan: &MigrationPlan, progress: &mut ImportProgress) -> Result<(), MigrationError> {
        let foreign_keys: i64 = self
            .conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .map_err(|e| MigrationError::storage("reading foreign key setting", e))?;
        let foreign_keys = foreign_keys != 0;

        // Rebuilding a referenced table drops it for a moment. The pragma is
        // a no-op inside a transaction, so it is switched here.
        if foreign_keys {
            self.conn
                .execute_batch("PRAGMA foreign_keys = OFF")
                .map_err(|e| MigrationError::storage("disabling foreign keys", e))?;
        }

        let result = Self::apply(&mut *self.conn, plan, progress, &self.config, foreign_keys);

        if foreign_keys {
            if let Err(e) = self.conn.execute_batch("PRAGMA foreign_keys = ON") {
                warn!(error = %e, "failed to re-enable foreign keys");
            }
        }

        result
    }

    fn apply(
        conn: &mut Connection,
        plan: &MigrationPlan,
        progress: &mut ImportProgress,
        config: &MigrationConfig,
        check_foreign_keys: bool,
    ) -> Result<(), MigrationError> {
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| MigrationError::TransactionCommit {
                reason: format!("cannot begin transaction: {}", e),
            })?;

        for (idx, table) in plan.tables.iter().enumerate() {
            if let Some(entry) = progress.tables.get_mut(idx) {
                entry.start();
            }

            match Self::apply_table(&tx, table, config) {
                Ok(Some(rows)) => {
                    if let Some(entry) = progress.tables.get_mut(idx) {
                        entry.complete(rows);
                    }
                }
                Ok(None) => {
                    if let Some(entry) = progress.tables.get_mut(idx) {
                        entry.skip();
                    }
                }
                Err(e) => {
                    if let Some(entry) = progress.tables.get_mut(idx) {
                        entry.fail(e.to_string());
                    }
                    return Err(e);
                }
            }
        }

        if check_foreign_keys {
            Self::check_foreign_keys(&tx)?;
        }

        tx.commit().map_err(|e| MigrationError::TransactionCommit {
            reason: e.to_string(),
        })
    }

    /// Apply one table operation. Returns rows copied, or `None` for a no-op.
    fn apply_table(
        tx: &Transaction<'_>,
        plan: &TablePlan,
        config: &MigrationConfig,
    ) -> Result<Option<u64>, MigrationError> {
        let table = plan.target_table();

        match (&plan.operation, plan.source_table()) {
            (TableOperation::NoOp, _) => {
                debug!(table, "nothing to do");
                Ok(None)
            }
            (TableOperation::AddColumns(added), source) => {
                let existing = quote_ident(source.unwrap_or(table));
                for column in added {
                    let sql = format!("ALTER TABLE {} ADD COLUMN {}", existing, column.definition_sql());
                    tx.execute_batch(&sql).map_err(|e| {
                        MigrationError::storage(
                            format!("adding column {}.{}", table, column.column.name),
                            e,
                        )
                    })?;
                }
                debug!(table, added = added.len(), "added columns");
                Ok(Some(0))
            }
            (TableOperation::Recreate(_), None) => {
                tx.execute_batch(&plan.definition.create_sql())
                    .map_err(|e| MigrationError::storage(format!("creating {}", table), e))?;
                debug!(table, "created table");
                Ok(Some(0))
            }
            (TableOperation::Recreate(projections), Some(source)) => {
                Self::recreate(tx, plan, source, projections, config).map(Some)
            }
        }
    }

    /// Build the target table under a temporary name, copy every row, drop
    /// the old table, and rename the new one into place.
    fn recreate(
        tx: &Transaction<'_>,
        plan: &TablePlan,
        source: &str,
        projections: &[Projection],
        config: &MigrationConfig,
    ) -> Result<u64, MigrationError> {
        let table = plan.target_table();
        let temp = format!("{}{}", table, config.temp_suffix);

        let stale: bool = tx
            .query_row(
                "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE name = ?1 COLLATE NOCASE)",
                [&temp],
                |row| row.get(0),
            )
            .map_err(|e| MigrationError::storage(format!("checking for {}", temp), e))?;
        if stale {
            return Err(MigrationError::DataCopy {
                table: table.to_string(),
                reason: format!("temporary table {} already exists", temp),
            });
        }

        tx.execute_batch(&plan.definition.create_sql_as(&temp))
            .map_err(|e| MigrationError::storage(format!("creating {}", temp), e))?;

        let (columns, values): (Vec<String>, Vec<String>) = projections
            .iter()
            .filter_map(|p| p.value.select_expr().map(|expr| (quote_ident(&p.target), expr)))
            .unzip();

        // No ORDER BY: rows arrive in storage order.
        let copy = if columns.is_empty() {
            format!(
                "INSERT INTO {} (rowid) SELECT NULL FROM {}",
                quote_ident(&temp),
                quote_ident(source)
            )
        } else {
            format!(
                "INSERT INTO {} ({}) SELECT {} FROM {}",
                quote_ident(&temp),
                columns.join(", "),
                values.join(", "),
                quote_ident(source)
            )
        };

        let rows = tx
            .execute(&copy, [])
            .map_err(|e| Self::copy_error(table, e))?;

        tx.execute_batch(&format!("DROP TABLE {}", quote_ident(source)))
            .map_err(|e| MigrationError::storage(format!("dropping {}", source), e))?;
        tx.execute_batch(&format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_ident(&temp),
            quote_ident(table)
        ))
        .map_err(|e| MigrationError::storage(format!("renaming {} to {}", temp, table), e))?;

        debug!(table, source, rows, "rebuilt table");
        Ok(rows as u64)
    }

    /// A row rejected by the rebuilt table is a copy failure. Storing a
    /// non-integer in an `INTEGER PRIMARY KEY` is reported as a type mismatch
    /// rather than a constraint violation.
    fn copy_error(table: &str, error: rusqlite::Error) -> MigrationError {
        match error {
            rusqlite::Error::SqliteFailure(failure, message)
                if matches!(
                    failure.code,
                    ErrorCode::ConstraintViolation | ErrorCode::TypeMismatch
                ) =>
            {
                MigrationError::DataCopy {
                    table: table.to_string(),
                    reason: message.unwrap_or_else(|| failure.to_string()),
                }
            }
            other => MigrationError::storage(format!("copying rows into {}", table), other),
        }
    }

    fn check_foreign_keys(tx: &Transaction<'_>) -> Result<(), MigrationError> {
        let violation: Option<(String, String)> = tx
            .query_row("PRAGMA foreign_key_check", [], |row| {
                Ok((row.get(0)?, row.get(2)?))
            })
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
            .map_err(|e| MigrationError::storage("checking foreign keys", e))?;

        match violation {
            Some((table, parent)) => Err(MigrationError::DataCopy {
                table,
                reason: format!("foreign key violation referencing {}", parent),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::{AliasRegistry, ColumnMatcher};
    use crate::migration::state::{ImportState, TableStatus};
    use crate::migration::MigrationPlanner;
    use crate::schema::{Column, ColumnType, Schema, Table};

    fn plan_for(conn: &Connection, target: &Schema) -> MigrationPlan {
        let source = crate::inspect::inspect(conn, "test").unwrap();
        let aliases = AliasRegistry::default();
        let mapping = ColumnMatcher::new(&aliases)
            .match_schemas(&source, target)
            .unwrap();
        MigrationPlanner::plan(&mapping, &source, target)
    }

    fn progress_for(plan: &MigrationPlan) -> ImportProgress {
        let mut progress = ImportProgress::new(plan.tables.iter().map(|t| t.target_table()));
        progress.validate().unwrap();
        progress
    }

    fn tools_target() -> Schema {
        Schema::new().with_table(
            Table::new("tools")
                .with_column(Column::new("id", ColumnType::Integer).primary_key())
                .with_column(Column::new("md5", ColumnType::Text))
                .with_column(Column::new("name", ColumnType::Text).not_null()),
        )
    }

    #[test]
    fn test_recreate_copies_rows_in_order() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE tools (id INTEGER, md5sum TEXT, name TEXT);
             INSERT INTO tools VALUES (3, 'c', 'gamma'), (1, 'a', 'alpha'), (2, 'b', 'beta');",
        )
        .unwrap();

        let plan = plan_for(&conn, &tools_target());
        let mut progress = progress_for(&plan);
        MigrationExecutor::new(&mut conn, MigrationConfig::default())
            .execute(&plan, &mut progress)
            .unwrap();

        assert_eq!(progress.state, ImportState::Committed);
        assert_eq!(progress.rows_copied(), 3);

        let rows: Vec<(i64, String)> = conn
            .prepare("SELECT id, md5 FROM tools ORDER BY rowid")
            .unwrap()
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.contains(&(3, "c".to_string())));

        let temp_left: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name LIKE '%__trackdb_migrate'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(temp_left, 0);
    }

    #[test]
    fn test_constraint_violation_rolls_back() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE tools (id INTEGER, md5sum TEXT, name TEXT);
             INSERT INTO tools VALUES (1, 'a', 'alpha'), (2, 'b', NULL);",
        )
        .unwrap();

        let plan = plan_for(&conn, &tools_target());
        let mut progress = progress_for(&plan);
        let err = MigrationExecutor::new(&mut conn, MigrationConfig::default())
            .execute(&plan, &mut progress)
            .unwrap_err();

        assert!(matches!(err, MigrationError::DataCopy { ref table, .. } if table == "tools"));
        assert_eq!(progress.state, ImportState::RolledBack);
        assert_eq!(progress.tables[0].status, TableStatus::Failed);

        let md5sum: String = conn
            .query_row("SELECT md5sum FROM tools WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(md5sum, "a");
    }

    #[test]
    fn test_non_integer_key_is_data_copy_error() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE tools (id INTEGER, md5sum TEXT, name TEXT);
             INSERT INTO tools VALUES ('abc', 'a', 'alpha');",
        )
        .unwrap();

        let plan = plan_for(&conn, &tools_target());
        let mut progress = progress_for(&plan);
        let err = MigrationExecutor::new(&mut conn, MigrationConfig::default())
            .execute(&plan, &mut progress)
            .unwrap_err();

        assert!(matches!(err, MigrationError::DataCopy { ref table, .. } if table == "tools"));
        assert_eq!(progress.state, ImportState::RolledBack);

        let id: String = conn
            .query_row("SELECT id FROM tools", [], |row| row.get(0))
            .unwrap();
        assert_eq!(id, "abc");
    }

    #[test]
    fn test_stale_temp_table_is_an_error() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE tools (id INTEGER, md5sum TEXT, name TEXT);
             CREATE TABLE tools__trackdb_migrate (x);",
        )
        .unwrap();

        let plan = plan_for(&conn, &tools_target());
        let mut progress = progress_for(&plan);
        let err = MigrationExecutor::new(&mut conn, MigrationConfig::default())
            .execute(&plan, &mut progress)
            .unwrap_err();

        match err {
            MigrationError::DataCopy { reason, .. } => assert!(reason.contains("already exists")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_foreign_keys_restored() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE tools (id INTEGER, md5sum TEXT, name TEXT);",
        )
        .unwrap();

        let plan = plan_for(&conn, &tools_target());
        let mut progress = progress_for(&plan);
        MigrationExecutor::new(&mut conn, MigrationConfig::default())
            .execute(&plan, &mut progress)
            .unwrap();

        let enabled: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn test_requires_validated_progress() {
        let mut conn = Connection::open_in_memory().unwrap();
        let plan = plan_for(&conn, &tools_target());
        let mut progress = ImportProgress::new(["tools"]);

        let err = MigrationExecutor::new(&mut conn, MigrationConfig::default())
            .execute(&plan, &mut progress)
            .unwrap_err();
        assert!(matches!(err, MigrationError::InvalidState { .. }));
    }
}
