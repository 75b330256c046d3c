//! Table definitions.

use super::column::Column;
use super::quote_ident;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A table definition: a name and an ordered list of columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Table name (unique within a schema, case-insensitively).
    pub name: String,
    /// Column definitions in declaration order.
    pub columns: Vec<Column>,
}

impl Table {
    /// Create a new table with no columns.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Add a column to the table.
    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Get a column by exact name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The primary key column, if any.
    pub fn primary_key(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.primary_key)
    }

    /// Check the table invariants: unique column names (case-insensitive) and
    /// at most one primary-key column.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.to_ascii_lowercase()) {
                return Err(format!(
                    "duplicate column '{}' in table '{}'",
                    column.name, self.name
                ));
            }
        }

        let pk_count = self.columns.iter().filter(|c| c.primary_key).count();
        if pk_count > 1 {
            return Err(format!(
                "table '{}' has a composite primary key ({} columns)",
                self.name, pk_count
            ));
        }

        Ok(())
    }

    /// Render a `CREATE TABLE` statement for this definition under `name`.
    pub fn create_sql_as(&self, name: &str) -> String {
        let columns: Vec<String> = self.columns.iter().map(Column::definition_sql).collect();
        format!("CREATE TABLE {} ({})", quote_ident(name), columns.join(", "))
    }

    /// Render the `CREATE TABLE` statement for this definition.
    pub fn create_sql(&self) -> String {
        self.create_sql_as(&self.name)
    }

    /// Render a `CREATE TABLE IF NOT EXISTS` statement for this definition.
    pub fn create_if_missing_sql(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(Column::definition_sql).collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(&self.name),
            columns.join(", ")
        )
    }
}
