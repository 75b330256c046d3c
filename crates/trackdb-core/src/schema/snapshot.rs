//! Schema snapshot - the ordered set of tables in one database.

use super::normalize_table_key;
use super::table::Table;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A read-only snapshot of a database schema.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    /// Tables in definition order.
    pub tables: Vec<Table>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table to the schema.
    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    /// Get a table by exact name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Table names in definition order.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// Check if the schema has no tables.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Check schema and table invariants.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for table in &self.tables {
            if !seen.insert(normalize_table_key(&table.name)) {
                return Err(format!("duplicate table '{}'", table.name));
            }
            table.validate()?;
        }
        Ok(())
    }

    /// Stable hex fingerprint of the schema's structure.
    ///
    /// Two schemas have the same fingerprint exactly when they render to the
    /// same DDL in the same order.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for table in &self.tables {
            hasher.update(table.create_sql().as_bytes());
            hasher.update(b";\n");
        }
        hex::encode(hasher.finalize().as_bytes())
    }
}
