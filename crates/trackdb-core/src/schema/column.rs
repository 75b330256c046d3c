//! Column definitions for tables.

use super::quote_ident;
use super::types::{ColumnType, DefaultValue};
use serde::{Deserialize, Serialize};

/// A column definition within a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Declared type text as written in the table definition.
    pub declared_type: String,
    /// Resolved column type.
    pub column_type: ColumnType,
    /// Whether the column accepts NULL.
    pub nullable: bool,
    /// Default value if not provided.
    pub default: Option<DefaultValue>,
    /// Whether this column is the table's primary key.
    pub primary_key: bool,
    /// Whether the primary key is declared `AUTOINCREMENT`.
    pub auto_increment: bool,
}

impl Column {
    /// Create a nullable column with the canonical spelling of `column_type`.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            declared_type: column_type.sql_name().to_string(),
            column_type,
            nullable: true,
            default: None,
            primary_key: false,
            auto_increment: false,
        }
    }

    /// Create a nullable column from a declared type string.
    pub fn declared(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        let declared_type = declared_type.into();
        Self {
            name: name.into(),
            column_type: ColumnType::from_declared(&declared_type),
            declared_type,
            nullable: true,
            default: None,
            primary_key: false,
            auto_increment: false,
        }
    }

    /// Mark as `NOT NULL`.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set the default value.
    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Mark as the primary key.
    ///
    /// Nullability is left untouched: SQLite reports an `INTEGER PRIMARY KEY`
    /// column as nullable unless `NOT NULL` is spelled out.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Mark the primary key as `AUTOINCREMENT`.
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// An `INTEGER PRIMARY KEY` column aliases the rowid, so storage assigns
    /// its value when none is supplied.
    pub fn is_rowid_alias(&self) -> bool {
        self.primary_key && self.declared_type.trim().eq_ignore_ascii_case("INTEGER")
    }

    /// Check whether `other` has the same name, type, constraints and default.
    pub fn structurally_eq(&self, other: &Column) -> bool {
        self.name == other.name
            && self.column_type == other.column_type
            && self.column_type != ColumnType::Unknown
            && self.nullable == other.nullable
            && self.default == other.default
            && self.primary_key == other.primary_key
            && self.auto_increment == other.auto_increment
    }

    /// Render the column definition used inside `CREATE TABLE` or
    /// `ALTER TABLE ... ADD COLUMN`.
    pub fn definition_sql(&self) -> String {
        let mut sql = quote_ident(&self.name);

        if !self.declared_type.is_empty() {
            sql.push(' ');
            sql.push_str(&self.declared_type);
        }
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
            if self.auto_increment {
                sql.push_str(" AUTOINCREMENT");
            }
        }
        if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default_clause(default));
        }

        sql
    }
}

/// Expressions other than literals must be parenthesized in a DEFAULT clause,
/// unless they are one of the bare keywords SQLite accepts.
fn default_clause(default: &DefaultValue) -> String {
    match default {
        DefaultValue::Expression(expr) => {
            let upper = expr.to_ascii_uppercase();
            let bare = matches!(
                upper.as_str(),
                "CURRENT_TIME" | "CURRENT_DATE" | "CURRENT_TIMESTAMP" | "TRUE" | "FALSE"
            );
            if bare || (expr.starts_with('(') && expr.ends_with(')')) {
                expr.clone()
            } else {
                format!("({})", expr)
            }
        }
        other => other.to_sql(),
    }
}
