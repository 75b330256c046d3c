//! trackdb core - schema inspection, column matching and atomic import
//! migration for the tracker's SQLite databases.
//!
//! An import reads the schema of a foreign database, matches its columns
//! against the target schema, plans a per-table strategy and applies it in a
//! single transaction.

pub mod catalog;
pub mod config;
pub mod error;
pub mod import;
pub mod inspect;
pub mod matching;
pub mod migration;
pub mod schema;

pub use catalog::{initialize, tracker_schema};
pub use config::{AliasFile, EngineConfig, DEFAULT_TEMP_SUFFIX};
pub use error::{Error, Result};
pub use import::{CancelHandle, ImportFailure, Importer, PreparedImport};
pub use inspect::{inspect, inspect_path, open_read_only};
pub use matching::{
    normalize, AliasRegistry, ColumnMapping, ColumnMatch, ColumnMatcher, MatchMethod,
    MatchStrategy, SchemaMapping,
};
pub use migration::{
    ImportProgress, ImportState, MigrationError, MigrationExecutor, MigrationPlan,
    MigrationPlanner, MigrationReport, OperationKind, SafetyGrade, TableOperation, ValueSource,
};
pub use schema::{Column, ColumnType, DefaultValue, Schema, Table};
