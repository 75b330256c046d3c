//! Core error types.

use crate::migration::MigrationError;
use thiserror::Error;

/// Top-level engine errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A database could not be opened, is not a database, or holds a table
    /// definition outside the supported model.
    #[error("cannot read schema of {database}: {reason}")]
    SchemaRead {
        /// Which database was being read.
        database: String,
        /// What went wrong.
        reason: String,
        /// Underlying storage error, if any.
        #[source]
        source: Option<rusqlite::Error>,
    },

    /// Matching, planning or execution failed.
    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn schema_read(
        database: impl Into<String>,
        reason: impl Into<String>,
        source: Option<rusqlite::Error>,
    ) -> Self {
        Error::SchemaRead {
            database: database.into(),
            reason: reason.into(),
            source,
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
