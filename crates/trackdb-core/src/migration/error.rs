//! Migration-specific error types.

use super::state::ImportState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Safety grade for a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SafetyGrade {
    /// Grade A: nothing changes, or columns are added with declared defaults or NULL.
    A,
    /// Grade B: added columns need values the schema does not declare.
    B,
    /// Grade C: the table is rebuilt but every source column is carried over.
    C,
    /// Grade D: source columns are discarded.
    D,
}

impl SafetyGrade {
    /// Whether a plan with this grade needs explicit caller confirmation.
    pub fn requires_confirmation(&self) -> bool {
        matches!(self, SafetyGrade::B | SafetyGrade::D)
    }
}

impl std::fmt::Display for SafetyGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SafetyGrade::A => write!(f, "A (additive)"),
            SafetyGrade::B => write!(f, "B (fabricated defaults)"),
            SafetyGrade::C => write!(f, "C (lossless rebuild)"),
            SafetyGrade::D => write!(f, "D (data loss)"),
        }
    }
}

/// Migration-specific errors.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// More than one source column qualified for a target column under a
    /// strict matching strategy.
    #[error("ambiguous match for {table}.{column}: candidates {candidates:?}")]
    UnresolvedAmbiguous {
        /// Target table.
        table: String,
        /// Target column.
        column: String,
        /// Source columns that matched equally well.
        candidates: Vec<String>,
    },

    /// A row did not satisfy the target table's constraints after projection.
    #[error("data copy into {table} failed: {reason}")]
    DataCopy {
        /// Table being rebuilt.
        table: String,
        /// Constraint or storage message.
        reason: String,
    },

    /// The storage layer failed to open or commit the import transaction.
    #[error("transaction commit failed: {reason}")]
    TransactionCommit {
        /// Storage message.
        reason: String,
    },

    /// The import was cancelled before its transaction opened.
    #[error("import cancelled before execution")]
    Cancelled,

    /// An operation was attempted in the wrong import state.
    #[error("cannot {action} while import is {state}")]
    InvalidState {
        /// State at the time of the attempt.
        state: ImportState,
        /// What was attempted.
        action: &'static str,
    },

    /// The database schema changed between planning and execution.
    #[error("schema changed since planning (planned {planned}, found {found})")]
    StalePlan {
        /// Fingerprint the plan was computed against.
        planned: String,
        /// Fingerprint found at execution time.
        found: String,
    },

    /// Storage error while applying a step.
    #[error("storage error while {context}: {source}")]
    Storage {
        /// What the executor was doing.
        context: String,
        /// Underlying error.
        #[source]
        source: rusqlite::Error,
    },
}

impl MigrationError {
    pub(crate) fn storage(context: impl Into<String>, source: rusqlite::Error) -> Self {
        MigrationError::Storage {
            context: context.into(),
            source,
        }
    }
}
