//! Import state tracking.
//!
//! An import moves through `Idle -> Validated -> Executing` and ends in
//! either `Committed` or `RolledBack`. Nothing here is persisted; the state
//! lives only as long as one import.

use super::error::MigrationError;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current time in microseconds since the Unix epoch.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or_default()
}

/// State of an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportState {
    /// Nothing planned yet.
    Idle,
    /// A plan exists and may be executed or abandoned.
    Validated,
    /// The transaction is open. Cannot be cancelled.
    Executing,
    /// All changes were committed.
    Committed,
    /// The transaction was rolled back; the database is unchanged.
    RolledBack,
}

impl std::fmt::Display for ImportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportState::Idle => write!(f, "idle"),
            ImportState::Validated => write!(f, "validated"),
            ImportState::Executing => write!(f, "executing"),
            ImportState::Committed => write!(f, "committed"),
            ImportState::RolledBack => write!(f, "rolled_back"),
        }
    }
}

/// Status of a single table within an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    /// Not yet started.
    Pending,
    /// In progress.
    InProgress,
    /// Applied (not yet durable until the import commits).
    Complete,
    /// Failed.
    Failed,
    /// Nothing to do.
    Skipped,
}

impl std::fmt::Display for TableStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableStatus::Pending => write!(f, "pending"),
            TableStatus::InProgress => write!(f, "in_progress"),
            TableStatus::Complete => write!(f, "complete"),
            TableStatus::Failed => write!(f, "failed"),
            TableStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Progress of a single table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableProgress {
    /// Target table name.
    pub table: String,
    /// Current status.
    pub status: TableStatus,
    /// When work on the table started (microseconds since epoch).
    pub started_at: Option<u64>,
    /// When work on the table finished (microseconds since epoch).
    pub completed_at: Option<u64>,
    /// Rows copied by a rebuild.
    pub rows_copied: u64,
    /// Error message if the table failed.
    pub error: Option<String>,
}

impl TableProgress {
    /// Create a pending entry.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            status: TableStatus::Pending,
            started_at: None,
            completed_at: None,
            rows_copied: 0,
            error: None,
        }
    }

    /// Mark as started.
    pub fn start(&mut self) {
        self.status = TableStatus::InProgress;
        self.started_at = Some(current_timestamp());
    }

    /// Mark as completed.
    pub fn complete(&mut self, rows_copied: u64) {
        self.status = TableStatus::Complete;
        self.rows_copied = rows_copied;
        self.completed_at = Some(current_timestamp());
    }

    /// Mark as failed.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = TableStatus::Failed;
        self.completed_at = Some(current_timestamp());
        self.error = Some(error.into());
    }

    /// Mark as skipped.
    pub fn skip(&mut self) {
        self.status = TableStatus::Skipped;
        self.completed_at = Some(current_timestamp());
    }
}

/// Progress of one import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportProgress {
    /// Current state.
    pub state: ImportState,
    /// Per-table progress, in plan order.
    pub tables: Vec<TableProgress>,
    /// When execution started (microseconds since epoch).
    pub started_at: Option<u64>,
    /// When execution ended (microseconds since epoch).
    pub completed_at: Option<u64>,
    /// Error message if the import rolled back.
    pub error: Option<String>,
}

impl ImportProgress {
    /// Create progress tracking for the given tables.
    pub fn new<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            state: ImportState::Idle,
            tables: tables.into_iter().map(TableProgress::new).collect(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    /// `Idle -> Validated`.
    pub fn validate(&mut self) -> Result<(), MigrationError> {
        self.transition(ImportState::Idle, ImportState::Validated, "validate")
    }

    /// `Validated -> Executing`.
    pub fn begin(&mut self) -> Result<(), MigrationError> {
        self.transition(ImportState::Validated, ImportState::Executing, "execute")?;
        self.started_at = Some(current_timestamp());
        Ok(())
    }

    /// `Executing -> Committed`.
    pub fn commit(&mut self) -> Result<(), MigrationError> {
        self.transition(ImportState::Executing, ImportState::Committed, "commit")?;
        self.completed_at = Some(current_timestamp());
        Ok(())
    }

    /// `Executing -> RolledBack`.
    ///
    /// Tables already marked complete revert to pending: their changes were
    /// undone with the transaction.
    pub fn roll_back(&mut self, error: impl Into<String>) -> Result<(), MigrationError> {
        self.transition(ImportState::Executing, ImportState::RolledBack, "roll back")?;
        for table in &mut self.tables {
            if table.status == TableStatus::Complete {
                table.status = TableStatus::Pending;
                table.rows_copied = 0;
            }
        }
        self.completed_at = Some(current_timestamp());
        self.error = Some(error.into());
        Ok(())
    }

    /// Total rows copied across all tables.
    pub fn rows_copied(&self) -> u64 {
        self.tables.iter().map(|t| t.rows_copied).sum()
    }

    fn transition(
        &mut self,
        from: ImportState,
        to: ImportState,
        action: &'static str,
    ) -> Result<(), MigrationError> {
        if self.state != from {
            return Err(MigrationError::InvalidState {
                state: self.state,
                action,
            });
        }
        self.state = to;
        Ok(())
    }
}
