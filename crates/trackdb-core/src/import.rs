//! Import orchestration.
//!
//! An import runs Inspector, Matcher, Planner and Executor in that order.
//! [`Importer::prepare`] covers the read-only part and leaves a
//! [`PreparedImport`] in the `Validated` state for the caller to review.
//! [`Importer::execute`] applies it. Cancellation is honored only before the
//! transaction opens.

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::inspect::inspect;
use crate::matching::SchemaMapping;
use crate::migration::{
    ImportProgress, ImportState, MigrationError, MigrationExecutor, MigrationPlan,
    MigrationPlanner, MigrationReport,
};
use crate::schema::Schema;
use rusqlite::Connection;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Shared flag for cancelling a prepared import.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Create a handle that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Has no effect once execution has started.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A planned import awaiting execution.
#[derive(Debug, Clone)]
pub struct PreparedImport {
    /// Column mapping per target table.
    pub mapping: SchemaMapping,
    /// The plan.
    pub plan: MigrationPlan,
    /// Report for review and confirmation.
    pub report: MigrationReport,
    progress: ImportProgress,
    cancel: CancelHandle,
}

impl PreparedImport {
    /// Handle that cancels this import if used before execution starts.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Whether the caller must confirm before executing.
    pub fn requires_confirmation(&self) -> bool {
        self.report.requires_confirmation
    }

    /// Current import state.
    pub fn state(&self) -> ImportState {
        self.progress.state
    }
}

/// An import that failed, with the report generated so far.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct ImportFailure {
    /// What went wrong.
    #[source]
    pub error: Error,
    /// Report at the time of failure.
    pub report: Box<MigrationReport>,
}

impl ImportFailure {
    fn new(error: impl Into<Error>, report: MigrationReport) -> Self {
        Self {
            error: error.into(),
            report: Box::new(report),
        }
    }
}

/// Runs imports with one configuration.
#[derive(Debug, Clone, Default)]
pub struct Importer {
    config: EngineConfig,
}

impl Importer {
    /// Create an importer.
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// The configuration in use.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Inspect `source` and plan its migration to `target`. Read-only.
    #[instrument(skip(self, source, target), fields(tables = target.tables.len()))]
    pub fn prepare(&self, source: &Connection, label: &str, target: &Schema) -> Result<PreparedImport> {
        let source_schema = inspect(source, label)?;
        self.prepare_schemas(&source_schema, target)
    }

    /// Plan the migration of an already inspected schema to `target`.
    pub fn prepare_schemas(&self, source: &Schema, target: &Schema) -> Result<PreparedImport> {
        self.config.validate()?;

        let mapping = self.config.matcher().match_schemas(source, target)?;
        let plan = MigrationPlanner::plan(&mapping, source, target);
        let report = MigrationReport::from_plan(&plan);

        let mut progress = ImportProgress::new(plan.tables.iter().map(|t| t.target_table()));
        progress.validate()?;

        info!(
            grade = %plan.grade.overall_grade,
            changes = plan.change_count(),
            dropped = report.dropped_count(),
            unmanaged = plan.unmanaged.len(),
            "prepared import"
        );

        Ok(PreparedImport {
            mapping,
            plan,
            report,
            progress,
            cancel: CancelHandle::new(),
        })
    }

    /// Execute a prepared import against the database it was planned from.
    ///
    /// Fails without touching the database if the import was cancelled or
    /// the schema changed since planning.
    #[instrument(skip_all, fields(tables = prepared.plan.tables.len()))]
    pub fn execute(
        &self,
        conn: &mut Connection,
        prepared: PreparedImport,
    ) -> std::result::Result<MigrationReport, ImportFailure> {
        let PreparedImport {
            plan,
            mut report,
            mut progress,
            cancel,
            ..
        } = prepared;

        if cancel.is_cancelled() {
            info!("import cancelled before execution");
            return Err(ImportFailure::new(MigrationError::Cancelled, report));
        }

        let current = match inspect(conn, "target") {
            Ok(schema) => schema.fingerprint(),
            Err(e) => return Err(ImportFailure::new(e, report)),
        };
        if current != plan.source_fingerprint {
            let error = MigrationError::StalePlan {
                planned: plan.source_fingerprint.clone(),
                found: current,
            };
            return Err(ImportFailure::new(error, report));
        }

        let result = MigrationExecutor::new(conn, self.config.migration_config())
            .execute(&plan, &mut progress);
        report.record_progress(&progress);

        if let Err(e) = result {
            return Err(ImportFailure::new(e, report));
        }

        match inspect(conn, "target") {
            Ok(schema) => report.result_fingerprint = Some(schema.fingerprint()),
            Err(e) => warn!(error = %e, "committed, but re-inspection failed"),
        }

        Ok(report)
    }

    /// Prepare an import of the database at `path` on a blocking worker.
    #[cfg(feature = "async")]
    pub async fn prepare_in_background(
        path: std::path::PathBuf,
        target: Schema,
        config: EngineConfig,
    ) -> Result<PreparedImport> {
        tokio::task::spawn_blocking(move || {
            let conn = crate::inspect::open_read_only(&path)?;
            Importer::new(config).prepare(&conn, &path.display().to_string(), &target)
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }
}
