//! Migration engine for trackdb.
//!
//! Given a column mapping between a source database and the target schema,
//! this module decides what to do with each table and applies it:
//! - Per-table planning (no-op, add columns, recreate)
//! - Safety grading (A/B/C/D)
//! - Atomic execution in a single transaction
//! - Import state tracking and reporting
//!
//! # Safety Grades
//!
//! | Grade | Description | Examples | Confirmation |
//! |-------|-------------|----------|--------------|
//! | **A** | Additive | Nothing to do, new nullable or defaulted columns, new tables | No |
//! | **B** | Fabricates values | New `NOT NULL` column without a default | Yes |
//! | **C** | Lossless rebuild | Renamed, reordered or widened columns | No |
//! | **D** | Destructive | Columns absent from the target, incompatible types | Yes |
//!
//! # Example
//!
//! ```ignore
//! use trackdb_core::migration::{MigrationConfig, MigrationExecutor, MigrationPlanner};
//!
//! let plan = MigrationPlanner::plan(&mapping, &source, &target);
//! println!("Migration grade: {}", plan.grade.overall_grade);
//!
//! let mut progress = ImportProgress::new(plan.tables.iter().map(|t| t.target_table()));
//! progress.validate()?;
//! MigrationExecutor::new(&mut conn, MigrationConfig::default()).execute(&plan, &mut progress)?;
//! ```

pub mod error;
pub mod executor;
pub mod grader;
pub mod plan;
pub mod report;
pub mod state;

// Error types
pub use error::{MigrationError, SafetyGrade};

// Grader types
pub use grader::{ChangeGrade, MigrationGrade, SafetyGrader};

// Plan types
pub use plan::{
    AddedColumn, DropReason, DroppedColumn, MigrationPlan, MigrationPlanner, OperationKind,
    Projection, TableOperation, TablePlan, ValueSource,
};

// Report types
pub use report::{MigrationReport, TableReport};

// State types
pub use state::{current_timestamp, ImportProgress, ImportState, TableProgress, TableStatus};

// Executor types
pub use executor::{MigrationConfig, MigrationExecutor};
