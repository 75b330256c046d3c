//! Machine-readable migration report.

use super::error::SafetyGrade;
use super::plan::{AddedColumn, DroppedColumn, MigrationPlan, OperationKind, TablePlan};
use super::state::{ImportProgress, ImportState, TableStatus};
use crate::matching::{ColumnMatch, MatchMethod};
use serde::{Deserialize, Serialize};

/// Report entry for one target table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableReport {
    /// Target table.
    pub target_table: String,
    /// Source table it was paired with.
    pub source_table: Option<String>,
    /// How the pair was resolved.
    pub table_method: MatchMethod,
    /// Operation kind.
    pub operation: OperationKind,
    /// Safety grade of this table.
    pub grade: SafetyGrade,
    /// Matched columns with their resolution method.
    pub matched: Vec<ColumnMatch>,
    /// Target columns without source data, with their value origin.
    pub added: Vec<AddedColumn>,
    /// Source columns that will not survive.
    pub dropped: Vec<DroppedColumn>,
    /// Execution status.
    pub status: TableStatus,
    /// Rows copied by a rebuild.
    pub rows_copied: u64,
}

impl TableReport {
    fn from_plan(plan: &TablePlan, grade: SafetyGrade) -> Self {
        Self {
            target_table: plan.target_table().to_string(),
            source_table: plan.source_table().map(str::to_string),
            table_method: plan.mapping.table_method,
            operation: plan.operation.kind(),
            grade,
            matched: plan.mapping.matched().cloned().collect(),
            added: plan.added(),
            dropped: plan.dropped.clone(),
            status: TableStatus::Pending,
            rows_copied: 0,
        }
    }

    /// Number of matched columns resolved through the alias registry.
    pub fn alias_matches(&self) -> usize {
        self.matched
            .iter()
            .filter(|m| m.method == MatchMethod::Alias)
            .count()
    }

    /// Number of target columns with fabricated values.
    pub fn fabricated(&self) -> usize {
        self.added.iter().filter(|a| a.value.is_fabricated()).count()
    }
}

/// Report of one import: the plan summary and, once executed, the outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Per-table entries, in plan order.
    pub tables: Vec<TableReport>,
    /// Source tables left untouched.
    pub unmanaged: Vec<String>,
    /// Worst grade across tables.
    pub grade: SafetyGrade,
    /// Whether the caller must confirm before executing.
    pub requires_confirmation: bool,
    /// Data loss and fabrication warnings.
    pub warnings: Vec<String>,
    /// Fingerprint of the schema the plan was computed against.
    pub source_fingerprint: String,
    /// Fingerprint of the target schema.
    pub target_fingerprint: String,
    /// Fingerprint of the database schema after commit.
    pub result_fingerprint: Option<String>,
    /// Import state when the report was produced.
    pub state: ImportState,
    /// When the plan was created (microseconds since epoch).
    pub created_at: u64,
    /// When execution ended (microseconds since epoch).
    pub completed_at: Option<u64>,
    /// Error message if the import failed.
    pub error: Option<String>,
}

impl MigrationReport {
    /// Summarize a plan. The report starts out `Validated`.
    pub fn from_plan(plan: &MigrationPlan) -> Self {
        let tables = plan
            .tables
            .iter()
            .zip(&plan.grade.change_grades)
            .map(|(table, grade)| TableReport::from_plan(table, grade.grade))
            .collect();

        Self {
            tables,
            unmanaged: plan.unmanaged.clone(),
            grade: plan.grade.overall_grade,
            requires_confirmation: plan.grade.requires_confirmation(),
            warnings: plan.grade.warnings.clone(),
            source_fingerprint: plan.source_fingerprint.clone(),
            target_fingerprint: plan.target_fingerprint.clone(),
            result_fingerprint: None,
            state: ImportState::Validated,
            created_at: plan.created_at,
            completed_at: None,
            error: None,
        }
    }

    /// Copy execution progress into the report.
    pub fn record_progress(&mut self, progress: &ImportProgress) {
        self.state = progress.state;
        self.completed_at = progress.completed_at;
        self.error = progress.error.clone();

        for entry in &progress.tables {
            if let Some(table) = self.tables.iter_mut().find(|t| t.target_table == entry.table) {
                table.status = entry.status;
                table.rows_copied = entry.rows_copied;
            }
        }
    }

    /// Report entry for a target table.
    pub fn table(&self, target_table: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.target_table == target_table)
    }

    /// Check if no table changes.
    pub fn is_noop(&self) -> bool {
        self.tables.iter().all(|t| t.operation == OperationKind::NoOp)
    }

    /// Total number of dropped source columns.
    pub fn dropped_count(&self) -> usize {
        self.tables.iter().map(|t| t.dropped.len()).sum()
    }

    /// Total number of alias-resolved matches.
    pub fn alias_count(&self) -> usize {
        self.tables.iter().map(TableReport::alias_matches).sum()
    }

    /// Total rows copied.
    pub fn rows_copied(&self) -> u64 {
        self.tables.iter().map(|t| t.rows_copied).sum()
    }

    /// Render as pretty JSON.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::{AliasRegistry, ColumnMatcher};
    use crate::migration::MigrationPlanner;
    use crate::schema::{Column, ColumnType, Schema, Table};

    fn tools_plan() -> MigrationPlan {
        let source = Schema::new().with_table(
            Table::new("tools")
                .with_column(Column::new("id", ColumnType::Integer))
                .with_column(Column::new("md5sum", ColumnType::Text))
                .with_column(Column::new("name", ColumnType::Text)),
        );
        let target = Schema::new().with_table(
            Table::new("tools")
                .with_column(Column::new("id", ColumnType::Integer).primary_key())
                .with_column(Column::new("md5", ColumnType::Text))
                .with_column(Column::new("name", ColumnType::Text))
                .with_column(Column::new("added_at", ColumnType::Text)),
        );
        let aliases = AliasRegistry::default();
        let mapping = ColumnMatcher::new(&aliases)
            .match_schemas(&source, &target)
            .unwrap();
        MigrationPlanner::plan(&mapping, &source, &target)
    }

    #[test]
    fn test_report_summary() {
        let report = MigrationReport::from_plan(&tools_plan());

        assert_eq!(report.state, ImportState::Validated);
        assert_eq!(report.grade, SafetyGrade::C);
        assert!(!report.requires_confirmation);
        assert_eq!(report.dropped_count(), 0);
        assert_eq!(report.alias_count(), 1);

        let tools = report.table("tools").unwrap();
        assert_eq!(tools.operation, OperationKind::Recreate);
        assert_eq!(tools.matched.len(), 3);
        assert_eq!(tools.added.len(), 1);
        assert_eq!(tools.added[0].column.name, "added_at");
    }

    #[test]
    fn test_record_progress() {
        let plan = tools_plan();
        let mut report = MigrationReport::from_plan(&plan);

        let mut progress = ImportProgress::new(["tools"]);
        progress.validate().unwrap();
        progress.begin().unwrap();
        progress.tables[0].start();
        progress.tables[0].complete(7);
        progress.commit().unwrap();

        report.record_progress(&progress);
        assert_eq!(report.state, ImportState::Committed);
        assert_eq!(report.rows_copied(), 7);
        assert_eq!(report.tables[0].status, TableStatus::Complete);
    }

    #[test]
    fn test_json_shape() {
        let report = MigrationReport::from_plan(&tools_plan());
        let value: serde_json::Value =
            serde_json::from_str(&report.to_json_pretty().unwrap()).unwrap();

        let table = &value["tables"][0];
        assert_eq!(table["operation"], "recreate");
        assert_eq!(table["matched"][1]["method"], "alias");
        assert_eq!(table["added"][0]["value"]["origin"], "null");
        assert_eq!(value["grade"], "C");
    }
}
