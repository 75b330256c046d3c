//! Safety grading for migration plans.
//!
//! Each table plan gets a grade (A/B/C/D) describing what it does to the
//! data; the plan carries the worst one. Grades only flag. Whether to go
//! ahead is the caller's decision.

use super::error::SafetyGrade;
use super::plan::{DropReason, TableOperation, TablePlan};
use serde::{Deserialize, Serialize};

/// Grading result for a single table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeGrade {
    /// Target table.
    pub table: String,
    /// The safety grade for this table.
    pub grade: SafetyGrade,
    /// Description of the change.
    pub change_description: String,
    /// Reasoning for the grade.
    pub reasoning: String,
}

impl ChangeGrade {
    fn new(
        table: impl Into<String>,
        grade: SafetyGrade,
        description: impl Into<String>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            grade,
            change_description: description.into(),
            reasoning: reasoning.into(),
        }
    }
}

/// Complete grading result for a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationGrade {
    /// The worst grade among all tables.
    pub overall_grade: SafetyGrade,
    /// Grades per table, in plan order.
    pub change_grades: Vec<ChangeGrade>,
    /// One warning per dropped column and per fabricated value.
    pub warnings: Vec<String>,
}

impl MigrationGrade {
    /// Whether the caller must obtain confirmation before executing: some
    /// table discards data or fabricates values.
    pub fn requires_confirmation(&self) -> bool {
        self.change_grades
            .iter()
            .any(|g| g.grade.requires_confirmation())
    }

}

/// Grades table plans for safety.
pub struct SafetyGrader;

impl SafetyGrader {
    /// Grade a list of table plans.
    pub fn grade(tables: &[TablePlan]) -> MigrationGrade {
        let mut change_grades = Vec::with_capacity(tables.len());
        let mut overall_grade = SafetyGrade::A;

        for table in tables {
            let grade = Self::grade_table(table);
            overall_grade = overall_grade.max(grade.grade);
            change_grades.push(grade);
        }

        MigrationGrade {
            overall_grade,
            change_grades,
            warnings: Self::generate_warnings(tables),
        }
    }

    /// Grade one table plan.
    ///
    /// Data loss dominates everything. Fabrication outranks a lossless
    /// rebuild so that it is always flagged.
    pub fn grade_table(plan: &TablePlan) -> ChangeGrade {
        let table = plan.target_table();

        if plan.loses_data() {
            return ChangeGrade::new(
                table,
                SafetyGrade::D,
                format!("Rebuild '{}' dropping {} column(s)", table, plan.dropped.len()),
                "Dropped source columns are discarded with their data",
            );
        }

        let fabricated = plan.fabricated().len();
        if fabricated > 0 {
            return ChangeGrade::new(
                table,
                SafetyGrade::B,
                format!(
                    "{} '{}' fabricating {} value(s)",
                    Self::verb(&plan.operation),
                    table,
                    fabricated
                ),
                "NOT NULL columns without a default receive synthesized zero values",
            );
        }

        match (&plan.operation, plan.source_table()) {
            (TableOperation::NoOp, _) => ChangeGrade::new(
                table,
                SafetyGrade::A,
                format!("Keep '{}'", table),
                "Table already matches the target",
            ),
            (TableOperation::AddColumns(added), _) => ChangeGrade::new(
                table,
                SafetyGrade::A,
                format!("Add {} column(s) to '{}'", added.len(), table),
                "New columns use declared defaults or NULL",
            ),
            (TableOperation::Recreate(_), None) => ChangeGrade::new(
                table,
                SafetyGrade::A,
                format!("Create '{}'", table),
                "Table does not exist yet",
            ),
            (TableOperation::Recreate(_), Some(_)) => ChangeGrade::new(
                table,
                SafetyGrade::C,
                format!("Rebuild '{}'", table),
                "Every source column is carried over",
            ),
        }
    }

    fn verb(operation: &TableOperation) -> &'static str {
        match operation {
            TableOperation::NoOp => "Keep",
            TableOperation::AddColumns(_) => "Extend",
            TableOperation::Recreate(_) => "Rebuild",
        }
    }

    fn generate_warnings(tables: &[TablePlan]) -> Vec<String> {
        let mut warnings = Vec::new();

        for plan in tables {
            let source_table = plan.source_table().unwrap_or(plan.target_table());

            for dropped in &plan.dropped {
                let warning = match &dropped.reason {
                    DropReason::NotInTarget => format!(
                        "Column '{}.{}' has no place in the target schema and will be dropped",
                        source_table, dropped.name
                    ),
                    DropReason::IncompatibleType { target, from, to } => format!(
                        "Column '{}.{}' ({}) cannot be stored as {} in '{}' and will be dropped",
                        source_table, dropped.name, from, to, target
                    ),
                };
                warnings.push(warning);
            }

            for added in plan.fabricated() {
                warnings.push(format!(
                    "Column '{}.{}' is NOT NULL without a default; existing rows get {}",
                    plan.target_table(),
                    added.column.name,
                    added.value
                ));
            }
        }

        warnings
    }
}
