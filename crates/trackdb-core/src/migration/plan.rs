//! Migration plan generation.
//!
//! Turns a [`SchemaMapping`] into one operation per target table. The
//! planner is pure: it reads the two schema snapshots and the mapping and
//! never touches storage.

use super::grader::{MigrationGrade, SafetyGrader};
use super::state::current_timestamp;
use crate::matching::{ColumnMapping, ColumnMatch, MatchMethod, SchemaMapping};
use crate::schema::{quote_ident, Column, ColumnType, DefaultValue, Schema, Table};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Where the value of a target column comes from during migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum ValueSource {
    /// Copied from a source column.
    Copied {
        /// Source column name.
        source: String,
    },
    /// The column's declared default.
    DeclaredDefault {
        /// The declared default.
        value: DefaultValue,
    },
    /// NULL.
    Null,
    /// Assigned by storage (`INTEGER PRIMARY KEY` row id).
    Generated,
    /// A zero value synthesized for a `NOT NULL` column without a default.
    Fabricated {
        /// The synthesized value.
        value: DefaultValue,
    },
}

impl ValueSource {
    /// Value for a target column that has no source counterpart.
    pub fn for_unmatched(column: &Column) -> Self {
        if let Some(default) = &column.default {
            ValueSource::DeclaredDefault {
                value: default.clone(),
            }
        } else if column.is_rowid_alias() {
            ValueSource::Generated
        } else if column.nullable {
            ValueSource::Null
        } else {
            ValueSource::Fabricated {
                value: column.column_type.zero_value(),
            }
        }
    }

    /// Check if the value is synthesized rather than copied or declared.
    pub fn is_fabricated(&self) -> bool {
        matches!(self, ValueSource::Fabricated { .. })
    }

    /// Expression for the `SELECT` list of a copy, or `None` when storage
    /// fills the column itself (declared default, NULL, row id).
    pub fn select_expr(&self) -> Option<String> {
        match self {
            ValueSource::Copied { source } => Some(quote_ident(source)),
            ValueSource::Fabricated { value } => Some(value.to_sql()),
            ValueSource::DeclaredDefault { .. } | ValueSource::Null | ValueSource::Generated => {
                None
            }
        }
    }
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::Copied { source } => write!(f, "from {}", source),
            ValueSource::DeclaredDefault { value } => write!(f, "default {}", value.to_sql()),
            ValueSource::Null => write!(f, "null"),
            ValueSource::Generated => write!(f, "row id"),
            ValueSource::Fabricated { value } => write!(f, "fabricated {}", value.to_sql()),
        }
    }
}

/// A column appended to an existing table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddedColumn {
    /// Target column definition.
    pub column: Column,
    /// How existing rows are filled.
    pub value: ValueSource,
}

impl AddedColumn {
    /// Column definition for `ALTER TABLE ... ADD COLUMN`.
    ///
    /// Storage refuses to add a `NOT NULL` column without a default, so a
    /// fabricated value is declared as the column's default.
    pub fn definition_sql(&self) -> String {
        match &self.value {
            ValueSource::Fabricated { value } => self
                .column
                .clone()
                .with_default(value.clone())
                .definition_sql(),
            _ => self.column.definition_sql(),
        }
    }
}

/// One target column of a rebuilt table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    /// Target column name.
    pub target: String,
    /// Where its values come from.
    pub value: ValueSource,
}

/// Why a source column will not survive the migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum DropReason {
    /// No target column claimed it.
    NotInTarget,
    /// It was matched, but its type cannot be carried losslessly.
    IncompatibleType {
        /// Target column it was matched to.
        target: String,
        /// Source type.
        from: ColumnType,
        /// Target type.
        to: ColumnType,
    },
}

/// A source column whose data is discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedColumn {
    /// Source column name.
    pub name: String,
    /// Why it is dropped.
    #[serde(flatten)]
    pub reason: DropReason,
}

impl std::fmt::Display for DroppedColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.reason {
            DropReason::NotInTarget => write!(f, "{} (not in target)", self.name),
            DropReason::IncompatibleType { target, from, to } => {
                write!(f, "{} ({} cannot become {} {})", self.name, from, to, target)
            }
        }
    }
}

/// Operation kind, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Nothing to do.
    NoOp,
    /// Columns appended in place.
    AddColumns,
    /// Table rebuilt and swapped in.
    Recreate,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::NoOp => write!(f, "no-op"),
            OperationKind::AddColumns => write!(f, "add columns"),
            OperationKind::Recreate => write!(f, "recreate"),
        }
    }
}

/// What the executor does to one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "columns", rename_all = "snake_case")]
pub enum TableOperation {
    /// Source and target tables are structurally identical.
    NoOp,
    /// Append the listed columns with `ALTER TABLE ... ADD COLUMN`.
    AddColumns(Vec<AddedColumn>),
    /// Build the target table under a temporary name, copy rows through the
    /// projections, drop the old table and rename the new one.
    Recreate(Vec<Projection>),
}

impl TableOperation {
    /// Kind of this operation.
    pub fn kind(&self) -> OperationKind {
        match self {
            TableOperation::NoOp => OperationKind::NoOp,
            TableOperation::AddColumns(_) => OperationKind::AddColumns,
            TableOperation::Recreate(_) => OperationKind::Recreate,
        }
    }

    /// Check if this operation changes nothing.
    pub fn is_noop(&self) -> bool {
        matches!(self, TableOperation::NoOp)
    }
}

/// Plan for one target table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TablePlan {
    /// Target table definition.
    pub definition: Table,
    /// Column mapping after type demotion.
    pub mapping: ColumnMapping,
    /// Source columns whose data is discarded, in source order.
    pub dropped: Vec<DroppedColumn>,
    /// The operation.
    pub operation: TableOperation,
}

impl TablePlan {
    /// Target table name.
    pub fn target_table(&self) -> &str {
        &self.definition.name
    }

    /// Source table name, if the table exists in the source.
    pub fn source_table(&self) -> Option<&str> {
        self.mapping.source_table.as_deref()
    }

    /// Target columns that get no source data, with their value origin.
    ///
    /// A newly created table has no existing rows, so nothing is added.
    pub fn added(&self) -> Vec<AddedColumn> {
        if self.source_table().is_none() {
            return Vec::new();
        }
        match &self.operation {
            TableOperation::NoOp => Vec::new(),
            TableOperation::AddColumns(added) => added.clone(),
            TableOperation::Recreate(projections) => projections
                .iter()
                .filter(|p| !matches!(p.value, ValueSource::Copied { .. }))
                .filter_map(|p| {
                    self.definition.column(&p.target).map(|column| AddedColumn {
                        column: column.clone(),
                        value: p.value.clone(),
                    })
                })
                .collect(),
        }
    }

    /// Target columns whose values are fabricated.
    pub fn fabricated(&self) -> Vec<AddedColumn> {
        self.added()
            .into_iter()
            .filter(|a| a.value.is_fabricated())
            .collect()
    }

    /// Check if the plan discards source data.
    pub fn loses_data(&self) -> bool {
        !self.dropped.is_empty()
    }
}

/// A complete migration plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationPlan {
    /// One plan per target table, in target order.
    pub tables: Vec<TablePlan>,
    /// Source tables left untouched.
    pub unmanaged: Vec<String>,
    /// Safety grade.
    pub grade: MigrationGrade,
    /// Fingerprint of the schema the plan was computed against.
    pub source_fingerprint: String,
    /// Fingerprint of the target schema.
    pub target_fingerprint: String,
    /// When the plan was created (microseconds since epoch).
    pub created_at: u64,
}

impl MigrationPlan {
    /// Check if every table is a no-op.
    pub fn is_noop(&self) -> bool {
        self.tables.iter().all(|t| t.operation.is_noop())
    }

    /// Plan for a target table.
    pub fn table(&self, target_table: &str) -> Option<&TablePlan> {
        self.tables.iter().find(|t| t.target_table() == target_table)
    }

    /// Number of tables the executor will change.
    pub fn change_count(&self) -> usize {
        self.tables.iter().filter(|t| !t.operation.is_noop()).count()
    }
}

/// Decides, per table, between in-place changes and rebuilding.
pub struct MigrationPlanner;

impl MigrationPlanner {
    /// Plan every table in `mapping`.
    pub fn plan(mapping: &SchemaMapping, source: &Schema, target: &Schema) -> MigrationPlan {
        let tables: Vec<TablePlan> = target
            .tables
            .iter()
            .filter_map(|definition| {
                let table_mapping = mapping.table(&definition.name)?;
                let source_table = table_mapping
                    .source_table
                    .as_deref()
                    .and_then(|name| source.table(name));
                Some(Self::plan_table(table_mapping, source_table, definition))
            })
            .collect();

        let grade = SafetyGrader::grade(&tables);

        MigrationPlan {
            tables,
            unmanaged: mapping.unmanaged.clone(),
            grade,
            source_fingerprint: source.fingerprint(),
            target_fingerprint: target.fingerprint(),
            created_at: current_timestamp(),
        }
    }

    /// Plan a single table.
    pub fn plan_table(mapping: &ColumnMapping, source: Option<&Table>, target: &Table) -> TablePlan {
        let Some(source) = source else {
            let mapping = ColumnMapping::fresh(target);
            return TablePlan {
                definition: target.clone(),
                operation: Self::recreate(&mapping, target),
                mapping,
                dropped: Vec::new(),
            };
        };

        let (mapping, dropped) = Self::demote_incompatible(mapping, source, target);

        let operation = if Self::is_noop(&mapping, &dropped, source, target) {
            TableOperation::NoOp
        } else if let Some(added) = Self::additions(&mapping, &dropped, source, target) {
            TableOperation::AddColumns(added)
        } else {
            Self::recreate(&mapping, target)
        };

        debug!(
            table = %target.name,
            operation = %operation.kind(),
            dropped = dropped.len(),
            "planned table"
        );

        TablePlan {
            definition: target.clone(),
            mapping,
            dropped,
            operation,
        }
    }

    /// Unmatch pairs whose types cannot be carried losslessly and collect
    /// every dropped source column in source order.
    fn demote_incompatible(
        mapping: &ColumnMapping,
        source: &Table,
        target: &Table,
    ) -> (ColumnMapping, Vec<DroppedColumn>) {
        let mut mapping = mapping.clone();
        let mut incompatible = Vec::new();

        for entry in &mut mapping.columns {
            let Some(source_name) = entry.source.as_deref() else {
                continue;
            };
            let (Some(from), Some(to)) = (source.column(source_name), target.column(&entry.target))
            else {
                continue;
            };
            if !from.column_type.widens_to(to.column_type) {
                incompatible.push(DroppedColumn {
                    name: from.name.clone(),
                    reason: DropReason::IncompatibleType {
                        target: to.name.clone(),
                        from: from.column_type,
                        to: to.column_type,
                    },
                });
                *entry = ColumnMatch {
                    target: entry.target.clone(),
                    source: None,
                    method: MatchMethod::Unmatched,
                };
            }
        }

        let dropped: Vec<DroppedColumn> = source
            .columns
            .iter()
            .filter_map(|column| {
                if let Some(found) = incompatible.iter().find(|d| d.name == column.name) {
                    Some(found.clone())
                } else if mapping.dropped.contains(&column.name) {
                    Some(DroppedColumn {
                        name: column.name.clone(),
                        reason: DropReason::NotInTarget,
                    })
                } else {
                    None
                }
            })
            .collect();

        mapping.dropped = dropped.iter().map(|d| d.name.clone()).collect();
        (mapping, dropped)
    }

    fn is_noop(
        mapping: &ColumnMapping,
        dropped: &[DroppedColumn],
        source: &Table,
        target: &Table,
    ) -> bool {
        mapping.table_method == MatchMethod::Exact
            && dropped.is_empty()
            && source.columns.len() == target.columns.len()
            && mapping.columns.iter().all(|m| m.method == MatchMethod::Exact)
            && source
                .columns
                .iter()
                .zip(&target.columns)
                .all(|(s, t)| s.structurally_eq(t))
    }

    /// Columns to append when the target is the source plus trailing new
    /// columns, or `None` when the table must be rebuilt.
    fn additions(
        mapping: &ColumnMapping,
        dropped: &[DroppedColumn],
        source: &Table,
        target: &Table,
    ) -> Option<Vec<AddedColumn>> {
        if mapping.table_method != MatchMethod::Exact || !dropped.is_empty() {
            return None;
        }
        let kept = source.columns.len();
        if target.columns.len() <= kept {
            return None;
        }

        // Existing columns are left as they are, so they must already be
        // the target prefix: same name, type, nullability, default and key.
        for (source_column, target_column) in source.columns.iter().zip(&target.columns) {
            let entry = mapping.get(&target_column.name)?;
            if entry.method != MatchMethod::Exact
                || entry.source.as_deref() != Some(source_column.name.as_str())
                || !source_column.structurally_eq(target_column)
            {
                return None;
            }
        }

        let mut added = Vec::new();
        for column in &target.columns[kept..] {
            // ADD COLUMN accepts neither keys nor non-constant defaults.
            if column.primary_key || matches!(column.default, Some(DefaultValue::Expression(_))) {
                return None;
            }
            if mapping.source_for(&column.name).is_some() {
                return None;
            }
            added.push(AddedColumn {
                column: column.clone(),
                value: ValueSource::for_unmatched(column),
            });
        }

        Some(added)
    }

    fn recreate(mapping: &ColumnMapping, target: &Table) -> TableOperation {
        let projections = target
            .columns
            .iter()
            .map(|column| Projection {
                target: column.name.clone(),
                value: match mapping.source_for(&column.name) {
                    Some(source) => ValueSource::Copied {
                        source: source.to_string(),
                    },
                    None => ValueSource::for_unmatched(column),
                },
            })
            .collect();
        TableOperation::Recreate(projections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::{AliasRegistry, ColumnMatcher};
    use crate::migration::SafetyGrade;

    fn plan_one(source: &Table, target: &Table) -> TablePlan {
        let aliases = AliasRegistry::default();
        let mapping = ColumnMatcher::new(&aliases)
            .match_table(Some(source), target)
            .unwrap();
        MigrationPlanner::plan_table(&mapping, Some(source), target)
    }

    fn tools_target() -> Table {
        Table::new("tools")
            .with_column(Column::new("id", ColumnType::Integer).primary_key())
            .with_column(Column::new("md5", ColumnType::Text))
            .with_column(Column::new("name", ColumnType::Text))
            .with_column(Column::new("added_at", ColumnType::Text))
    }

    #[test]
    fn test_identical_table_is_noop() {
        let target = tools_target();
        let plan = plan_one(&target, &target);
        assert_eq!(plan.operation, TableOperation::NoOp);
        assert!(plan.dropped.is_empty());
    }

    #[test]
    fn test_trailing_columns_are_added() {
        let source = Table::new("tools")
            .with_column(Column::new("id", ColumnType::Integer).primary_key())
            .with_column(Column::new("md5", ColumnType::Text));
        let target = tools_target()
            .with_column(Column::new("rating", ColumnType::Integer).not_null())
            .with_column(
                Column::new("kind", ColumnType::Text)
                    .not_null()
                    .with_default(DefaultValue::Text("tool".into())),
            );

        let plan = plan_one(&source, &target);
        let TableOperation::AddColumns(added) = &plan.operation else {
            panic!("expected AddColumns, got {:?}", plan.operation);
        };

        let values: Vec<(&str, &ValueSource)> = added
            .iter()
            .map(|a| (a.column.name.as_str(), &a.value))
            .collect();
        assert_eq!(values[0], ("name", &ValueSource::Null));
        assert_eq!(values[1], ("added_at", &ValueSource::Null));
        assert_eq!(
            values[2],
            (
                "rating",
                &ValueSource::Fabricated {
                    value: DefaultValue::Integer(0)
                }
            )
        );
        assert!(matches!(values[3].1, ValueSource::DeclaredDefault { .. }));

        assert_eq!(
            added[2].definition_sql(),
            "\"rating\" INTEGER NOT NULL DEFAULT 0"
        );
        assert_eq!(plan.fabricated().len(), 1);
    }

    #[test]
    fn test_constraint_drift_on_kept_column_recreates() {
        let source = Table::new("tools")
            .with_column(Column::new("id", ColumnType::Integer).primary_key())
            .with_column(Column::new("name", ColumnType::Text));
        let target = Table::new("tools")
            .with_column(Column::new("id", ColumnType::Integer).primary_key())
            .with_column(Column::new("name", ColumnType::Text).not_null())
            .with_column(Column::new("version", ColumnType::Text));

        let plan = plan_one(&source, &target);
        assert_eq!(plan.operation.kind(), OperationKind::Recreate);
        assert!(plan.dropped.is_empty());

        let defaulted = Table::new("tools")
            .with_column(Column::new("id", ColumnType::Integer).primary_key())
            .with_column(
                Column::new("name", ColumnType::Text).with_default(DefaultValue::Text("x".into())),
            )
            .with_column(Column::new("version", ColumnType::Text));
        let plan = plan_one(&source, &defaulted);
        assert_eq!(plan.operation.kind(), OperationKind::Recreate);
    }

    #[test]
    fn test_widened_kept_column_recreates() {
        let source = Table::new("t").with_column(Column::new("score", ColumnType::Integer));
        let target = Table::new("t")
            .with_column(Column::new("score", ColumnType::Real))
            .with_column(Column::new("note", ColumnType::Text));

        let plan = plan_one(&source, &target);
        assert_eq!(plan.operation.kind(), OperationKind::Recreate);
        assert_eq!(plan.mapping.source_for("score"), Some("score"));
    }

    #[test]
    fn test_tools_scenario_recreates() {
        let source = Table::new("tools")
            .with_column(Column::new("id", ColumnType::Integer))
            .with_column(Column::new("md5sum", ColumnType::Text))
            .with_column(Column::new("name", ColumnType::Text));

        let plan = plan_one(&source, &tools_target());

        assert_eq!(plan.operation.kind(), OperationKind::Recreate);
        assert!(plan.dropped.is_empty());
        assert_eq!(plan.mapping.source_for("md5"), Some("md5sum"));
        assert_eq!(
            plan.mapping.get("md5").map(|m| m.method),
            Some(MatchMethod::Alias)
        );

        let TableOperation::Recreate(projections) = &plan.operation else {
            unreachable!();
        };
        assert_eq!(projections[3].target, "added_at");
        assert_eq!(projections[3].value, ValueSource::Null);
    }

    #[test]
    fn test_incompatible_type_is_dropped() {
        let source = Table::new("builds")
            .with_column(Column::new("name", ColumnType::Text))
            .with_column(Column::new("year", ColumnType::Text));
        let target = Table::new("builds")
            .with_column(Column::new("name", ColumnType::Text))
            .with_column(Column::new("year", ColumnType::Integer));

        let plan = plan_one(&source, &target);

        assert_eq!(plan.operation.kind(), OperationKind::Recreate);
        assert_eq!(plan.mapping.source_for("year"), None);
        assert_eq!(plan.dropped.len(), 1);
        assert_eq!(
            plan.dropped[0].reason,
            DropReason::IncompatibleType {
                target: "year".into(),
                from: ColumnType::Text,
                to: ColumnType::Integer,
            }
        );
        assert!(plan.mapping.is_injective());
    }

    #[test]
    fn test_integer_widens_to_real() {
        let source = Table::new("t").with_column(Column::new("score", ColumnType::Integer));
        let target = Table::new("t").with_column(Column::new("score", ColumnType::Real));

        let plan = plan_one(&source, &target);
        assert!(plan.dropped.is_empty());
        assert_eq!(plan.mapping.source_for("score"), Some("score"));
        assert_eq!(plan.operation.kind(), OperationKind::Recreate);
    }

    #[test]
    fn test_unknown_type_never_carried() {
        let source = Table::new("t").with_column(Column::declared("flag", "BOOLEAN"));
        let target = Table::new("t").with_column(Column::declared("flag", "BOOLEAN"));

        let plan = plan_one(&source, &target);
        assert_eq!(plan.dropped.len(), 1);
        assert_eq!(plan.operation.kind(), OperationKind::Recreate);
    }

    #[test]
    fn test_reordered_columns_recreate() {
        let source = Table::new("t")
            .with_column(Column::new("b", ColumnType::Text))
            .with_column(Column::new("a", ColumnType::Text));
        let target = Table::new("t")
            .with_column(Column::new("a", ColumnType::Text))
            .with_column(Column::new("b", ColumnType::Text))
            .with_column(Column::new("c", ColumnType::Text));

        let plan = plan_one(&source, &target);
        assert_eq!(plan.operation.kind(), OperationKind::Recreate);
        assert!(plan.dropped.is_empty());
    }

    #[test]
    fn test_renamed_table_recreates() {
        let source = Table::new("Tools").with_column(Column::new("name", ColumnType::Text));
        let target = Table::new("tools").with_column(Column::new("name", ColumnType::Text));

        let aliases = AliasRegistry::default();
        let source_schema = Schema::new().with_table(source);
        let target_schema = Schema::new().with_table(target);
        let mapping = ColumnMatcher::new(&aliases)
            .match_schemas(&source_schema, &target_schema)
            .unwrap();

        let plan = MigrationPlanner::plan(&mapping, &source_schema, &target_schema);
        assert_eq!(plan.tables[0].operation.kind(), OperationKind::Recreate);
        assert_eq!(plan.tables[0].source_table(), Some("Tools"));
    }

    #[test]
    fn test_missing_table_created() {
        let target = tools_target();
        let mapping = ColumnMapping::fresh(&target);
        let plan = MigrationPlanner::plan_table(&mapping, None, &target);

        assert_eq!(plan.source_table(), None);
        let TableOperation::Recreate(projections) = &plan.operation else {
            panic!("expected Recreate");
        };
        assert_eq!(projections[0].value, ValueSource::Generated);
        assert!(projections.iter().all(|p| p.value.select_expr().is_none()));
    }

    #[test]
    fn test_plan_grade_and_fingerprints() {
        let source = Schema::new().with_table(
            Table::new("tools")
                .with_column(Column::new("name", ColumnType::Text))
                .with_column(Column::new("notes", ColumnType::Text)),
        );
        let target =
            Schema::new().with_table(Table::new("tools").with_column(Column::new("name", ColumnType::Text)));

        let aliases = AliasRegistry::default();
        let mapping = ColumnMatcher::new(&aliases)
            .match_schemas(&source, &target)
            .unwrap();
        let plan = MigrationPlanner::plan(&mapping, &source, &target);

        assert_eq!(plan.grade.overall_grade, SafetyGrade::D);
        assert!(plan.grade.requires_confirmation());
        assert_eq!(plan.source_fingerprint, source.fingerprint());
        assert_eq!(plan.target_fingerprint, target.fingerprint());
        assert_eq!(plan.change_count(), 1);
    }
}
