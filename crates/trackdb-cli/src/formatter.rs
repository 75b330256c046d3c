//! Output formatters for schemas and migration reports.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use trackdb_core::migration::TableReport;
use trackdb_core::{MigrationReport, OperationKind, Schema};

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Format an inspected schema.
    fn format_schema(&self, schema: &Schema) -> String;

    /// Format a migration report.
    fn format_report(&self, report: &MigrationReport) -> String;

    /// Format a simple message.
    fn format_message(&self, message: &str) -> String;

    /// Format an error message, with the report produced before the failure
    /// if there is one.
    fn format_error(&self, error: &str, report: Option<&MigrationReport>) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_schema(&self, schema: &Schema) -> String {
        if schema.is_empty() {
            return "No tables".to_string();
        }

        let mut table = Table::new();
        table.set_header(vec![
            "Table", "Column", "Type", "Nullable", "Default", "Key",
        ]);

        for t in &schema.tables {
            for column in &t.columns {
                let key = match (column.primary_key, column.auto_increment) {
                    (true, true) => "PK AUTOINCREMENT",
                    (true, false) => "PK",
                    _ => "",
                };
                table.add_row(vec![
                    Cell::new(&t.name),
                    Cell::new(&column.name),
                    Cell::new(format!("{} ({})", column.declared_type, column.column_type)),
                    Cell::new(if column.nullable { "yes" } else { "no" }),
                    Cell::new(column.default.as_ref().map(|d| d.to_sql()).unwrap_or_default()),
                    Cell::new(key),
                ]);
            }
        }

        format!("{}\nFingerprint: {}", table, schema.fingerprint())
    }

    fn format_report(&self, report: &MigrationReport) -> String {
        let mut output = format!(
            "State: {}\nGrade: {}{}\n",
            report.state,
            report.grade,
            if report.requires_confirmation {
                " - confirmation required"
            } else {
                ""
            }
        );

        let mut summary = Table::new();
        summary.set_header(vec![
            "Table", "Source", "Operation", "Grade", "Matched", "Added", "Dropped", "Status",
            "Rows",
        ]);
        for t in &report.tables {
            summary.add_row(vec![
                Cell::new(&t.target_table),
                Cell::new(t.source_table.as_deref().unwrap_or("-")),
                Cell::new(t.operation),
                Cell::new(format!("{:?}", t.grade)),
                Cell::new(t.matched.len()),
                Cell::new(t.added.len()),
                Cell::new(t.dropped.len()),
                Cell::new(t.status),
                Cell::new(t.rows_copied),
            ]);
        }
        output.push_str(&summary.to_string());

        let changed: Vec<&TableReport> = report
            .tables
            .iter()
            .filter(|t| t.source_table.is_some() && t.operation != OperationKind::NoOp)
            .collect();
        if !changed.is_empty() {
            output.push_str("\n\n");
            output.push_str(&format_columns(&changed));
        }

        let aliases = report.alias_count();
        if aliases > 0 {
            output.push_str(&format!("\n\nColumns matched by alias: {}", aliases));
        }

        if !report.unmanaged.is_empty() {
            output.push_str(&format!("\n\nUnmanaged: {}", report.unmanaged.join(", ")));
        }

        for warning in &report.warnings {
            output.push_str(&format!("\nWarning: {}", warning));
        }

        if let Some(error) = &report.error {
            output.push_str(&format!("\nError: {}", error));
        }

        output
    }

    fn format_message(&self, message: &str) -> String {
        message.to_string()
    }

    fn format_error(&self, error: &str, report: Option<&MigrationReport>) -> String {
        match report {
            Some(report) => format!("{}\n\nError: {}", self.format_report(report), error),
            None => format!("Error: {}", error),
        }
    }
}

/// Column-level detail for tables that are not left as they are.
fn format_columns(tables: &[&TableReport]) -> String {
    let mut table = Table::new();
    table.set_header(vec!["Table", "Column", "Source", "Resolution"]);

    for t in tables {
        for m in &t.matched {
            table.add_row(vec![
                Cell::new(&t.target_table),
                Cell::new(&m.target),
                Cell::new(m.source.as_deref().unwrap_or("-")),
                Cell::new(m.method),
            ]);
        }
        for added in &t.added {
            table.add_row(vec![
                Cell::new(&t.target_table),
                Cell::new(&added.column.name),
                Cell::new("-"),
                Cell::new(&added.value),
            ]);
        }
        for dropped in &t.dropped {
            table.add_row(vec![
                Cell::new(&t.target_table),
                Cell::new("-"),
                Cell::new(&dropped.name),
                Cell::new(format!("dropped: {}", dropped)),
            ]);
        }
    }

    table.to_string()
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_schema(&self, schema: &Schema) -> String {
        serde_json::json!({
            "tables": schema.tables,
            "fingerprint": schema.fingerprint(),
        })
        .to_string()
    }

    fn format_report(&self, report: &MigrationReport) -> String {
        report
            .to_json_pretty()
            .unwrap_or_else(|e| self.format_error(&e.to_string(), None))
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({ "message": message }).to_string()
    }

    fn format_error(&self, error: &str, report: Option<&MigrationReport>) -> String {
        serde_json::json!({
            "error": error,
            "report": report,
        })
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackdb_core::{tracker_schema, Column, ColumnType, Importer, Table};

    fn report() -> MigrationReport {
        let source = Schema::new().with_table(
            Table::new("tools")
                .with_column(Column::new("md5sum", ColumnType::Text))
                .with_column(Column::new("notes", ColumnType::Text)),
        );
        Importer::default()
            .prepare_schemas(&source, &tracker_schema())
            .unwrap()
            .report
    }

    #[test]
    fn test_table_report() {
        let output = TableFormatter.format_report(&report());
        assert!(output.contains("confirmation required"));
        assert!(output.contains("tools"));
        assert!(output.contains("Warning:"));
        assert!(output.contains("notes"));
        assert!(output.contains("Columns matched by alias: 1"));
    }

    #[test]
    fn test_json_report() {
        let output = JsonFormatter.format_report(&report());
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["grade"], "D");
        assert_eq!(value["requires_confirmation"], true);
    }

    #[test]
    fn test_schema_formats() {
        let schema = tracker_schema();
        let table = TableFormatter.format_schema(&schema);
        assert!(table.contains("manifest_id"));
        assert!(table.contains("PK AUTOINCREMENT"));

        let json: serde_json::Value =
            serde_json::from_str(&JsonFormatter.format_schema(&schema)).unwrap();
        assert_eq!(json["tables"].as_array().map(Vec::len), Some(5));
        assert_eq!(json["fingerprint"], schema.fingerprint());
    }

    #[test]
    fn test_json_error_carries_report() {
        let report = report();
        let output = JsonFormatter.format_error("boom", Some(&report));
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["error"], "boom");
        assert_eq!(value["report"]["grade"], "D");
    }
}
