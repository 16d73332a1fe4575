//! Rendering of load errors, records and merge reports for the terminal

use serde::Serialize;

use crate::merge::MergeReport;
use crate::models::{LoadErrorDetail, RECORD_COLUMNS, Record, TIMESTAMP_FORMAT};
use crate::partition::artifact::escape_field;

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Column headers and stringified cells
struct Grid {
    columns: Vec<&'static str>,
    rows: Vec<Vec<String>>,
}

const LOAD_ERROR_COLUMNS: [&str; 11] = [
    "starttime",
    "session",
    "tbl",
    "query",
    "filename",
    "line_number",
    "colname",
    "type",
    "raw_field_value",
    "err_code",
    "err_reason",
];

fn load_error_grid(errors: &[LoadErrorDetail]) -> Grid {
    let rows = errors
        .iter()
        .map(|e| {
            vec![
                e.start_time
                    .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
                    .unwrap_or_default(),
                e.session.to_string(),
                e.table.clone(),
                e.query.to_string(),
                e.filename.clone(),
                e.line_number.to_string(),
                e.column_name.clone(),
                e.column_type.clone(),
                e.raw_value.clone(),
                e.error_code.to_string(),
                e.reason.clone(),
            ]
        })
        .collect();

    Grid {
        columns: LOAD_ERROR_COLUMNS.to_vec(),
        rows,
    }
}

fn record_grid(records: &[Record]) -> Grid {
    Grid {
        columns: RECORD_COLUMNS.to_vec(),
        rows: records.iter().map(|r| r.to_text_fields().to_vec()).collect(),
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "[]".to_string())
}

/// Format load-error catalog rows
pub fn format_load_errors(errors: &[LoadErrorDetail], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(errors),
        OutputFormat::Csv => format_as_csv(&load_error_grid(errors)),
        OutputFormat::Table => format_as_table(&load_error_grid(errors)),
    }
}

/// Format target-table rows
pub fn format_records(records: &[Record], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(records),
        OutputFormat::Csv => format_as_csv(&record_grid(records)),
        OutputFormat::Table => format_as_table(&record_grid(records)),
    }
}

/// One-line human summary of a merge run
pub fn merge_summary(report: &MergeReport) -> String {
    match (&report.counts, &report.error) {
        (Some(counts), _) => format!(
            "Merged {} into target: {} row(s) loaded, {} replaced, {} inserted",
            report.artifact,
            report.rows_loaded.unwrap_or_default(),
            counts.deleted,
            counts.inserted
        ),
        (None, Some(error)) => format!("Merge of {} rolled back: {}", report.artifact, error),
        (None, None) => format!("Merge of {}: {}", report.artifact, report.state),
    }
}

/// Format the result of one merge run
///
/// Table output prints the summary followed by any diagnostics. CSV output
/// is the diagnostics alone, header included, so it always parses; the
/// summary is the caller's to print elsewhere.
pub fn format_merge_report(report: &MergeReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => return to_json(report),
        OutputFormat::Csv => return format_load_errors(&report.diagnostics, format),
        OutputFormat::Table => {}
    }

    let mut output = merge_summary(report);
    if !report.diagnostics.is_empty() {
        output.push_str("\nLoad errors:\n");
        output.push_str(&format_load_errors(&report.diagnostics, format));
    }

    output
}

fn format_as_csv(grid: &Grid) -> String {
    let mut output = String::new();

    // Header row
    output.push_str(&grid.columns.join(","));
    output.push('\n');

    // Data rows
    for row in &grid.rows {
        let values: Vec<String> = row.iter().map(|v| escape_field(v)).collect();
        output.push_str(&values.join(","));
        output.push('\n');
    }

    output
}

fn format_as_table(grid: &Grid) -> String {
    if grid.rows.is_empty() {
        return "(0 rows)".to_string();
    }

    // Calculate column widths
    let mut widths: Vec<usize> = grid.columns.iter().map(|c| c.chars().count()).collect();
    for row in &grid.rows {
        for (i, value) in row.iter().enumerate() {
            widths[i] = widths[i].max(value.chars().count());
        }
    }

    let mut output = String::new();

    // Header
    let header: Vec<String> = grid
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{:width$}", c, width = widths[i]))
        .collect();
    output.push_str(&header.join(" | "));
    output.push('\n');

    // Separator
    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    output.push_str(&separator.join("-+-"));
    output.push('\n');

    // Data rows
    for row in &grid.rows {
        let values: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, v)| format!("{:width$}", v, width = widths[i]))
            .collect();
        output.push_str(&values.join(" | "));
        output.push('\n');
    }

    output.push_str(&format!("({} rows)", grid.rows.len()));

    output
}
