use serde_json::Value;

use scribe_core::state::{ExecutionArtifact, QueryOutput};

/// Rows shown by name in a small-result summary.
const SAMPLE_ROWS: usize = 3;
const SMALL_RESULT_ROWS: usize = 5;
const MAX_SUMMARY_CHARS: usize = 100;

/// One-line digest of a completed execution for session history, e.g.
/// "3 rows: Laptop, Monitor, Desk" or "120 rows: $1.2M (top)". Id and tenant
/// columns are skipped so the summary names something a person would
/// recognize. Never fails; anything unexpected degrades to "N rows".
pub fn summarize_results(execution: Option<&ExecutionArtifact>, tenant_column: &str) -> String {
    let Some(output) = execution.and_then(|e| e.output()).filter(|o| !o.rows.is_empty()) else {
        return "0 rows".to_string();
    };

    if output.row_count <= SMALL_RESULT_ROWS {
        let values: Vec<String> = output
            .rows
            .iter()
            .take(SAMPLE_ROWS)
            .filter_map(|row| first_display_value(output, row, tenant_column))
            .collect();
        truncate_chars(
            format!("{} rows: {}", output.row_count, values.join(", ")),
            MAX_SUMMARY_CHARS,
        )
    } else {
        match output
            .rows
            .first()
            .and_then(|row| first_display_value(output, row, tenant_column))
        {
            Some(top) => format!("{} rows: {top} (top)", output.row_count),
            None => format!("{} rows", output.row_count),
        }
    }
}

/// The first column value in SELECT order that is not an id or the tenant
/// filter, rendered for people (large numbers get K/M suffixes).
fn first_display_value(output: &QueryOutput, row: &Value, tenant_column: &str) -> Option<String> {
    let columns = output
        .columns
        .iter()
        .filter(|c| !c.eq_ignore_ascii_case("id") && !c.eq_ignore_ascii_case(tenant_column));
    for column in columns {
        match row.get(column) {
            Some(Value::Null) | None => continue,
            Some(value) => return Some(display_value(value)),
        }
    }
    None
}

fn display_value(value: &Value) -> String {
    if let Some(n) = value.as_f64() {
        if n > 1_000_000.0 {
            return format!("${:.1}M", n / 1_000_000.0);
        }
        if n > 1000.0 {
            return format!("${:.1}K", n / 1000.0);
        }
    }
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate_chars(summary: String, max: usize) -> String {
    if summary.chars().count() > max {
        let head: String = summary.chars().take(max - 3).collect();
        format!("{head}...")
    } else {
        summary
    }
}
