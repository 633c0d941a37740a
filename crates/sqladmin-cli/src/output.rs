//! Terminal rendering of results and history

use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use sqladmin_query::{HistoryEntry, QueryTemplate, TableResult};

/// Longest query text shown in the history table
const QUERY_COLUMN_WIDTH: usize = 60;

pub fn result_table(result: &TableResult) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(result.columns.iter().map(|c| {
            if c.name.is_empty() {
                "(no column name)".to_string()
            } else {
                c.name.clone()
            }
        }));

    for row in &result.rows {
        table.add_row(row.values.iter().map(|v| v.to_string()));
    }
    table
}

pub fn history_table(entries: &[HistoryEntry]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Executed", "Database", "Status", "Duration", "Rows", "Query"]);

    for entry in entries {
        let status = if entry.success {
            "ok".to_string()
        } else {
            entry.error.clone().unwrap_or_else(|| "failed".to_string())
        };
        table.add_row(vec![
            entry
                .executed_at
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            entry.database.clone().unwrap_or_default(),
            status,
            format!("{} ms", entry.duration_ms),
            entry
                .rows_affected
                .map(|rows| rows.to_string())
                .unwrap_or_default(),
            truncate_query(&entry.query),
        ]);
    }
    table
}

pub fn templates_table(templates: &[QueryTemplate]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Name", "Category", "Description", "Query"]);

    for template in templates {
        table.add_row(vec![
            template.name.clone(),
            template.category.clone(),
            template.description.clone(),
            truncate_query(&template.query),
        ]);
    }
    table
}

/// Single-line preview of a query for tabular display
fn truncate_query(query: &str) -> String {
    let flattened = query.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.chars().count() <= QUERY_COLUMN_WIDTH {
        return flattened;
    }
    let mut preview: String = flattened.chars().take(QUERY_COLUMN_WIDTH - 3).collect();
    preview.push_str("...");
    preview
}

pub fn rows_footer(count: usize) -> String {
    match count {
        1 => "(1 row)".to_string(),
        n => format!("({} rows)", n),
    }
}
