//! CLI Output Formatting Module
//! Provides consistent, colorized output for terminal UX

use colored::Colorize;
use serde_json::Value;

use crate::engine::batch::ResultEnvelope;

pub struct CliFormatter;

impl CliFormatter {
    /// Print a success message
    pub fn success(message: &str) {
        println!("{} {}", "✓".green().bold(), message);
    }

    /// Print an error message
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red().bold(), message);
    }

    /// Print a warning message
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow().bold(), message);
    }

    /// Print an info message
    pub fn info(message: &str) {
        println!("{} {}", "ℹ".blue().bold(), message);
    }

    /// Print a section header
    pub fn header(title: &str) {
        println!("\n{}", title.bright_cyan().bold());
        println!("{}", "─".repeat(title.len()).bright_black());
    }

    /// Print a key-value pair
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", key.bright_white().bold(), value);
    }

    /// Print a list item
    pub fn item(text: &str) {
        println!("  {} {}", "•".bright_black(), text);
    }

    /// Print a table header
    pub fn table_header(columns: &[&str]) {
        let header = columns
            .iter()
            .map(|c| c.bright_white().bold().to_string())
            .collect::<Vec<_>>()
            .join(" │ ");
        println!("  {}", header);
        println!("  {}", "─".repeat(header.len()).bright_black());
    }

    /// Print a table row
    pub fn table_row(values: &[&str]) {
        println!("  {}", values.join(" │ "));
    }

    /// Print a divider
    pub fn divider() {
        println!("{}", "─".repeat(60).bright_black());
    }

    /// Print a result envelope as a table, failed indices in red
    pub fn envelope(envelope: &ResultEnvelope) {
        let columns = record_columns(&envelope.resource);
        if columns.is_empty() && envelope.error.is_none() {
            Self::info("No records");
            return;
        }

        let mut header = vec!["#"];
        header.extend(columns.iter().map(String::as_str));
        Self::table_header(&header);

        for (index, entry) in envelope.resource.iter().enumerate() {
            let position = index.to_string();
            match entry {
                Value::Object(record) => {
                    let cells: Vec<String> = columns
                        .iter()
                        .map(|c| record.get(c).map(cell).unwrap_or_default())
                        .collect();
                    let mut row = vec![position.as_str()];
                    row.extend(cells.iter().map(String::as_str));
                    Self::table_row(&row);
                }
                other => println!("  {} │ {}", position, cell(other).red()),
            }
        }

        Self::divider();
        if let Some(meta) = &envelope.meta {
            Self::kv("count", &meta.count.to_string());
        }
        match &envelope.error {
            Some(failed) => Self::warning(&format!(
                "{} of {} items failed (indices {:?})",
                failed.len(),
                envelope.resource.len(),
                failed
            )),
            None => Self::success(&format!("{} records", envelope.resource.len())),
        }
    }
}

/// Union of the record fields, in first-seen order
pub fn record_columns(resource: &[Value]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for record in resource.iter().filter_map(Value::as_object) {
        for key in record.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

/// A JSON value as a table cell: strings unquoted, everything else as JSON
pub fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_columns() {
        let resource = vec![json!({"id": "a", "name": "x"}), json!("boom"), json!({"id": "b", "age": 3})];
        let columns = record_columns(&resource);
        assert_eq!(columns.len(), 3);
        assert!(columns.contains(&"age".to_string()));
    }

    #[test]
    fn test_cell() {
        assert_eq!(cell(&json!("Ann")), "Ann");
        assert_eq!(cell(&json!(42)), "42");
        assert_eq!(cell(&json!(null)), "null");
        assert_eq!(cell(&json!([1, 2])), "[1,2]");
    }
}
