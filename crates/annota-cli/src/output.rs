//! Output formatting for CLI

use annota_core::{format_time, Annotation};
use console::style;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Table,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "table" => OutputFormat::Table,
            _ => OutputFormat::Text,
        }
    }
}

/// Format output based on selected format
pub fn format_output<T: Serialize>(data: &T, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Table | OutputFormat::Text => {
            format!("{:?}", serde_json::to_value(data).unwrap_or_default())
        }
    }
}

#[derive(Tabled)]
struct AnnotationRow {
    #[tabled(rename = "ID")]
    id: u64,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "User")]
    user: String,
    #[tabled(rename = "Body")]
    body: String,
}

impl From<&Annotation> for AnnotationRow {
    fn from(ann: &Annotation) -> Self {
        Self {
            id: ann.id,
            time: format_time(ann.at),
            user: ann.user.username.clone(),
            body: ann.body.clone(),
        }
    }
}

/// One annotation as a single line. JSON output is one object per line.
pub fn annotation_line(ann: &Annotation, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string(ann).unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Text | OutputFormat::Table => format!(
            "{} {}: {}",
            style(format!("[{}]", format_time(ann.at))).cyan(),
            style(&ann.user.username).bold(),
            ann.body
        ),
    }
}

/// A list of annotations
pub fn annotation_list(annotations: &[Annotation], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => format_output(&annotations, format),
        OutputFormat::Table => {
            let rows: Vec<AnnotationRow> = annotations.iter().map(AnnotationRow::from).collect();
            Table::new(rows).with(Style::rounded()).to_string()
        }
        OutputFormat::Text => annotations
            .iter()
            .map(|ann| annotation_line(ann, format))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!(OutputFormat::from("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::from("table"), OutputFormat::Table);
        assert_eq!(OutputFormat::from("anything"), OutputFormat::Text);
    }

    #[test]
    fn test_json_line_is_parseable() {
        let ann = Annotation::new(4, "jose", "nice", 61_000);
        let line = annotation_line(&ann, OutputFormat::Json);
        let back: Annotation = serde_json::from_str(&line).unwrap();
        assert_eq!(back, ann);
    }

    #[test]
    fn test_table_has_formatted_time() {
        let table = annotation_list(&[Annotation::new(1, "maria", "hello", 90_000)], OutputFormat::Table);
        assert!(table.contains("01:30"));
        assert!(table.contains("maria"));
    }
}
