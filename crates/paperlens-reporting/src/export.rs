use std::path::Path;

use paperlens_core::ResultTable;
use rust_xlsxwriter::{Format, Workbook};
use serde_json::{Map, Value};

use crate::{ExportError, ExportFormat, XLSX_MAX_CELL_CHARS, XLSX_MAX_COLUMNS};

/// Serialize `table` in the given format.
///
/// Columns follow schema order. An empty table yields a header-only
/// document.
pub fn export(table: &ResultTable, format: ExportFormat) -> Result<Vec<u8>, ExportError> {
    let bytes = match format {
        ExportFormat::Xlsx => export_xlsx(table)?,
        ExportFormat::Csv => export_csv(table).into_bytes(),
        ExportFormat::Json => export_json(table)?,
        ExportFormat::Markdown => export_markdown(table).into_bytes(),
    };
    tracing::debug!(%format, rows = table.len(), bytes = bytes.len(), "table exported");
    Ok(bytes)
}

/// Export `table` and write the result to `path`.
pub fn export_to_path(
    table: &ResultTable,
    format: ExportFormat,
    path: &Path,
) -> Result<(), ExportError> {
    let bytes = export(table, format)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

fn export_xlsx(table: &ResultTable) -> Result<Vec<u8>, ExportError> {
    let width = table.schema().len();
    if width > XLSX_MAX_COLUMNS {
        return Err(ExportError::TooManyColumns(width));
    }
    let column = |col: usize| u16::try_from(col).map_err(|_| ExportError::TooManyColumns(width));

    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Sheet1")?;

    for (col, name) in table.header().into_iter().enumerate() {
        let col = column(col)?;
        sheet.write_string_with_format(0, col, name, &bold)?;
        sheet.set_column_width(col, 24)?;
    }
    sheet.set_freeze_panes(1, 0)?;

    for (i, record) in table.rows().iter().enumerate() {
        let row = u32::try_from(i + 1).map_err(|_| ExportError::TooManyRows(table.len()))?;
        for (col, value) in record.values().iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            let cell = truncate_cell(value);
            if cell.len() < value.len() {
                tracing::warn!(
                    row,
                    column = %table.schema().fields()[col].name,
                    chars = value.chars().count(),
                    "cell exceeds the xlsx limit, truncated"
                );
            }
            sheet.write_string(row, column(col)?, cell)?;
        }
    }

    Ok(workbook.save_to_buffer()?)
}

/// Clip to the per-cell character limit, on a char boundary.
fn truncate_cell(s: &str) -> &str {
    match s.char_indices().nth(XLSX_MAX_CELL_CHARS) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn csv_escape(s: &str) -> String {
    if s.contains('"') || s.contains(',') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn export_csv(table: &ResultTable) -> String {
    let mut out = String::new();
    let header: Vec<String> = table.header().into_iter().map(csv_escape).collect();
    out.push_str(&header.join(","));
    out.push('\n');
    for record in table.rows() {
        let cells: Vec<String> = record.values().iter().map(|v| csv_escape(v)).collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}

fn export_json(table: &ResultTable) -> Result<Vec<u8>, ExportError> {
    let rows: Vec<Value> = table
        .rows()
        .iter()
        .map(|record| {
            let object: Map<String, Value> = record
                .iter()
                .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
                .collect();
            Value::Object(object)
        })
        .collect();
    Ok(serde_json::to_vec_pretty(&rows)?)
}

fn md_escape(s: &str) -> String {
    s.replace('|', "\\|").replace("\r\n", "<br>").replace('\n', "<br>")
}

fn export_markdown(table: &ResultTable) -> String {
    let header = table.header();
    let mut out = String::from("# Academic Papers Analysis\n\n");
    out.push_str(&format!("Papers analyzed: {}\n\n", table.len()));

    let names: Vec<String> = header.iter().map(|h| md_escape(h)).collect();
    out.push_str(&format!("| {} |\n", names.join(" | ")));
    out.push_str(&format!("|{}\n", "---|".repeat(header.len())));
    for record in table.rows() {
        let cells: Vec<String> = record.values().iter().map(|v| md_escape(v)).collect();
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use paperlens_core::{PaperRecord, Schema, SchemaField, TableAccumulator};

    fn small_table(rows: &[&[&str]]) -> ResultTable {
        let schema = Arc::new(
            Schema::new(vec![
                SchemaField::new("Title", "Title of the paper"),
                SchemaField::new("Authors", "Authors of the paper"),
            ])
            .unwrap(),
        );
        let mut acc = TableAccumulator::new(Arc::clone(&schema));
        for row in rows {
            let values = row.iter().map(|s| s.to_string()).collect();
            acc.append(PaperRecord::from_values(Arc::clone(&schema), values));
        }
        acc.into_table()
    }

    #[test]
    fn test_csv_escape_quotes() {
        assert_eq!(csv_escape(r#"He said "hi""#), r#""He said ""hi""""#);
    }

    #[test]
    fn test_xlsx_rejects_oversized_schema() {
        let fields = (0..=XLSX_MAX_COLUMNS)
            .map(|i| SchemaField::new(format!("Field_{i}"), "filler"))
            .collect();
        let table = ResultTable::new(Arc::new(Schema::new(fields).unwrap()));
        let err = export_xlsx(&table).unwrap_err();
        assert!(matches!(err, ExportError::TooManyColumns(n) if n == XLSX_MAX_COLUMNS + 1));
        // Other formats have no column limit.
        assert!(export(&table, ExportFormat::Csv).is_ok());
    }

    #[test]
    fn test_csv_escape_comma_and_newline() {
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("a\nb"), "\"a\nb\"");
        assert_eq!(csv_escape("hello"), "hello");
    }

    #[test]
    fn test_md_escape() {
        assert_eq!(md_escape("A | B"), "A \\| B");
        assert_eq!(md_escape("line1\nline2"), "line1<br>line2");
    }

    #[test]
    fn test_truncate_cell_on_char_boundary() {
        let long = "é".repeat(XLSX_MAX_CELL_CHARS + 10);
        let cell = truncate_cell(&long);
        assert_eq!(cell.chars().count(), XLSX_MAX_CELL_CHARS);
        assert_eq!(truncate_cell("short"), "short");
    }

    #[test]
    fn test_csv_layout() {
        let table = small_table(&[&["Foo, revisited", "Bar"], &["Baz", ""]]);
        let csv = export_csv(&table);
        assert_eq!(csv, "Title,Authors\n\"Foo, revisited\",Bar\nBaz,\n");
    }

    #[test]
    fn test_json_keeps_schema_order() {
        let table = small_table(&[&["Foo", "Bar"]]);
        let bytes = export_json(&table).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let title = text.find("\"Title\"").unwrap();
        let authors = text.find("\"Authors\"").unwrap();
        assert!(title < authors);
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed[0]["Authors"], "Bar");
    }

    #[test]
    fn test_json_empty_table() {
        let table = small_table(&[]);
        let parsed: Value = serde_json::from_slice(&export_json(&table).unwrap()).unwrap();
        assert_eq!(parsed, Value::Array(Vec::new()));
    }

    #[test]
    fn test_markdown_table() {
        let table = small_table(&[&["A | B", "Bar"]]);
        let md = export_markdown(&table);
        assert!(md.contains("| Title | Authors |\n|---|---|\n"));
        assert!(md.contains("| A \\| B | Bar |"));
        assert!(md.contains("Papers analyzed: 1"));
    }

    #[test]
    fn test_xlsx_is_a_zip_container() {
        let table = small_table(&[&["Foo", "Bar"]]);
        let bytes = export_xlsx(&table).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }
}
