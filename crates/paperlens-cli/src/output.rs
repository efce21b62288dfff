use std::io::Write;

use owo_colors::OwoColorize;
use paperlens_core::{DocumentFailure, ProgressEvent, ResultTable, Schema};

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Columns shown in the terminal preview; the export carries all of them.
const PREVIEW_COLUMNS: &[&str] = &["Title", "Authors", "Date_Published", "TLDR"];

/// One-line description of a progress event, or `None` for events that only
/// update the spinner.
pub fn progress_line(event: &ProgressEvent, color: ColorMode) -> Option<String> {
    match event {
        ProgressEvent::DocumentStarted { .. } => None,
        ProgressEvent::TextExtracted {
            index,
            total,
            name,
            chars,
        } => {
            let line = format!("[{}/{}] {}: {} characters of text", index + 1, total, name, chars);
            Some(if color.enabled() {
                line.dimmed().to_string()
            } else {
                line
            })
        }
        ProgressEvent::RecordAppended {
            index,
            total,
            name,
            record,
        } => {
            let title = record.get("Title").filter(|t| !t.is_empty()).unwrap_or("(untitled)");
            Some(if color.enabled() {
                format!(
                    "[{}/{}] {} {} -> \"{}\"",
                    index + 1,
                    total,
                    "Extracted".green(),
                    name,
                    truncate(title, 60)
                )
            } else {
                format!(
                    "[{}/{}] Extracted {} -> \"{}\"",
                    index + 1,
                    total,
                    name,
                    truncate(title, 60)
                )
            })
        }
        ProgressEvent::DocumentFailed {
            index,
            total,
            name,
            stage,
            message,
        } => Some(if color.enabled() {
            format!(
                "[{}/{}] {} {} (after {}): {}",
                index + 1,
                total,
                "Failed".red(),
                name,
                stage,
                message
            )
        } else {
            format!(
                "[{}/{}] Failed {} (after {}): {}",
                index + 1,
                total,
                name,
                stage,
                message
            )
        }),
    }
}

/// Print the first rows of the table, a handful of columns wide.
pub fn print_preview(
    w: &mut dyn Write,
    table: &ResultTable,
    rows: usize,
    color: ColorMode,
) -> std::io::Result<()> {
    let head = table.head(rows);
    if head.is_empty() {
        writeln!(w, "No rows extracted.")?;
        return Ok(());
    }

    let columns: Vec<&str> = PREVIEW_COLUMNS
        .iter()
        .copied()
        .filter(|c| table.schema().position(c).is_some())
        .collect();
    let columns = if columns.is_empty() {
        table.header().into_iter().take(3).collect()
    } else {
        columns
    };

    if color.enabled() {
        writeln!(w, "{}", format!("Preview ({} of {} rows)", head.len(), table.len()).bold())?;
    } else {
        writeln!(w, "Preview ({} of {} rows)", head.len(), table.len())?;
    }
    for (i, record) in head.iter().enumerate() {
        writeln!(w)?;
        writeln!(w, "  [{}]", i + 1)?;
        for column in &columns {
            let value = record.get(column).unwrap_or("");
            let value = if value.is_empty() { "-" } else { value };
            let value = truncate(&value.replace('\n', " "), 100);
            if color.enabled() {
                writeln!(w, "  {:<16} {}", format!("{column}:").dimmed(), value)?;
            } else {
                writeln!(w, "  {:<16} {}", format!("{column}:"), value)?;
            }
        }
    }
    writeln!(w)?;
    Ok(())
}

/// Print the documents that produced no row.
pub fn print_failures(
    w: &mut dyn Write,
    failures: &[DocumentFailure],
    color: ColorMode,
) -> std::io::Result<()> {
    if failures.is_empty() {
        return Ok(());
    }
    let heading = format!("{} document(s) produced no row:", failures.len());
    if color.enabled() {
        writeln!(w, "{}", heading.yellow().bold())?;
    } else {
        writeln!(w, "{heading}")?;
    }
    for f in failures {
        writeln!(w, "  {} (after {}): {}", f.name, f.stage, f.error)?;
    }
    writeln!(w)?;
    Ok(())
}

/// Print the final summary.
pub fn print_summary(
    w: &mut dyn Write,
    documents: usize,
    table: &ResultTable,
    failed: usize,
    export_path: &std::path::Path,
    color: ColorMode,
) -> std::io::Result<()> {
    let sep = "=".repeat(60);
    if color.enabled() {
        writeln!(w, "{}", sep.bold())?;
        writeln!(w, "{}", "SUMMARY".bold())?;
        writeln!(w, "{}", sep.bold())?;
    } else {
        writeln!(w, "{sep}")?;
        writeln!(w, "SUMMARY")?;
        writeln!(w, "{sep}")?;
    }
    writeln!(w, "  Documents submitted: {documents}")?;
    if color.enabled() {
        writeln!(w, "  {} {}", "Rows extracted:".green(), table.len())?;
    } else {
        writeln!(w, "  Rows extracted: {}", table.len())?;
    }
    if failed > 0 {
        if color.enabled() {
            writeln!(w, "  {} {}", "Failed:".red(), failed)?;
        } else {
            writeln!(w, "  Failed: {failed}")?;
        }
    }
    writeln!(w, "  Written to: {}", export_path.display())?;
    writeln!(w)?;
    Ok(())
}

/// Print the schema as a name/description listing.
pub fn print_schema(w: &mut dyn Write, schema: &Schema, color: ColorMode) -> std::io::Result<()> {
    for (i, field) in schema.fields().iter().enumerate() {
        if color.enabled() {
            writeln!(w, "{:>2}. {}", i + 1, field.name.bold())?;
        } else {
            writeln!(w, "{:>2}. {}", i + 1, field.name)?;
        }
        writeln!(w, "    {}", field.description)?;
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use paperlens_core::{DocumentStage, PaperRecord, TableAccumulator};

    const PLAIN: ColorMode = ColorMode(false);

    fn table(titles: &[&str]) -> ResultTable {
        let schema = Arc::new(Schema::academic_paper());
        let mut acc = TableAccumulator::new(Arc::clone(&schema));
        for title in titles {
            acc.append(PaperRecord::from_pairs(
                Arc::clone(&schema),
                [("Title", *title), ("Authors", "A. Author")],
            ));
        }
        acc.into_table()
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo wörld", 5), "héllo...");
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn started_event_has_no_line() {
        let event = ProgressEvent::DocumentStarted {
            index: 0,
            total: 1,
            name: "a.pdf".into(),
        };
        assert!(progress_line(&event, PLAIN).is_none());
    }

    #[test]
    fn failed_event_names_stage() {
        let event = ProgressEvent::DocumentFailed {
            index: 1,
            total: 3,
            name: "scan.pdf".into(),
            stage: DocumentStage::Uploaded,
            message: "failed to open PDF".into(),
        };
        let line = progress_line(&event, PLAIN).unwrap();
        assert_eq!(line, "[2/3] Failed scan.pdf (after uploaded): failed to open PDF");
    }

    #[test]
    fn preview_limits_rows() {
        let table = table(&["One", "Two", "Three"]);
        let mut out = Vec::new();
        print_preview(&mut out, &table, 2, PLAIN).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Preview (2 of 3 rows)"));
        assert!(text.contains("One"));
        assert!(text.contains("Two"));
        assert!(!text.contains("Three"));
        assert!(text.contains("A. Author"));
    }

    #[test]
    fn preview_of_empty_table() {
        let mut out = Vec::new();
        print_preview(&mut out, &table(&[]), 5, PLAIN).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "No rows extracted.\n");
    }

    #[test]
    fn schema_listing_is_numbered() {
        let mut out = Vec::new();
        print_schema(&mut out, &Schema::academic_paper(), PLAIN).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with(" 1. Title\n"));
        assert!(text.contains("25. Extra_Info\n"));
    }
}
