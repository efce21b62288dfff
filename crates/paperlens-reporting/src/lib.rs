use std::fmt;
use std::str::FromStr;

use thiserror::Error;

mod export;

pub use export::{export, export_to_path};

/// Base name of every downloadable artifact, without extension.
pub const EXPORT_BASENAME: &str = "academic-papers-analysis";

pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Largest string Excel stores in a single cell.
pub const XLSX_MAX_CELL_CHARS: usize = 32_767;

/// Widest sheet Excel accepts.
pub const XLSX_MAX_COLUMNS: usize = 16_384;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("xlsx writer error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} columns do not fit in an xlsx sheet (max {XLSX_MAX_COLUMNS})")]
    TooManyColumns(usize),
    #[error("{0} rows do not fit in an xlsx sheet")]
    TooManyRows(usize),
}

/// Output format for a result table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Xlsx,
    Csv,
    Json,
    Markdown,
}

impl ExportFormat {
    pub fn all() -> &'static [ExportFormat] {
        &[
            ExportFormat::Xlsx,
            ExportFormat::Csv,
            ExportFormat::Json,
            ExportFormat::Markdown,
        ]
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Xlsx => "xlsx",
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Markdown => "md",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Xlsx => XLSX_MIME,
            Self::Csv => "text/csv; charset=utf-8",
            Self::Json => "application/json",
            Self::Markdown => "text/markdown; charset=utf-8",
        }
    }

    /// Download file name, e.g. `academic-papers-analysis.xlsx`.
    pub fn file_name(self) -> String {
        format!("{EXPORT_BASENAME}.{}", self.extension())
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xlsx" | "excel" => Ok(Self::Xlsx),
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "md" | "markdown" => Ok(Self::Markdown),
            other => Err(format!(
                "unknown export format '{other}' (expected xlsx, csv, json or md)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_str() {
        assert_eq!("xlsx".parse::<ExportFormat>(), Ok(ExportFormat::Xlsx));
        assert_eq!("Excel".parse::<ExportFormat>(), Ok(ExportFormat::Xlsx));
        assert_eq!("markdown".parse::<ExportFormat>(), Ok(ExportFormat::Markdown));
        assert!("pdf".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for &format in ExportFormat::all() {
            assert_eq!(format.to_string().parse::<ExportFormat>(), Ok(format));
        }
    }

    #[test]
    fn file_names() {
        assert_eq!(
            ExportFormat::Xlsx.file_name(),
            "academic-papers-analysis.xlsx"
        );
        assert_eq!(ExportFormat::Markdown.file_name(), "academic-papers-analysis.md");
        assert_eq!(ExportFormat::default(), ExportFormat::Xlsx);
    }
}
