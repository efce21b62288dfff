use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open PDF: {0}")]
    OpenError(String),
    #[error("failed to extract text: {0}")]
    ExtractionError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where a document's bytes come from.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// One submitted PDF. Consumed by text extraction.
#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    pub source: DocumentSource,
}

impl Document {
    /// A document read from disk, named after its file name.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            name,
            source: DocumentSource::Path(path),
        }
    }

    /// A document uploaded as raw bytes.
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            source: DocumentSource::Bytes(data),
        }
    }
}

/// Trait for PDF text extraction backends.
///
/// Implementors return the text of each page in page order. A page with no
/// text layer (e.g. a scan without OCR) yields an empty string rather than
/// an error.
pub trait PdfBackend: Send + Sync {
    fn pages(&self, source: &DocumentSource) -> Result<Vec<String>, BackendError>;

    /// Full document text: page texts concatenated in page order.
    fn extract_text(&self, source: &DocumentSource) -> Result<String, BackendError> {
        Ok(self.pages(source)?.concat())
    }
}
