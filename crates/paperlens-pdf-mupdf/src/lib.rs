use mupdf::{Document, TextPageFlags};

use paperlens_core::{BackendError, DocumentSource, PdfBackend};

/// MuPDF-based implementation of [`PdfBackend`].
///
/// This crate isolates the mupdf dependency (AGPL-3.0) so that the core
/// pipeline and its tests never link against it.
///
/// Every page is read in full, running headers and footers included.
#[derive(Debug, Default, Clone)]
pub struct MupdfBackend;

impl MupdfBackend {
    pub fn new() -> Self {
        Self
    }

    fn open(&self, source: &DocumentSource) -> Result<Document, BackendError> {
        match source {
            DocumentSource::Path(path) => {
                let path_str = path
                    .to_str()
                    .ok_or_else(|| BackendError::OpenError("invalid path encoding".into()))?;
                Document::open(path_str).map_err(|e| BackendError::OpenError(e.to_string()))
            }
            DocumentSource::Bytes(data) => Document::from_bytes(data, "application/pdf")
                .map_err(|e| BackendError::OpenError(e.to_string())),
        }
    }

    fn page_text(&self, page: &mupdf::Page) -> Result<String, BackendError> {
        let text_page = page
            .to_text_page(TextPageFlags::empty())
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?;

        let mut text = String::new();
        for block in text_page.blocks() {
            for line in block.lines() {
                text.extend(line.chars().map(|c| c.char().unwrap_or('\u{FFFD}')));
                text.push('\n');
            }
        }
        Ok(text)
    }
}

impl PdfBackend for MupdfBackend {
    fn pages(&self, source: &DocumentSource) -> Result<Vec<String>, BackendError> {
        let document = self.open(source)?;

        let mut pages = Vec::new();
        for page in document
            .pages()
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?
        {
            let page = page.map_err(|e| BackendError::ExtractionError(e.to_string()))?;
            pages.push(self.page_text(&page)?);
        }

        tracing::debug!(pages = pages.len(), "pdf text extracted");
        Ok(pages)
    }
}
