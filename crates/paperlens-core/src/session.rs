//! Session driver: runs documents through extraction one at a time.
//!
//! Per document the stages are `Uploaded → TextExtracted → RecordExtracted →
//! Accumulated`. A document that fails at any stage adds no row. Whether the
//! session continues afterwards is decided by [`FailurePolicy`].

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::backend::{BackendError, Document, PdfBackend};
use crate::extractor::RecordExtractor;
use crate::record::PaperRecord;
use crate::table::{ResultTable, TableAccumulator};
use crate::{DocumentError, DocumentStage, FailurePolicy, ProgressEvent, SessionError};

/// A document that produced no row, and why.
#[derive(Debug)]
pub struct DocumentFailure {
    pub index: usize,
    pub name: String,
    /// Last stage the document reached before failing.
    pub stage: DocumentStage,
    pub error: DocumentError,
}

/// Outcome of a completed session.
#[derive(Debug)]
pub struct SessionReport {
    pub table: ResultTable,
    pub failures: Vec<DocumentFailure>,
}

enum Interrupt {
    Disconnected,
    Failed(DocumentStage, DocumentError),
}

pub struct Session {
    backend: Arc<dyn PdfBackend>,
    extractor: RecordExtractor,
    policy: FailurePolicy,
}

impl Session {
    pub fn new(backend: Arc<dyn PdfBackend>, extractor: RecordExtractor) -> Self {
        Self {
            backend,
            extractor,
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Process `documents` in order and return the accumulated table.
    ///
    /// Cancelling `cancel` signals that the consumer went away; the session
    /// stops at the next stage boundary with
    /// [`SessionError::ConsumerDisconnected`]. In-flight PDF parsing and
    /// completion calls are not interrupted.
    pub async fn run(
        &self,
        documents: Vec<Document>,
        progress: impl Fn(ProgressEvent) + Send + Sync,
        cancel: CancellationToken,
    ) -> Result<SessionReport, SessionError> {
        let total = documents.len();
        let mut table = TableAccumulator::new(Arc::clone(self.extractor.schema()));
        let mut failures = Vec::new();

        tracing::info!(documents = total, policy = ?self.policy, "session started");

        for (index, document) in documents.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(SessionError::ConsumerDisconnected);
            }

            let name = document.name.clone();
            progress(ProgressEvent::DocumentStarted {
                index,
                total,
                name: name.clone(),
            });

            match self
                .process(index, total, document, &progress, &cancel)
                .await
            {
                Ok(record) => {
                    table.append(record.clone());
                    tracing::info!(document = %name, rows = table.snapshot().len(), "row appended");
                    progress(ProgressEvent::RecordAppended {
                        index,
                        total,
                        name,
                        record: Box::new(record),
                    });
                }
                Err(Interrupt::Disconnected) => {
                    tracing::info!(document = %name, "consumer disconnected, aborting session");
                    return Err(SessionError::ConsumerDisconnected);
                }
                Err(Interrupt::Failed(stage, error)) => {
                    tracing::warn!(document = %name, ?stage, error = %error, "document failed");
                    progress(ProgressEvent::DocumentFailed {
                        index,
                        total,
                        name: name.clone(),
                        stage,
                        message: error.to_string(),
                    });
                    match self.policy {
                        FailurePolicy::Abort => {
                            return Err(SessionError::Aborted {
                                document: name,
                                stage,
                                source: error,
                            });
                        }
                        FailurePolicy::Skip => failures.push(DocumentFailure {
                            index,
                            name,
                            stage,
                            error,
                        }),
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(SessionError::ConsumerDisconnected);
        }

        let table = table.into_table();
        tracing::info!(
            rows = table.len(),
            failed = failures.len(),
            "session finished"
        );
        Ok(SessionReport { table, failures })
    }

    async fn process(
        &self,
        index: usize,
        total: usize,
        document: Document,
        progress: &(impl Fn(ProgressEvent) + Send + Sync),
        cancel: &CancellationToken,
    ) -> Result<PaperRecord, Interrupt> {
        let name = document.name.clone();

        // The document (and its bytes) is dropped as soon as the text is out.
        let backend = Arc::clone(&self.backend);
        let text = tokio::task::spawn_blocking(move || backend.extract_text(&document.source))
            .await
            .map_err(|e| BackendError::ExtractionError(format!("extraction task failed: {e}")))
            .and_then(|r| r)
            .map_err(|e| {
                Interrupt::Failed(DocumentStage::Uploaded, DocumentError::ExtractionFailed(e))
            })?;

        tracing::debug!(document = %name, chars = text.len(), "text extracted");
        progress(ProgressEvent::TextExtracted {
            index,
            total,
            name,
            chars: text.chars().count(),
        });
        if cancel.is_cancelled() {
            return Err(Interrupt::Disconnected);
        }

        self.extractor
            .extract_record(&text)
            .await
            .map_err(|e| Interrupt::Failed(DocumentStage::TextExtracted, e))
    }
}
