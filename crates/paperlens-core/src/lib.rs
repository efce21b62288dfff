use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod backend;
pub mod completion;
pub mod config_file;
pub mod extractor;
pub mod record;
pub mod retry;
pub mod schema;
pub mod session;
pub mod table;

// Re-export for convenience
pub use backend::{BackendError, Document, DocumentSource, PdfBackend};
pub use completion::{CompletionClient, CompletionError, CompletionRequest, OpenAiClient};
pub use extractor::{ExtractionRequest, ModelSettings, RecordExtractor};
pub use record::PaperRecord;
pub use retry::RetryPolicy;
pub use schema::{Schema, SchemaError, SchemaField, SchemaParseError};
pub use session::{DocumentFailure, Session, SessionReport};
pub use table::{ResultTable, TableAccumulator};

pub const DEFAULT_MODEL: &str = "gpt-4-1106-preview";
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

/// Why a single document produced no row.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("text extraction failed: {0}")]
    ExtractionFailed(#[from] BackendError),
    #[error("completion failed: {0}")]
    Completion(#[from] CompletionError),
    #[error("model output did not match the schema: {0}")]
    SchemaParseFailed(#[from] SchemaParseError),
}

/// Why a whole session stopped early.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The consumer of session progress went away.
    #[error("consumer disconnected")]
    ConsumerDisconnected,
    #[error("aborted at {document} ({stage}): {source}")]
    Aborted {
        document: String,
        stage: DocumentStage,
        #[source]
        source: DocumentError,
    },
}

/// Per-document pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStage {
    Uploaded,
    TextExtracted,
    RecordExtracted,
    Accumulated,
}

impl std::fmt::Display for DocumentStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DocumentStage::Uploaded => "uploaded",
            DocumentStage::TextExtracted => "text extracted",
            DocumentStage::RecordExtracted => "record extracted",
            DocumentStage::Accumulated => "accumulated",
        };
        f.write_str(s)
    }
}

/// What to do when one document fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record the failure and continue with the next document.
    #[default]
    Skip,
    /// Stop the session at the first failure.
    Abort,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" | "continue" => Ok(FailurePolicy::Skip),
            "abort" | "stop" => Ok(FailurePolicy::Abort),
            other => Err(format!(
                "unknown failure policy '{other}' (expected skip or abort)"
            )),
        }
    }
}

/// Progress events emitted while a session runs.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    DocumentStarted {
        index: usize,
        total: usize,
        name: String,
    },
    TextExtracted {
        index: usize,
        total: usize,
        name: String,
        chars: usize,
    },
    RecordAppended {
        index: usize,
        total: usize,
        name: String,
        record: Box<PaperRecord>,
    },
    DocumentFailed {
        index: usize,
        total: usize,
        name: String,
        stage: DocumentStage,
        message: String,
    },
}

/// Resolved runtime configuration.
#[derive(Clone)]
pub struct Config {
    pub api_key: Option<String>,
    /// OpenAI-compatible base URL; `None` uses the public API.
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub json_mode: bool,
    pub failure_policy: FailurePolicy,
    pub max_retries: u32,
    /// Completion request timeout. `None` waits indefinitely.
    pub request_timeout_secs: Option<u64>,
    pub schema: Arc<Schema>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("json_mode", &self.json_mode)
            .field("failure_policy", &self.failure_policy)
            .field("max_retries", &self.max_retries)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("schema_fields", &self.schema.len())
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            json_mode: true,
            failure_policy: FailurePolicy::Skip,
            max_retries: 0,
            request_timeout_secs: None,
            schema: Arc::new(Schema::academic_paper()),
        }
    }
}

impl Config {
    pub fn model_settings(&self) -> ModelSettings {
        ModelSettings {
            model: self.model.clone(),
            temperature: self.temperature,
            json_mode: self.json_mode,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_max_retries(self.max_retries)
    }

    /// Build the HTTP completion client described by this config.
    pub fn completion_client(&self) -> Result<OpenAiClient, CompletionError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(CompletionError::MissingApiKey)?;
        let mut client = OpenAiClient::new(api_key)
            .with_timeout(self.request_timeout_secs.map(Duration::from_secs));
        if let Some(ref url) = self.base_url {
            client = client.with_base_url(url.as_str());
        }
        Ok(client)
    }

    /// Wire a session from this config and the two collaborators.
    pub fn session(
        &self,
        backend: Arc<dyn PdfBackend>,
        client: Arc<dyn CompletionClient>,
    ) -> Session {
        let extractor = RecordExtractor::new(Arc::clone(&self.schema), client)
            .with_settings(self.model_settings())
            .with_retry(self.retry_policy());
        Session::new(backend, extractor).with_failure_policy(self.failure_policy)
    }
}
