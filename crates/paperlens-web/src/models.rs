use axum::response::sse::Event;
use paperlens_core::{DocumentFailure, DocumentStage, PaperRecord, ProgressEvent};
use serde::Serialize;
use serde_json::{Map, Value};

// ── SSE event payloads ──────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SessionStartEvent {
    pub session_id: String,
    pub file_count: usize,
    pub columns: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct FileStartEvent {
    pub index: usize,
    pub total: usize,
    pub filename: String,
}

#[derive(Debug, Serialize)]
pub struct TextExtractedEvent {
    pub index: usize,
    pub total: usize,
    pub filename: String,
    pub chars: usize,
}

#[derive(Debug, Serialize)]
pub struct RecordEvent {
    pub index: usize,
    pub total: usize,
    pub filename: String,
    /// Field values keyed by name, in schema order.
    pub record: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct FileErrorEvent {
    pub index: usize,
    pub total: usize,
    pub filename: String,
    pub stage: DocumentStage,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct FailureJson {
    pub filename: String,
    pub stage: DocumentStage,
    pub message: String,
}

impl From<&DocumentFailure> for FailureJson {
    fn from(f: &DocumentFailure) -> Self {
        Self {
            filename: f.name.clone(),
            stage: f.stage,
            message: f.error.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CompleteEvent {
    pub session_id: String,
    pub rows: usize,
    pub failures: Vec<FailureJson>,
    pub download_url: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorEvent {
    pub message: String,
}

pub fn record_json(record: &PaperRecord) -> Map<String, Value> {
    record
        .iter()
        .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
        .collect()
}

/// Event name and JSON payload for a session progress event.
pub fn progress_payload(event: &ProgressEvent) -> (&'static str, Value) {
    let (name, payload) = match event {
        ProgressEvent::DocumentStarted { index, total, name } => (
            "file_start",
            serde_json::to_value(FileStartEvent {
                index: *index,
                total: *total,
                filename: name.clone(),
            }),
        ),
        ProgressEvent::TextExtracted {
            index,
            total,
            name,
            chars,
        } => (
            "text_extracted",
            serde_json::to_value(TextExtractedEvent {
                index: *index,
                total: *total,
                filename: name.clone(),
                chars: *chars,
            }),
        ),
        ProgressEvent::RecordAppended {
            index,
            total,
            name,
            record,
        } => (
            "record",
            serde_json::to_value(RecordEvent {
                index: *index,
                total: *total,
                filename: name.clone(),
                record: record_json(record),
            }),
        ),
        ProgressEvent::DocumentFailed {
            index,
            total,
            name,
            stage,
            message,
        } => (
            "file_error",
            serde_json::to_value(FileErrorEvent {
                index: *index,
                total: *total,
                filename: name.clone(),
                stage: *stage,
                message: message.clone(),
            }),
        ),
    };
    (name, payload.unwrap_or(Value::Null))
}

pub fn sse_event<T: Serialize>(event_type: &str, data: &T) -> Event {
    Event::default()
        .event(event_type)
        .data(serde_json::to_string(data).unwrap_or_default())
}
