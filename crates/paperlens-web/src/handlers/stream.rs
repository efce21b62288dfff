use axum::extract::{Multipart, State};
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use paperlens_core::{Document, ProgressEvent, SessionError};

use crate::models::*;
use crate::state::{AppState, SessionStore};
use crate::upload::{self, UploadedFile};

type EventSender = mpsc::UnboundedSender<Result<Event, Infallible>>;

pub async fn stream(State(state): State<Arc<AppState>>, multipart: Multipart) -> impl IntoResponse {
    let (tx, rx) = mpsc::unbounded_channel::<Result<Event, Infallible>>();

    tokio::spawn(async move {
        let result = match upload::parse_multipart(multipart).await {
            Ok(files) => run_session(state, files, tx.clone()).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "analysis stream failed");
            let _ = tx.send(Ok(sse_event("error", &ErrorEvent { message: e })));
        }
    });

    Sse::new(UnboundedReceiverStream::new(rx)).keep_alive(KeepAlive::default())
}

/// Run one extraction session over `files`, streaming progress to `tx`.
///
/// The finished table is stored for download. If the client goes away the
/// session is cancelled and nothing is stored.
pub async fn run_session(
    state: Arc<AppState>,
    files: Vec<UploadedFile>,
    tx: EventSender,
) -> Result<(), String> {
    let client = state.client.clone().ok_or_else(|| {
        "No API key configured. Set OPENAI_API_KEY and restart the server.".to_string()
    })?;

    let session_id = SessionStore::new_id();
    send(
        &tx,
        "session_start",
        &SessionStartEvent {
            session_id: session_id.clone(),
            file_count: files.len(),
            columns: state
                .config
                .schema
                .field_names()
                .map(str::to_string)
                .collect(),
        },
    )?;

    let documents: Vec<Document> = files
        .into_iter()
        .map(|f| Document::from_bytes(f.filename, f.data))
        .collect();
    let session = state.config.session(Arc::clone(&state.backend), client);

    let cancel = CancellationToken::new();
    let progress = {
        let tx = tx.clone();
        let cancel = cancel.clone();
        move |event: ProgressEvent| send_progress_event(&tx, &event, &cancel)
    };

    // Run in a separate task so we can detect client disconnect
    let run_cancel = cancel.clone();
    let mut run =
        tokio::spawn(async move { session.run(documents, progress, run_cancel).await });

    let finished = tokio::select! {
        joined = &mut run => Some(joined),
        _ = tx.closed() => None,
    };
    let joined = match finished {
        Some(joined) => joined,
        None => {
            cancel.cancel();
            run.await
        }
    };
    let result = joined.map_err(|e| format!("Session task error: {}", e))?;

    let report = match result {
        Ok(report) => report,
        Err(SessionError::ConsumerDisconnected) => {
            tracing::info!(session = %session_id, "client disconnected, session cancelled");
            return Ok(());
        }
        Err(e) => return Err(e.to_string()),
    };

    let complete = CompleteEvent {
        session_id: session_id.clone(),
        rows: report.table.len(),
        failures: report.failures.iter().map(FailureJson::from).collect(),
        download_url: format!("/download/{}", session_id),
    };
    state.store.insert(session_id.clone(), report.table);
    tracing::info!(
        session = %session_id,
        rows = complete.rows,
        failed = complete.failures.len(),
        stored = state.store.len(),
        "session stored"
    );
    send(&tx, "complete", &complete)
}

/// Forward a session progress event. A closed stream cancels the session.
fn send_progress_event(tx: &EventSender, event: &ProgressEvent, cancel: &CancellationToken) {
    let (name, payload) = progress_payload(event);
    if tx.send(Ok(sse_event(name, &payload))).is_err() {
        cancel.cancel();
    }
}

/// Send an SSE event, returning Err if the client disconnected.
fn send<T: serde::Serialize>(tx: &EventSender, event_type: &str, data: &T) -> Result<(), String> {
    tx.send(Ok(sse_event(event_type, data)))
        .map_err(|_| "Client disconnected".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperlens_core::completion::mock::{MockCompletion, MockReply};
    use paperlens_core::{BackendError, CompletionClient, Config, DocumentSource, PdfBackend};

    /// Reads uploaded bytes as the document text.
    struct EchoPdf;

    impl PdfBackend for EchoPdf {
        fn pages(&self, source: &DocumentSource) -> Result<Vec<String>, BackendError> {
            match source {
                DocumentSource::Bytes(data) => Ok(vec![String::from_utf8_lossy(data).to_string()]),
                DocumentSource::Path(_) => Err(BackendError::OpenError("no paths here".into())),
            }
        }
    }

    fn state(client: Option<Arc<MockCompletion>>) -> Arc<AppState> {
        Arc::new(AppState {
            config: Config::default(),
            backend: Arc::new(EchoPdf),
            client: client.map(|c| c as Arc<dyn CompletionClient>),
            store: SessionStore::new(4),
        })
    }

    fn upload(name: &str) -> UploadedFile {
        UploadedFile {
            filename: name.to_string(),
            data: b"%PDF-1.4 Title: Foo. Authors: Bar.".to_vec(),
        }
    }

    #[tokio::test]
    async fn completed_session_is_stored() {
        let mock = Arc::new(MockCompletion::new(MockReply::text(
            r#"{"Title": "Foo", "Authors": "Bar"}"#,
        )));
        let state = state(Some(Arc::clone(&mock)));
        let (tx, mut rx) = mpsc::unbounded_channel();

        run_session(Arc::clone(&state), vec![upload("a.pdf"), upload("b.pdf")], tx)
            .await
            .unwrap();

        // session_start + 3 per document + complete
        let mut count = 0;
        while rx.recv().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 1 + 3 * 2 + 1);
        assert_eq!(state.store.len(), 1);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_any_event() {
        let state = state(None);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let err = run_session(state, vec![upload("a.pdf")], tx).await.unwrap_err();
        assert!(err.contains("OPENAI_API_KEY"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn closed_stream_cancels_session() {
        let mock = Arc::new(MockCompletion::new(MockReply::text(r#"{"Title": "Foo"}"#)));
        let state = state(Some(Arc::clone(&mock)));
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        let err = run_session(Arc::clone(&state), vec![upload("a.pdf")], tx)
            .await
            .unwrap_err();
        assert_eq!(err, "Client disconnected");
        assert_eq!(state.store.len(), 0);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn disconnect_mid_session_stores_nothing() {
        let mock = Arc::new(
            MockCompletion::new(MockReply::text(r#"{"Title": "Foo"}"#))
                .with_delay(std::time::Duration::from_millis(20)),
        );
        let state = state(Some(Arc::clone(&mock)));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run_session(
            Arc::clone(&state),
            vec![upload("a.pdf"), upload("b.pdf"), upload("c.pdf")],
            tx,
        ));
        // Read up to the first record, then hang up.
        let mut seen = 0;
        while let Some(_event) = rx.recv().await {
            seen += 1;
            if seen == 4 {
                break;
            }
        }
        drop(rx);

        task.await.unwrap().unwrap();
        assert_eq!(state.store.len(), 0);
        assert!(mock.call_count() < 3);
    }
}
