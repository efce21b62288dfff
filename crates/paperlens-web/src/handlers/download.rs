use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::sync::Arc;

use paperlens_reporting::ExportFormat;

use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct DownloadQuery {
    pub format: Option<String>,
}

/// Serve a stored table as a file attachment. The format defaults to xlsx.
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Response {
    let format = match query.format.as_deref().map(str::parse::<ExportFormat>) {
        None => ExportFormat::default(),
        Some(Ok(format)) => format,
        Some(Err(e)) => return (StatusCode::BAD_REQUEST, e).into_response(),
    };

    let Some(table) = state.store.get(&session_id) else {
        return (StatusCode::NOT_FOUND, "Unknown or expired session").into_response();
    };

    let exported = tokio::task::spawn_blocking(move || paperlens_reporting::export(&table, format))
        .await
        .map_err(|e| e.to_string())
        .and_then(|r| r.map_err(|e| e.to_string()));

    match exported {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, format.mime().to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", format.file_name()),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(session = %session_id, %format, error = %e, "export failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Export failed: {e}")).into_response()
        }
    }
}
