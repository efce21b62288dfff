use std::net::SocketAddr;
use std::sync::Arc;

use paperlens_core::CompletionClient;
use paperlens_core::config_file;
use paperlens_pdf_mupdf::MupdfBackend;
use tower_http::trace::TraceLayer;

mod handlers;
mod models;
mod state;
mod template;
mod upload;

use state::{AppState, DEFAULT_STORE_CAPACITY, SessionStore};

const DEFAULT_BIND: &str = "127.0.0.1:5001";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = config_file::resolve(&config_file::load_config())?;
    tracing::info!(?config, "configuration resolved");

    let client: Option<Arc<dyn CompletionClient>> = match config.completion_client() {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!(error = %e, "no completion client; uploads will be rejected until OPENAI_API_KEY is set");
            None
        }
    };

    let state = Arc::new(AppState {
        config,
        backend: Arc::new(MupdfBackend::new()),
        client,
        store: SessionStore::new(DEFAULT_STORE_CAPACITY),
    });

    // Allow large batches of uploads (500MB)
    let body_limit = axum::extract::DefaultBodyLimit::max(500 * 1024 * 1024);

    let app = axum::Router::new()
        .route("/", axum::routing::get(handlers::index::index))
        .route(
            "/analyze/stream",
            axum::routing::post(handlers::stream::stream),
        )
        .route(
            "/download/{session_id}",
            axum::routing::get(handlers::download::download),
        )
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let bind = std::env::var("PAPERLENS_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let addr: SocketAddr = bind
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid PAPERLENS_BIND '{bind}': {e}"))?;
    tracing::info!("Listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
