//! Dashboard HTTP server for Maestro (axum).
//!
//! Serves run CRUD and goal submission under `/api`, a live
//! `text/event-stream` fan-out at `/api/events`, and a minimal HTML page at
//! `/`. Every response carries `Access-Control-Allow-Origin: *`.
//!
//! **Public API**: [`run_serve`], [`run_serve_on_listener`], [`AppState`].

mod app;
mod routes;
mod runs;
mod sse;

pub use app::AppState;
pub use sse::{Broadcaster, RunEventObserver};

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use app::router;

const DEFAULT_ADDR: &str = "127.0.0.1:4173";

/// Runs the server on an existing listener. Used by tests (bind to
/// 127.0.0.1:0 then pass the listener).
pub async fn run_serve_on_listener(
    listener: TcpListener,
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    info!("dashboard listening on http://{}", addr);
    let app = router(state);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Runs the server. Listens on `addr` (default 127.0.0.1:4173).
pub async fn run_serve(
    addr: Option<&str>,
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = addr.unwrap_or(DEFAULT_ADDR);
    let listener = TcpListener::bind(addr).await?;
    run_serve_on_listener(listener, state).await
}
