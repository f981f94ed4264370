//! Axum app: shared state, router, and the CORS layer.

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::Router;

use maestro::{GatewayRegistry, Orchestrator, RunStore};

use crate::runs::RunMap;
use crate::sse::Broadcaster;

/// Default bound on the in-memory recent-run map.
pub const DEFAULT_MAX_RUNS: usize = 50;

/// Shared server state: the orchestrator, gateway pool, optional persistent
/// store, the bounded recent-run map, and the event broadcaster.
pub struct AppState {
    pub(crate) orchestrator: Arc<Orchestrator>,
    pub(crate) gateways: Arc<GatewayRegistry>,
    pub(crate) store: Option<Arc<dyn RunStore>>,
    pub(crate) runs: RunMap,
    pub(crate) broadcaster: Broadcaster,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, gateways: Arc<GatewayRegistry>) -> Self {
        Self {
            orchestrator,
            gateways,
            store: None,
            runs: RunMap::new(DEFAULT_MAX_RUNS),
            broadcaster: Broadcaster::new(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn RunStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_max_runs(mut self, max_runs: usize) -> Self {
        self.runs = RunMap::new(max_runs);
        self
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }
}

pub(crate) fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(crate::routes::dashboard))
        .route("/api/health", get(crate::routes::health))
        .route("/api/agents/health", get(crate::routes::agents_health))
        .route("/api/events", get(crate::sse::events))
        .route(
            "/api/runs",
            get(crate::runs::list_runs).post(crate::runs::submit_goal),
        )
        .route(
            "/api/runs/:id",
            get(crate::runs::get_run).delete(crate::runs::delete_run),
        )
        .layer(middleware::from_fn(cors))
        .with_state(state)
}

/// Answers preflight with 204 and stamps every response with the open CORS
/// headers the dashboard asset expects.
async fn cors(request: axum::extract::Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = Response::new(Default::default());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(&mut response);
        return response;
    }
    let mut response = next.run(request).await;
    apply_cors_headers(&mut response);
    response
}

fn apply_cors_headers(response: &mut Response) {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, DELETE, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
}
