//! Health routes and the embedded dashboard page.

use std::sync::Arc;

use axum::extract::State;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::app::AppState;

/// Placeholder page; the full dashboard asset ships separately and talks to
/// the same `/api` surface.
const DASHBOARD_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Maestro</title>
</head>
<body>
  <h1>Maestro</h1>
  <p>Dashboard API is up. Subscribe to <code>/api/events</code> and POST goals to <code>/api/runs</code>.</p>
</body>
</html>
"#;

/// GET /
pub(crate) async fn dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

/// GET /api/health — roster, cached agent health, gateway names.
pub(crate) async fn health(State(state): State<Arc<AppState>>) -> Response {
    let registry = state.orchestrator.agents();
    let cached = registry.health_snapshot().await;
    let agents: Vec<Value> = registry
        .iter()
        .map(|adapter| {
            let mut entry = json!({
                "name": adapter.name(),
                "type": adapter.kind(),
            });
            let obj = entry.as_object_mut().expect("object literal");
            if let Some(description) = adapter.description() {
                obj.insert("description".to_string(), Value::from(description));
            }
            if !adapter.capabilities().is_empty() {
                obj.insert(
                    "capabilities".to_string(),
                    Value::from(adapter.capabilities().to_vec()),
                );
            }
            if let Some(health) = cached.get(adapter.name()) {
                if let Ok(health) = serde_json::to_value(health) {
                    obj.insert("health".to_string(), health);
                }
            }
            entry
        })
        .collect();

    Json(json!({
        "ok": true,
        "agents": agents,
        "gateways": state.gateways.names(),
    }))
    .into_response()
}

/// GET /api/agents/health — fresh parallel probe of every adapter.
pub(crate) async fn agents_health(State(state): State<Arc<AppState>>) -> Response {
    let registry = state.orchestrator.agents();
    let snapshot = registry.check_all_health().await;
    let agents: Vec<Value> = registry
        .iter()
        .filter_map(|adapter| {
            let health = snapshot.get(adapter.name())?;
            let mut entry = serde_json::to_value(health).ok()?;
            entry
                .as_object_mut()?
                .insert("name".to_string(), Value::from(adapter.name()));
            Some(entry)
        })
        .collect();
    Json(json!({ "agents": agents })).into_response()
}
