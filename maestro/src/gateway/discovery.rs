//! Agent discovery: list agents on a gateway and enrich each with its
//! SOUL.md metadata. Per-agent failures degrade to bare {id, name}.

use serde_json::Value;
use tracing::debug;

use crate::agent::SoulDoc;

use super::client::GatewayClient;
use super::GatewayError;

/// One agent advertised by a gateway.
#[derive(Clone, Debug)]
pub struct DiscoveredAgent {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub capabilities: Vec<String>,
    pub role_prompt: Option<String>,
}

/// Lists the gateway's agents and best-effort fetches each SOUL.md.
///
/// A failing `agents.list` surfaces to the caller; a failing per-agent file
/// fetch only loses that agent's metadata.
pub async fn discover_agents(
    client: &GatewayClient,
) -> Result<Vec<DiscoveredAgent>, GatewayError> {
    let payload = client.call("agents.list", None, None).await?;
    let mut agents = normalize_agent_list(&payload);

    for agent in &mut agents {
        let params = serde_json::json!({ "agentId": agent.id, "name": "SOUL.md" });
        match client.call("agents.files.get", Some(params), None).await {
            Ok(file) => {
                if let Some(content) = file_content(&file) {
                    let soul = SoulDoc::parse(&content);
                    agent.description = soul.description;
                    agent.capabilities = soul.capabilities;
                    agent.role_prompt = Some(soul.role_prompt);
                }
            }
            Err(e) => {
                debug!(agent = %agent.name, "SOUL.md fetch failed: {}", e);
            }
        }
    }
    Ok(agents)
}

/// Accepts either a bare array or `{agents: […]}`; entries missing both id
/// and name are dropped, a missing one mirrors the other.
fn normalize_agent_list(payload: &Value) -> Vec<DiscoveredAgent> {
    let items = payload
        .as_array()
        .or_else(|| payload.get("agents").and_then(Value::as_array));
    let Some(items) = items else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let id = item.get("id").and_then(Value::as_str);
            let name = item.get("name").and_then(Value::as_str);
            let (id, name) = match (id, name) {
                (Some(id), Some(name)) => (id, name),
                (Some(id), None) => (id, id),
                (None, Some(name)) => (name, name),
                (None, None) => return None,
            };
            Some(DiscoveredAgent {
                id: id.to_string(),
                name: name.to_string(),
                description: None,
                capabilities: Vec::new(),
                role_prompt: None,
            })
        })
        .collect()
}

fn file_content(payload: &Value) -> Option<String> {
    payload
        .get("content")
        .and_then(Value::as_str)
        .or_else(|| payload.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_bare_array() {
        let payload = json!([{"id":"a1","name":"researcher"},{"id":"a2"}]);
        let agents = normalize_agent_list(&payload);
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].name, "researcher");
        assert_eq!(agents[1].name, "a2");
    }

    #[test]
    fn normalizes_wrapped_object() {
        let payload = json!({"agents":[{"name":"coder"}]});
        let agents = normalize_agent_list(&payload);
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].id, "coder");
    }

    #[test]
    fn entries_without_identity_are_dropped() {
        let payload = json!([{"id":"ok"},{"other":"junk"}]);
        let agents = normalize_agent_list(&payload);
        assert_eq!(agents.len(), 1);
    }

    #[test]
    fn non_list_payload_is_empty() {
        assert!(normalize_agent_list(&json!("nope")).is_empty());
    }

    #[test]
    fn file_content_accepts_both_shapes() {
        assert_eq!(
            file_content(&json!({"content":"# Soul"})).as_deref(),
            Some("# Soul")
        );
        assert_eq!(file_content(&json!("# Soul")).as_deref(), Some("# Soul"));
        assert_eq!(file_content(&json!({"other":1})), None);
    }
}
