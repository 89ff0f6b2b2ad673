//! Wire types for the session-addressed streaming protocol: one message per
//! POST, correlated results pushed over the SSE stream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One client-to-server protocol message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum ProtocolRequest {
    #[serde(rename = "tools/list")]
    ToolsList { id: String },
    #[serde(rename = "tools/call")]
    ToolsCall { id: String, params: ToolCallParams },
    #[serde(rename = "agent/run")]
    AgentRun { id: String, params: AgentRunParams },
}

impl ProtocolRequest {
    pub fn id(&self) -> &str {
        match self {
            ProtocolRequest::ToolsList { id } => id,
            ProtocolRequest::ToolsCall { id, .. } => id,
            ProtocolRequest::AgentRun { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRunParams {
    pub goal: String,
    pub url: String,
    /// "extract" (default) or "fill-form"; picks the step budget.
    #[serde(default)]
    pub task_kind: Option<String>,
}

/// Events pushed to the client over the SSE stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// First event on stream open: where to POST messages for this connection.
    Endpoint {
        connection_id: String,
        post_path: String,
    },
    /// Correlated result of a posted request.
    Result { id: String, result: Value },
    /// Correlated failure of a posted request.
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        code: String,
        message: String,
    },
}

impl StreamEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            StreamEvent::Endpoint { .. } => "endpoint",
            StreamEvent::Result { .. } => "result",
            StreamEvent::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_parses_tools_call() {
        let request: ProtocolRequest = serde_json::from_value(json!({
            "method": "tools/call",
            "id": "r1",
            "params": {"name": "navigate", "arguments": {"session_id": "s1", "url": "https://example.com"}}
        }))
        .expect("parse");
        assert_eq!(request.id(), "r1");
        match request {
            ProtocolRequest::ToolsCall { params, .. } => {
                assert_eq!(params.name, "navigate");
                assert_eq!(params.arguments["url"], "https://example.com");
            }
            other => panic!("expected ToolsCall, got {:?}", other),
        }
    }

    #[test]
    fn test_request_parses_agent_run() {
        let request: ProtocolRequest = serde_json::from_value(json!({
            "method": "agent/run",
            "id": "r2",
            "params": {"goal": "extract the posting", "url": "https://example.com"}
        }))
        .expect("parse");
        match request {
            ProtocolRequest::AgentRun { params, .. } => {
                assert!(params.task_kind.is_none());
                assert_eq!(params.goal, "extract the posting");
            }
            other => panic!("expected AgentRun, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_method_rejected() {
        let result = serde_json::from_value::<ProtocolRequest>(json!({
            "method": "nope", "id": "x"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_event_serialization() {
        let event = StreamEvent::Endpoint {
            connection_id: "c1".to_string(),
            post_path: "/messages/c1".to_string(),
        };
        assert_eq!(event.event_name(), "endpoint");
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["type"], "endpoint");
        assert_eq!(value["post_path"], "/messages/c1");
    }
}
