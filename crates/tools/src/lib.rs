pub mod capture;
pub mod dom;
pub mod extract;
pub mod interact;
pub mod navigate;
pub mod registry;
pub mod session;
pub mod upload;

use async_trait::async_trait;
use autoapply_core::{Config, Paths, Result};
use autoapply_browser::SessionRegistry;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub use registry::ToolRegistry;

/// Shared context handed to every tool execution.
#[derive(Clone)]
pub struct ToolContext {
    pub sessions: Arc<SessionRegistry>,
    pub paths: Paths,
    pub config: Config,
}

pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// One typed block of tool output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Structured { value: Value },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolStatus {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Uniform result envelope. Executor failures are folded into diagnostic
/// content so the consuming agent can read and recover from them inline;
/// only infrastructure failures escape as errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Vec<ContentBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ToolStatus>,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            status: Some(ToolStatus { ok: true, code: None }),
        }
    }

    pub fn structured(value: Value) -> Self {
        Self {
            content: vec![ContentBlock::Structured { value }],
            status: Some(ToolStatus { ok: true, code: None }),
        }
    }

    /// A failure the agent should read and adapt to, not a thrown error.
    pub fn diagnostic(code: &str, text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            status: Some(ToolStatus {
                ok: false,
                code: Some(code.to_string()),
            }),
        }
    }

    pub fn push_text(mut self, text: impl Into<String>) -> Self {
        self.content.push(ContentBlock::Text { text: text.into() });
        self
    }

    pub fn push_structured(mut self, value: Value) -> Self {
        self.content.push(ContentBlock::Structured { value });
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status.as_ref().map(|s| s.ok).unwrap_or(true)
    }

    /// Serialized form appended to the agent conversation.
    pub fn to_message_string(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!("{{\"error\": \"unserializable tool result: {}\"}}", e))
    }
}

/// Decode a tool's argument bag into its concrete argument struct. An
/// undecodable bag is a diagnostic the agent can correct, not an error.
pub fn decode_args<T: DeserializeOwned>(
    tool: &str,
    params: Value,
) -> std::result::Result<T, Box<ToolResult>> {
    serde_json::from_value(params).map_err(|e| {
        Box::new(ToolResult::diagnostic(
            "invalid_arguments",
            format!("{}: invalid arguments: {}", tool, e),
        ))
    })
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> ToolSchema;
    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolResult>;
}
