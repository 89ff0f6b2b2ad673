//! Session lifecycle tools: open, close, list.

use async_trait::async_trait;
use autoapply_core::Result;
use serde::Deserialize;
use serde_json::json;

use crate::{decode_args, Tool, ToolContext, ToolResult, ToolSchema};

pub struct OpenSessionTool;

#[derive(Deserialize)]
struct OpenSessionArgs {
    #[serde(default)]
    session_id: Option<String>,
}

#[async_trait]
impl Tool for OpenSessionTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "open_session",
            description: "Launch an isolated browser session. Returns the session id used to address every other browser tool. Rejected when the session ceiling is reached; retry later after closing sessions.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "session_id": {
                        "type": "string",
                        "description": "Optional caller-chosen session id; generated when omitted"
                    }
                },
                "required": []
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: serde_json::Value) -> Result<ToolResult> {
        let args: OpenSessionArgs = match decode_args("open_session", params) {
            Ok(a) => a,
            Err(diag) => return Ok(*diag),
        };

        let session_id = ctx.sessions.create(args.session_id).await?;
        Ok(ToolResult::text(format!("Session {} opened", session_id))
            .push_structured(json!({"session_id": session_id})))
    }
}

pub struct CloseSessionTool;

#[derive(Deserialize)]
struct CloseSessionArgs {
    session_id: String,
}

#[async_trait]
impl Tool for CloseSessionTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "close_session",
            description: "Close a browser session and release its browser. Safe to call even if the session is already gone.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "session_id": { "type": "string" }
                },
                "required": ["session_id"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: serde_json::Value) -> Result<ToolResult> {
        let args: CloseSessionArgs = match decode_args("close_session", params) {
            Ok(a) => a,
            Err(diag) => return Ok(*diag),
        };

        ctx.sessions.destroy(&args.session_id).await;
        Ok(ToolResult::text(format!("Session {} closed", args.session_id)))
    }
}

pub struct ListSessionsTool;

#[async_trait]
impl Tool for ListSessionsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "list_sessions",
            description: "List live browser sessions with their pages and current URLs.",
            parameters: json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, _params: serde_json::Value) -> Result<ToolResult> {
        let sessions = ctx.sessions.list().await;
        let count = sessions.len();
        Ok(ToolResult::structured(json!({
            "sessions": sessions,
            "count": count,
        })))
    }
}
