//! Screenshot capture, persisted outside the hot path.

use async_trait::async_trait;
use autoapply_core::{Error, Result};
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use crate::{decode_args, Tool, ToolContext, ToolResult, ToolSchema};

pub struct ScreenshotTool;

#[derive(Deserialize)]
struct ScreenshotArgs {
    session_id: String,
    #[serde(default)]
    page_id: Option<String>,
}

#[async_trait]
impl Tool for ScreenshotTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "screenshot",
            description: "Capture a full-page screenshot. The image is written to the workspace media directory and a file reference is returned, keeping message payloads small.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "session_id": { "type": "string" },
                    "page_id": { "type": "string" }
                },
                "required": ["session_id"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: serde_json::Value) -> Result<ToolResult> {
        let args: ScreenshotArgs = match decode_args("screenshot", params) {
            Ok(a) => a,
            Err(diag) => return Ok(*diag),
        };

        let page = ctx
            .sessions
            .get_or_create_page(&args.session_id, args.page_id.as_deref())
            .await?;

        let base64_data = page.cdp.screenshot().await?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&base64_data)
            .map_err(|e| Error::Tool(format!("base64 decode: {}", e)))?;

        let media_dir = ctx.paths.media_dir();
        std::fs::create_dir_all(&media_dir)
            .map_err(|e| Error::Tool(format!("create media dir: {}", e)))?;
        let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = media_dir.join(format!("screenshot_{}_{}.png", ts, &args.session_id));
        std::fs::write(&path, &bytes)
            .map_err(|e| Error::Tool(format!("write screenshot: {}", e)))?;

        Ok(
            ToolResult::text(format!("Screenshot saved to {}", path.display()))
                .push_structured(json!({
                    "path": path.display().to_string(),
                    "size_bytes": bytes.len(),
                })),
        )
    }
}
