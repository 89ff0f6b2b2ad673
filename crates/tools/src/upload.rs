//! File upload into a page's file input.

use async_trait::async_trait;
use autoapply_core::Result;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};

use crate::dom;
use crate::{decode_args, Tool, ToolContext, ToolResult, ToolSchema};

pub struct UploadFileTool;

#[derive(Deserialize)]
struct UploadFileArgs {
    session_id: String,
    selector: String,
    file_path: String,
    #[serde(default)]
    page_id: Option<String>,
}

#[async_trait]
impl Tool for UploadFileTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "upload_file",
            description: "Attach a local file to a file input located by CSS selector. Waits for the element to appear before uploading; fails if it never does.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "session_id": { "type": "string" },
                    "selector": { "type": "string" },
                    "file_path": { "type": "string" },
                    "page_id": { "type": "string" }
                },
                "required": ["session_id", "selector", "file_path"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: serde_json::Value) -> Result<ToolResult> {
        let args: UploadFileArgs = match decode_args("upload_file", params) {
            Ok(a) => a,
            Err(diag) => return Ok(*diag),
        };

        if !std::path::Path::new(&args.file_path).exists() {
            return Ok(ToolResult::diagnostic(
                "tool",
                format!("File not found: {}", args.file_path),
            ));
        }

        let page = ctx
            .sessions
            .get_or_create_page(&args.session_id, args.page_id.as_deref())
            .await?;

        // Upload targets are often revealed by earlier interactions; poll
        // for the element within the configured deadline.
        let deadline = Duration::from_millis(ctx.config.browser.element_wait_ms);
        let start = Instant::now();
        let node_id = loop {
            if let Some(id) = dom::find_node(&page, &args.selector).await? {
                break id;
            }
            if start.elapsed() > deadline {
                return Ok(ToolResult::diagnostic(
                    "element_not_found",
                    format!(
                        "Element '{}' did not appear within {}ms",
                        args.selector,
                        ctx.config.browser.element_wait_ms
                    ),
                ));
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        };

        page.cdp
            .set_file_input_files(vec![args.file_path.clone()], node_id)
            .await?;
        dom::dispatch_input_events(&page, node_id).await?;

        Ok(ToolResult::text(format!(
            "Attached {} to {}",
            args.file_path, args.selector
        )))
    }
}
