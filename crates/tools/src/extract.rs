//! Page content extraction tool.

use async_trait::async_trait;
use autoapply_core::{safe_truncate, Result};
use autoapply_browser::extract::{page_to_markdown, prune_structural};
use serde::Deserialize;
use serde_json::json;

use crate::dom;
use crate::{decode_args, Tool, ToolContext, ToolResult, ToolSchema};

const MAX_CONTENT_CHARS: usize = 50_000;

pub struct ExtractContentTool;

#[derive(Deserialize)]
struct ExtractContentArgs {
    session_id: String,
    #[serde(default)]
    selector: Option<String>,
    #[serde(default = "default_format")]
    format: ExtractFormat,
    #[serde(default)]
    page_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ExtractFormat {
    Structural,
    Text,
}

fn default_format() -> ExtractFormat {
    ExtractFormat::Structural
}

#[async_trait]
impl Tool for ExtractContentTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "extract_content",
            description: "Extract the page's content. format='structural' returns a pruned HTML subtree rooted at the selector (default: body) with scripts, styles, comments and empty leaves removed; format='text' returns the whole page rendered as markdown.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "session_id": { "type": "string" },
                    "selector": {
                        "type": "string",
                        "description": "Root of the structural subtree (structural format only)"
                    },
                    "format": {
                        "type": "string",
                        "enum": ["structural", "text"],
                        "description": "Output form (default: structural)"
                    },
                    "page_id": { "type": "string" }
                },
                "required": ["session_id"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: serde_json::Value) -> Result<ToolResult> {
        let args: ExtractContentArgs = match decode_args("extract_content", params) {
            Ok(a) => a,
            Err(diag) => return Ok(*diag),
        };

        let page = ctx
            .sessions
            .get_or_create_page(&args.session_id, args.page_id.as_deref())
            .await?;

        let html_result = page
            .cdp
            .evaluate_js("document.documentElement.outerHTML")
            .await?;
        let html = dom::eval_value(&html_result)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        if html.is_empty() {
            return Ok(ToolResult::diagnostic(
                "tool",
                "Page returned no markup to extract",
            ));
        }

        let (format_name, content) = match args.format {
            ExtractFormat::Structural => {
                let pruned = prune_structural(&html, args.selector.as_deref())?;
                ("structural", pruned)
            }
            ExtractFormat::Text => ("text", page_to_markdown(&html)),
        };

        let total = content.len();
        let truncated = if total > MAX_CONTENT_CHARS {
            format!(
                "{}...\n[truncated, {} total chars]",
                safe_truncate(&content, MAX_CONTENT_CHARS),
                total
            )
        } else {
            content
        };

        Ok(ToolResult::text(truncated).push_structured(json!({
            "format": format_name,
            "length": total,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_deserializes_snake_case() {
        let args: ExtractContentArgs = serde_json::from_value(json!({
            "session_id": "s1",
            "format": "text"
        }))
        .expect("args");
        assert_eq!(args.format, ExtractFormat::Text);
    }

    #[test]
    fn test_format_defaults_to_structural() {
        let args: ExtractContentArgs =
            serde_json::from_value(json!({"session_id": "s1"})).expect("args");
        assert_eq!(args.format, ExtractFormat::Structural);
        assert!(args.selector.is_none());
    }
}
