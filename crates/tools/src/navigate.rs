//! Page navigation with idempotence and a deadline-raced readiness signal.

use async_trait::async_trait;
use autoapply_core::{race_with_deadline, Result};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use crate::{decode_args, Tool, ToolContext, ToolResult, ToolSchema};

pub struct NavigateTool;

#[derive(Deserialize)]
struct NavigateArgs {
    session_id: String,
    url: String,
    #[serde(default)]
    page_id: Option<String>,
}

#[async_trait]
impl Tool for NavigateTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "navigate",
            description: "Open a URL in a session's page. Returns immediately if the page is already at that URL. Waits for the network to go mostly idle, bounded by a hard deadline; hitting the deadline returns whatever state the page reached.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "session_id": { "type": "string" },
                    "url": { "type": "string" },
                    "page_id": {
                        "type": "string",
                        "description": "Optional page id for multi-page sessions (default: main)"
                    }
                },
                "required": ["session_id", "url"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: serde_json::Value) -> Result<ToolResult> {
        let args: NavigateArgs = match decode_args("navigate", params) {
            Ok(a) => a,
            Err(diag) => return Ok(*diag),
        };

        let page = ctx
            .sessions
            .get_or_create_page(&args.session_id, args.page_id.as_deref())
            .await?;

        // Idempotence: a repeat navigation to the current URL is a no-op.
        if ctx
            .sessions
            .current_url(&args.session_id, &page.page_id)
            .await
            .as_deref()
            == Some(args.url.as_str())
        {
            return Ok(ToolResult::text(format!(
                "Already at {}, no navigation performed",
                args.url
            )));
        }

        // Subscribe before navigating so the readiness event cannot be missed.
        let mut lifecycle_rx = page.cdp.subscribe_event("Page.lifecycleEvent").await;

        page.cdp.navigate(&args.url).await?;

        let deadline = Duration::from_millis(ctx.config.browser.navigation_timeout_ms);
        let settled = race_with_deadline(wait_for_network_idle(&mut lifecycle_rx), deadline)
            .await
            .unwrap_or(false);

        // The session may have been destroyed while we waited; discard then.
        if !ctx
            .sessions
            .set_current_url(&args.session_id, &page.page_id, &args.url)
            .await
        {
            return Ok(ToolResult::diagnostic(
                "session_not_found",
                format!("Session {} was closed during navigation", args.session_id),
            ));
        }

        let text = if settled {
            format!("Navigated to {}", args.url)
        } else {
            debug!(url = %args.url, "Navigation deadline reached, returning partial state");
            format!(
                "Navigated to {} (network not yet idle after {}ms; page returned in its current state)",
                args.url, ctx.config.browser.navigation_timeout_ms
            )
        };
        Ok(ToolResult::text(text).push_structured(json!({
            "url": args.url,
            "settled": settled,
        })))
    }
}

/// Wait until the page reports its network as mostly idle. Returns false if
/// the event stream ends first (page target went away).
pub(crate) async fn wait_for_network_idle(rx: &mut mpsc::Receiver<serde_json::Value>) -> bool {
    while let Some(event) = rx.recv().await {
        let name = event.get("name").and_then(|v| v.as_str()).unwrap_or("");
        if name == "networkAlmostIdle" || name == "networkIdle" {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_for_network_idle_matches_lifecycle_names() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(json!({"name": "init"})).await.expect("send");
        tx.send(json!({"name": "DOMContentLoaded"})).await.expect("send");
        tx.send(json!({"name": "networkAlmostIdle"})).await.expect("send");
        drop(tx);
        assert!(wait_for_network_idle(&mut rx).await);
    }

    #[tokio::test]
    async fn test_wait_for_network_idle_ends_with_stream() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(json!({"name": "load"})).await.expect("send");
        drop(tx);
        assert!(!wait_for_network_idle(&mut rx).await);
    }
}
