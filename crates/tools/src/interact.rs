//! Element interaction tools: click, input_text, read_input.

use async_trait::async_trait;
use autoapply_core::{race_with_deadline, Result};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::dom;
use crate::navigate::wait_for_network_idle;
use crate::{decode_args, Tool, ToolContext, ToolResult, ToolSchema};

pub struct ClickTool;

#[derive(Deserialize)]
struct ClickArgs {
    session_id: String,
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    xpath: Option<String>,
    #[serde(default)]
    coordinates: Option<[f64; 2]>,
    #[serde(default)]
    page_id: Option<String>,
}

enum ClickTarget {
    Selector(String),
    XPath(String),
    Coordinates(f64, f64),
}

impl ClickArgs {
    /// Exactly one locating strategy must be honored.
    fn target(&self) -> std::result::Result<ClickTarget, String> {
        let given = [
            self.selector.is_some(),
            self.xpath.is_some(),
            self.coordinates.is_some(),
        ]
        .iter()
        .filter(|v| **v)
        .count();
        if given != 1 {
            return Err(format!(
                "click requires exactly one of selector, xpath or coordinates ({} given)",
                given
            ));
        }
        if let Some(sel) = &self.selector {
            Ok(ClickTarget::Selector(sel.clone()))
        } else if let Some(xp) = &self.xpath {
            Ok(ClickTarget::XPath(xp.clone()))
        } else {
            let [x, y] = self.coordinates.unwrap_or([0.0, 0.0]);
            Ok(ClickTarget::Coordinates(x, y))
        }
    }
}

#[async_trait]
impl Tool for ClickTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "click",
            description: "Click an element located by exactly one of: CSS selector, XPath expression, or viewport coordinates [x, y]. A click that triggers navigation waits for the page to settle, bounded by the navigation deadline.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "session_id": { "type": "string" },
                    "selector": { "type": "string", "description": "CSS selector" },
                    "xpath": { "type": "string", "description": "XPath expression" },
                    "coordinates": {
                        "type": "array",
                        "items": { "type": "number" },
                        "minItems": 2,
                        "maxItems": 2,
                        "description": "Viewport [x, y] position"
                    },
                    "page_id": { "type": "string" }
                },
                "required": ["session_id"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: serde_json::Value) -> Result<ToolResult> {
        let args: ClickArgs = match decode_args("click", params) {
            Ok(a) => a,
            Err(diag) => return Ok(*diag),
        };
        let target = match args.target() {
            Ok(t) => t,
            Err(msg) => return Ok(ToolResult::diagnostic("invalid_arguments", msg)),
        };

        let page = ctx
            .sessions
            .get_or_create_page(&args.session_id, args.page_id.as_deref())
            .await?;

        // Subscribe before clicking so a triggered navigation is observed.
        let mut nav_rx = page.cdp.subscribe_event("Page.frameNavigated").await;
        let mut lifecycle_rx = page.cdp.subscribe_event("Page.lifecycleEvent").await;

        let described = match &target {
            ClickTarget::Selector(sel) => {
                let node_id = match dom::find_node(&page, sel).await? {
                    Some(id) => id,
                    None => {
                        return Ok(ToolResult::diagnostic(
                            "element_not_found",
                            format!("No element matches selector '{}'", sel),
                        ))
                    }
                };
                dom::click_node(&page, node_id).await?;
                format!("selector '{}'", sel)
            }
            ClickTarget::XPath(xp) => {
                let js = format!(
                    "(function() {{ \
                        const r = document.evaluate('{}', document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null); \
                        const n = r.singleNodeValue; \
                        if (!n) return false; \
                        n.click(); \
                        return true; \
                    }})()",
                    dom::escape_js(xp)
                );
                let result = page.cdp.evaluate_js(&js).await?;
                if dom::eval_value(&result).and_then(|v| v.as_bool()) != Some(true) {
                    return Ok(ToolResult::diagnostic(
                        "element_not_found",
                        format!("No element matches xpath '{}'", xp),
                    ));
                }
                format!("xpath '{}'", xp)
            }
            ClickTarget::Coordinates(x, y) => {
                // Jittered position and a human-ish pre-click pause keep
                // coordinate clicks from looking machine-perfect.
                let (jx, jy) = (x + jitter(3.0), y + jitter(3.0));
                let delay_ms = 50 + (jitter(1.0).abs() * 100.0) as u64;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                page.cdp
                    .dispatch_mouse_event("mousePressed", jx, jy, "left", 1)
                    .await?;
                page.cdp
                    .dispatch_mouse_event("mouseReleased", jx, jy, "left", 1)
                    .await?;
                format!("coordinates ({:.0}, {:.0})", x, y)
            }
        };

        // If the click kicked off a navigation, wait for it under the same
        // deadline policy as navigate; otherwise return promptly.
        let mut navigated_to = None;
        if let Some(Some(event)) =
            race_with_deadline(nav_rx.recv(), Duration::from_millis(600)).await
        {
            let url = event
                .get("frame")
                .and_then(|f| f.get("url"))
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            debug!(url = %url, "Click triggered navigation");
            let deadline = Duration::from_millis(ctx.config.browser.navigation_timeout_ms);
            let _ = race_with_deadline(wait_for_network_idle(&mut lifecycle_rx), deadline).await;
            if !url.is_empty() {
                // Discarded silently if the session went away meanwhile.
                ctx.sessions
                    .set_current_url(&args.session_id, &page.page_id, &url)
                    .await;
                navigated_to = Some(url);
            }
        }

        let mut result = ToolResult::text(format!("Clicked {}", described));
        if let Some(url) = navigated_to {
            result = result.push_text(format!("The click navigated to {}", url));
        }
        Ok(result)
    }
}

/// Deterministic-free jitter in [-range, +range] without a rand dependency:
/// derived from fresh uuid bytes.
fn jitter(range: f64) -> f64 {
    let bytes = *uuid::Uuid::new_v4().as_bytes();
    let raw = u16::from_le_bytes([bytes[0], bytes[1]]) as f64 / u16::MAX as f64;
    (raw * 2.0 - 1.0) * range
}

pub struct InputTextTool;

#[derive(Deserialize)]
struct InputTextArgs {
    session_id: String,
    selector: String,
    text: String,
    #[serde(default)]
    page_id: Option<String>,
}

#[async_trait]
impl Tool for InputTextTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "input_text",
            description: "Fill a form field located by CSS selector, then read the value back. A readback that differs from the written text (rich-text widgets normalize input) is reported as a warning, not a failure.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "session_id": { "type": "string" },
                    "selector": { "type": "string" },
                    "text": { "type": "string" },
                    "page_id": { "type": "string" }
                },
                "required": ["session_id", "selector", "text"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: serde_json::Value) -> Result<ToolResult> {
        let args: InputTextArgs = match decode_args("input_text", params) {
            Ok(a) => a,
            Err(diag) => return Ok(*diag),
        };

        let page = ctx
            .sessions
            .get_or_create_page(&args.session_id, args.page_id.as_deref())
            .await?;

        let node_id = match dom::find_node(&page, &args.selector).await? {
            Some(id) => id,
            None => {
                return Ok(ToolResult::diagnostic(
                    "element_not_found",
                    format!("No element matches selector '{}'", args.selector),
                ))
            }
        };

        dom::focus_node(&page, node_id).await?;
        dom::clear_node(&page, node_id).await?;
        page.cdp.insert_text(&args.text).await?;
        dom::dispatch_input_events(&page, node_id).await?;

        let readback = dom::read_node_value(&page, node_id).await?;
        Ok(input_outcome(&args.selector, &args.text, &readback))
    }
}

/// Build the input_text envelope: success either way, with a mismatch
/// warning when the widget normalized what was written.
fn input_outcome(selector: &str, written: &str, readback: &str) -> ToolResult {
    if readback == written {
        ToolResult::text(format!("Filled '{}' into {}", written, selector))
    } else {
        ToolResult::text(format!(
            "Filled {} but the field now reads '{}' instead of '{}' (widget may normalize input)",
            selector, readback, written
        ))
        .push_structured(json!({
            "warning": "value_mismatch",
            "expected": written,
            "actual": readback,
        }))
    }
}

pub struct ReadInputTool;

#[derive(Deserialize)]
struct ReadInputArgs {
    session_id: String,
    selector: String,
    #[serde(default)]
    page_id: Option<String>,
}

#[async_trait]
impl Tool for ReadInputTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "read_input",
            description: "Read the current value of a form field located by CSS selector.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "session_id": { "type": "string" },
                    "selector": { "type": "string" },
                    "page_id": { "type": "string" }
                },
                "required": ["session_id", "selector"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: serde_json::Value) -> Result<ToolResult> {
        let args: ReadInputArgs = match decode_args("read_input", params) {
            Ok(a) => a,
            Err(diag) => return Ok(*diag),
        };

        let page = ctx
            .sessions
            .get_or_create_page(&args.session_id, args.page_id.as_deref())
            .await?;

        let node_id = match dom::find_node(&page, &args.selector).await? {
            Some(id) => id,
            None => {
                return Ok(ToolResult::diagnostic(
                    "element_not_found",
                    format!("No element matches selector '{}'", args.selector),
                ))
            }
        };

        let value = dom::read_node_value(&page, node_id).await?;
        Ok(ToolResult::text(format!("Value of {}: '{}'", args.selector, value))
            .push_structured(json!({"selector": args.selector, "value": value})))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click_args(json: serde_json::Value) -> ClickArgs {
        serde_json::from_value(json).expect("args")
    }

    #[test]
    fn test_click_requires_exactly_one_strategy() {
        let none = click_args(json!({"session_id": "s"}));
        assert!(none.target().is_err());

        let two = click_args(json!({"session_id": "s", "selector": "#a", "xpath": "//a"}));
        assert!(two.target().is_err());

        let one = click_args(json!({"session_id": "s", "coordinates": [10.0, 20.0]}));
        assert!(matches!(one.target(), Ok(ClickTarget::Coordinates(_, _))));
    }

    #[test]
    fn test_jitter_bounded() {
        for _ in 0..50 {
            let j = jitter(3.0);
            assert!((-3.0..=3.0).contains(&j), "jitter out of range: {}", j);
        }
    }

    #[test]
    fn test_input_mismatch_is_warning_not_failure() {
        let written = format!("{}.{}@Example.com", "Jane", "Doe");
        let readback = written.to_lowercase();
        let result = input_outcome("#email", &written, &readback);
        assert!(result.is_ok());
        let value = serde_json::to_value(&result).expect("serialize");
        assert_eq!(value["content"][1]["value"]["warning"], "value_mismatch");
        assert_eq!(value["content"][1]["value"]["expected"], written);
        assert_eq!(value["content"][1]["value"]["actual"], readback);
    }

    #[test]
    fn test_input_match_is_plain_success() {
        let result = input_outcome("#name", "Jane Doe", "Jane Doe");
        assert!(result.is_ok());
        assert_eq!(result.content.len(), 1);
    }
}
