//! Shared DOM helpers for tools that locate and drive page elements.

use autoapply_core::Result;
use autoapply_browser::PageRef;
use serde_json::Value;

/// Find the first node matching a CSS selector. `Ok(None)` when absent.
pub async fn find_node(page: &PageRef, selector: &str) -> Result<Option<i64>> {
    let root = page.cdp.get_document_root().await?;
    page.cdp.query_selector(root, selector).await
}

/// Focus an element by node id.
pub async fn focus_node(page: &PageRef, node_id: i64) -> Result<()> {
    let object_id = page.cdp.resolve_node(node_id).await?;
    page.cdp
        .call_function_on(&object_id, "function() { this.focus(); }")
        .await?;
    Ok(())
}

/// Clear a form field's current contents.
pub async fn clear_node(page: &PageRef, node_id: i64) -> Result<()> {
    let object_id = page.cdp.resolve_node(node_id).await?;
    page.cdp
        .call_function_on(
            &object_id,
            "function() { if ('value' in this) { this.value = ''; } else { this.textContent = ''; } }",
        )
        .await?;
    Ok(())
}

/// Read a field's current value (or text content for rich-text widgets).
pub async fn read_node_value(page: &PageRef, node_id: i64) -> Result<String> {
    let object_id = page.cdp.resolve_node(node_id).await?;
    let result = page
        .cdp
        .call_function_on(
            &object_id,
            "function() { return ('value' in this) ? String(this.value) : (this.textContent || ''); }",
        )
        .await?;
    Ok(result
        .get("result")
        .and_then(|r| r.get("value"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string())
}

/// Dispatch input/change events so framework-bound fields observe the edit.
pub async fn dispatch_input_events(page: &PageRef, node_id: i64) -> Result<()> {
    let object_id = page.cdp.resolve_node(node_id).await?;
    page.cdp
        .call_function_on(
            &object_id,
            "function() { \
                this.dispatchEvent(new Event('input', {bubbles: true})); \
                this.dispatchEvent(new Event('change', {bubbles: true})); \
            }",
        )
        .await?;
    Ok(())
}

/// Click an element by node id via its DOM click() method.
pub async fn click_node(page: &PageRef, node_id: i64) -> Result<()> {
    let object_id = page.cdp.resolve_node(node_id).await?;
    page.cdp
        .call_function_on(&object_id, "function() { this.click(); }")
        .await?;
    Ok(())
}

/// Escape a string for embedding inside a single-quoted JS literal.
pub fn escape_js(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'").replace('\n', "\\n")
}

/// Extract the returned value of a Runtime.evaluate response.
pub fn eval_value(result: &Value) -> Option<&Value> {
    result.get("result").and_then(|r| r.get("value"))
}
