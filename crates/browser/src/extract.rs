//! Content extraction: cleaned structural HTML subtrees and markdown text
//! renderings of a page. Pure functions of the markup; no browser state.

use autoapply_core::{Error, Result};
use scraper::{ElementRef, Html, Selector};

/// Tags dropped entirely during structural pruning.
const SKIP_TAGS: &[&str] = &[
    "script", "style", "meta", "link", "noscript", "template", "head", "title", "svg", "iframe",
];

/// Tags kept even when they have no rendered children (form fields matter
/// even when empty).
const KEEP_EMPTY_TAGS: &[&str] = &[
    "img", "input", "br", "hr", "textarea", "select", "option", "button",
];

/// Void elements serialized without a closing tag.
const VOID_TAGS: &[&str] = &["img", "input", "br", "hr"];

/// Attributes preserved on pruned elements; everything else is noise for the
/// consuming agent.
const KEEP_ATTRS: &[&str] = &[
    "id", "class", "name", "type", "value", "href", "src", "placeholder", "for", "action",
    "method", "role", "aria-label", "alt", "required", "checked", "selected",
];

/// Return a pruned structural subtree rooted at `selector` (default: body).
/// Pruning removes script/style/meta nodes, comments, and empty leaves.
pub fn prune_structural(html: &str, selector: Option<&str>) -> Result<String> {
    let document = Html::parse_document(html);

    let root = match selector {
        Some(sel_str) => {
            let sel = Selector::parse(sel_str)
                .map_err(|e| Error::Tool(format!("Invalid selector '{}': {}", sel_str, e)))?;
            document
                .select(&sel)
                .next()
                .ok_or_else(|| Error::ElementNotFound(sel_str.to_string()))?
        }
        None => {
            let body = Selector::parse("body").expect("static selector");
            document
                .select(&body)
                .next()
                .unwrap_or_else(|| document.root_element())
        }
    };

    let mut out = String::new();
    render_element(root, &mut out);
    Ok(out.trim().to_string())
}

fn render_element(el: ElementRef, out: &mut String) {
    let name = el.value().name();
    if SKIP_TAGS.contains(&name) {
        return;
    }

    let mut children = String::new();
    for child in el.children() {
        match child.value() {
            scraper::Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    render_element(child_el, &mut children);
                }
            }
            scraper::Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    children.push_str(&escape_text(trimmed));
                }
            }
            // Comments, doctypes and processing instructions are dropped.
            _ => {}
        }
    }

    if children.is_empty() && !KEEP_EMPTY_TAGS.contains(&name) {
        return;
    }

    out.push('<');
    out.push_str(name);
    for (attr, value) in el.value().attrs() {
        if KEEP_ATTRS.contains(&attr) {
            out.push(' ');
            out.push_str(attr);
            out.push_str("=\"");
            out.push_str(&escape_attr(value));
            out.push('"');
        }
    }
    out.push('>');

    if VOID_TAGS.contains(&name) {
        return;
    }

    out.push_str(&children);
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}

/// Convert a full page's HTML to clean markdown using htmd.
///
/// Strips nav, header, footer, script, style, aside and similar chrome to
/// focus on main content.
pub fn page_to_markdown(html: &str) -> String {
    use htmd::HtmlToMarkdown;

    let converter = HtmlToMarkdown::builder()
        .skip_tags(vec![
            "script", "style", "nav", "footer", "header", "aside", "noscript", "iframe",
        ])
        .build();

    match converter.convert(html) {
        Ok(md) => clean_markdown(&md),
        Err(_) => extract_text_fallback(html),
    }
}

/// Clean up converted markdown:
/// - Collapse excessive blank lines (3+ → 2)
/// - Trim leading/trailing whitespace
fn clean_markdown(md: &str) -> String {
    let mut result = String::with_capacity(md.len());
    let mut consecutive_newlines: usize = 0;

    for line in md.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            consecutive_newlines += 1;
        } else {
            // Insert at most one blank line (two newlines) between content lines
            if !result.is_empty() {
                let separator_newlines = if consecutive_newlines > 0 { 2 } else { 1 };
                for _ in 0..separator_newlines {
                    result.push('\n');
                }
            }
            consecutive_newlines = 0;
            result.push_str(line);
        }
    }

    result.trim().to_string()
}

/// Fallback text extraction using scraper (when htmd fails).
fn extract_text_fallback(html: &str) -> String {
    let document = Html::parse_document(html);

    // Try main content areas first
    let selectors = ["article", "main", "[role=\"main\"]", ".content", "#content", "body"];

    for sel_str in selectors {
        if let Ok(selector) = Selector::parse(sel_str) {
            if let Some(element) = document.select(&selector).next() {
                let text: String = element
                    .text()
                    .collect::<Vec<_>>()
                    .join(" ")
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ");
                if text.len() > 100 {
                    return text;
                }
            }
        }
    }

    // Last resort: all text
    document
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prune_keeps_heading_drops_noise() {
        let html = "<html><head><title>t</title></head><body>\
                    <script>alert('x')</script>\
                    <style>h1 { color: red }</style>\
                    <!-- a comment -->\
                    <h1>Hi</h1></body></html>";
        let pruned = prune_structural(html, None).expect("prune");
        assert!(pruned.contains("<h1>Hi</h1>"));
        assert!(!pruned.contains("script"));
        assert!(!pruned.contains("alert"));
        assert!(!pruned.contains("style"));
        assert!(!pruned.contains("comment"));
    }

    #[test]
    fn test_prune_removes_empty_leaves() {
        let html = "<body><div><span></span></div><p>Text</p></body>";
        let pruned = prune_structural(html, None).expect("prune");
        assert!(!pruned.contains("<span>"));
        assert!(!pruned.contains("<div>"));
        assert!(pruned.contains("<p>Text</p>"));
    }

    #[test]
    fn test_prune_keeps_empty_form_fields() {
        let html = r#"<body><form action="/apply"><input type="text" name="email"></form></body>"#;
        let pruned = prune_structural(html, None).expect("prune");
        assert!(pruned.contains(r#"<input type="text" name="email">"#));
        assert!(pruned.contains(r#"action="/apply""#));
    }

    #[test]
    fn test_prune_drops_unlisted_attributes() {
        let html = r#"<body><p data-tracking="xyz" class="intro">Hello</p></body>"#;
        let pruned = prune_structural(html, None).expect("prune");
        assert!(pruned.contains(r#"class="intro""#));
        assert!(!pruned.contains("data-tracking"));
    }

    #[test]
    fn test_prune_rooted_at_selector() {
        let html = r#"<body><div id="a">A</div><div id="b">B</div></body>"#;
        let pruned = prune_structural(html, Some("#b")).expect("prune");
        assert!(pruned.contains("B"));
        assert!(!pruned.contains(">A<"));
    }

    #[test]
    fn test_prune_unknown_selector_is_element_not_found() {
        let html = "<body><p>x</p></body>";
        let err = prune_structural(html, Some("#missing")).unwrap_err();
        assert!(matches!(err, Error::ElementNotFound(_)));
    }

    #[test]
    fn test_markdown_conversion() {
        let html = "<html><body><h1>Hello</h1><p>World</p></body></html>";
        let md = page_to_markdown(html);
        assert!(md.contains("Hello"));
        assert!(md.contains("World"));
    }

    #[test]
    fn test_markdown_strips_scripts() {
        let html = "<html><body><script>alert('x')</script><p>Content</p></body></html>";
        let md = page_to_markdown(html);
        assert!(!md.contains("alert"));
        assert!(md.contains("Content"));
    }

    #[test]
    fn test_clean_markdown_collapses_blank_runs() {
        let md = "a\n\n\n\n\nb";
        assert_eq!(clean_markdown(md), "a\n\nb");
    }
}
