use std::collections::HashMap;
use std::sync::Arc;

use autoapply_core::Result;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::capture::ScreenshotTool;
use crate::extract::ExtractContentTool;
use crate::interact::{ClickTool, InputTextTool, ReadInputTool};
use crate::navigate::NavigateTool;
use crate::session::{CloseSessionTool, ListSessionsTool, OpenSessionTool};
use crate::upload::UploadFileTool;
use crate::{Tool, ToolContext, ToolResult};

#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        // Session lifecycle
        registry.register(Arc::new(OpenSessionTool));
        registry.register(Arc::new(CloseSessionTool));
        registry.register(Arc::new(ListSessionsTool));

        // Navigation
        registry.register(Arc::new(NavigateTool));

        // Element interaction
        registry.register(Arc::new(ClickTool));
        registry.register(Arc::new(InputTextTool));
        registry.register(Arc::new(ReadInputTool));

        // Content
        registry.register(Arc::new(ExtractContentTool));
        registry.register(Arc::new(ScreenshotTool));

        // Uploads
        registry.register(Arc::new(UploadFileTool));

        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        debug!(name = schema.name, "Registering tool");
        self.tools.insert(schema.name.to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Tool schemas in the OpenAI function-calling format.
    pub fn get_tool_schemas(&self) -> Vec<Value> {
        self.tools
            .values()
            .map(|tool| {
                let schema = tool.schema();
                json!({
                    "type": "function",
                    "function": {
                        "name": schema.name,
                        "description": schema.description,
                        "parameters": schema.parameters
                    }
                })
            })
            .collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Execute a tool by name. Executor failures come back as diagnostic
    /// envelopes the agent can read; only infrastructure failures are
    /// returned as errors.
    pub async fn execute(&self, name: &str, ctx: ToolContext, params: Value) -> Result<ToolResult> {
        let tool = match self.get(name) {
            Some(t) => t,
            None => {
                warn!(tool = name, "Unknown tool requested");
                return Ok(ToolResult::diagnostic(
                    "unknown_tool",
                    format!("Unknown tool: {}", name),
                ));
            }
        };

        debug!(tool = name, "Executing tool");
        match tool.execute(ctx, params).await {
            Ok(result) => Ok(result),
            Err(e) if e.is_infrastructure() => Err(e),
            Err(e) => {
                warn!(tool = name, error = %e, "Tool failed");
                Ok(ToolResult::diagnostic(e.code(), e.to_string()))
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoapply_browser::SessionRegistry;
    use autoapply_core::{Config, Paths};

    fn test_ctx() -> ToolContext {
        let base = std::env::temp_dir().join("autoapply-tools-test");
        ToolContext {
            sessions: Arc::new(SessionRegistry::new(base.clone(), 10, true)),
            paths: Paths::with_base(base),
            config: Config::default(),
        }
    }

    #[test]
    fn test_registry_new_empty() {
        let reg = ToolRegistry::new();
        assert!(reg.tool_names().is_empty());
        assert!(reg.get("navigate").is_none());
    }

    #[test]
    fn test_registry_with_defaults_has_catalog() {
        let reg = ToolRegistry::with_defaults();
        let names = reg.tool_names();
        for expected in [
            "open_session",
            "close_session",
            "list_sessions",
            "navigate",
            "click",
            "input_text",
            "read_input",
            "extract_content",
            "screenshot",
            "upload_file",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {}", expected);
        }
        assert_eq!(names.len(), 10);
    }

    #[test]
    fn test_registry_get_tool_schemas() {
        let reg = ToolRegistry::with_defaults();
        let schemas = reg.get_tool_schemas();
        assert_eq!(schemas.len(), 10);
        for schema in &schemas {
            assert_eq!(schema["type"], "function");
            assert!(schema["function"]["name"].is_string());
            assert!(schema["function"]["description"].is_string());
            assert_eq!(schema["function"]["parameters"]["type"], "object");
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_is_diagnostic_not_error() {
        let reg = ToolRegistry::with_defaults();
        let result = reg
            .execute("definitely_not_a_tool", test_ctx(), json!({}))
            .await
            .expect("diagnostic, not error");
        assert!(!result.is_ok());
    }

    #[tokio::test]
    async fn test_session_not_found_is_diagnostic() {
        let reg = ToolRegistry::with_defaults();
        let result = reg
            .execute(
                "navigate",
                test_ctx(),
                json!({"session_id": "ghost", "url": "https://example.com"}),
            )
            .await
            .expect("diagnostic, not error");
        assert!(!result.is_ok());
        assert_eq!(
            result.status.as_ref().and_then(|s| s.code.as_deref()),
            Some("session_not_found")
        );
    }

    #[tokio::test]
    async fn test_close_unknown_session_is_noop_success() {
        let reg = ToolRegistry::with_defaults();
        let result = reg
            .execute("close_session", test_ctx(), json!({"session_id": "ghost"}))
            .await
            .expect("ok");
        assert!(result.is_ok());
    }
}
