//! The bounded agent loop: a conversation between the text-generation
//! provider and the browser tool catalog, capped by a per-task step budget.

use autoapply_core::types::{ChatMessage, ToolCallRequest};
use autoapply_core::Result;
use autoapply_providers::Provider;
use autoapply_tools::{ToolContext, ToolRegistry};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

const SYSTEM_PROMPT: &str = "You are a browser-automation assistant for job-application workflows. \
You control real browser sessions through the provided tools. \
Open a session before using other tools, address every call with its session id, \
and close sessions you opened once the goal is met. \
Tool failures come back as readable diagnostics; adjust and retry instead of giving up. \
When the goal is achieved, reply with the final answer as plain text and no further tool calls.";

/// What kind of task the loop is budgeted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Read-only extraction (job-posting scraping and similar).
    Extract,
    /// Multi-field form filling.
    FillForm,
}

impl TaskKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "extract" => Some(Self::Extract),
            "fill-form" | "fill_form" => Some(Self::FillForm),
            _ => None,
        }
    }
}

/// Terminal result of one agent run. Budget exhaustion and cancellation are
/// sentinels, not errors, so callers can decide whether to retry.
#[derive(Debug)]
pub enum AgentOutcome {
    Completed(String),
    BudgetExhausted,
    Cancelled,
}

pub struct AgentRunner {
    provider: Arc<dyn Provider>,
    tools: ToolRegistry,
    ctx: ToolContext,
}

impl AgentRunner {
    pub fn new(provider: Arc<dyn Provider>, tools: ToolRegistry, ctx: ToolContext) -> Self {
        Self {
            provider,
            tools,
            ctx,
        }
    }

    /// Drive the loop until the model stops calling tools, the step budget
    /// runs out, or the cancellation signal flips.
    pub async fn run(
        &self,
        goal: &str,
        url: &str,
        kind: TaskKind,
        cancel: watch::Receiver<bool>,
    ) -> Result<AgentOutcome> {
        let max_steps = match kind {
            TaskKind::Extract => self.ctx.config.agent.max_steps_extract,
            TaskKind::FillForm => self.ctx.config.agent.max_steps_fill_form,
        };

        let mut messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(&format!("Goal: {}\nTarget URL: {}", goal, url)),
        ];
        let tool_schemas = self.tools.get_tool_schemas();

        for step in 0..max_steps {
            // Cancellation is observed between steps, never mid-tool.
            if *cancel.borrow() {
                info!(step, "Agent run cancelled");
                return Ok(AgentOutcome::Cancelled);
            }

            debug!(step, "LLM call iteration");
            let response = self.chat_with_retry(&messages, &tool_schemas).await?;

            info!(
                step,
                content_len = response.content.as_ref().map(|c| c.len()).unwrap_or(0),
                tool_calls_count = response.tool_calls.len(),
                finish_reason = %response.finish_reason,
                "LLM response received"
            );

            if response.tool_calls.is_empty() {
                return Ok(AgentOutcome::Completed(response.content.unwrap_or_default()));
            }

            let mut assistant_msg =
                ChatMessage::assistant(response.content.as_deref().unwrap_or(""));
            assistant_msg.tool_calls = Some(response.tool_calls.clone());
            messages.push(assistant_msg);

            // Independent tool calls run concurrently; results are appended
            // in the model's emission order so the conversation stays stable
            // regardless of execution timing.
            let executions = response
                .tool_calls
                .iter()
                .map(|call| self.execute_tool_call(call));
            let results = join_all(executions).await;

            for (call, result_text) in response.tool_calls.iter().zip(results) {
                let mut tool_msg = ChatMessage::tool_result(&call.id, &result_text);
                tool_msg.name = Some(call.name.clone());
                messages.push(tool_msg);
            }
        }

        warn!(max_steps, "Agent step budget exhausted");
        Ok(AgentOutcome::BudgetExhausted)
    }

    async fn chat_with_retry(
        &self,
        messages: &[ChatMessage],
        tools: &[serde_json::Value],
    ) -> Result<autoapply_core::types::LLMResponse> {
        let max_retries = self.ctx.config.agent.llm_max_retries;
        let base_delay_ms = self.ctx.config.agent.llm_retry_delay_ms;
        let mut last_error = None;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                let delay_ms = base_delay_ms * (1u64 << (attempt - 1).min(4));
                warn!(attempt, max_retries, delay_ms, "Retrying LLM call after transient error");
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            }
            match self.provider.chat(messages, tools).await {
                Ok(r) => {
                    if attempt > 0 {
                        info!(attempt, "LLM call succeeded after retry");
                    }
                    return Ok(r);
                }
                Err(e) => {
                    warn!(error = %e, attempt, max_retries, "LLM call failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| autoapply_core::Error::Provider("LLM call failed".to_string())))
    }

    /// Execute one tool call, producing the message text appended for the
    /// model. Diagnostics flow back like successes. An infrastructure
    /// failure tears down the affected session and is reported inline; it
    /// never aborts the loop or the process.
    async fn execute_tool_call(&self, call: &ToolCallRequest) -> String {
        match self
            .tools
            .execute(&call.name, self.ctx.clone(), call.arguments.clone())
            .await
        {
            Ok(result) => result.to_message_string(),
            Err(e) => {
                let affected = call
                    .arguments
                    .get("session_id")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
                if let Some(session_id) = &affected {
                    warn!(
                        tool = %call.name,
                        session = %session_id,
                        error = %e,
                        "Infrastructure failure, destroying affected session"
                    );
                    self.ctx.sessions.destroy(session_id).await;
                } else {
                    warn!(tool = %call.name, error = %e, "Infrastructure failure");
                }
                serde_json::json!({
                    "content": [{
                        "type": "text",
                        "text": match affected {
                            Some(sid) => format!(
                                "Infrastructure failure: {}. Session {} was destroyed; open a new session to continue.",
                                e, sid
                            ),
                            None => format!("Infrastructure failure: {}", e),
                        }
                    }],
                    "status": {"ok": false, "code": "infrastructure"}
                })
                .to_string()
            }
        }
    }
}
