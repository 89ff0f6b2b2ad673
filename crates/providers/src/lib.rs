pub mod factory;
pub mod openai;

use async_trait::async_trait;
use autoapply_core::types::{ChatMessage, LLMResponse};
use autoapply_core::Result;
use serde_json::Value;

#[async_trait]
pub trait Provider: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<LLMResponse>;
}

pub use factory::create_provider;
pub use openai::OpenAIProvider;
