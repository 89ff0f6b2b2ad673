pub mod config;
pub mod error;
pub mod paths;
pub mod sync;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use paths::Paths;
pub use sync::{race_with_deadline, CloseHooks};
pub use types::{safe_truncate, ChatMessage, LLMResponse, ToolCallRequest};
