use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Step budget for read-only extraction tasks.
    #[serde(default = "default_max_steps_extract")]
    pub max_steps_extract: u32,
    /// Step budget for multi-field form-filling tasks.
    #[serde(default = "default_max_steps_fill_form")]
    pub max_steps_fill_form: u32,
    #[serde(default = "default_llm_max_retries")]
    pub llm_max_retries: u32,
    #[serde(default = "default_llm_retry_delay_ms")]
    pub llm_retry_delay_ms: u64,
    /// Explicit provider name; inferred from the model prefix when absent.
    #[serde(default)]
    pub provider: Option<String>,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_steps_extract() -> u32 {
    10
}

fn default_max_steps_fill_form() -> u32 {
    20
}

fn default_llm_max_retries() -> u32 {
    3
}

fn default_llm_retry_delay_ms() -> u64 {
    2000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_steps_extract: default_max_steps_extract(),
            max_steps_fill_form: default_max_steps_fill_form(),
            llm_max_retries: default_llm_max_retries(),
            llm_retry_delay_ms: default_llm_retry_delay_ms(),
            provider: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfig {
    /// Admission ceiling: new sessions are rejected once this many are live.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,
    /// Deadline for upload_file to find its target element.
    #[serde(default = "default_element_wait_ms")]
    pub element_wait_ms: u64,
    #[serde(default = "default_headless")]
    pub headless: bool,
}

fn default_max_sessions() -> usize {
    100
}

fn default_navigation_timeout_ms() -> u64 {
    10_000
}

fn default_element_wait_ms() -> u64 {
    5_000
}

fn default_headless() -> bool {
    true
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            navigation_timeout_ms: default_navigation_timeout_ms(),
            element_wait_ms: default_element_wait_ms(),
            headless: default_headless(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8923
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config {}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Load the config if present, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Config unreadable, using defaults");
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.browser.max_sessions, 100);
        assert_eq!(config.browser.navigation_timeout_ms, 10_000);
        assert_eq!(config.agent.max_steps_extract, 10);
        assert_eq!(config.agent.max_steps_fill_form, 20);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"browser": {"maxSessions": 5}}"#).expect("parse");
        assert_eq!(config.browser.max_sessions, 5);
        assert_eq!(config.browser.navigation_timeout_ms, 10_000);
        assert_eq!(config.agent.max_steps_extract, 10);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        let mut config = Config::default();
        config.browser.max_sessions = 7;
        config.save(&path).expect("save");

        let loaded = Config::load(&path).expect("load");
        assert_eq!(loaded.browser.max_sessions, 7);
        assert_eq!(loaded.gateway.port, 8923);
    }

    #[test]
    fn test_camel_case_keys() {
        let json = serde_json::to_value(Config::default()).expect("to_value");
        assert!(json["browser"].get("maxSessions").is_some());
        assert!(json["agent"].get("maxStepsFillForm").is_some());
    }
}
