use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Navigation timed out: {0}")]
    NavigationTimeout(String),

    #[error("Session capacity exceeded ({0} live sessions)")]
    CapacityExceeded(usize),

    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Infrastructure failure: {0}")]
    Infrastructure(String),
}

impl Error {
    /// Machine-readable status code carried in tool/protocol envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Provider(_) => "provider",
            Error::Tool(_) => "tool",
            Error::SessionNotFound(_) => "session_not_found",
            Error::ElementNotFound(_) => "element_not_found",
            Error::NavigationTimeout(_) => "navigation_timeout",
            Error::CapacityExceeded(_) => "capacity_exceeded",
            Error::ConnectionNotFound(_) => "connection_not_found",
            Error::Transport(_) => "transport",
            Error::Infrastructure(_) => "infrastructure",
        }
    }

    /// Infrastructure failures propagate past the tool catalog; everything
    /// else is folded into a diagnostic result envelope.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Error::Infrastructure(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(Error::SessionNotFound("s1".into()).code(), "session_not_found");
        assert_eq!(Error::CapacityExceeded(100).code(), "capacity_exceeded");
        assert_eq!(Error::ConnectionNotFound("c1".into()).code(), "connection_not_found");
    }

    #[test]
    fn test_only_infrastructure_propagates() {
        assert!(Error::Infrastructure("browser died".into()).is_infrastructure());
        assert!(!Error::Tool("bad selector".into()).is_infrastructure());
        assert!(!Error::ElementNotFound("#missing".into()).is_infrastructure());
    }
}
