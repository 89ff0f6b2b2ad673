use autoapply_browser::SessionRegistry;
use autoapply_core::{Config, Paths};
use autoapply_gateway::{serve, GatewayState};
use autoapply_providers::create_provider;
use autoapply_tools::ToolRegistry;
use std::sync::Arc;
use tracing::warn;

pub async fn run(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let paths = Paths::new();
    let mut config = Config::load_or_default(&paths.config_file());
    if let Some(h) = host {
        config.gateway.host = h;
    }
    if let Some(p) = port {
        config.gateway.port = p;
    }

    let sessions = Arc::new(SessionRegistry::new(
        paths.browser_dir(),
        config.browser.max_sessions,
        config.browser.headless,
    ));
    let tools = Arc::new(ToolRegistry::with_defaults());
    let provider = match create_provider(&config) {
        Ok(p) => Some(p),
        Err(e) => {
            warn!(error = %e, "No provider configured; agent/run will be rejected");
            None
        }
    };

    let state = GatewayState::new(sessions, tools, provider, paths, config);
    serve(state).await?;
    Ok(())
}
