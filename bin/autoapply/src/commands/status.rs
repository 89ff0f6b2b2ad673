use autoapply_browser::launch::find_browser_binary;
use autoapply_core::{Config, Paths};
use autoapply_providers::factory::resolve_provider_name;

pub fn run() -> anyhow::Result<()> {
    let paths = Paths::new();
    let config_path = paths.config_file();

    println!("autoapply {}", env!("CARGO_PKG_VERSION"));
    println!();

    if config_path.exists() {
        println!("Config:   {}", config_path.display());
    } else {
        println!("Config:   not found (run `autoapply onboard`)");
    }

    let config = Config::load_or_default(&config_path);
    let provider_name = resolve_provider_name(&config);
    let provider_ready = config
        .providers
        .get(&provider_name)
        .map(|p| !p.api_key.trim().is_empty())
        .unwrap_or(false);
    println!("Model:    {}", config.agent.model);
    println!(
        "Provider: {} ({})",
        provider_name,
        if provider_ready { "configured" } else { "missing apiKey" }
    );

    match find_browser_binary() {
        Some(path) => println!("Browser:  {}", path),
        None => println!("Browser:  no Chrome/Chromium found"),
    }

    println!("Sessions: ceiling {}", config.browser.max_sessions);
    println!(
        "Gateway:  {}:{}",
        config.gateway.host, config.gateway.port
    );
    Ok(())
}
