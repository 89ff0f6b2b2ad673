use autoapply_core::{Config, Paths};

pub fn run(force: bool) -> anyhow::Result<()> {
    let paths = Paths::new();
    let config_path = paths.config_file();

    if config_path.exists() && !force {
        println!(
            "Config already exists at {} (use --force to overwrite)",
            config_path.display()
        );
        return Ok(());
    }

    let config = Config::default();
    config.save(&config_path)?;
    std::fs::create_dir_all(paths.workspace())?;
    std::fs::create_dir_all(paths.media_dir())?;
    std::fs::create_dir_all(paths.browser_dir())?;

    println!("Wrote default config to {}", config_path.display());
    println!("Add a provider apiKey under \"providers\" to enable the agent loop.");
    Ok(())
}
