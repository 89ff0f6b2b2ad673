use autoapply_agent::{AgentOutcome, AgentRunner, TaskKind};
use autoapply_browser::SessionRegistry;
use autoapply_core::{Config, Paths};
use autoapply_providers::create_provider;
use autoapply_tools::{ToolContext, ToolRegistry};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

pub async fn run(goal: &str, url: &str, task: &str) -> anyhow::Result<()> {
    let kind = TaskKind::parse(task)
        .ok_or_else(|| anyhow::anyhow!("unknown task kind '{}' (expected extract or fill-form)", task))?;

    let paths = Paths::new();
    let config = Config::load_or_default(&paths.config_file());
    let provider = create_provider(&config)?;

    let sessions = Arc::new(SessionRegistry::new(
        paths.browser_dir(),
        config.browser.max_sessions,
        config.browser.headless,
    ));
    let ctx = ToolContext {
        sessions: sessions.clone(),
        paths,
        config,
    };
    let runner = AgentRunner::new(provider, ToolRegistry::with_defaults(), ctx);

    // Ctrl-C cancels the loop at its next step; the drain below still runs.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling agent run");
            let _ = cancel_tx.send(true);
        }
    });

    let outcome = runner.run(goal, url, kind, cancel_rx).await;

    // Whatever happened, no browser process may outlive the run.
    sessions.drain().await;

    match outcome? {
        AgentOutcome::Completed(text) => println!("{}", text),
        AgentOutcome::BudgetExhausted => {
            println!("Step budget exhausted before the goal was met; rerun to retry with a fresh budget.")
        }
        AgentOutcome::Cancelled => println!("Run cancelled."),
    }
    Ok(())
}
