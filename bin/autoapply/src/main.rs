mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "autoapply")]
#[command(about = "Agent-driven browser automation for job-application workflows", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and workspace
    Onboard {
        /// Force overwrite existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Show configuration and environment status
    Status,

    /// Drive the agent against a goal and target URL
    Run {
        /// Goal description (e.g. "extract the job posting")
        #[arg(short, long)]
        goal: String,

        /// Target URL
        #[arg(short, long)]
        url: String,

        /// Task kind: extract or fill-form (picks the step budget)
        #[arg(short, long, default_value = "extract")]
        task: String,
    },

    /// Start the gateway (long-running daemon)
    Serve {
        /// Port to listen on (overrides config gateway.port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides config gateway.host)
        #[arg(long)]
        host: Option<String>,
    },

    /// List registered tools
    Tools,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    match cli.command {
        Commands::Onboard { force } => commands::onboard::run(force),
        Commands::Status => commands::status::run(),
        Commands::Run { goal, url, task } => commands::run::run(&goal, &url, &task).await,
        Commands::Serve { port, host } => commands::serve::run(host, port).await,
        Commands::Tools => commands::tools::run(),
    }
}
