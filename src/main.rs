//! agentbox - Docker sandbox sessions for interactive AI coding agents

use agentbox::cli::{self, Cli, Commands};
use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;

#[tokio::main]
async fn main() -> Result<()> {
    // Off by default: log lines would interleave with the attached terminal.
    if std::env::var("AGENTBOX_DEBUG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter("agentbox=debug")
            .with_writer(std::io::stderr)
            .init();
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => cli::run::run(args).await,
        Commands::Cleanup(args) => cli::cleanup::run(args).await,
        Commands::Image(args) => cli::image::run(args).await,
        Commands::Completion { shell } => {
            generate(shell, &mut Cli::command(), "agentbox", &mut std::io::stdout());
            Ok(())
        }
    }
}
