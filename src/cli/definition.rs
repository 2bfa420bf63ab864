//! Top-level command-line definition

use clap::{Parser, Subcommand};

use super::cleanup::CleanupArgs;
use super::image::ImageArgs;
use super::run::RunArgs;

#[derive(Parser)]
#[command(name = "agentbox")]
#[command(about = "Run AI coding agents inside disposable Docker sandboxes")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a sandbox session and attach to it (Ctrl-Q detaches)
    Run(RunArgs),

    /// Stop and remove every sandbox created by agentbox
    Cleanup(CleanupArgs),

    /// Show which image a program would run in
    Image(ImageArgs),

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_options() {
        let cli = Cli::try_parse_from([
            "agentbox", "run", "fix bug", "--cmd", "aider --yes", "--image", "my/img:1",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.name, "fix bug");
                assert_eq!(args.command, "aider --yes");
                assert_eq!(args.image.as_deref(), Some("my/img:1"));
                assert!(!args.headless);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_run_defaults_to_claude() {
        let cli = Cli::try_parse_from(["agentbox", "run", "demo"]).unwrap();
        match cli.command {
            Commands::Run(args) => assert_eq!(args.command, "claude"),
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_run_requires_name() {
        assert!(Cli::try_parse_from(["agentbox", "run"]).is_err());
    }
}
