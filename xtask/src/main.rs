//! xtask - Development tasks for agentbox

use clap::{Parser, Subcommand};
use std::fs;
use std::path::Path;
use std::process::ExitCode;

const REFERENCE_PATH: &str = "docs/cli/reference.md";

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Development tasks for agentbox")]
struct Xtask {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the CLI reference generated from the clap definitions
    GenDocs {
        /// Fail instead of writing when the committed reference is stale
        #[arg(long)]
        check: bool,
    },
}

fn main() -> ExitCode {
    let args = Xtask::parse();
    let result = match args.command {
        Commands::GenDocs { check: false } => write_reference(),
        Commands::GenDocs { check: true } => check_reference(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{}", msg);
            ExitCode::FAILURE
        }
    }
}

fn render_reference() -> String {
    clap_markdown::help_markdown::<agentbox::cli::Cli>()
}

fn write_reference() -> Result<(), String> {
    let path = Path::new(REFERENCE_PATH);
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| format!("Failed to create {}: {}", dir.display(), e))?;
    }
    fs::write(path, render_reference())
        .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;

    println!("Generated CLI documentation at {}", path.display());
    Ok(())
}

fn check_reference() -> Result<(), String> {
    let committed = fs::read_to_string(REFERENCE_PATH).unwrap_or_default();
    if committed == render_reference() {
        println!("{} is up to date", REFERENCE_PATH);
        Ok(())
    } else {
        Err(format!(
            "{} is stale; run `cargo xtask gen-docs`",
            REFERENCE_PATH
        ))
    }
}
