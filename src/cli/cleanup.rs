//! `agentbox cleanup` command implementation

use anyhow::Result;
use clap::Args;

use crate::containers::{cleanup_all, DockerRuntime};

#[derive(Args)]
pub struct CleanupArgs {
    /// Only print the number of sandboxes removed
    #[arg(short = 'q', long)]
    quiet: bool,
}

pub async fn run(args: CleanupArgs) -> Result<()> {
    let runtime = DockerRuntime::connect()?;
    let removed = cleanup_all(&runtime).await?;

    if args.quiet {
        println!("{}", removed);
    } else if removed == 0 {
        println!("No sandboxes to clean up.");
    } else {
        println!("✓ Removed {} sandbox(es)", removed);
    }
    Ok(())
}
