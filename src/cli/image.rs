//! `agentbox image` command implementation

use anyhow::Result;
use clap::Args;

use crate::config::Config;
use crate::containers::resolve_image;

#[derive(Args)]
pub struct ImageArgs {
    /// Program whose image should be resolved
    #[arg(short = 'c', long = "cmd", default_value = "claude")]
    command: String,

    /// Explicit image override
    #[arg(long)]
    image: Option<String>,
}

pub async fn run(args: ImageArgs) -> Result<()> {
    let config = Config::load()?;
    let image = resolve_image(
        &args.command,
        args.image.as_deref(),
        &config.sandbox.images,
        &config.sandbox.default_image,
    );
    println!("{}", image);
    Ok(())
}
