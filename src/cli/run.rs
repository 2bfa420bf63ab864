//! `agentbox run` command implementation

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;

use crate::config::Config;
use crate::containers::{DockerRuntime, SandboxRuntime};
use crate::session::Session;

/// Poll interval for `--headless`.
const HEADLESS_POLL: Duration = Duration::from_millis(500);

#[derive(Args)]
pub struct RunArgs {
    /// Session name
    pub name: String,

    /// Project directory mounted at /workspace (defaults to current directory)
    #[arg(short = 'p', long, default_value = ".")]
    pub path: PathBuf,

    /// Program to run in the sandbox (e.g., 'claude', 'aider --yes', 'gemini')
    #[arg(short = 'c', long = "cmd", default_value = "claude")]
    pub command: String,

    /// Image override
    #[arg(long)]
    pub image: Option<String>,

    /// Do not attach; report output changes until Ctrl-C
    #[arg(long)]
    pub headless: bool,
}

pub async fn run(args: RunArgs) -> Result<()> {
    let path = if args.path.as_os_str() == "." {
        std::env::current_dir()?
    } else {
        args.path.canonicalize()?
    };
    if !path.is_dir() {
        bail!("Path is not a directory: {}", path.display());
    }

    let config = Config::load()?;
    let runtime = DockerRuntime::connect()?;
    if !runtime.is_daemon_running().await {
        bail!(crate::containers::RuntimeError::DaemonNotRunning(
            "ping failed".to_string()
        ));
    }

    let mut session = Session::new(&args.name, &args.command, runtime).with_config(config.sandbox);
    if let Some(image) = args.image {
        session = session.with_image(image);
    }

    println!("Starting {} in {}...", session.program(), session.name());
    session
        .start(&path)
        .await
        .with_context(|| format!("Failed to start session '{}'", args.name))?;

    let outcome = if args.headless {
        watch(&session).await
    } else {
        attach_terminal(&session).await
    };

    let closed = session.close().await;
    outcome?;
    closed?;
    println!("✓ Sandbox {} removed", session.name());
    Ok(())
}

async fn attach_terminal<R: SandboxRuntime>(session: &Session<R>) -> Result<()> {
    crossterm::terminal::enable_raw_mode()?;
    let attached = session.attach().await;
    let outcome = match attached {
        Ok(signal) => {
            signal.wait().await;
            Ok(())
        }
        Err(e) => Err(e.into()),
    };
    crossterm::terminal::disable_raw_mode()?;
    outcome
}

async fn watch<R: SandboxRuntime>(session: &Session<R>) -> Result<()> {
    println!("Watching {} (Ctrl-C to stop)", session.name());
    let mut ticker = tokio::time::interval(HEADLESS_POLL);
    let mut waiting = false;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            _ = ticker.tick() => {
                let (updated, has_prompt) = session.has_updated().await;
                if updated {
                    println!("[{}] output changed", session.name());
                }
                if has_prompt != waiting {
                    waiting = has_prompt;
                    if waiting {
                        println!("[{}] agent is waiting for input", session.name());
                    } else {
                        println!("[{}] agent resumed", session.name());
                    }
                }
            }
        }
    }
}
