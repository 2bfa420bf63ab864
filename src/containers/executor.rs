//! Host process execution for image builds.

use async_trait::async_trait;
use tokio::process::Command;

use super::error::{Result, RuntimeError};

/// Runs a fully composed shell command line on the host.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, command_line: &str) -> Result<()>;
}

/// Executes through `sh -c`, inheriting the terminal so build progress is visible.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostExecutor;

#[async_trait]
impl CommandExecutor for HostExecutor {
    async fn run(&self, command_line: &str) -> Result<()> {
        tracing::debug!("Running host command: {}", command_line);

        let status = Command::new("sh")
            .args(["-c", command_line])
            .status()
            .await?;

        if !status.success() {
            return Err(RuntimeError::CommandFailed(format!(
                "`{}` exited with {}",
                command_line, status
            )));
        }

        Ok(())
    }
}

/// Trimmed stdout of `git config --global --get <key>`, if set.
pub async fn git_config_value(key: &str) -> Option<String> {
    let output = Command::new("git")
        .args(["config", "--global", "--get", key])
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_host_executor_reports_success() {
        assert!(HostExecutor.run("true").await.is_ok());
    }

    #[tokio::test]
    async fn test_host_executor_reports_failure() {
        let err = HostExecutor.run("exit 3").await.unwrap_err();
        assert!(matches!(err, RuntimeError::CommandFailed(_)));
    }
}
