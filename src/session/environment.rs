//! Mount and environment preparation for sandbox containers.
//!
//! Each mount is checked on the host independently: anything missing is logged
//! and skipped. Environment assembly only reads host variables.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::agents::Agent;
use crate::config::SandboxConfig;
use crate::containers::VolumeMount;

/// Where the session's work directory appears inside the sandbox.
pub const CONTAINER_WORKSPACE: &str = "/workspace";

/// Home directory of the unprivileged user in the sandbox image.
pub const CONTAINER_HOME: &str = "/home/agent";

/// Terminal type advertised to the agent.
pub const CONTAINER_TERM: &str = "xterm-256color";

/// Host credentials forwarded whenever they are set.
pub(crate) const FORWARDED_CREDENTIALS: &[&str] = &["GITHUB_TOKEN", "GOOGLE_AI_STUDIO_API_KEY"];

/// An optional host path bind-mounted under the sandbox user's home.
struct OptionalMount {
    /// Relative to the host home directory.
    host_rel: &'static str,
    /// Relative to [`CONTAINER_HOME`].
    container_rel: &'static str,
    read_only: bool,
    label: &'static str,
}

const OPTIONAL_MOUNTS: &[OptionalMount] = &[
    OptionalMount {
        host_rel: ".claude",
        container_rel: ".claude",
        read_only: false,
        label: "Claude directory",
    },
    OptionalMount {
        host_rel: ".gemini",
        container_rel: ".gemini",
        read_only: false,
        label: "Gemini directory",
    },
    OptionalMount {
        host_rel: ".gitconfig",
        container_rel: ".gitconfig",
        read_only: true,
        label: "git config",
    },
    OptionalMount {
        host_rel: ".agentbox/mcp-servers.txt",
        container_rel: ".claude/mcp-servers.txt",
        read_only: true,
        label: "MCP servers config",
    },
];

/// The home directory could not be determined. Carries the mounts that do
/// not depend on it so the caller can still proceed.
#[derive(Debug, Error)]
#[error("Could not find home directory; only the workspace will be mounted")]
pub struct HomeDirUnavailable {
    pub mounts: Vec<VolumeMount>,
}

fn workspace_mount(work_dir: &Path) -> VolumeMount {
    VolumeMount {
        host_path: work_dir.to_string_lossy().to_string(),
        container_path: CONTAINER_WORKSPACE.to_string(),
        read_only: false,
    }
}

/// Workspace mount plus every optional mount found under `home`.
pub fn collect_mounts(work_dir: &Path, home: &Path) -> Vec<VolumeMount> {
    let mut mounts = vec![workspace_mount(work_dir)];

    for optional in OPTIONAL_MOUNTS {
        let host_path: PathBuf = home.join(optional.host_rel);
        if !host_path.exists() {
            tracing::info!(
                "{} not found, skipping mount: {}",
                optional.label,
                host_path.display()
            );
            continue;
        }

        tracing::info!("Mounting {}: {}", optional.label, host_path.display());
        mounts.push(VolumeMount {
            host_path: host_path.to_string_lossy().to_string(),
            container_path: format!("{}/{}", CONTAINER_HOME, optional.container_rel),
            read_only: optional.read_only,
        });
    }

    mounts
}

pub fn prepare_mounts(work_dir: &Path) -> Result<Vec<VolumeMount>, HomeDirUnavailable> {
    match dirs::home_dir() {
        Some(home) => Ok(collect_mounts(work_dir, &home)),
        None => Err(HomeDirUnavailable {
            mounts: vec![workspace_mount(work_dir)],
        }),
    }
}

/// Resolve an environment_values entry. If the value starts with `$`, read the
/// named variable from the host environment (use `$$` to escape a literal `$`).
/// Otherwise return the literal value.
pub(crate) fn resolve_env_value(val: &str) -> Option<String> {
    if let Some(rest) = val.strip_prefix("$$") {
        Some(format!("${}", rest))
    } else if let Some(var_name) = val.strip_prefix('$') {
        std::env::var(var_name).ok()
    } else {
        Some(val.to_string())
    }
}

fn push_unique(env: &mut Vec<(String, String)>, key: &str, value: String) {
    if env.iter().any(|(k, _)| k == key) {
        return;
    }
    env.push((key.to_string(), value));
}

/// Key/value pairs for the sandbox environment.
pub fn prepare_environment(agent: &Agent, config: &SandboxConfig) -> Vec<(String, String)> {
    let mut env = vec![("TERM".to_string(), CONTAINER_TERM.to_string())];

    let forwarded = FORWARDED_CREDENTIALS
        .iter()
        .copied()
        .chain(config.forward_env.iter().map(String::as_str));
    for key in forwarded {
        match std::env::var(key) {
            Ok(val) if !val.is_empty() => {
                tracing::info!("Forwarding {} into sandbox", key);
                push_unique(&mut env, key, val);
            }
            _ => {}
        }
    }

    for (key, val) in &config.environment_values {
        if let Some(resolved) = resolve_env_value(val) {
            push_unique(&mut env, key, resolved);
        }
    }

    for (key, val) in agent.container_env() {
        push_unique(&mut env, key, val.to_string());
    }

    env
}
