pub mod container_interface;
pub mod docker;
pub mod error;
pub mod executor;
pub mod image;

use std::time::Duration;

pub use container_interface::{
    AttachedStreams, ContainerConfig, ContainerSummary, InputSink, OutputStream, SandboxRuntime,
    VolumeMount,
};
pub use docker::DockerRuntime;
pub use error::{Result, RuntimeError};
pub use executor::{CommandExecutor, HostExecutor};
pub use image::{resolve_image, DEFAULT_IMAGE};

use crate::session::SessionError;

/// Namespace tag carried by every sandbox this tool creates. Fleet cleanup
/// and name collision checks both key on it.
pub const NAME_PREFIX: &str = "agentbox_";

/// Grace period given to a sandbox before it is killed on stop.
pub const STOP_GRACE: Duration = Duration::from_secs(10);

/// Derive the runtime container name for a human session name.
///
/// Whitespace is dropped and dots become underscores, so "a b.c" and "ab_c"
/// map to the same sandbox.
pub fn to_sandbox_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == '.' { '_' } else { c })
        .collect();
    format!("{}{}", NAME_PREFIX, sanitized)
}

fn is_managed(name: &str) -> bool {
    name.trim_start_matches('/').starts_with(NAME_PREFIX)
}

/// Stop and force-remove every sandbox carrying [`NAME_PREFIX`], running or not.
///
/// Stop failures are logged and removal is still attempted; the first removal
/// failure aborts the sweep. Returns how many sandboxes were removed.
pub async fn cleanup_all<R>(runtime: &R) -> std::result::Result<usize, SessionError>
where
    R: SandboxRuntime + ?Sized,
{
    let containers = runtime.list_containers(NAME_PREFIX).await?;
    let mut removed = 0;

    for container in containers {
        let Some(name) = container.names.iter().find(|n| is_managed(n)) else {
            continue;
        };
        let name = name.trim_start_matches('/').to_string();
        tracing::info!("Cleaning up sandbox: {}", name);

        if container.running {
            if let Err(e) = runtime.stop_container(&container.id, STOP_GRACE).await {
                tracing::error!("Failed to stop sandbox {}: {}", name, e);
            }
        }

        runtime
            .remove_container(&container.id, true)
            .await
            .map_err(|source| SessionError::CleanupFailed {
                name: name.clone(),
                source,
            })?;
        removed += 1;
    }

    Ok(removed)
}
