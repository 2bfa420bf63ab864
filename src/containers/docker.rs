use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerCreateBody, HostConfig, Mount, MountTypeEnum};
use bollard::query_parameters::{
    AttachContainerOptions, CreateContainerOptions, InspectContainerOptions,
    ListContainersOptions, LogsOptions, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions,
};
use bollard::Docker;
use futures_util::{StreamExt, TryStreamExt};

use super::container_interface::{
    AttachedStreams, ContainerConfig, ContainerSummary, SandboxRuntime, VolumeMount,
};
use super::error::{Result, RuntimeError};

/// Sandbox runtime backed by the local Docker Engine API.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects using the usual `DOCKER_HOST` / local socket defaults.
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::DaemonNotRunning(e.to_string()))?;
        Ok(Self { docker })
    }

    pub async fn is_daemon_running(&self) -> bool {
        self.docker.ping().await.is_ok()
    }
}

fn status_code(err: &BollardError) -> Option<u16> {
    match err {
        BollardError::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

/// Maps an API error onto the runtime taxonomy. 404 means the subject is gone,
/// 403 is a socket permission problem, everything else keeps its message.
fn classify(err: BollardError, subject: &str, fallback: fn(String) -> RuntimeError) -> RuntimeError {
    match status_code(&err) {
        Some(404) => RuntimeError::ContainerNotFound(subject.to_string()),
        Some(403) => RuntimeError::PermissionDenied,
        _ => fallback(err.to_string()),
    }
}

fn to_docker_mount(vol: &VolumeMount) -> Mount {
    Mount {
        typ: Some(MountTypeEnum::BIND),
        source: Some(vol.host_path.clone()),
        target: Some(vol.container_path.clone()),
        read_only: Some(vol.read_only),
        ..Default::default()
    }
}

/// Build the create request body from the container config.
/// Separated from `create_container` to enable unit testing.
pub(crate) fn build_create_body(config: &ContainerConfig) -> ContainerCreateBody {
    let env = config
        .environment
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();

    let host_config = HostConfig {
        mounts: Some(config.volumes.iter().map(to_docker_mount).collect()),
        auto_remove: Some(false),
        ..Default::default()
    };

    ContainerCreateBody {
        image: Some(config.image.clone()),
        cmd: if config.cmd.is_empty() {
            None
        } else {
            Some(config.cmd.clone())
        },
        working_dir: Some(config.working_dir.clone()),
        tty: Some(config.tty),
        attach_stdin: Some(true),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        open_stdin: Some(true),
        stdin_once: Some(false),
        env: Some(env),
        host_config: Some(host_config),
        ..Default::default()
    }
}

#[async_trait]
impl SandboxRuntime for DockerRuntime {
    async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) if status_code(&e) == Some(404) => Ok(false),
            Err(e) => Err(classify(e, image, RuntimeError::CommandFailed)),
        }
    }

    async fn container_exists(&self, name: &str) -> Result<bool> {
        match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if status_code(&e) == Some(404) => Ok(false),
            Err(e) => Err(classify(e, name, RuntimeError::InspectFailed)),
        }
    }

    async fn create_container(&self, name: &str, config: &ContainerConfig) -> Result<String> {
        let options = CreateContainerOptions {
            name: Some(name.to_string()),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(Some(options), build_create_body(config))
            .await
            .map_err(|e| match status_code(&e) {
                Some(404) => RuntimeError::ImageNotFound(config.image.clone()),
                _ => classify(e, name, RuntimeError::CreateFailed),
            })?;

        for warning in &response.warnings {
            tracing::warn!("Docker warning while creating {}: {}", name, warning);
        }

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions>)
            .await
            .map_err(|e| classify(e, id, RuntimeError::StartFailed))
    }

    async fn is_running(&self, id: &str) -> Result<bool> {
        let inspect = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| classify(e, id, RuntimeError::InspectFailed))?;

        Ok(inspect
            .state
            .and_then(|state| state.running)
            .unwrap_or(false))
    }

    async fn stop_container(&self, id: &str, grace: Duration) -> Result<()> {
        let options = StopContainerOptions {
            t: Some(i32::try_from(grace.as_secs()).unwrap_or(i32::MAX)),
            ..Default::default()
        };

        match self.docker.stop_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            // 304: already stopped
            Err(e) if status_code(&e) == Some(304) => Ok(()),
            Err(e) => Err(classify(e, id, RuntimeError::StopFailed)),
        }
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };

        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| classify(e, id, RuntimeError::RemoveFailed))
    }

    async fn attach(&self, id: &str) -> Result<AttachedStreams> {
        let options = AttachContainerOptions {
            stream: true,
            stdin: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let attached = self
            .docker
            .attach_container(id, Some(options))
            .await
            .map_err(|e| classify(e, id, RuntimeError::AttachFailed))?;

        let output = attached
            .output
            .map(|item| {
                item.map(LogOutput::into_bytes)
                    .map_err(|e| RuntimeError::AttachFailed(e.to_string()))
            })
            .boxed();

        Ok(AttachedStreams {
            output,
            input: attached.input,
        })
    }

    async fn logs(&self, id: &str, tail: usize) -> Result<String> {
        let options = LogsOptions {
            stdout: true,
            stderr: true,
            tail: tail.to_string(),
            ..Default::default()
        };

        let chunks: Vec<LogOutput> = self
            .docker
            .logs(id, Some(options))
            .try_collect()
            .await
            .map_err(|e| classify(e, id, RuntimeError::LogsFailed))?;

        let mut content = Vec::new();
        for chunk in chunks {
            content.extend_from_slice(&chunk.into_bytes());
        }
        Ok(String::from_utf8_lossy(&content).into_owned())
    }

    async fn list_containers(&self, name_filter: &str) -> Result<Vec<ContainerSummary>> {
        let filters = HashMap::from([("name".to_string(), vec![name_filter.to_string()])]);
        let options = ListContainersOptions {
            all: true,
            filters: Some(filters),
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| classify(e, name_filter, RuntimeError::ListFailed))?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerSummary {
                id: c.id.unwrap_or_default(),
                names: c.names.unwrap_or_default(),
                running: c
                    .state
                    .map(|state| state.to_string() == "running")
                    .unwrap_or(false),
            })
            .collect())
    }
}
