use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(
        "Docker daemon is not reachable: {0}\n\
         Start Docker Desktop or run: sudo systemctl start docker"
    )]
    DaemonNotRunning(String),

    #[error(
        "Docker permission denied.\n\
         On Linux, add your user to the docker group:\n\
         sudo usermod -aG docker $USER\n\
         Then log out and back in."
    )]
    PermissionDenied,

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Docker image not found: {0}")]
    ImageNotFound(String),

    #[error("Failed to create container: {0}")]
    CreateFailed(String),

    #[error("Failed to start container: {0}")]
    StartFailed(String),

    #[error("Failed to inspect container: {0}")]
    InspectFailed(String),

    #[error("Failed to stop container: {0}")]
    StopFailed(String),

    #[error("Failed to remove container: {0}")]
    RemoveFailed(String),

    #[error("Failed to attach to container: {0}")]
    AttachFailed(String),

    #[error("Failed to read container logs: {0}")]
    LogsFailed(String),

    #[error("Failed to list containers: {0}")]
    ListFailed(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
