use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use tokio::io::AsyncWrite;

use super::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub host_path: String,
    pub container_path: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ContainerConfig {
    pub image: String,
    pub cmd: Vec<String>,
    pub working_dir: String,
    pub tty: bool,
    pub volumes: Vec<VolumeMount>,
    pub environment: Vec<(String, String)>,
}

/// One entry of a container listing.
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub id: String,
    /// Names as reported by the runtime. Docker prefixes them with `/`.
    pub names: Vec<String>,
    pub running: bool,
}

/// Sandbox output as it arrives on an attached stream.
pub type OutputStream = BoxStream<'static, Result<Bytes>>;

/// Write half of an attached stream, connected to the sandbox's stdin.
pub type InputSink = Pin<Box<dyn AsyncWrite + Send>>;

/// Both halves of a duplexed attach to a running container.
pub struct AttachedStreams {
    pub output: OutputStream,
    pub input: InputSink,
}

#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    async fn image_exists(&self, image: &str) -> Result<bool>;

    /// Looks a container up by name or id, running or stopped.
    async fn container_exists(&self, name: &str) -> Result<bool>;

    /// Creates the container and returns its runtime-assigned id.
    async fn create_container(&self, name: &str, config: &ContainerConfig) -> Result<String>;

    async fn start_container(&self, id: &str) -> Result<()>;

    async fn is_running(&self, id: &str) -> Result<bool>;

    async fn stop_container(&self, id: &str, grace: Duration) -> Result<()>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<()>;

    async fn attach(&self, id: &str) -> Result<AttachedStreams>;

    /// Last `tail` lines of combined stdout and stderr.
    async fn logs(&self, id: &str, tail: usize) -> Result<String>;

    /// All containers, running or stopped, whose name contains `name_filter`.
    async fn list_containers(&self, name_filter: &str) -> Result<Vec<ContainerSummary>>;
}
