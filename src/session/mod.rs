//! Sandbox sessions: lifecycle, status polling and terminal attachment.

pub mod attach;
pub mod environment;
pub mod error;
pub mod monitor;
pub mod prompts;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

pub use attach::{DetachSignal, TerminalIo, DETACH_KEY};
pub use environment::{prepare_environment, prepare_mounts, HomeDirUnavailable};
pub use error::{Rollback, SessionError};
pub use monitor::StatusMonitor;

use crate::agents::{Agent, ENTER};
use crate::config::SandboxConfig;
use crate::containers::image::{build_command_line, find_build_context, HostIdentity};
use crate::containers::{
    resolve_image, to_sandbox_name, AttachedStreams, CommandExecutor, ContainerConfig,
    HostExecutor, RuntimeError, SandboxRuntime,
};
use attach::{AttachmentSlot, SharedMonitor};
use monitor::{contains_marker, CAPTURE_TAIL_LINES};

/// How often readiness is checked after start.
pub const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long a started sandbox has to report itself running.
pub const READY_TIMEOUT: Duration = Duration::from_secs(5);

/// One agent running in one sandbox, from `start` to `close`.
pub struct Session<R: SandboxRuntime> {
    name: String,
    program: String,
    agent: Agent,
    custom_image: Option<String>,
    config: SandboxConfig,
    runtime: R,
    executor: Box<dyn CommandExecutor>,
    input_warmup: Duration,
    sandbox_id: Option<String>,
    /// Set by `close`; a session covers a single sandbox lifetime.
    closed: bool,
    monitor: SharedMonitor,
    attachment: AttachmentSlot,
}

impl<R: SandboxRuntime> Session<R> {
    /// No I/O happens until [`start`](Self::start).
    pub fn new(name: &str, program: &str, runtime: R) -> Self {
        let config = SandboxConfig::default();
        Self {
            name: to_sandbox_name(name),
            program: program.to_string(),
            agent: Agent::resolve(program),
            custom_image: None,
            input_warmup: config.input_warmup(),
            config,
            runtime,
            executor: Box::new(HostExecutor),
            sandbox_id: None,
            closed: false,
            monitor: Arc::new(Mutex::new(StatusMonitor::new())),
            attachment: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.custom_image = Some(image.into());
        self
    }

    pub fn with_config(mut self, config: SandboxConfig) -> Self {
        self.input_warmup = config.input_warmup();
        self.config = config;
        self
    }

    pub fn with_executor(mut self, executor: impl CommandExecutor + 'static) -> Self {
        self.executor = Box::new(executor);
        self
    }

    /// Waiting marker for programs outside the agent registry. Ignored for known agents.
    pub fn with_waiting_marker(mut self, marker: impl Into<String>) -> Self {
        if let Agent::Custom { waiting_marker } = &mut self.agent {
            *waiting_marker = Some(marker.into());
        }
        self
    }

    pub fn with_input_warmup(mut self, warmup: Duration) -> Self {
        self.input_warmup = warmup;
        self
    }

    /// Sanitized sandbox name, including the namespace prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn sandbox_id(&self) -> Option<&str> {
        self.sandbox_id.as_deref()
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn image(&self) -> String {
        resolve_image(
            &self.program,
            self.custom_image.as_deref(),
            &self.config.images,
            &self.config.default_image,
        )
    }

    pub async fn is_attached(&self) -> bool {
        self.attachment.lock().await.is_some()
    }

    /// Whether the runtime knows a sandbox with this session's name.
    pub async fn exists(&self) -> Result<bool, SessionError> {
        Ok(self.runtime.container_exists(&self.name).await?)
    }

    fn require_id(&self) -> Result<&str, SessionError> {
        self.sandbox_id
            .as_deref()
            .ok_or_else(|| SessionError::NotStarted(self.name.clone()))
    }

    /// Create and start the sandbox with `work_dir` mounted at `/workspace`.
    ///
    /// On failure nothing is left behind: the created sandbox is removed and
    /// the returned error records whether that removal worked.
    pub async fn start(&mut self, work_dir: &Path) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed(self.name.clone()));
        }
        if self.exists().await? {
            return Err(SessionError::AlreadyExists(self.name.clone()));
        }

        let image = self.image();
        self.ensure_image(&image).await?;

        let volumes = match prepare_mounts(work_dir) {
            Ok(mounts) => mounts,
            Err(e) => {
                tracing::warn!("Failed to prepare some mounts: {}", e);
                e.mounts
            }
        };

        let config = ContainerConfig {
            image: image.clone(),
            cmd: self.agent.container_command(&self.program),
            working_dir: environment::CONTAINER_WORKSPACE.to_string(),
            tty: true,
            volumes,
            environment: prepare_environment(&self.agent, &self.config),
        };

        tracing::info!("Creating sandbox {} from {}", self.name, image);
        let id = self
            .runtime
            .create_container(&self.name, &config)
            .await
            .map_err(|source| SessionError::StartFailed {
                name: self.name.clone(),
                source,
                rollback: Rollback::clean(),
            })?;
        self.sandbox_id = Some(id.clone());

        let started = self.runtime.start_container(&id).await;
        if let Err(source) = started {
            let removal = self
                .runtime
                .remove_container(&id, true)
                .await
                .map_err(SessionError::from);
            self.sandbox_id = None;
            return Err(SessionError::StartFailed {
                name: self.name.clone(),
                source,
                rollback: Rollback::from_result(removal),
            });
        }

        let ready = self.wait_until_running(&id).await;
        if let Err(last_error) = ready {
            tracing::warn!("Sandbox {} did not become ready, removing it", self.name);
            let rollback = Rollback::from_result(self.close().await);
            return Err(SessionError::StartTimeout {
                name: self.name.clone(),
                last_error,
                rollback,
            });
        }

        self.restore().await;
        tracing::info!("Sandbox {} is running", self.name);

        if let Err(e) = prompts::dismiss_startup_prompts(&*self).await {
            tracing::warn!("Failed to dismiss startup prompt in {}: {}", self.name, e);
        }

        Ok(())
    }

    async fn ensure_image(&self, image: &str) -> Result<(), SessionError> {
        if self.runtime.image_exists(image).await? {
            return Ok(());
        }

        tracing::info!("Image {} not found locally, building it", image);
        let context = self
            .config
            .build_context
            .clone()
            .or_else(|| {
                std::env::current_dir()
                    .ok()
                    .and_then(|dir| find_build_context(&dir))
            })
            .ok_or_else(|| SessionError::ImageBuildFailed {
                image: image.to_string(),
                reason: "no build context: set sandbox.build_context or run from a checkout containing docker/Dockerfile".to_string(),
            })?;

        let identity = HostIdentity::detect().await;
        let command_line = build_command_line(image, &context, &identity);
        self.executor
            .run(&command_line)
            .await
            .map_err(|e| SessionError::ImageBuildFailed {
                image: image.to_string(),
                reason: e.to_string(),
            })
    }

    /// Ok once the runtime reports the sandbox running; otherwise the last
    /// inspection error seen before the deadline.
    async fn wait_until_running(&self, id: &str) -> Result<(), Option<RuntimeError>> {
        let deadline = tokio::time::Instant::now() + READY_TIMEOUT;
        let mut last_error = None;

        loop {
            match self.runtime.is_running(id).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => {
                    tracing::debug!("Readiness check for {} failed: {}", self.name, e);
                    last_error = Some(e);
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(last_error);
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Forget the last observed output so the next poll reports a change.
    pub async fn restore(&self) {
        self.monitor.lock().await.reset();
    }

    /// Detach, stop and remove the sandbox. Safe to call when nothing was started.
    pub async fn close(&mut self) -> Result<(), SessionError> {
        self.closed = true;
        let mut errors = Vec::new();

        match attach::detach(&self.attachment, &self.monitor, &self.name).await {
            Ok(()) | Err(SessionError::NotAttached(_)) => {}
            Err(e) => errors.push(e),
        }

        let Some(id) = self.sandbox_id.take() else {
            return SessionError::from_teardown(errors);
        };

        tracing::info!("Closing sandbox {}", self.name);
        if let Err(e) = self
            .runtime
            .stop_container(&id, self.config.stop_timeout())
            .await
        {
            errors.push(e.into());
        }
        if let Err(e) = self.runtime.remove_container(&id, true).await {
            errors.push(e.into());
        }

        SessionError::from_teardown(errors)
    }

    /// Last lines of combined sandbox output.
    pub async fn capture_output(&self) -> Result<String, SessionError> {
        let id = self.require_id()?;
        self.runtime
            .logs(id, CAPTURE_TAIL_LINES)
            .await
            .map_err(SessionError::CaptureFailed)
    }

    /// `(updated, has_prompt)`: whether output changed since the last poll and
    /// whether the agent is waiting for the operator. Never fails.
    pub async fn has_updated(&self) -> (bool, bool) {
        let content = match self.capture_output().await {
            Ok(content) => content,
            Err(e) => {
                tracing::error!("Error capturing output of {}: {}", self.name, e);
                return (false, false);
            }
        };

        let has_prompt = contains_marker(&content, self.agent.waiting_marker());
        let updated = self.monitor.lock().await.observe(&content);
        (updated, has_prompt)
    }

    /// Attach the process terminal. See [`attach_with`](Self::attach_with).
    pub async fn attach(&self) -> Result<DetachSignal, SessionError> {
        self.attach_with(TerminalIo::stdio()).await
    }

    /// Stream sandbox output to `terminal` and forward its input until the
    /// detach key is pressed or [`detach`](Self::detach) is called.
    pub async fn attach_with(&self, terminal: TerminalIo) -> Result<DetachSignal, SessionError> {
        let id = self.require_id()?;

        let mut slot = self.attachment.lock().await;
        if slot.is_some() {
            return Err(SessionError::AlreadyAttached(self.name.clone()));
        }

        let streams = self.runtime.attach(id).await?;
        tracing::info!("Attached to sandbox {}", self.name);

        Ok(attach::install(
            &mut slot,
            self.attachment.clone(),
            self.monitor.clone(),
            self.name.clone(),
            streams,
            terminal,
            self.input_warmup,
        ))
    }

    pub async fn detach(&self) -> Result<(), SessionError> {
        attach::detach(&self.attachment, &self.monitor, &self.name).await
    }

    /// Type `keys` into the sandbox, through the current attachment if any.
    pub async fn send_keys(&self, keys: &[u8]) -> Result<(), SessionError> {
        let sink = self.attachment.lock().await.as_ref().map(|a| a.input());
        if let Some(sink) = sink {
            return attach::write_input(&sink, keys)
                .await
                .map_err(|e| RuntimeError::from(e).into());
        }

        let id = self.require_id()?;
        let AttachedStreams { output, mut input } = self.runtime.attach(id).await?;
        let written = async {
            input.write_all(keys).await?;
            input.flush().await?;
            input.shutdown().await
        }
        .await;
        drop(output);
        written.map_err(|e| RuntimeError::from(e).into())
    }

    pub async fn tap_enter(&self) -> Result<(), SessionError> {
        self.send_keys(&[ENTER]).await
    }
}
