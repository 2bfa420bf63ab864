//! In-memory stand-ins for the sandbox runtime, the host executor and the
//! operator's terminal.

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;

use crate::containers::{
    AttachedStreams, CommandExecutor, ContainerConfig, ContainerSummary, Result, RuntimeError,
    SandboxRuntime,
};

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub name: String,
    pub running: bool,
    pub config: ContainerConfig,
}

#[derive(Default)]
struct FakeState {
    images: HashSet<String>,
    containers: BTreeMap<String, FakeContainer>,
    next_id: u64,
    calls: Vec<String>,
    logs: String,
    forwarded: Vec<u8>,
    output_tx: Option<mpsc::UnboundedSender<Bytes>>,
    fail_create: bool,
    fail_start: bool,
    stall_input: bool,
    never_running: bool,
    fail_stop: bool,
    fail_remove: bool,
}

/// Records every call; containers live in a map keyed by id.
#[derive(Clone, Default)]
pub struct FakeRuntime {
    state: Arc<Mutex<FakeState>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record(&self, call: String) {
        self.state().calls.push(call);
    }

    pub fn with_image(self, image: &str) -> Self {
        self.state().images.insert(image.to_string());
        self
    }

    pub fn fail_create(self) -> Self {
        self.state().fail_create = true;
        self
    }

    /// Attached inputs accept nothing, like a frozen sandbox that stopped
    /// reading stdin. Writes and shutdowns stay pending forever.
    pub fn stall_input(self) -> Self {
        self.state().stall_input = true;
        self
    }

    pub fn fail_start(self) -> Self {
        self.state().fail_start = true;
        self
    }

    pub fn never_running(self) -> Self {
        self.state().never_running = true;
        self
    }

    pub fn fail_stop(self) -> Self {
        self.state().fail_stop = true;
        self
    }

    pub fn fail_remove(self) -> Self {
        self.state().fail_remove = true;
        self
    }

    /// Add a container that was not created through the runtime.
    pub fn insert_container(&self, name: &str, running: bool) -> String {
        let mut state = self.state();
        state.next_id += 1;
        let id = format!("fake{}", state.next_id);
        state.containers.insert(
            id.clone(),
            FakeContainer {
                name: name.to_string(),
                running,
                config: ContainerConfig::default(),
            },
        );
        id
    }

    pub fn set_logs(&self, logs: &str) {
        self.state().logs = logs.to_string();
    }

    /// Deliver bytes on the most recent attach's output stream.
    pub fn push_output(&self, bytes: &[u8]) {
        if let Some(tx) = &self.state().output_tx {
            let _ = tx.send(Bytes::copy_from_slice(bytes));
        }
    }

    /// Close the most recent attach's output stream, as if the sandbox exited.
    pub fn end_output(&self) {
        self.state().output_tx = None;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.split_whitespace().next() == Some(method))
            .count()
    }

    /// Everything written to any attached input so far.
    pub fn forwarded(&self) -> Vec<u8> {
        self.state().forwarded.clone()
    }

    pub fn container(&self, id: &str) -> Option<FakeContainer> {
        self.state().containers.get(id).cloned()
    }

    pub fn container_count(&self) -> usize {
        self.state().containers.len()
    }
}

#[async_trait]
impl SandboxRuntime for FakeRuntime {
    async fn image_exists(&self, image: &str) -> Result<bool> {
        self.record(format!("image_exists {}", image));
        Ok(self.state().images.contains(image))
    }

    async fn container_exists(&self, name: &str) -> Result<bool> {
        self.record(format!("container_exists {}", name));
        let state = self.state();
        Ok(state.containers.contains_key(name)
            || state.containers.values().any(|c| c.name == name))
    }

    async fn create_container(&self, name: &str, config: &ContainerConfig) -> Result<String> {
        self.record(format!("create {}", name));
        let mut state = self.state();
        if state.fail_create {
            return Err(RuntimeError::CreateFailed("injected create failure".to_string()));
        }
        if state.containers.values().any(|c| c.name == name) {
            return Err(RuntimeError::CreateFailed(format!(
                "Conflict. The container name \"/{}\" is already in use",
                name
            )));
        }
        state.next_id += 1;
        let id = format!("fake{}", state.next_id);
        state.containers.insert(
            id.clone(),
            FakeContainer {
                name: name.to_string(),
                running: false,
                config: config.clone(),
            },
        );
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.record(format!("start {}", id));
        let mut state = self.state();
        if state.fail_start {
            return Err(RuntimeError::StartFailed("injected start failure".to_string()));
        }
        let never_running = state.never_running;
        let container = state
            .containers
            .get_mut(id)
            .ok_or_else(|| RuntimeError::ContainerNotFound(id.to_string()))?;
        container.running = !never_running;
        Ok(())
    }

    async fn is_running(&self, id: &str) -> Result<bool> {
        self.record(format!("is_running {}", id));
        let state = self.state();
        let container = state
            .containers
            .get(id)
            .ok_or_else(|| RuntimeError::ContainerNotFound(id.to_string()))?;
        Ok(container.running)
    }

    async fn stop_container(&self, id: &str, grace: Duration) -> Result<()> {
        self.record(format!("stop {} {}", id, grace.as_secs()));
        let mut state = self.state();
        if state.fail_stop {
            return Err(RuntimeError::StopFailed("injected stop failure".to_string()));
        }
        if let Some(container) = state.containers.get_mut(id) {
            container.running = false;
        }
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        self.record(format!("remove {} {}", id, force));
        let mut state = self.state();
        if state.fail_remove {
            return Err(RuntimeError::RemoveFailed(
                "injected remove failure".to_string(),
            ));
        }
        state
            .containers
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RuntimeError::ContainerNotFound(id.to_string()))
    }

    async fn attach(&self, id: &str) -> Result<AttachedStreams> {
        self.record(format!("attach {}", id));
        let (tx, rx) = mpsc::unbounded_channel::<Bytes>();
        {
            let mut state = self.state();
            if !state.containers.contains_key(id) {
                return Err(RuntimeError::ContainerNotFound(id.to_string()));
            }
            state.output_tx = Some(tx);
        }

        let output = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|bytes| (Ok(bytes), rx))
        })
        .boxed();

        Ok(AttachedStreams {
            output,
            input: Box::pin(FakeInput {
                state: self.state.clone(),
            }),
        })
    }

    async fn logs(&self, id: &str, tail: usize) -> Result<String> {
        self.record(format!("logs {} {}", id, tail));
        let state = self.state();
        if !state.containers.contains_key(id) {
            return Err(RuntimeError::ContainerNotFound(id.to_string()));
        }
        Ok(state.logs.clone())
    }

    async fn list_containers(&self, name_filter: &str) -> Result<Vec<ContainerSummary>> {
        self.record(format!("list {}", name_filter));
        Ok(self
            .state()
            .containers
            .iter()
            .filter(|(_, c)| c.name.contains(name_filter))
            .map(|(id, c)| ContainerSummary {
                id: id.clone(),
                names: vec![format!("/{}", c.name)],
                running: c.running,
            })
            .collect())
    }
}

struct FakeInput {
    state: Arc<Mutex<FakeState>>,
}

impl FakeInput {
    fn state(&self) -> MutexGuard<'_, FakeState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl AsyncWrite for FakeInput {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut state = self.state();
        if state.stall_input {
            return Poll::Pending;
        }
        state.forwarded.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.state().stall_input {
            return Poll::Pending;
        }
        Poll::Ready(Ok(()))
    }
}

/// Records image build command lines instead of running them.
#[derive(Clone, Default)]
pub struct FakeExecutor {
    commands: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn commands(&self) -> Vec<String> {
        match self.commands.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl CommandExecutor for FakeExecutor {
    async fn run(&self, command_line: &str) -> Result<()> {
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(command_line.to_string());
        }
        if self.fail {
            return Err(RuntimeError::CommandFailed(format!(
                "`{}` exited with exit status: 1",
                command_line
            )));
        }
        Ok(())
    }
}

/// A terminal writer whose contents can be read back.
#[derive(Clone, Default)]
pub struct RecordingWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl RecordingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        match self.buf.lock() {
            Ok(guard) => String::from_utf8_lossy(&guard).to_string(),
            Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner()).to_string(),
        }
    }
}

impl AsyncWrite for RecordingWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if let Ok(mut guard) = self.buf.lock() {
            guard.extend_from_slice(buf);
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
