//! Terminal attachment: the output pump, the input pump and detach.
//!
//! An attachment owns the write half of the sandbox stream, a cancellation
//! token shared by both pumps, the output pump's join handle and the sender
//! that completes the caller's [`DetachSignal`]. Detach is the only path that
//! clears it, whether requested by the caller or by the detach key.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::SessionError;
use super::monitor::StatusMonitor;
use crate::containers::{AttachedStreams, InputSink, OutputStream};

/// Ctrl-Q.
pub const DETACH_KEY: u8 = 17;

/// Input is read in chunks of at most this many bytes. A detach key press
/// arrives as a read of exactly one byte.
pub const INPUT_CHUNK: usize = 32;

/// Upper bound on closing the sandbox input during detach.
pub const INPUT_CLOSE_GRACE: Duration = Duration::from_secs(1);

pub(crate) const ABNORMAL_EXIT_WARNING: &str = "\n\x1b[31mError: Sandbox terminated without detaching. Use Ctrl-Q to properly detach from sandboxes.\x1b[0m\n";

type Reader = Pin<Box<dyn AsyncRead + Send>>;
type Writer = Pin<Box<dyn AsyncWrite + Send>>;

/// The operator's side of an attachment.
pub struct TerminalIo {
    pub input: Reader,
    pub output: Writer,
    /// Receives the abnormal termination warning.
    pub errors: Writer,
}

impl TerminalIo {
    pub fn new(
        input: impl AsyncRead + Send + 'static,
        output: impl AsyncWrite + Send + 'static,
        errors: impl AsyncWrite + Send + 'static,
    ) -> Self {
        Self {
            input: Box::pin(input),
            output: Box::pin(output),
            errors: Box::pin(errors),
        }
    }

    /// The process's own stdin, stdout and stderr.
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout(), tokio::io::stderr())
    }
}

/// Completes once detach has fully finished.
#[derive(Debug)]
pub struct DetachSignal(oneshot::Receiver<()>);

impl DetachSignal {
    /// Wait for detach. Also returns if the attachment is dropped without one.
    pub async fn wait(self) {
        let _ = self.0.await;
    }
}

pub(crate) struct Attachment {
    input: SharedSink,
    cancel: CancellationToken,
    output_pump: JoinHandle<()>,
    done: oneshot::Sender<()>,
}

/// Write half of the sandbox stream. Kept apart from the slot so a write the
/// sandbox never drains cannot block detach.
pub(crate) type SharedSink = Arc<Mutex<InputSink>>;
pub(crate) type AttachmentSlot = Arc<Mutex<Option<Attachment>>>;
pub(crate) type SharedMonitor = Arc<Mutex<StatusMonitor>>;

impl Attachment {
    pub(crate) fn input(&self) -> SharedSink {
        self.input.clone()
    }
}

pub(crate) async fn write_input(sink: &SharedSink, bytes: &[u8]) -> std::io::Result<()> {
    let mut sink = sink.lock().await;
    sink.write_all(bytes).await?;
    sink.flush().await
}

/// Wire `streams` to `terminal` and store the attachment in `slot_guard`,
/// which must be the empty, locked contents of `slot`.
pub(crate) fn install(
    slot_guard: &mut Option<Attachment>,
    slot: AttachmentSlot,
    monitor: SharedMonitor,
    name: String,
    streams: AttachedStreams,
    terminal: TerminalIo,
    warmup: Duration,
) -> DetachSignal {
    let AttachedStreams { output, input } = streams;
    let TerminalIo {
        input: term_in,
        output: term_out,
        errors: term_err,
    } = terminal;

    let cancel = CancellationToken::new();
    let (done, signal) = oneshot::channel();

    let sink: SharedSink = Arc::new(Mutex::new(input));

    let output_pump = tokio::spawn(output_pump(output, term_out, term_err, cancel.clone()));

    *slot_guard = Some(Attachment {
        input: sink.clone(),
        cancel: cancel.clone(),
        output_pump,
        done,
    });

    let pump = InputPump {
        slot,
        monitor,
        sink,
        name,
        cancel,
        warmup,
    };
    tokio::spawn(pump.run(term_in));

    DetachSignal(signal)
}

/// Tear the attachment down: stop both pumps, close the write half, join the
/// output pump, reset the monitor and finally complete the detach signal.
pub(crate) async fn detach(
    slot: &AttachmentSlot,
    monitor: &SharedMonitor,
    name: &str,
) -> Result<(), SessionError> {
    let attachment = slot
        .lock()
        .await
        .take()
        .ok_or_else(|| SessionError::NotAttached(name.to_string()))?;

    let Attachment {
        input,
        cancel,
        output_pump,
        done,
    } = attachment;

    // Cancelling first releases the sink if a forward is stuck on it.
    cancel.cancel();

    let closed = tokio::time::timeout(INPUT_CLOSE_GRACE, async {
        input.lock().await.shutdown().await
    })
    .await;
    match closed {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("Failed to close sandbox input for {}: {}", name, e),
        Err(_) => tracing::warn!("Timed out closing sandbox input for {}", name),
    }
    drop(input);

    if let Err(e) = output_pump.await {
        tracing::warn!("Output pump for {} ended abnormally: {}", name, e);
    }

    monitor.lock().await.reset();

    let _ = done.send(());
    tracing::info!("Detached from sandbox {}", name);
    Ok(())
}

async fn output_pump(
    mut output: OutputStream,
    mut terminal: Writer,
    mut errors: Writer,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            chunk = output.next() => match chunk {
                Some(Ok(bytes)) => {
                    if let Err(e) = terminal.write_all(&bytes).await {
                        tracing::debug!("Terminal write failed: {}", e);
                        continue;
                    }
                    let _ = terminal.flush().await;
                }
                Some(Err(e)) => {
                    tracing::debug!("Sandbox output stream failed: {}", e);
                    break;
                }
                None => break,
            },
        }
    }

    if cancel.is_cancelled() {
        return;
    }

    tracing::warn!("Sandbox output closed while still attached");
    let _ = errors.write_all(ABNORMAL_EXIT_WARNING.as_bytes()).await;
    let _ = errors.flush().await;
}

struct InputPump {
    slot: AttachmentSlot,
    monitor: SharedMonitor,
    sink: SharedSink,
    name: String,
    cancel: CancellationToken,
    warmup: Duration,
}

impl InputPump {
    async fn run(self, mut input: Reader) {
        let started = Instant::now();
        let mut buf = [0u8; INPUT_CHUNK];

        loop {
            let n = tokio::select! {
                _ = self.cancel.cancelled() => return,
                read = input.read(&mut buf) => match read {
                    Ok(0) => {
                        tracing::debug!("Terminal input closed");
                        return;
                    }
                    Ok(n) => n,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::debug!("Terminal read failed: {}", e);
                        return;
                    }
                },
            };

            // Terminals answer queries with escape sequences right after attach.
            if started.elapsed() < self.warmup {
                tracing::debug!("Discarding {} bytes read during warm-up", n);
                continue;
            }

            if n == 1 && buf[0] == DETACH_KEY {
                if let Err(e) = detach(&self.slot, &self.monitor, &self.name).await {
                    tracing::debug!("Detach key ignored: {}", e);
                }
                return;
            }

            let forwarded = tokio::select! {
                _ = self.cancel.cancelled() => return,
                result = write_input(&self.sink, &buf[..n]) => result,
            };
            if let Err(e) = forwarded {
                tracing::warn!("Failed to forward input to {}: {}", self.name, e);
            }
        }
    }
}
