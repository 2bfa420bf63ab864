//! Attach/detach behaviour: pumps, the detach key, warm-up and the
//! abnormal termination warning.

use std::time::Duration;

use agentbox::containers::DEFAULT_IMAGE;
use agentbox::session::{Session, SessionError, TerminalIo, DETACH_KEY};
use agentbox::test_support::{FakeRuntime, RecordingWriter};
use serial_test::serial;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

struct Terminal {
    keyboard: DuplexStream,
    screen: RecordingWriter,
    errors: RecordingWriter,
}

fn terminal() -> (Terminal, TerminalIo) {
    let (keyboard, input) = tokio::io::duplex(256);
    let screen = RecordingWriter::new();
    let errors = RecordingWriter::new();
    let io = TerminalIo::new(input, screen.clone(), errors.clone());
    (
        Terminal {
            keyboard,
            screen,
            errors,
        },
        io,
    )
}

async fn started_session(rt: &FakeRuntime, warmup: Duration) -> Session<FakeRuntime> {
    let home = tempfile::TempDir::new().unwrap();
    std::env::set_var("HOME", home.path());
    let mut session = Session::new("attach", "bash", rt.clone()).with_input_warmup(warmup);
    session.start(home.path()).await.unwrap();
    session
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
#[serial]
async fn test_attach_before_start_is_rejected() {
    let rt = FakeRuntime::new().with_image(DEFAULT_IMAGE);
    let session = Session::new("early", "bash", rt.clone());
    let (_term, io) = terminal();

    let err = session.attach_with(io).await.unwrap_err();

    assert!(matches!(err, SessionError::NotStarted(_)));
    assert_eq!(rt.call_count("attach"), 0);
}

#[tokio::test]
#[serial]
async fn test_second_attach_is_rejected() {
    let rt = FakeRuntime::new().with_image(DEFAULT_IMAGE);
    let session = started_session(&rt, Duration::ZERO).await;
    let (_first, io) = terminal();
    let _signal = session.attach_with(io).await.unwrap();

    let (_second, io) = terminal();
    let err = session.attach_with(io).await.unwrap_err();

    assert!(matches!(err, SessionError::AlreadyAttached(_)));
    assert_eq!(rt.call_count("attach"), 1);
    session.detach().await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_detach_without_attach_is_an_error() {
    let rt = FakeRuntime::new().with_image(DEFAULT_IMAGE);
    let session = started_session(&rt, Duration::ZERO).await;

    assert!(matches!(
        session.detach().await,
        Err(SessionError::NotAttached(_))
    ));
}

#[tokio::test]
#[serial]
async fn test_output_and_input_are_pumped() {
    let rt = FakeRuntime::new().with_image(DEFAULT_IMAGE);
    let session = started_session(&rt, Duration::ZERO).await;
    let (mut term, io) = terminal();
    let _signal = session.attach_with(io).await.unwrap();

    rt.push_output(b"agent> ");
    eventually(|| term.screen.contents() == "agent> ").await;

    term.keyboard.write_all(b"hello\r").await.unwrap();
    eventually(|| rt.forwarded() == b"hello\r".to_vec()).await;

    session.detach().await.unwrap();
    assert!(term.errors.contents().is_empty());
}

#[tokio::test]
#[serial]
async fn test_detach_key_ends_attachment() {
    let rt = FakeRuntime::new().with_image(DEFAULT_IMAGE);
    let session = started_session(&rt, Duration::ZERO).await;
    let (mut term, io) = terminal();
    let signal = session.attach_with(io).await.unwrap();

    term.keyboard.write_all(&[DETACH_KEY]).await.unwrap();
    timeout(WAIT, signal.wait()).await.unwrap();

    assert!(!session.is_attached().await);
    assert!(rt.forwarded().is_empty());
    assert!(term.errors.contents().is_empty());
}

#[tokio::test]
#[serial]
async fn test_warmup_input_is_discarded() {
    let rt = FakeRuntime::new().with_image(DEFAULT_IMAGE);
    let session = started_session(&rt, Duration::from_millis(50)).await;
    let (mut term, io) = terminal();
    let signal = session.attach_with(io).await.unwrap();

    term.keyboard.write_all(&[b'x'; 20]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    term.keyboard.write_all(&[DETACH_KEY]).await.unwrap();

    timeout(WAIT, signal.wait()).await.unwrap();
    assert!(rt.forwarded().is_empty());
    assert!(!session.is_attached().await);
}

#[tokio::test]
#[serial]
async fn test_detach_key_inside_longer_read_is_forwarded() {
    let rt = FakeRuntime::new().with_image(DEFAULT_IMAGE);
    let session = started_session(&rt, Duration::ZERO).await;
    let (mut term, io) = terminal();
    let _signal = session.attach_with(io).await.unwrap();

    term.keyboard.write_all(&[b'a', DETACH_KEY]).await.unwrap();
    eventually(|| rt.forwarded() == vec![b'a', DETACH_KEY]).await;

    assert!(session.is_attached().await);
    session.detach().await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_external_detach_completes_signal_and_resets_monitor() {
    let rt = FakeRuntime::new().with_image(DEFAULT_IMAGE);
    let session = started_session(&rt, Duration::ZERO).await;
    rt.set_logs("steady output");
    assert_eq!(session.has_updated().await, (true, false));
    assert_eq!(session.has_updated().await, (false, false));

    let (term, io) = terminal();
    let signal = session.attach_with(io).await.unwrap();
    session.detach().await.unwrap();

    timeout(WAIT, signal.wait()).await.unwrap();
    assert_eq!(session.has_updated().await, (true, false));
    assert!(term.errors.contents().is_empty());

    // Output after detach never reaches the old terminal.
    rt.push_output(b"late");
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(term.screen.contents().is_empty());
}

#[tokio::test]
#[serial]
async fn test_reattach_after_detach() {
    let rt = FakeRuntime::new().with_image(DEFAULT_IMAGE);
    let session = started_session(&rt, Duration::ZERO).await;

    let (_first, io) = terminal();
    session.attach_with(io).await.unwrap();
    session.detach().await.unwrap();

    let (mut second, io) = terminal();
    session.attach_with(io).await.unwrap();
    second.keyboard.write_all(b"again").await.unwrap();
    eventually(|| rt.forwarded() == b"again".to_vec()).await;
    session.detach().await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_sandbox_exit_warns_operator() {
    let rt = FakeRuntime::new().with_image(DEFAULT_IMAGE);
    let session = started_session(&rt, Duration::ZERO).await;
    let (term, io) = terminal();
    let _signal = session.attach_with(io).await.unwrap();

    rt.push_output(b"bye\n");
    rt.end_output();

    eventually(|| term.errors.contents().contains("Ctrl-Q")).await;
    assert!(term.errors.contents().contains("\x1b[31m"));
    assert_eq!(term.screen.contents(), "bye\n");

    session.detach().await.unwrap();
    assert_eq!(term.errors.contents().matches("Ctrl-Q").count(), 1);
}

#[tokio::test]
#[serial]
async fn test_send_keys_goes_through_attachment() {
    let rt = FakeRuntime::new().with_image(DEFAULT_IMAGE);
    let session = started_session(&rt, Duration::ZERO).await;
    let (_term, io) = terminal();
    session.attach_with(io).await.unwrap();

    session.tap_enter().await.unwrap();

    assert_eq!(rt.forwarded(), b"\r".to_vec());
    assert_eq!(rt.call_count("attach"), 1);
    session.detach().await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_close_detaches_first() {
    let rt = FakeRuntime::new().with_image(DEFAULT_IMAGE);
    let mut session = started_session(&rt, Duration::ZERO).await;
    let (_term, io) = terminal();
    let signal = session.attach_with(io).await.unwrap();

    session.close().await.unwrap();

    timeout(WAIT, signal.wait()).await.unwrap();
    assert!(!session.is_attached().await);
    assert_eq!(rt.container_count(), 0);
}

#[tokio::test]
#[serial]
async fn test_detach_finishes_when_sandbox_stops_reading_input() {
    let rt = FakeRuntime::new().with_image(DEFAULT_IMAGE).stall_input();
    let mut session = started_session(&rt, Duration::ZERO).await;
    let (mut term, io) = terminal();
    let signal = session.attach_with(io).await.unwrap();

    term.keyboard.write_all(b"pasted text").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    timeout(Duration::from_secs(3), session.detach())
        .await
        .expect("detach blocked on a stalled input")
        .unwrap();
    timeout(WAIT, signal.wait()).await.unwrap();
    assert!(!session.is_attached().await);

    timeout(Duration::from_secs(3), session.close())
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
#[serial]
async fn test_old_terminal_is_inert_after_detach() {
    let rt = FakeRuntime::new().with_image(DEFAULT_IMAGE);
    let session = started_session(&rt, Duration::ZERO).await;

    let (mut first, io) = terminal();
    session.attach_with(io).await.unwrap();
    session.detach().await.unwrap();

    // The old pump may already have dropped its end; write errors are expected.
    let _ = first.keyboard.write_all(b"stale").await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(rt.forwarded().is_empty());

    let (mut second, io) = terminal();
    session.attach_with(io).await.unwrap();
    let _ = first.keyboard.write_all(b"stale").await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(rt.forwarded().is_empty());

    second.keyboard.write_all(b"fresh").await.unwrap();
    eventually(|| rt.forwarded() == b"fresh".to_vec()).await;
    session.detach().await.unwrap();
}
