//! Change detection over captured sandbox output.

use sha2::{Digest, Sha256};

/// Lines of combined stdout/stderr inspected on each poll.
pub const CAPTURE_TAIL_LINES: usize = 100;

/// Remembers the digest of the last snapshot it was shown.
#[derive(Debug, Default, Clone)]
pub struct StatusMonitor {
    prev_output_hash: Option<[u8; 32]>,
}

impl StatusMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `content` and report whether it differs from the previous snapshot.
    /// The first snapshot after construction or [`reset`](Self::reset) always counts as a change.
    pub fn observe(&mut self, content: &str) -> bool {
        let digest: [u8; 32] = Sha256::digest(content.as_bytes()).into();
        if self.prev_output_hash == Some(digest) {
            return false;
        }
        self.prev_output_hash = Some(digest);
        true
    }

    pub fn reset(&mut self) {
        self.prev_output_hash = None;
    }
}

/// Whether `content` shows the agent waiting on the operator.
pub fn contains_marker(content: &str, marker: Option<&str>) -> bool {
    match marker {
        Some(m) if !m.is_empty() => content.contains(m),
        _ => false,
    }
}
