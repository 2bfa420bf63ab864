//! Auto-dismissal of first-run confirmation screens.

use std::time::Duration;

use super::{Session, SessionError};
use crate::containers::SandboxRuntime;

/// Pause before each look at the sandbox output.
pub const PROMPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Watch for the agent's trust prompt and accept it once.
///
/// Returns whether the prompt was seen. Capture failures only cost an
/// attempt; a failure to deliver the keys is returned.
pub async fn dismiss_startup_prompts<R: SandboxRuntime>(
    session: &Session<R>,
) -> Result<bool, SessionError> {
    let Some(prompt) = session.agent().trust_prompt() else {
        return Ok(false);
    };

    for attempt in 1..=prompt.attempts {
        tokio::time::sleep(PROMPT_POLL_INTERVAL).await;

        let content = match session.capture_output().await {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!("Prompt check {} failed: {}", attempt, e);
                continue;
            }
        };

        if content.contains(prompt.marker) {
            tracing::info!(
                "Dismissing {} startup prompt in {}",
                session.agent().name(),
                session.name()
            );
            session.send_keys(prompt.keys).await?;
            return Ok(true);
        }
    }

    tracing::debug!(
        "No {} startup prompt after {} checks",
        session.agent().name(),
        prompt.attempts
    );
    Ok(false)
}
