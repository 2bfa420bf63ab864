use std::fmt;

use thiserror::Error;

use crate::containers::RuntimeError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Sandbox already exists: {0}")]
    AlreadyExists(String),

    #[error("Failed to build sandbox image {image}: {reason}")]
    ImageBuildFailed { image: String, reason: String },

    #[error("Failed to start sandbox {name}: {source}{rollback}")]
    StartFailed {
        name: String,
        source: RuntimeError,
        rollback: Rollback,
    },

    #[error("Timed out waiting for sandbox {name} to start{}{rollback}", cause_suffix(.last_error))]
    StartTimeout {
        name: String,
        last_error: Option<RuntimeError>,
        rollback: Rollback,
    },

    #[error("Sandbox has not been started: {0}")]
    NotStarted(String),

    #[error("Session has been closed: {0}")]
    Closed(String),

    #[error("Already attached to sandbox: {0}")]
    AlreadyAttached(String),

    #[error("Not attached to sandbox: {0}")]
    NotAttached(String),

    #[error("Failed to capture sandbox output: {0}")]
    CaptureFailed(#[source] RuntimeError),

    #[error("Failed to remove sandbox {name}: {source}")]
    CleanupFailed { name: String, source: RuntimeError },

    #[error("multiple errors occurred during cleanup:{}", TeardownList(.0))]
    Teardown(Vec<SessionError>),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl SessionError {
    /// Collapse teardown failures: none is success, one is returned as is.
    pub fn from_teardown(mut errors: Vec<SessionError>) -> Result<(), SessionError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(SessionError::Teardown(errors)),
        }
    }

    /// Individual causes, flattened for a composite teardown error.
    pub fn causes(&self) -> Vec<&SessionError> {
        match self {
            SessionError::Teardown(errors) => errors.iter().collect(),
            other => vec![other],
        }
    }
}

/// Outcome of undoing partial work after a failed start.
#[derive(Debug, Default)]
pub struct Rollback(Option<Box<SessionError>>);

impl Rollback {
    pub fn clean() -> Self {
        Self(None)
    }

    pub fn from_result(result: Result<(), SessionError>) -> Self {
        Self(result.err().map(Box::new))
    }

    pub fn error(&self) -> Option<&SessionError> {
        self.0.as_deref()
    }
}

impl fmt::Display for Rollback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(err) => write!(f, " (cleanup error: {})", err),
            None => Ok(()),
        }
    }
}

struct TeardownList<'a>(&'a [SessionError]);

impl fmt::Display for TeardownList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for err in self.0 {
            write!(f, "\n  - {}", err)?;
        }
        Ok(())
    }
}

fn cause_suffix(last_error: &Option<RuntimeError>) -> String {
    match last_error {
        Some(err) => format!(": {}", err),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_teardown_empty_is_ok() {
        assert!(SessionError::from_teardown(Vec::new()).is_ok());
    }

    #[test]
    fn test_from_teardown_single_error_is_unwrapped() {
        let err = SessionError::from_teardown(vec![SessionError::Runtime(
            RuntimeError::StopFailed("boom".to_string()),
        )])
        .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Runtime(RuntimeError::StopFailed(_))
        ));
    }

    #[test]
    fn test_from_teardown_multiple_errors_are_listed() {
        let err = SessionError::from_teardown(vec![
            SessionError::Runtime(RuntimeError::StopFailed("stop".to_string())),
            SessionError::Runtime(RuntimeError::RemoveFailed("remove".to_string())),
        ])
        .unwrap_err();

        assert_eq!(err.causes().len(), 2);
        let msg = err.to_string();
        assert!(msg.starts_with("multiple errors occurred during cleanup:"));
        assert!(msg.contains("\n  - Failed to stop container: stop"));
        assert!(msg.contains("\n  - Failed to remove container: remove"));
    }

    #[test]
    fn test_start_failed_mentions_rollback_error() {
        let err = SessionError::StartFailed {
            name: "agentbox_demo".to_string(),
            source: RuntimeError::StartFailed("port in use".to_string()),
            rollback: Rollback::from_result(Err(SessionError::Runtime(
                RuntimeError::RemoveFailed("busy".to_string()),
            ))),
        };
        let msg = err.to_string();
        assert!(msg.contains("port in use"));
        assert!(msg.contains("(cleanup error: Failed to remove container: busy)"));
    }

    #[test]
    fn test_start_timeout_without_details() {
        let err = SessionError::StartTimeout {
            name: "agentbox_demo".to_string(),
            last_error: None,
            rollback: Rollback::clean(),
        };
        assert_eq!(
            err.to_string(),
            "Timed out waiting for sandbox agentbox_demo to start"
        );
    }
}
