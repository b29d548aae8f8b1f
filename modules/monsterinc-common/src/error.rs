use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonsterIncError {
    #[error("scan cancelled")]
    Cancelled,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No valid targets to scan")]
    NoTargets,

    #[error("No URLs remained after preprocessing")]
    NoUrlsAfterPreprocess,

    #[error("{stage} stage failed: {message}")]
    Stage { stage: String, message: String },

    #[error("Store write failed: {0}")]
    Store(String),

    #[error("Report generation failed: {0}")]
    Report(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl MonsterIncError {
    /// Whether an anyhow error chain bottoms out in a cancellation.
    /// Cancellation must survive `.context(...)` wrapping, so callers classify
    /// through the chain instead of comparing messages.
    pub fn is_cancellation(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<MonsterIncError>(),
            Some(MonsterIncError::Cancelled)
        )
    }

    pub fn stage(stage: &str, message: impl Into<String>) -> Self {
        MonsterIncError::Stage {
            stage: stage.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn cancellation_survives_context_wrapping() {
        let err = anyhow::Error::from(MonsterIncError::Cancelled).context("crawler stage");
        assert!(MonsterIncError::is_cancellation(&err));
    }

    #[test]
    fn other_errors_are_not_cancellation() {
        let err = anyhow::Error::from(MonsterIncError::NoTargets);
        assert!(!MonsterIncError::is_cancellation(&err));

        let err = anyhow::anyhow!("connection refused");
        assert!(!MonsterIncError::is_cancellation(&err));
    }
}
