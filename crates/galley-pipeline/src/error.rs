use serde::{Deserialize, Serialize};

/// Failure classes a generation session can surface. Carried inside
/// session snapshots, so it is cloneable and serializable rather than
/// wrapping source errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "class", content = "message", rename_all = "snake_case")]
pub enum PipelineError {
    /// The request was rejected before any network activity.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The stream could not be established or maintained.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The stream ended without a complete result. Internal: the
    /// controller funnels this into recovery instead of surfacing it.
    #[error("generation incomplete: {0}")]
    PartialGeneration(String),

    /// Recovery ran out of attempts without finding a usable result.
    /// The only unrecoverable failure a caller is expected to show.
    #[error("{0}")]
    RecoveryExhausted(String),

    /// Saving an accepted result failed. The session keeps its result
    /// so the save can be retried.
    #[error("could not save: {0}")]
    Persistence(String),
}

impl PipelineError {
    /// Whether the caller can retry the failed step without starting a
    /// whole new generation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::Persistence(_))
    }
}
