//! Error types surfaced by the planning core.

use thiserror::Error;
use uuid::Uuid;

/// Failures of plan generation and replanning that reach the caller.
#[derive(Debug, Error)]
pub enum PlanningError {
    /// The rule table is unusable. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("field {0} not found")]
    FieldNotFound(Uuid),

    /// Replanning needs an existing plan version.
    #[error("field {0} has no plan yet")]
    NoPlan(Uuid),

    /// A storage write or read failed; nothing was committed.
    #[error(transparent)]
    Persistence(#[from] anyhow::Error),
}

/// Failures of a model or embedding provider.
///
/// These never leave the core: callers log them and continue with a
/// deterministic fallback.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider is not configured")]
    NotConfigured,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("provider returned an empty result")]
    Empty,
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}
