use thiserror::Error;

/// The error taxonomy shared by every component of the pipeline.
///
/// Each variant carries the identifying detail a caller needs to react
/// programmatically (the agent name, the missing dependency type, ...)
/// rather than a bare string; `Display` renders the human-readable form.
#[derive(Debug, Error)]
pub enum ForgeError {
    /// Caller-side: malformed specification, unknown module type, missing
    /// required field. Surfaced at submit time; the run is never created.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// MCP refusal: `agent` attempted `action` without the matching
    /// capability.
    #[error("permission denied: agent '{agent}' attempted '{action}'")]
    PermissionDenied {
        /// The agent that attempted the action.
        agent: String,
        /// The action attempted, e.g. `"write:module_code"`.
        action: String,
    },

    /// A required upstream artifact was absent when an agent ran.
    #[error("blocked: missing dependency '{0}'")]
    DependencyMissing(String),

    /// An agent or LM call exceeded its bound.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The LM transport failed after exhausting retries.
    #[error("LM unavailable: {0}")]
    UpstreamUnavailable(String),

    /// An artifact or sidecar write failed.
    #[error("IO failure: {0}")]
    IoFailure(String),

    /// An unexpected internal error, caught at an agent or stage boundary.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for ForgeError {
    fn from(err: std::io::Error) -> Self {
        ForgeError::IoFailure(err.to_string())
    }
}

impl From<serde_json::Error> for ForgeError {
    fn from(err: serde_json::Error) -> Self {
        ForgeError::InvalidInput(err.to_string())
    }
}

/// Convenience alias used at every public API surface in the workspace.
pub type ForgeResult<T> = Result<T, ForgeError>;
