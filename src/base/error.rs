use thiserror::Error;

/// Errors produced by the traffic-governance core.
///
/// Most event-facing entry points swallow failures (a malformed cookie event
/// is dropped, a failed persistence write is logged); these variants surface
/// only from fallible internals and from the provided collaborator
/// implementations.
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("storage operation failed: {0}")]
    Storage(String),

    #[error("serialization failed")]
    Serialization(#[from] serde_json::Error),

    #[error("io error")]
    Io(#[from] std::io::Error),

    #[error("invalid cookie line: {0}")]
    CookieParse(String),

    #[error("unknown request type: {0}")]
    UnknownRequestType(String),

    #[error("no session for tab {0}")]
    TabNotFound(i64),
}
