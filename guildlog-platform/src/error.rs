//! Errors returned by platform calls.

/// Errors that can occur while talking to the platform.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// The bot lacks the permission needed for this call (HTTP 403).
    #[error("missing permission for {0}")]
    PermissionDenied(String),

    /// The requested object does not exist (HTTP 404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other non-success status.
    #[error("platform returned {status} for {route}: {body}")]
    Status {
        route: String,
        status: u16,
        body: String,
    },

    /// The request never completed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body did not have the expected shape.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl PlatformError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}
