use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Silent token retrieval failed; only an interactive login can recover.
    #[error("Auth error: {0}")]
    Auth(String),

    /// The server answered a task or identity call with a non-success status.
    #[error("{operation} failed with status {status}: {detail}")]
    Transport {
        operation: &'static str,
        status: StatusCode,
        detail: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Rejected before reaching the network.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// HTTP status of a failed call, if the server answered at all.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Transport { status, .. } => Some(*status),
            Self::Http(e) => e.status(),
            _ => None,
        }
    }

    /// True when the server rejected the attached credential.
    #[must_use]
    pub fn is_credential_expired(&self) -> bool {
        self.status() == Some(StatusCode::FORBIDDEN)
    }
}
