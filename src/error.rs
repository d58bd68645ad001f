pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("invalid field: {0}")]
    InvalidField(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("invalid data map: {0}")]
    InvalidDataMap(String),

    #[error("request forbidden ({reason}): {request}")]
    Forbidden { reason: String, request: String },

    #[error("request failed after {attempts} attempts with status {status} ({reason}): {request}")]
    RetriesExhausted {
        attempts: u32,
        status: u16,
        reason: String,
        request: String,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the error came from a local I/O or timeout condition that the
    /// transport layer may retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Io(_))
    }
}

/// Abbreviate a request or response payload for inclusion in error messages.
pub fn abbreviate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let head: String = text.chars().take(max).collect();
    format!("{}...", head)
}
