use std::fmt;

/// Closed error taxonomy for the Guardian core.
///
/// Variants map directly to the HTTP-facing taxonomy: `InvalidInput` becomes 400/422,
/// `NotFound` becomes 404/407, `PolicyDeny` becomes 403, `Timeout` becomes 403/504,
/// `Upstream` becomes 502. Conversion to a status code happens in the proxy/UI layers,
/// not here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("policy denied: {0}")]
    PolicyDeny(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0}")]
    Message(String),
}

impl Error {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn policy_deny(msg: impl Into<String>) -> Self {
        Self::PolicyDeny(msg.into())
    }

    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }
}

/// Reason class surfaced to HTTP callers alongside a deny/error outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    PolicyDeny,
    Timeout,
    Upstream,
    Fatal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::NotFound => "not_found",
            ErrorKind::PolicyDeny => "policy_deny",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Upstream => "upstream",
            ErrorKind::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
