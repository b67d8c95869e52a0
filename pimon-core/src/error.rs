use thiserror::Error;

/// Tagged failure of an external source call.
///
/// Collectors never propagate these past the scheduler: a failed tick is
/// logged and recorded, and the affected keys simply age toward stale/expired.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("{0}")]
    Unavailable(String),
    #[error("command `{command}` failed: {reason}")]
    Command { command: String, reason: String },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("mail delivery failed: {0}")]
    Mail(String),
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        SourceError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Http(err.to_string())
    }
}
