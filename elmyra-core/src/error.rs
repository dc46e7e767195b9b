//! Error taxonomy shared by the store, the dispatcher and the HTTP layer.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Already exists: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Import failed: {0}")]
    ImportFailed(String),

    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    #[error("Missing form field: {0}")]
    MissingField(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// HTTP status code this error is reported with.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound(_) | Error::UnsupportedFormat(_) => 404,
            Error::JobFailed(_)
            | Error::ImportFailed(_)
            | Error::InvalidName(_)
            | Error::MissingField(_) => 400,
            Error::Conflict(_) => 409,
            Error::Config(_) | Error::Io(_) | Error::Json(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::NotFound("x".into()).status_code(), 404);
        assert_eq!(Error::UnsupportedFormat("foo".into()).status_code(), 404);
        assert_eq!(Error::JobFailed("x".into()).status_code(), 400);
        assert_eq!(Error::ImportFailed("x".into()).status_code(), 400);
        assert_eq!(Error::Conflict("x".into()).status_code(), 409);
    }
}
