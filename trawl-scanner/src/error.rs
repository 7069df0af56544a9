use thiserror::Error;

/// Reasons an href cannot become a [`crate::Link`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Path escapes the domain root: {0}")]
    InvalidPath(String),

    #[error("Unknown URL scheme: {0}")]
    UnknownScheme(String),

    #[error("Invalid port: {0}")]
    InvalidPort(String),

    #[error("URL has no host: {0}")]
    MissingHost(String),
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid link: {0}")]
    Link(#[from] LinkError),

    #[error("Task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, ScanError>;
