use shared::error::{ApiError, PageErrors};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No structured body: connection failures, timeouts, undecodable bodies.
    Transport,
    /// The backend answered with a `{message}` body.
    Backend,
    /// Rejected before anything was sent.
    Validation,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend error (status {status}): {}", .body.message)]
    Backend { status: u16, body: ApiError },
    #[error("unexpected status {status}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid configuration document: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("validation failed: {0}")]
    Validation(#[from] PageErrors),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Backend { .. } => ErrorKind::Backend,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Http(_)
            | Self::UnexpectedStatus { .. }
            | Self::Decode(_)
            | Self::Yaml(_)
            | Self::Url(_) => ErrorKind::Transport,
        }
    }

    /// The backend's message, when the failure carried one.
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            Self::Backend { body, .. } => Some(body.message.as_str()),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Backend { status, .. } | Self::UnexpectedStatus { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
