use std::fmt;
use std::time::Duration;

/// Why an inbound frame or status body could not be turned into a typed value.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("frame has no type")]
    MissingType,
    #[error("unknown frame type {0:?}")]
    UnknownType(String),
    #[error("unknown task status {0:?}")]
    UnknownStatus(String),
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid push url: {0}")]
    InvalidUrl(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
    #[error("socket error: {0}")]
    Socket(String),
    #[error("connection is not open")]
    Closed,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: ApiFailureKind,
    pub message: String,
}

impl ApiError {
    pub(crate) fn new(kind: ApiFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiFailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    Network,
    Decode,
    /// The server answered but refused the request (e.g. `success: false`).
    Rejected,
}

impl fmt::Display for ApiFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiFailureKind::InvalidUrl => write!(f, "invalid url"),
            ApiFailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            ApiFailureKind::Timeout => write!(f, "timeout"),
            ApiFailureKind::Network => write!(f, "network error"),
            ApiFailureKind::Decode => write!(f, "undecodable response"),
            ApiFailureKind::Rejected => write!(f, "rejected"),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PollError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("task did not reach a terminal status within {0:?}")]
    CeilingExceeded(Duration),
}
