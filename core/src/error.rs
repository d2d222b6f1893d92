//! Error types surfaced to failure handlers.
//!
//! # Design
//! A non-success status is not an exceptional condition for the dispatcher:
//! once the retry and merge policies are exhausted, the raw response lands
//! in `DispatchError::Rejected` so the caller can inspect it.
//! The remaining variants cover the cases where no usable response exists.

use thiserror::Error;

use crate::http::HttpResponse;

/// The transport could not produce a response at all.
#[derive(Debug, Clone, Error)]
#[error("transport error: {message}")]
pub struct TransportError {
    /// Set when the status line arrived but the body could not be read.
    pub status: Option<u16>,
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

/// Outcome handed to `on_failure`.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The server answered with a status outside the success set, after any
    /// retry or merge policy for that status ran out.
    #[error("HTTP {}: {}", .0.status, .0.body)]
    Rejected(HttpResponse),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The request body could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// A re-fetched representation was not a JSON object, so it cannot be
    /// merged with.
    #[error("unusable representation (HTTP {status}): {reason}")]
    Representation { status: u16, reason: String },
}

impl DispatchError {
    /// The server response behind this failure, if there was one.
    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            DispatchError::Rejected(response) => Some(response),
            _ => None,
        }
    }

    /// Status code associated with the failure, when the server sent one.
    pub fn status(&self) -> Option<u16> {
        match self {
            DispatchError::Rejected(response) => Some(response.status),
            DispatchError::Transport(err) => err.status,
            DispatchError::Representation { status, .. } => Some(*status),
            DispatchError::Encode(_) => None,
        }
    }
}
