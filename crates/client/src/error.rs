// crates/client/src/error.rs
use std::path::PathBuf;

use crowdwatch_core::SessionId;
use thiserror::Error;

/// Failures of one-shot backend requests. Reported once, never retried.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Request to {operation} failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("Backend answered {status} to {operation}: {body}")]
    Status {
        operation: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Session not found: {id}")]
    SessionNotFound { id: SessionId },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot upload {path}: {reason}")]
    InvalidUpload { path: PathBuf, reason: &'static str },
}

impl ClientError {
    pub(crate) fn transport(operation: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| Self::Transport { operation, source }
    }
}
