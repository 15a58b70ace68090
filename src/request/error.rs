//! Errors resolving a pending request.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::{disconnect::DisconnectReason, payload::SendError};

/// Why a request did not produce a response.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The caller cancelled the request.
    #[error("request {id} was cancelled")]
    Cancelled {
        /// Correlation id.
        id: Uuid,
    },
    /// No response arrived in time.
    #[error("request {id} timed out after {timeout:?}")]
    TimedOut {
        /// Correlation id.
        id: Uuid,
        /// Configured limit.
        timeout: Duration,
    },
    /// The connection went away first.
    #[error("connection lost: {0}")]
    Disconnected(DisconnectReason),
    /// The request could not be written.
    #[error(transparent)]
    Send(#[from] SendError),
    /// Another request is already registered under this id.
    #[error("request {id} is already pending")]
    DuplicateId {
        /// Correlation id.
        id: Uuid,
    },
    /// The response stream could not be decoded.
    #[error("invalid response to request {id}: {reason}")]
    InvalidResponse {
        /// Correlation id.
        id: Uuid,
        /// Decoder message.
        reason: String,
    },
    /// The request envelope could not be encoded.
    #[error("failed to encode request envelope")]
    Encode(#[from] serde_json::Error),
}
