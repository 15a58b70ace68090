//! Errors raised by the payload sender and receiver.

use thiserror::Error;

use crate::{disconnect::DisconnectReason, header::HeaderError};

/// Errors returned to the caller of a send operation.
#[derive(Debug, Error)]
pub enum SendError {
    /// The sender has never been connected.
    #[error("sender is not connected")]
    NotConnected,
    /// The connection went away before every frame was written.
    #[error("connection lost: {0}")]
    Disconnected(DisconnectReason),
    /// A packet header declared more bytes than were supplied.
    #[error("header declares {declared} bytes but only {available} are available")]
    LengthMismatch {
        /// Length written in the header.
        declared: usize,
        /// Bytes supplied with the header.
        available: usize,
    },
    /// A header could not be built for the payload.
    #[error(transparent)]
    Header(#[from] HeaderError),
    /// An envelope could not be serialised.
    #[error("failed to encode envelope")]
    Encode(#[from] serde_json::Error),
}

/// Errors returned when attaching a transport.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ConnectError {
    /// A transport is already attached and connected.
    #[error("Already connected")]
    AlreadyConnected,
    /// The sender was used once and has since disconnected.
    #[error("sender already finished; create a new one to reconnect")]
    Finished,
}
