//! Canonical error and result types for the crate.
//!
//! Each layer raises its own error type; [`StreamwireError`] gathers them for
//! applications that want a single error surface.

use thiserror::Error;

use crate::{
    disconnect::DisconnectReason,
    frame::FrameError,
    header::HeaderError,
    message::ReadError,
    payload::{ConnectError, SendError},
    request::RequestError,
    stream::StreamError,
};

/// Top-level error type exposed by `streamwire`.
#[derive(Debug, Error)]
pub enum StreamwireError {
    /// A header failed validation.
    #[error(transparent)]
    Header(#[from] HeaderError),
    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// A payload could not be queued or written.
    #[error(transparent)]
    Send(#[from] SendError),
    /// A transport could not be attached.
    #[error(transparent)]
    Connect(#[from] ConnectError),
    /// A request did not produce a response.
    #[error(transparent)]
    Request(#[from] RequestError),
    /// A frame could not be routed to its stream.
    #[error(transparent)]
    Stream(#[from] StreamError),
    /// An attachment could not be read.
    #[error(transparent)]
    Read(#[from] ReadError),
    /// The connection went away.
    #[error("disconnected: {0}")]
    Disconnected(#[from] DisconnectReason),
    /// An error in the underlying transport.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

impl StreamwireError {
    /// Returns true if this error represents a clean connection close.
    #[must_use]
    pub fn is_clean_close(&self) -> bool {
        let reason = match self {
            Self::Disconnected(reason)
            | Self::Send(SendError::Disconnected(reason))
            | Self::Request(RequestError::Disconnected(reason)) => reason,
            _ => return false,
        };
        matches!(reason, DisconnectReason::Local | DisconnectReason::Closed)
    }
}

/// Result type alias using [`StreamwireError`].
pub type Result<T, E = StreamwireError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use std::io;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::local(StreamwireError::Disconnected(DisconnectReason::Local), true)]
    #[case::closed(StreamwireError::Request(RequestError::Disconnected(DisconnectReason::Closed)), true)]
    #[case::send_local(StreamwireError::Send(SendError::Disconnected(DisconnectReason::Local)), true)]
    #[case::malformed(StreamwireError::Disconnected(DisconnectReason::Malformed(HeaderError::Malformed)), false)]
    #[case::io(StreamwireError::Io(io::Error::other("boom")), false)]
    fn classifies_clean_closes(#[case] err: StreamwireError, #[case] clean: bool) {
        assert_eq!(err.is_clean_close(), clean);
    }

    #[test]
    fn header_errors_keep_their_message() {
        let err = StreamwireError::from(HeaderError::MalformedId);
        assert_eq!(err.to_string(), HeaderError::MalformedId.to_string());
    }
}
