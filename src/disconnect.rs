//! Connection-wide disconnect signalling.
//!
//! The sender and receiver of one connection share a [`DisconnectSignal`].
//! Whichever side fails first records the [`DisconnectReason`] and cancels
//! the token; every other task observes the same reason.

use std::{
    io,
    sync::{Arc, OnceLock},
};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{frame::FrameError, header::HeaderError};

/// Why a connection stopped.
#[derive(Clone, Debug, Error)]
pub enum DisconnectReason {
    /// The local side asked to disconnect.
    #[error("disconnected locally")]
    Local,
    /// The peer closed the transport.
    #[error("transport closed by peer")]
    Closed,
    /// A header failed to decode.
    #[error("malformed frame: {0}")]
    Malformed(#[source] HeaderError),
    /// The transport reported an I/O failure.
    #[error("transport error: {0}")]
    Transport(#[source] Arc<io::Error>),
    /// A frame carried a different number of bytes than its header declared.
    #[error("frame declared {declared} bytes but carried {actual}")]
    InvalidFrame {
        /// Length written in the header.
        declared: usize,
        /// Bytes actually available.
        actual: usize,
    },
}

impl From<io::Error> for DisconnectReason {
    fn from(err: io::Error) -> Self { Self::Transport(Arc::new(err)) }
}

impl From<FrameError> for DisconnectReason {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Header(err) => Self::Malformed(err),
            FrameError::LengthMismatch { declared, actual } => {
                Self::InvalidFrame { declared, actual }
            }
            FrameError::Io(err) => err.into(),
        }
    }
}

/// Shared, first-writer-wins disconnect flag.
#[derive(Clone, Debug, Default)]
pub struct DisconnectSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<DisconnectReason>>,
}

impl DisconnectSignal {
    /// Create an untriggered signal.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Record `reason` and wake every waiter.
    ///
    /// Returns `true` if this call was the first to trigger the signal.
    /// Later reasons are dropped.
    pub fn trigger(&self, reason: DisconnectReason) -> bool {
        let first = self.reason.set(reason).is_ok();
        self.token.cancel();
        first
    }

    /// Whether the connection has been torn down.
    #[must_use]
    pub fn is_triggered(&self) -> bool { self.token.is_cancelled() }

    /// Reason recorded by the first trigger, if any.
    #[must_use]
    pub fn reason(&self) -> Option<DisconnectReason> { self.reason.get().cloned() }

    /// Wait for the signal and return its reason.
    pub async fn triggered(&self) -> DisconnectReason {
        self.token.cancelled().await;
        self.reason().unwrap_or(DisconnectReason::Local)
    }

    /// Token cancelled when the signal fires.
    #[must_use]
    pub fn token(&self) -> &CancellationToken { &self.token }
}
