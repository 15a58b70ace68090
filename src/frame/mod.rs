//! Frames: a validated header plus exactly the content bytes it declares.
//!
//! [`Frame`] is the unit written to and read from the transport. The
//! [`FrameCodec`] turns a byte stream into frames and back, enforcing the
//! per-frame payload cap agreed between the peers.

mod codec;

use std::io;

use bytes::Bytes;
pub use codec::FrameCodec;
use thiserror::Error;

use crate::header::{Header, HeaderError};

/// Errors raised while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The header failed validation.
    #[error(transparent)]
    Header(#[from] HeaderError),
    /// The declared payload length disagrees with the bytes supplied.
    #[error("frame declares {declared} payload bytes but carries {actual}")]
    LengthMismatch {
        /// Length written in the header.
        declared: usize,
        /// Bytes actually attached to the frame.
        actual: usize,
    },
    /// The underlying stream failed.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

/// A header and its content bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    header: Header,
    payload: Bytes,
}

impl Frame {
    /// Pair `header` with `payload`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::LengthMismatch`] unless `payload` holds exactly
    /// the number of bytes the header declares.
    ///
    /// # Examples
    ///
    /// ```
    /// use bytes::Bytes;
    /// use streamwire::{
    ///     frame::Frame,
    ///     header::{Header, PayloadType},
    /// };
    /// use uuid::Uuid;
    ///
    /// let header = Header::new(PayloadType::Stream, 3, Uuid::nil(), true).expect("valid header");
    /// assert!(Frame::new(header, Bytes::from_static(b"abc")).is_ok());
    /// assert!(Frame::new(header, Bytes::from_static(b"ab")).is_err());
    /// ```
    pub fn new(header: Header, payload: Bytes) -> Result<Self, FrameError> {
        if header.payload_length() != payload.len() {
            return Err(FrameError::LengthMismatch {
                declared: header.payload_length(),
                actual: payload.len(),
            });
        }
        Ok(Self { header, payload })
    }

    /// Frame header.
    #[must_use]
    pub const fn header(&self) -> &Header { &self.header }

    /// Content bytes carried by this frame.
    #[must_use]
    pub const fn payload(&self) -> &Bytes { &self.payload }

    /// Split the frame into its header and payload.
    #[must_use]
    pub fn into_parts(self) -> (Header, Bytes) { (self.header, self.payload) }
}
