//! Validation failures raised while building or decoding headers.
//!
//! Every variant is fatal for the frame that produced it; the decoder never
//! returns a partially populated header.

use thiserror::Error;

/// Errors produced by the header codec.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    /// Fewer bytes than a full header were supplied.
    #[error("header requires {required} bytes, found {found}")]
    Truncated {
        /// Bytes required for a complete header.
        required: usize,
        /// Bytes available in the buffer.
        found: usize,
    },
    /// Wrong field count or missing newline terminator.
    #[error("header is malformed")]
    Malformed,
    /// Type field is not a single printable character.
    #[error("header type is malformed")]
    MalformedType,
    /// Length field is not a six digit non-negative decimal.
    #[error("header length is malformed")]
    MalformedLength,
    /// Id field is not a canonical hyphenated GUID.
    #[error("header id is malformed")]
    MalformedId,
    /// End flag is not exactly `0` or `1`.
    #[error("header end is malformed")]
    MalformedEnd,
    /// Length exceeds what the peers agreed to accept.
    #[error("header length {length} exceeds the {limit} byte limit")]
    LengthTooLarge {
        /// Declared payload length.
        length: usize,
        /// Agreed maximum.
        limit: usize,
    },
    /// The destination buffer cannot hold a full header.
    #[error("destination holds {found} bytes but a header needs {required}")]
    BufferTooSmall {
        /// Bytes required for a complete header.
        required: usize,
        /// Bytes available in the destination.
        found: usize,
    },
}
