//! Test doubles for exercising `streamwire` connections without sockets.
//!
//! [`ScriptedTransport`] replays canned inbound bytes and records everything
//! written to it. [`transport_pair`] connects two real transports over an
//! in-memory duplex pipe. The [`frames`] helpers build and split wire bytes.
//!
//! ```rust
//! use streamwire::header::PayloadType;
//! use streamwire_testing::{ScriptedTransport, frames::encode_frame};
//! use uuid::Uuid;
//!
//! let wire = encode_frame(PayloadType::Request, Uuid::nil(), b"hello", true);
//! let transport = ScriptedTransport::new([wire]);
//! assert!(transport.written().is_empty());
//! ```

pub mod frames;
mod scripted;

use std::sync::Arc;

use rstest::fixture;
pub use scripted::ScriptedTransport;
use streamwire::{ProtocolConfig, transport::StreamTransport};
use tokio::io::{DuplexStream, duplex};

/// Transport over one end of an in-memory pipe.
pub type DuplexTransport = StreamTransport<DuplexStream>;

const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

/// Create two transports joined by an in-memory pipe of `capacity` bytes.
#[must_use]
pub fn transport_pair_with_capacity(
    capacity: usize,
) -> (Arc<DuplexTransport>, Arc<DuplexTransport>) {
    let (left, right) = duplex(capacity);
    (
        Arc::new(StreamTransport::new(left)),
        Arc::new(StreamTransport::new(right)),
    )
}

/// Create two transports joined by an in-memory pipe.
#[must_use]
pub fn transport_pair() -> (Arc<DuplexTransport>, Arc<DuplexTransport>) {
    transport_pair_with_capacity(DEFAULT_PIPE_CAPACITY)
}

/// Configuration with small frames so multi-frame paths are exercised.
#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
pub fn small_frames() -> ProtocolConfig { ProtocolConfig::default().max_payload_length(8) }
