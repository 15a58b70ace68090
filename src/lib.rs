#![doc(html_root_url = "https://docs.rs/streamwire/latest")]
//! Public API for the `streamwire` library.
//!
//! `streamwire` multiplexes request/response exchanges and their attachments
//! over one bidirectional byte transport. Every frame starts with a fixed
//! 48-byte text header naming its type, payload length, stream id and end
//! flag; frames of many logical streams may interleave on the wire.
//!
//! The layers, bottom-up:
//!
//! - [`header`] encodes and validates the fixed-width header.
//! - [`frame`] pairs headers with content and splits a byte stream into
//!   frames.
//! - [`stream`] reassembles logical streams by id.
//! - [`payload`] writes chunked payloads and runs the read loop.
//! - [`request`] correlates responses with the requests awaiting them.
//! - [`protocol`] ties everything to a [`RequestHandler`] over one
//!   [`transport::Transport`].

pub mod config;
pub mod disconnect;
pub mod error;
pub mod frame;
pub mod header;
pub mod message;
pub mod metrics;
pub mod panic;
pub mod payload;
pub mod protocol;
pub mod request;
pub mod stream;
pub mod transport;

pub use config::ProtocolConfig;
pub use disconnect::{DisconnectReason, DisconnectSignal};
pub use error::{Result, StreamwireError};
pub use header::{Header, PayloadType};
pub use message::{ReceiveRequest, ReceiveResponse, StreamingRequest, StreamingResponse};
pub use metrics::{CONNECTIONS_ACTIVE, Direction, ERRORS_TOTAL, FRAMES_PROCESSED, HANDLER_PANICS};
pub use protocol::{BoxError, ProtocolAdapter, RequestHandler};
pub use transport::{StreamTransport, Transport};
