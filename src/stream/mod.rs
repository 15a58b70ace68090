//! Per-id reassembly of logical streams.
//!
//! Frames sharing an id are appended, in arrival order, to a
//! [`StreamAssembler`] owned by the connection's [`StreamManager`]. When the
//! frame flagged `end` arrives the assembler completes and hands its bytes to
//! whoever subscribed through a [`StreamContent`] future.

mod assembler;
mod manager;

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

pub use assembler::StreamAssembler;
use bytes::Bytes;
use derive_more::Display;
pub use manager::{CompletedStream, StreamManager};
use thiserror::Error;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::header::PayloadType;

/// Role of a logical stream within a message exchange.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Body of an inbound request (`A` frames).
    #[display("request")]
    Request,
    /// Body of an inbound response (`B` frames).
    #[display("response")]
    Response,
    /// Attachment referenced from a request or response (`S` frames).
    #[display("attachment")]
    Attachment,
}

impl TryFrom<PayloadType> for StreamKind {
    type Error = PayloadType;

    fn try_from(value: PayloadType) -> Result<Self, Self::Error> {
        match value {
            PayloadType::Request => Ok(Self::Request),
            PayloadType::Response => Ok(Self::Response),
            PayloadType::Stream => Ok(Self::Attachment),
            other => Err(other),
        }
    }
}

/// The stream was abandoned before its final frame arrived.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("stream {id} was cancelled")]
pub struct StreamCancelled {
    /// Id of the abandoned stream.
    pub id: Uuid,
}

/// Errors raised while routing a frame to its assembler.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    /// A frame arrived for an id that already completed or was cancelled.
    #[error("stream {id} already finished")]
    AlreadyFinished {
        /// Stream id carried by the late frame.
        id: Uuid,
    },
    /// The assembler is no longer accepting bytes.
    #[error("stream {id} is not assembling")]
    NotAssembling {
        /// Stream id.
        id: Uuid,
    },
    /// The frame type does not carry stream content.
    #[error("payload type {payload_type} does not carry stream content")]
    UnsupportedType {
        /// Stream id carried by the frame.
        id: Uuid,
        /// Offending type tag.
        payload_type: PayloadType,
    },
}

type ContentResult = Result<Bytes, StreamCancelled>;

/// Resolves to the full content of a logical stream once it completes.
///
/// ```
/// use bytes::Bytes;
/// use streamwire::stream::{StreamAssembler, StreamKind};
/// use uuid::Uuid;
///
/// let mut assembler = StreamAssembler::new(Uuid::nil(), StreamKind::Attachment);
/// let content = assembler.subscribe().expect("first subscriber");
/// assembler.on_receive(b"hel", false).expect("assembling");
/// assembler.on_receive(b"lo", true).expect("assembling");
/// let bytes = futures::executor::block_on(content).expect("completed");
/// assert_eq!(bytes, Bytes::from_static(b"hello"));
/// ```
#[derive(Debug)]
#[must_use = "stream content does nothing unless awaited"]
pub struct StreamContent {
    id: Uuid,
    rx: oneshot::Receiver<ContentResult>,
}

impl StreamContent {
    fn channel(id: Uuid) -> (oneshot::Sender<ContentResult>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { id, rx })
    }

    /// Content that resolves immediately with a cancellation.
    pub fn cancelled(id: Uuid) -> Self {
        let (tx, content) = Self::channel(id);
        let _ = tx.send(Err(StreamCancelled { id }));
        content
    }

    /// Id of the stream this content belongs to.
    #[must_use]
    pub const fn id(&self) -> Uuid { self.id }
}

impl Future for StreamContent {
    type Output = ContentResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let id = self.id;
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(StreamCancelled { id })))
    }
}
