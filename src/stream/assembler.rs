//! Reconstruction buffer for a single logical stream.

use bytes::{Bytes, BytesMut};
use tokio::sync::oneshot;
use uuid::Uuid;

use super::{ContentResult, StreamCancelled, StreamContent, StreamError, StreamKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AssemblyState {
    Assembling,
    Complete,
    Cancelled,
}

/// Accumulates the frames of one stream id until the final frame arrives.
///
/// The assembler owns its buffer exclusively. Completion hands the bytes to
/// the subscriber; cancellation releases them and tells the subscriber the
/// stream was abandoned. Either transition happens at most once.
#[derive(Debug)]
pub struct StreamAssembler {
    id: Uuid,
    kind: StreamKind,
    buffer: BytesMut,
    state: AssemblyState,
    notify: Option<oneshot::Sender<ContentResult>>,
    content: Option<StreamContent>,
}

impl StreamAssembler {
    /// Create an empty assembler for `id`.
    #[must_use]
    pub fn new(id: Uuid, kind: StreamKind) -> Self {
        let (notify, content) = StreamContent::channel(id);
        Self {
            id,
            kind,
            buffer: BytesMut::new(),
            state: AssemblyState::Assembling,
            notify: Some(notify),
            content: Some(content),
        }
    }

    /// Stream id.
    #[must_use]
    pub const fn id(&self) -> Uuid { self.id }

    /// Role of the stream.
    #[must_use]
    pub const fn kind(&self) -> StreamKind { self.kind }

    /// Bytes buffered so far.
    #[must_use]
    pub fn buffered_len(&self) -> usize { self.buffer.len() }

    /// Whether the final frame has been received.
    #[must_use]
    pub fn is_complete(&self) -> bool { self.state == AssemblyState::Complete }

    /// Whether the stream was abandoned.
    #[must_use]
    pub fn is_cancelled(&self) -> bool { self.state == AssemblyState::Cancelled }

    /// Take the future that resolves with the stream content.
    ///
    /// Only the first call returns `Some`.
    pub fn subscribe(&mut self) -> Option<StreamContent> { self.content.take() }

    /// Append `bytes`, completing the stream when `is_final` is set.
    ///
    /// Returns the full content when this call completed the stream.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::NotAssembling`] once the stream has completed or
    /// been cancelled.
    pub fn on_receive(
        &mut self,
        bytes: &[u8],
        is_final: bool,
    ) -> Result<Option<Bytes>, StreamError> {
        if self.state != AssemblyState::Assembling {
            return Err(StreamError::NotAssembling { id: self.id });
        }
        self.buffer.extend_from_slice(bytes);
        if !is_final {
            return Ok(None);
        }

        self.state = AssemblyState::Complete;
        let content = self.buffer.split().freeze();
        if let Some(notify) = self.notify.take() {
            let _ = notify.send(Ok(content.clone()));
        }
        Ok(Some(content))
    }

    /// Abandon the stream, releasing buffered bytes.
    ///
    /// Returns `false` if the stream had already completed or been cancelled.
    pub fn cancel(&mut self) -> bool {
        if self.state != AssemblyState::Assembling {
            return false;
        }
        self.state = AssemblyState::Cancelled;
        self.buffer = BytesMut::new();
        if let Some(notify) = self.notify.take() {
            let _ = notify.send(Err(StreamCancelled { id: self.id }));
        }
        true
    }
}
