//! Routes decoded frames to stream assemblers and dispatches completed
//! top-level streams.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    header::{Header, PayloadType},
    message::{AssembledPayload, ContentStream, peek_stream_descriptions},
    stream::{CompletedStream, StreamContent, StreamKind, StreamManager},
};

/// A completed top-level stream ready for the adapter.
#[derive(Debug)]
pub enum InboundPayload {
    /// A request body and its attachments.
    Request(AssembledPayload),
    /// A response body and its attachments.
    Response(AssembledPayload),
}

impl InboundPayload {
    /// Correlation id of the payload.
    #[must_use]
    pub fn id(&self) -> Uuid {
        match self {
            Self::Request(payload) | Self::Response(payload) => payload.id,
        }
    }
}

/// Frame router for one connection.
///
/// Content frames go to the [`StreamManager`]; `C` and `X` frames cancel
/// streams; frames with unknown type tags are discarded. Completed request
/// and response streams are paired with their attachments and queued on the
/// channel returned from [`PayloadAssemblerManager::new`].
#[derive(Debug)]
pub struct PayloadAssemblerManager {
    streams: Arc<StreamManager>,
    inbound: mpsc::UnboundedSender<InboundPayload>,
}

impl PayloadAssemblerManager {
    /// Create a router over `streams` and the receiving end of its dispatch
    /// queue.
    #[must_use]
    pub fn new(streams: Arc<StreamManager>) -> (Self, mpsc::UnboundedReceiver<InboundPayload>) {
        let (inbound, rx) = mpsc::unbounded_channel();
        (Self { streams, inbound }, rx)
    }

    /// Stream registry shared with the rest of the connection.
    #[must_use]
    pub fn streams(&self) -> &Arc<StreamManager> { &self.streams }

    /// Route one frame.
    ///
    /// Returns the kind of stream this frame completed, if any. Protocol
    /// violations such as frames for finished streams are logged and the
    /// frame is discarded.
    pub fn on_receive(&self, header: &Header, payload: &[u8]) -> Option<StreamKind> {
        let id = header.id();
        match header.payload_type() {
            PayloadType::CancelStream => {
                let cancelled = self.streams.cancel(id);
                debug!(%id, cancelled, "peer cancelled stream");
                None
            }
            PayloadType::CancelAll => {
                let cancelled = self.streams.cancel_all();
                debug!(cancelled, "peer cancelled all streams");
                None
            }
            PayloadType::Other(tag) => {
                warn!(%tag, %id, "discarding frame with unknown payload type");
                None
            }
            PayloadType::Request | PayloadType::Response | PayloadType::Stream => {
                match self.streams.on_receive(header, payload) {
                    Ok(Some(completed)) => {
                        let kind = completed.kind();
                        self.dispatch(completed);
                        Some(kind)
                    }
                    Ok(None) => None,
                    Err(err) => {
                        warn!(error = %err, "discarding frame");
                        None
                    }
                }
            }
        }
    }

    fn dispatch(&self, completed: CompletedStream) {
        let id = completed.id();
        let kind = completed.kind();
        if kind == StreamKind::Attachment {
            debug!(%id, "attachment stream completed");
            return;
        }

        let body = completed.into_content();
        let streams = peek_stream_descriptions(&body)
            .into_iter()
            .map(|description| {
                let content = self
                    .streams
                    .subscribe(description.id, StreamKind::Attachment)
                    .unwrap_or_else(|| StreamContent::cancelled(description.id));
                ContentStream::new(description, content)
            })
            .collect();
        let payload = AssembledPayload { id, body, streams };
        let inbound = match kind {
            StreamKind::Request => InboundPayload::Request(payload),
            _ => InboundPayload::Response(payload),
        };
        debug!(%id, %kind, "dispatching completed stream");
        if self.inbound.send(inbound).is_err() {
            warn!(%id, %kind, "no dispatcher for completed stream; dropping");
        }
    }
}
