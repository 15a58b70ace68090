//! Outbound side of a connection.

use std::{
    future::Future,
    io,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll},
};

use bytes::{Bytes, BytesMut};
use tokio::sync::{mpsc, oneshot};
use tokio_util::{codec::Encoder, task::TaskTracker};
use tracing::{debug, error};
use uuid::Uuid;

use super::{ConnectError, SendError};
use crate::{
    disconnect::{DisconnectReason, DisconnectSignal},
    frame::{Frame, FrameCodec, FrameError},
    header::{Header, HeaderError, PayloadType},
    metrics::{self, Direction},
    transport::Transport,
};

/// Frames of one payload plus the slot that reports its outcome.
struct Submission {
    frames: Vec<Frame>,
    done: oneshot::Sender<Result<(), SendError>>,
}

impl Submission {
    fn complete(self, outcome: Result<(), SendError>) { let _ = self.done.send(outcome); }
}

struct SenderLink {
    queue: mpsc::UnboundedSender<Submission>,
    signal: DisconnectSignal,
}

/// Resolves once every frame of a payload has been written.
#[derive(Debug)]
#[must_use = "dropping a completion does not cancel the send"]
pub struct SendCompletion {
    rx: oneshot::Receiver<Result<(), SendError>>,
    signal: DisconnectSignal,
}

impl Future for SendCompletion {
    type Output = Result<(), SendError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        Pin::new(&mut this.rx).poll(cx).map(|outcome| {
            outcome.unwrap_or_else(|_| {
                Err(SendError::Disconnected(
                    this.signal.reason().unwrap_or(DisconnectReason::Local),
                ))
            })
        })
    }
}

/// Splits payloads into frames and writes them in submission order.
///
/// Sends are queued without blocking and written by a single task, so the
/// frames of different payloads never interleave inside a header. A write
/// failure disconnects the sender and fails the in-flight payload along with
/// everything still queued. Nothing is retried.
pub struct PayloadSender {
    max_payload_length: usize,
    link: Mutex<Option<SenderLink>>,
    tracker: TaskTracker,
}

impl PayloadSender {
    /// Create a sender that emits frames of at most `max_payload_length`
    /// content bytes.
    #[must_use]
    pub fn new(max_payload_length: usize) -> Self {
        let tracker = TaskTracker::new();
        tracker.close();
        Self {
            max_payload_length: FrameCodec::new(max_payload_length).max_payload_length(),
            link: Mutex::new(None),
            tracker,
        }
    }

    fn link(&self) -> MutexGuard<'_, Option<SenderLink>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach `transport` and start the writer task.
    ///
    /// Returns the signal that fires when the sender disconnects.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError`] if the sender was connected before.
    pub fn connect(
        &self,
        transport: Arc<dyn Transport>,
    ) -> Result<DisconnectSignal, ConnectError> {
        let signal = DisconnectSignal::new();
        self.connect_with_signal(transport, signal.clone())?;
        Ok(signal)
    }

    /// Attach `transport`, sharing `signal` with the rest of the connection.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::AlreadyConnected`] while connected and
    /// [`ConnectError::Finished`] once a previous connection has ended.
    pub fn connect_with_signal(
        &self,
        transport: Arc<dyn Transport>,
        signal: DisconnectSignal,
    ) -> Result<(), ConnectError> {
        let mut link = self.link();
        if let Some(existing) = link.as_ref() {
            return Err(if existing.signal.is_triggered() {
                ConnectError::Finished
            } else {
                ConnectError::AlreadyConnected
            });
        }

        let (queue, rx) = mpsc::unbounded_channel();
        let codec = FrameCodec::new(self.max_payload_length);
        self.tracker.spawn(write_loop(transport, rx, signal.clone(), codec));
        *link = Some(SenderLink { queue, signal });
        Ok(())
    }

    /// Whether the sender is attached and its connection is alive.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.link()
            .as_ref()
            .is_some_and(|link| !link.signal.is_triggered())
    }

    /// Largest number of content bytes written per frame.
    #[must_use]
    pub const fn max_payload_length(&self) -> usize { self.max_payload_length }

    /// Queue `content` as one logical stream of `payload_type` frames.
    ///
    /// Content is split into frames of at most the configured length; the
    /// last frame carries the end flag. Empty content is sent as a single
    /// zero-length final frame.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::NotConnected`] before [`connect`](Self::connect)
    /// and [`SendError::Disconnected`] once the connection has gone away.
    pub fn send_payload(
        &self,
        payload_type: PayloadType,
        id: Uuid,
        content: Bytes,
    ) -> Result<SendCompletion, SendError> {
        let frames = chunk(payload_type, id, content, self.max_payload_length)?;
        self.enqueue(frames)
    }

    /// Queue a single frame built from an explicit header.
    ///
    /// Only the first `header.payload_length()` bytes of `content` are
    /// written. A header that declares more bytes than `content` holds would
    /// desynchronise the peer, so the sender disconnects instead.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::LengthMismatch`] for a short `content`,
    /// [`SendError::Header`] for a frame over the agreed cap, and the
    /// connection errors of [`send_payload`](Self::send_payload).
    pub fn send_packet(
        &self,
        header: Header,
        content: Bytes,
    ) -> Result<SendCompletion, SendError> {
        let declared = header.payload_length();
        if content.len() < declared {
            if let Some(link) = self.link().as_ref() {
                link.signal.trigger(DisconnectReason::InvalidFrame {
                    declared,
                    actual: content.len(),
                });
            }
            return Err(SendError::LengthMismatch {
                declared,
                available: content.len(),
            });
        }
        if declared > self.max_payload_length {
            return Err(HeaderError::LengthTooLarge {
                length: declared,
                limit: self.max_payload_length,
            }
            .into());
        }
        let frame = frame(header, content.slice(..declared))?;
        self.enqueue(vec![frame])
    }

    /// Ask the peer to abandon stream `id`.
    ///
    /// # Errors
    ///
    /// Returns the connection errors of [`send_payload`](Self::send_payload).
    pub fn send_cancel_stream(&self, id: Uuid) -> Result<SendCompletion, SendError> {
        self.send_payload(PayloadType::CancelStream, id, Bytes::new())
    }

    /// Ask the peer to abandon every in-flight stream.
    ///
    /// # Errors
    ///
    /// Returns the connection errors of [`send_payload`](Self::send_payload).
    pub fn send_cancel_all(&self) -> Result<SendCompletion, SendError> {
        self.send_payload(PayloadType::CancelAll, Uuid::nil(), Bytes::new())
    }

    /// Disconnect locally. Queued payloads fail with
    /// [`DisconnectReason::Local`].
    ///
    /// Returns `true` if this call ended a live connection.
    pub fn disconnect(&self) -> bool {
        self.link()
            .as_ref()
            .is_some_and(|link| link.signal.trigger(DisconnectReason::Local))
    }

    /// Wait for the writer task to finish.
    pub async fn closed(&self) { self.tracker.wait().await; }

    fn enqueue(&self, frames: Vec<Frame>) -> Result<SendCompletion, SendError> {
        let link = self.link();
        let Some(link) = link.as_ref() else {
            return Err(SendError::NotConnected);
        };
        let disconnected =
            || SendError::Disconnected(link.signal.reason().unwrap_or(DisconnectReason::Local));
        if link.signal.is_triggered() {
            return Err(disconnected());
        }

        let (done, rx) = oneshot::channel();
        link.queue
            .send(Submission { frames, done })
            .map_err(|_| disconnected())?;
        Ok(SendCompletion {
            rx,
            signal: link.signal.clone(),
        })
    }
}

impl std::fmt::Debug for PayloadSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadSender")
            .field("max_payload_length", &self.max_payload_length)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

fn frame(header: Header, payload: Bytes) -> Result<Frame, SendError> {
    Frame::new(header, payload).map_err(|err| match err {
        FrameError::Header(err) => SendError::Header(err),
        FrameError::LengthMismatch { declared, actual } => SendError::LengthMismatch {
            declared,
            available: actual,
        },
        FrameError::Io(err) => SendError::Disconnected(err.into()),
    })
}

fn chunk(
    payload_type: PayloadType,
    id: Uuid,
    mut content: Bytes,
    max_payload_length: usize,
) -> Result<Vec<Frame>, SendError> {
    if content.is_empty() {
        return Ok(vec![frame(Header::new(payload_type, 0, id, true)?, content)?]);
    }
    let mut frames = Vec::with_capacity(content.len().div_ceil(max_payload_length));
    while !content.is_empty() {
        let piece = content.split_to(content.len().min(max_payload_length));
        let header = Header::new(payload_type, piece.len(), id, content.is_empty())?;
        frames.push(frame(header, piece)?);
    }
    Ok(frames)
}

async fn write_loop(
    transport: Arc<dyn Transport>,
    mut queue: mpsc::UnboundedReceiver<Submission>,
    signal: DisconnectSignal,
    mut codec: FrameCodec,
) {
    let mut buf = BytesMut::new();
    loop {
        let submission = tokio::select! {
            biased;
            () = signal.token().cancelled() => break,
            next = queue.recv() => match next {
                Some(submission) => submission,
                None => {
                    signal.trigger(DisconnectReason::Local);
                    break;
                }
            },
        };

        let written = tokio::select! {
            biased;
            () = signal.token().cancelled() => None,
            outcome = write_frames(&*transport, &mut codec, &mut buf, &submission.frames) => {
                Some(outcome)
            }
        };
        match written {
            Some(Ok(())) => submission.complete(Ok(())),
            None => {
                let reason = signal.reason().unwrap_or(DisconnectReason::Local);
                debug!(%reason, "abandoning write in progress");
                submission.complete(Err(SendError::Disconnected(reason)));
                break;
            }
            Some(Err(reason)) => {
                error!(%reason, "frame write failed; disconnecting");
                metrics::inc_errors();
                signal.trigger(reason);
                let reason = signal.reason().unwrap_or(DisconnectReason::Local);
                submission.complete(Err(SendError::Disconnected(reason)));
                break;
            }
        }
    }

    queue.close();
    let reason = signal.reason().unwrap_or(DisconnectReason::Local);
    let mut failed = 0_usize;
    while let Ok(submission) = queue.try_recv() {
        submission.complete(Err(SendError::Disconnected(reason.clone())));
        failed += 1;
    }
    debug!(%reason, failed, "payload sender stopped");
    transport.close().await;
}

async fn write_frames(
    transport: &dyn Transport,
    codec: &mut FrameCodec,
    buf: &mut BytesMut,
    frames: &[Frame],
) -> Result<(), DisconnectReason> {
    for frame in frames {
        write_frame(transport, codec, buf, frame).await?;
    }
    Ok(())
}

async fn write_frame(
    transport: &dyn Transport,
    codec: &mut FrameCodec,
    buf: &mut BytesMut,
    frame: &Frame,
) -> Result<(), DisconnectReason> {
    buf.clear();
    codec.encode(frame.clone(), buf)?;
    let mut written = 0;
    while written < buf.len() {
        match transport.send(&buf[written..]).await? {
            0 => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
            n => written += n,
        }
    }
    metrics::inc_frames(Direction::Outbound);
    debug!(header = %frame.header(), "frame written");
    Ok(())
}
