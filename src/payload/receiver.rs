//! Inbound side of a connection.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::BytesMut;
use tokio::sync::broadcast;
use tokio_util::{codec::Decoder, task::TaskTracker};
use tracing::{debug, error};
use uuid::Uuid;

use super::{ConnectError, PayloadAssemblerManager};
use crate::{
    config::ProtocolConfig,
    disconnect::{DisconnectReason, DisconnectSignal},
    frame::FrameCodec,
    header::{HEADER_LENGTH, Header},
    metrics::{self, Direction},
    stream::StreamKind,
    transport::Transport,
};

/// Notifications published by the read loop.
#[derive(Clone, Debug)]
pub enum ReceiverEvent {
    /// A frame header was decoded.
    HeaderReceived(Header),
    /// A logical stream received its final frame.
    StreamCompleted {
        /// Stream id.
        id: Uuid,
        /// Role of the stream.
        kind: StreamKind,
    },
    /// The read loop stopped.
    Disconnected(DisconnectReason),
}

/// Runs the read loop for one connection.
///
/// Reads are sized so that exactly one header, then exactly one payload, is
/// requested from the transport at a time. Any read or decode failure, or
/// end of stream, disconnects: the transport is closed, every in-flight
/// stream is cancelled and [`ReceiverEvent::Disconnected`] is published.
pub struct PayloadReceiver {
    manager: Arc<PayloadAssemblerManager>,
    config: ProtocolConfig,
    events: broadcast::Sender<ReceiverEvent>,
    signal: Mutex<Option<DisconnectSignal>>,
    tracker: TaskTracker,
}

impl PayloadReceiver {
    /// Create a receiver routing frames through `manager`.
    #[must_use]
    pub fn new(manager: PayloadAssemblerManager, config: &ProtocolConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity_value());
        let tracker = TaskTracker::new();
        tracker.close();
        Self {
            manager: Arc::new(manager),
            config: *config,
            events,
            signal: Mutex::new(None),
            tracker,
        }
    }

    fn signal(&self) -> MutexGuard<'_, Option<DisconnectSignal>> {
        self.signal.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to read loop events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ReceiverEvent> { self.events.subscribe() }

    /// Frame router used by the read loop.
    #[must_use]
    pub fn manager(&self) -> &Arc<PayloadAssemblerManager> { &self.manager }

    /// Start reading from `transport`.
    ///
    /// Returns the signal that fires when the read loop stops.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::AlreadyConnected`] while a read loop is live.
    pub fn connect(
        &self,
        transport: Arc<dyn Transport>,
    ) -> Result<DisconnectSignal, ConnectError> {
        let signal = DisconnectSignal::new();
        self.connect_with_signal(transport, signal.clone())?;
        Ok(signal)
    }

    /// Start reading from `transport`, sharing `signal` with the sender.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::AlreadyConnected`] while a read loop is live.
    pub fn connect_with_signal(
        &self,
        transport: Arc<dyn Transport>,
        signal: DisconnectSignal,
    ) -> Result<(), ConnectError> {
        let mut current = self.signal();
        if current.as_ref().is_some_and(|live| !live.is_triggered()) {
            return Err(ConnectError::AlreadyConnected);
        }

        let task = ReadLoop {
            transport,
            manager: Arc::clone(&self.manager),
            events: self.events.clone(),
            signal: signal.clone(),
            codec: self.config.build_codec(),
        };
        self.tracker.spawn(task.run());
        *current = Some(signal);
        Ok(())
    }

    /// Whether a read loop is live.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.signal()
            .as_ref()
            .is_some_and(|signal| !signal.is_triggered())
    }

    /// Stop the read loop.
    ///
    /// Returns `true` if this call ended a live connection.
    pub fn disconnect(&self) -> bool {
        self.signal()
            .as_ref()
            .is_some_and(|signal| signal.trigger(DisconnectReason::Local))
    }

    /// Wait for the read loop to finish its teardown.
    pub async fn closed(&self) { self.tracker.wait().await; }
}

impl std::fmt::Debug for PayloadReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadReceiver")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

struct ReadLoop {
    transport: Arc<dyn Transport>,
    manager: Arc<PayloadAssemblerManager>,
    events: broadcast::Sender<ReceiverEvent>,
    signal: DisconnectSignal,
    codec: FrameCodec,
}

impl ReadLoop {
    async fn run(mut self) {
        let reason = self.read_frames().await;
        self.signal.trigger(reason.clone());
        let reason = self.signal.reason().unwrap_or(reason);

        let cancelled = self.manager.streams().cancel_all();
        self.transport.close().await;
        match reason {
            DisconnectReason::Local | DisconnectReason::Closed => {
                debug!(%reason, cancelled, "payload receiver stopped");
            }
            _ => {
                error!(%reason, cancelled, "payload receiver disconnected");
                metrics::inc_errors();
            }
        }
        let _ = self.events.send(ReceiverEvent::Disconnected(reason));
    }

    async fn read_frames(&mut self) -> DisconnectReason {
        let mut buf = BytesMut::with_capacity(HEADER_LENGTH);
        loop {
            match self.codec.decode(&mut buf) {
                Ok(Some(frame)) => {
                    let (header, payload) = frame.into_parts();
                    self.route(&header, &payload);
                    continue;
                }
                Ok(None) => {}
                Err(err) => return err.into(),
            }

            let wanted = self.codec.bytes_needed(buf.len());
            let read = tokio::select! {
                biased;
                reason = self.signal.triggered() => return reason,
                read = self.transport.receive(wanted) => read,
            };
            match read {
                Ok(bytes) if bytes.is_empty() => return DisconnectReason::Closed,
                Ok(bytes) => buf.extend_from_slice(&bytes),
                Err(err) => return err.into(),
            }
        }
    }

    fn route(&self, header: &Header, payload: &[u8]) {
        metrics::inc_frames(Direction::Inbound);
        debug!(%header, "frame received");
        let _ = self.events.send(ReceiverEvent::HeaderReceived(*header));
        if let Some(kind) = self.manager.on_receive(header, payload) {
            let _ = self.events.send(ReceiverEvent::StreamCompleted {
                id: header.id(),
                kind,
            });
        }
    }
}
