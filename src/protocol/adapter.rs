//! The protocol adapter.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::future::try_join_all;
use tokio::sync::{broadcast, mpsc};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::RequestHandler;
use crate::{
    config::ProtocolConfig,
    disconnect::{DisconnectReason, DisconnectSignal},
    header::PayloadType,
    message::{
        AssembledPayload,
        ReceiveRequest,
        ReceiveResponse,
        StreamingRequest,
        StreamingResponse,
    },
    metrics,
    panic::catch_panic,
    payload::{
        ConnectError,
        InboundPayload,
        PayloadAssemblerManager,
        PayloadReceiver,
        PayloadSender,
        ReceiverEvent,
        SendError,
    },
    request::{RequestError, RequestManager},
    stream::StreamManager,
    transport::Transport,
};

struct Inner {
    config: ProtocolConfig,
    handler: Box<dyn RequestHandler>,
    sender: PayloadSender,
    receiver: PayloadReceiver,
    streams: Arc<StreamManager>,
    requests: Arc<RequestManager>,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<InboundPayload>>>,
    signal: Mutex<Option<DisconnectSignal>>,
    tracker: TaskTracker,
}

/// One protocol connection.
///
/// Cloning the adapter yields another handle to the same connection. The
/// transport disconnect is the only teardown path: when it fires, every
/// pending request is rejected and every incomplete stream is cancelled.
///
/// ```no_run
/// use std::sync::Arc;
///
/// use streamwire::{
///     ProtocolConfig,
///     message::{ReceiveRequest, StreamingRequest, StreamingResponse},
///     protocol::{BoxError, ProtocolAdapter},
///     transport::StreamTransport,
/// };
/// use tokio::net::TcpStream;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let adapter = ProtocolAdapter::new(
///     |_request: ReceiveRequest| async { Ok::<_, BoxError>(StreamingResponse::not_found()) },
///     ProtocolConfig::default(),
/// );
/// let stream = TcpStream::connect("127.0.0.1:7878").await?;
/// adapter.connect(Arc::new(StreamTransport::new(stream)))?;
///
/// let response = adapter
///     .send_request(&StreamingRequest::get("/status"), &CancellationToken::new())
///     .await?;
/// println!("status {}", response.status_code());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ProtocolAdapter {
    inner: Arc<Inner>,
}

impl ProtocolAdapter {
    /// Create an unconnected adapter answering requests with `handler`.
    pub fn new(handler: impl RequestHandler, config: ProtocolConfig) -> Self {
        let streams = Arc::new(StreamManager::new(config.completed_id_window_value()));
        let (manager, inbound) = PayloadAssemblerManager::new(Arc::clone(&streams));
        let tracker = TaskTracker::new();
        tracker.close();
        Self {
            inner: Arc::new(Inner {
                config,
                handler: Box::new(handler),
                sender: PayloadSender::new(config.max_payload_length_value()),
                receiver: PayloadReceiver::new(manager, &config),
                streams,
                requests: Arc::new(RequestManager::new()),
                inbound: Mutex::new(Some(inbound)),
                signal: Mutex::new(None),
                tracker,
            }),
        }
    }

    fn signal(&self) -> MutexGuard<'_, Option<DisconnectSignal>> {
        self.inner
            .signal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach `transport` and start reading, writing and dispatching.
    ///
    /// An adapter serves a single connection. Returns the signal that fires
    /// when it ends.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::AlreadyConnected`] while connected and
    /// [`ConnectError::Finished`] after the connection has ended.
    pub fn connect(
        &self,
        transport: Arc<dyn Transport>,
    ) -> Result<DisconnectSignal, ConnectError> {
        let mut current = self.signal();
        if let Some(existing) = current.as_ref() {
            return Err(if existing.is_triggered() {
                ConnectError::Finished
            } else {
                ConnectError::AlreadyConnected
            });
        }
        let inbound = self
            .inner
            .inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(ConnectError::Finished)?;

        let signal = DisconnectSignal::new();
        self.inner
            .sender
            .connect_with_signal(Arc::clone(&transport), signal.clone())?;
        if let Err(err) = self
            .inner
            .receiver
            .connect_with_signal(transport, signal.clone())
        {
            signal.trigger(DisconnectReason::Local);
            return Err(err);
        }

        metrics::inc_connections();
        info!(
            max_payload_length = self.inner.config.max_payload_length_value(),
            "connection established"
        );
        self.inner.tracker.spawn(dispatch(
            Arc::downgrade(&self.inner),
            Arc::clone(&self.inner.requests),
            Arc::clone(&self.inner.streams),
            inbound,
            signal.clone(),
        ));
        *current = Some(signal.clone());
        Ok(signal)
    }

    /// Whether the connection is live.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.signal()
            .as_ref()
            .is_some_and(|signal| !signal.is_triggered())
    }

    /// Tear the connection down locally.
    ///
    /// Returns `true` if this call ended a live connection.
    pub fn disconnect(&self) -> bool {
        self.signal()
            .as_ref()
            .is_some_and(|signal| signal.trigger(DisconnectReason::Local))
    }

    /// Wait until the connection has ended and every task has finished.
    pub async fn closed(&self) {
        let signal = self.signal().clone();
        if let Some(signal) = signal {
            signal.triggered().await;
        }
        self.inner.sender.closed().await;
        self.inner.receiver.closed().await;
        self.inner.tracker.wait().await;
    }

    /// Send `request` and wait for its response.
    ///
    /// The wait ends early when `cancel` fires or the configured request
    /// timeout elapses. Cancelling does not recall frames already written.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] if the request cannot be sent, or is
    /// cancelled, times out or loses its connection before the response
    /// arrives.
    pub async fn send_request(
        &self,
        request: &StreamingRequest,
        cancel: &CancellationToken,
    ) -> Result<ReceiveResponse, RequestError> {
        self.inner
            .requests
            .send_request(&self.inner.sender, request)
            .await?
            .wait(cancel, self.inner.config.request_timeout_value())
            .await
    }

    /// Answer an inbound request through the handler.
    ///
    /// Undecodable envelopes are answered with `400`; handler errors and
    /// panics with `500`. The response reuses the request's id.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] if the response could not be written.
    pub async fn on_receive_request(&self, payload: AssembledPayload) -> Result<(), SendError> {
        let id = payload.id;
        let response = match ReceiveRequest::from_payload(payload) {
            Err(err) => {
                warn!(%id, error = %err, "undecodable request envelope");
                StreamingResponse::bad_request()
            }
            Ok(request) => {
                debug!(%id, verb = request.verb(), path = request.path(), "handling request");
                match catch_panic(self.inner.handler.process_request(request)).await {
                    Ok(Ok(response)) => response,
                    Ok(Err(err)) => {
                        error!(%id, error = %err, "request handler failed");
                        StreamingResponse::internal_server_error()
                    }
                    Err(panic) => {
                        error!(%id, panic = %panic, "request handler panicked");
                        metrics::inc_handler_panics();
                        StreamingResponse::internal_server_error()
                    }
                }
            }
        };
        self.send_response(id, &response).await
    }

    /// Write `response` as the answer to request `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] if any frame could not be written.
    pub async fn send_response(
        &self,
        id: Uuid,
        response: &StreamingResponse,
    ) -> Result<(), SendError> {
        let body = serde_json::to_vec(&response.envelope())?;
        let sender = &self.inner.sender;
        let mut completions = vec![sender.send_payload(PayloadType::Response, id, body.into())?];
        for stream in response.streams() {
            completions.push(sender.send_payload(
                PayloadType::Stream,
                stream.id(),
                stream.content().clone(),
            )?);
        }
        try_join_all(completions).await?;
        debug!(%id, status = response.status_code(), "response sent");
        Ok(())
    }

    /// Deliver an inbound response to the request waiting on it.
    ///
    /// Returns `false` if no request was waiting. A response whose envelope
    /// cannot be decoded fails the waiting request.
    pub fn on_receive_response(&self, payload: AssembledPayload) -> bool {
        let id = payload.id;
        match ReceiveResponse::from_payload(payload) {
            Ok(response) => self.inner.requests.signal_response(response),
            Err(err) => {
                warn!(%id, error = %err, "undecodable response envelope");
                self.inner.requests.fail(
                    id,
                    RequestError::InvalidResponse {
                        id,
                        reason: err.to_string(),
                    },
                )
            }
        }
    }

    /// Abandon the inbound stream `id`.
    ///
    /// Never fails; returns `true` only if an in-flight stream was cancelled.
    pub fn on_cancel_stream(&self, id: Uuid) -> bool { self.inner.streams.cancel(id) }

    /// Ask the peer to abandon stream `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] if the cancel frame could not be written.
    pub async fn cancel_remote_stream(&self, id: Uuid) -> Result<(), SendError> {
        self.inner.sender.send_cancel_stream(id)?.await
    }

    /// Subscribe to frame-level receiver events.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<ReceiverEvent> { self.inner.receiver.subscribe() }

    /// Requests awaiting a response.
    #[must_use]
    pub fn requests(&self) -> &Arc<RequestManager> { &self.inner.requests }

    /// Inbound streams being assembled.
    #[must_use]
    pub fn streams(&self) -> &Arc<StreamManager> { &self.inner.streams }

    /// Connection settings.
    #[must_use]
    pub fn config(&self) -> &ProtocolConfig { &self.inner.config }
}

impl std::fmt::Debug for ProtocolAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolAdapter")
            .field("config", &self.inner.config)
            .field("connected", &self.is_connected())
            .field("pending_requests", &self.inner.requests.pending_count())
            .field("streams", &self.inner.streams.len())
            .finish_non_exhaustive()
    }
}

async fn dispatch(
    adapter: Weak<Inner>,
    requests: Arc<RequestManager>,
    streams: Arc<StreamManager>,
    mut inbound: mpsc::UnboundedReceiver<InboundPayload>,
    signal: DisconnectSignal,
) {
    let reason = loop {
        let next = tokio::select! {
            biased;
            next = inbound.recv() => next,
            reason = signal.triggered() => break reason,
        };
        let (Some(payload), Some(inner)) = (next, adapter.upgrade()) else {
            break signal.reason().unwrap_or(DisconnectReason::Local);
        };
        let adapter = ProtocolAdapter { inner };
        match payload {
            InboundPayload::Request(payload) => {
                let tracker = adapter.inner.tracker.clone();
                tracker.spawn(async move {
                    let id = payload.id;
                    if let Err(err) = adapter.on_receive_request(payload).await {
                        warn!(%id, error = %err, "failed to send response");
                    }
                });
            }
            InboundPayload::Response(payload) => {
                adapter.on_receive_response(payload);
            }
        }
    };

    signal.trigger(reason.clone());
    let rejected = requests.reject_all(&reason);
    let cancelled = streams.cancel_all();
    metrics::dec_connections();
    info!(%reason, rejected, cancelled, "connection closed");
}
