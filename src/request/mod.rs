//! Correlation of outbound requests with inbound responses.
//!
//! Every request is registered under a fresh correlation id before its first
//! frame is written. The response stream carries the same id, and
//! [`RequestManager::signal_response`] wakes exactly the caller waiting on
//! it. Cancellation, timeouts and disconnects all resolve the waiter and
//! remove its entry.

mod error;

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry};
pub use error::RequestError;
use futures::future::try_join_all;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    disconnect::DisconnectReason,
    header::PayloadType,
    message::{ReceiveResponse, StreamingRequest},
    payload::{PayloadSender, SendError},
};

type ResponseSlot = oneshot::Sender<Result<ReceiveResponse, RequestError>>;

/// Registry of requests awaiting a response on one connection.
#[derive(Debug, Default)]
pub struct RequestManager {
    pending: DashMap<Uuid, ResponseSlot>,
}

impl RequestManager {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register a waiter for the response to request `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::DuplicateId`] if `id` is already pending.
    pub fn register(self: &Arc<Self>, id: Uuid) -> Result<PendingResponse, RequestError> {
        let (tx, rx) = oneshot::channel();
        match self.pending.entry(id) {
            Entry::Occupied(_) => return Err(RequestError::DuplicateId { id }),
            Entry::Vacant(slot) => {
                slot.insert(tx);
            }
        }
        Ok(PendingResponse {
            id,
            rx,
            manager: Arc::clone(self),
        })
    }

    /// Register `request` under a new id and queue its frames on `sender`.
    ///
    /// The envelope goes out as the request stream, followed by each
    /// attachment. Returns once every frame is written; await the returned
    /// handle for the response.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Disconnected`] if the connection ends before
    /// every frame is written, [`RequestError::Send`] for other write
    /// failures and [`RequestError::Encode`] if the envelope could not be
    /// serialised. The registration is removed on error.
    pub async fn send_request(
        self: &Arc<Self>,
        sender: &PayloadSender,
        request: &StreamingRequest,
    ) -> Result<PendingResponse, RequestError> {
        let pending = self.register(Uuid::new_v4())?;
        let body = serde_json::to_vec(&request.envelope())?;

        let mut completions =
            vec![sender.send_payload(PayloadType::Request, pending.id, body.into())?];
        for stream in request.streams() {
            completions.push(sender.send_payload(
                PayloadType::Stream,
                stream.id(),
                stream.content().clone(),
            )?);
        }
        try_join_all(completions).await.map_err(|err| match err {
            SendError::Disconnected(reason) => RequestError::Disconnected(reason),
            other => RequestError::Send(other),
        })?;
        debug!(id = %pending.id, verb = request.verb(), path = request.path(), "request sent");
        Ok(pending)
    }

    /// Resolve the waiter registered under the response's id.
    ///
    /// Returns `false`, after logging, when no request with that id is
    /// pending.
    pub fn signal_response(&self, response: ReceiveResponse) -> bool {
        let id = response.id();
        let Some((_, slot)) = self.pending.remove(&id) else {
            warn!(%id, "response for unknown request; discarding");
            return false;
        };
        let _ = slot.send(Ok(response));
        true
    }

    /// Resolve the waiter for `id` with `err`.
    ///
    /// Returns `false` if no request with that id is pending.
    pub fn fail(&self, id: Uuid, err: RequestError) -> bool {
        let Some((_, slot)) = self.pending.remove(&id) else {
            return false;
        };
        let _ = slot.send(Err(err));
        true
    }

    /// Resolve the waiter for `id` with [`RequestError::Cancelled`].
    pub fn cancel(&self, id: Uuid) -> bool { self.fail(id, RequestError::Cancelled { id }) }

    /// Resolve every waiter with [`RequestError::Disconnected`].
    ///
    /// Returns the number of requests rejected.
    pub fn reject_all(&self, reason: &DisconnectReason) -> usize {
        let ids: Vec<Uuid> = self.pending.iter().map(|entry| *entry.key()).collect();
        ids.into_iter()
            .filter(|id| self.fail(*id, RequestError::Disconnected(reason.clone())))
            .count()
    }

    /// Whether a request with `id` is awaiting its response.
    #[must_use]
    pub fn is_pending(&self, id: Uuid) -> bool { self.pending.contains_key(&id) }

    /// Number of requests awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize { self.pending.len() }
}

/// Resolves to the response of one request.
///
/// Dropping the handle withdraws the registration; a response arriving
/// afterwards is treated as unknown.
#[derive(Debug)]
#[must_use = "a pending response does nothing unless awaited"]
pub struct PendingResponse {
    id: Uuid,
    rx: oneshot::Receiver<Result<ReceiveResponse, RequestError>>,
    manager: Arc<RequestManager>,
}

impl PendingResponse {
    /// Correlation id of the request.
    #[must_use]
    pub const fn id(&self) -> Uuid { self.id }

    /// Wait for the response, giving up when `cancel` fires or `timeout`
    /// elapses.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Cancelled`], [`RequestError::TimedOut`], or the
    /// error the request was resolved with.
    pub async fn wait(
        self,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<ReceiveResponse, RequestError> {
        let id = self.id;
        let response = async move {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, self)
                    .await
                    .unwrap_or(Err(RequestError::TimedOut { id, timeout: limit })),
                None => self.await,
            }
        };
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(RequestError::Cancelled { id }),
            outcome = response => outcome,
        }
    }
}

impl Future for PendingResponse {
    type Output = Result<ReceiveResponse, RequestError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let id = self.id;
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or(Err(RequestError::Cancelled { id })))
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        if self.manager.pending.remove(&self.id).is_some() {
            debug!(id = %self.id, "pending request withdrawn");
        }
    }
}
