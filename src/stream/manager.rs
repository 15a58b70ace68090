//! Connection-scoped registry of in-flight stream assemblers.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Mutex, MutexGuard, PoisonError},
};

use bytes::Bytes;
use dashmap::DashMap;
use uuid::Uuid;

use super::{StreamAssembler, StreamContent, StreamError, StreamKind};
use crate::header::Header;

/// A stream whose final frame has arrived.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletedStream {
    id: Uuid,
    kind: StreamKind,
    content: Bytes,
}

impl CompletedStream {
    /// Stream id.
    #[must_use]
    pub const fn id(&self) -> Uuid { self.id }

    /// Role of the stream.
    #[must_use]
    pub const fn kind(&self) -> StreamKind { self.kind }

    /// Full stream content.
    #[must_use]
    pub const fn content(&self) -> &Bytes { &self.content }

    /// Consume the stream, returning its content.
    #[must_use]
    pub fn into_content(self) -> Bytes { self.content }
}

/// Bounded memory of ids that completed or were cancelled.
///
/// Attachment content that finished before anyone subscribed is parked here
/// until it is claimed or its id ages out.
#[derive(Debug)]
struct FinishedWindow {
    capacity: usize,
    order: VecDeque<Uuid>,
    ids: HashSet<Uuid>,
    unclaimed: HashMap<Uuid, StreamContent>,
}

impl FinishedWindow {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            ids: HashSet::new(),
            unclaimed: HashMap::new(),
        }
    }

    fn remember(&mut self, id: Uuid, unclaimed: Option<StreamContent>) {
        if self.ids.insert(id) {
            self.order.push_back(id);
        }
        if let Some(content) = unclaimed {
            self.unclaimed.insert(id, content);
        }
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.ids.remove(&evicted);
                self.unclaimed.remove(&evicted);
            }
        }
    }

    fn contains(&self, id: &Uuid) -> bool { self.ids.contains(id) }

    fn claim(&mut self, id: &Uuid) -> Option<StreamContent> { self.unclaimed.remove(id) }
}

/// Maps stream ids to their assemblers for one connection.
///
/// Each assembler leaves the registry exactly once, either on completion or
/// on cancellation. Finished ids are remembered in a bounded window so late
/// frames for them are rejected instead of starting a new stream.
#[derive(Debug)]
pub struct StreamManager {
    assemblers: DashMap<Uuid, StreamAssembler>,
    finished: Mutex<FinishedWindow>,
}

impl StreamManager {
    /// Create a manager remembering up to `finished_window` finished ids.
    #[must_use]
    pub fn new(finished_window: usize) -> Self {
        Self {
            assemblers: DashMap::new(),
            finished: Mutex::new(FinishedWindow::new(finished_window)),
        }
    }

    fn finished(&self) -> MutexGuard<'_, FinishedWindow> {
        self.finished.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ensure an assembler exists for `id`.
    ///
    /// Returns `true` if a new assembler was created. An existing assembler
    /// keeps its original kind.
    pub fn get_or_create(&self, id: Uuid, kind: StreamKind) -> bool {
        let mut created = false;
        self.assemblers.entry(id).or_insert_with(|| {
            created = true;
            StreamAssembler::new(id, kind)
        });
        created
    }

    /// Obtain the content future for `id`, creating its assembler if needed.
    ///
    /// Returns `None` when the stream already has a subscriber, or when it
    /// finished without leaving unclaimed content.
    pub fn subscribe(&self, id: Uuid, kind: StreamKind) -> Option<StreamContent> {
        let mut finished = self.finished();
        if finished.contains(&id) {
            return finished.claim(&id);
        }
        self.assemblers
            .entry(id)
            .or_insert_with(|| StreamAssembler::new(id, kind))
            .subscribe()
    }

    /// Route the content of one frame to its assembler.
    ///
    /// Returns the completed stream when `header` carries the end flag. The
    /// completed assembler is removed and its id remembered.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::AlreadyFinished`] for frames addressed to a
    /// remembered id and [`StreamError::UnsupportedType`] for frame types that
    /// do not carry stream content.
    pub fn on_receive(
        &self,
        header: &Header,
        content: &[u8],
    ) -> Result<Option<CompletedStream>, StreamError> {
        let id = header.id();
        let kind = StreamKind::try_from(header.payload_type()).map_err(|payload_type| {
            StreamError::UnsupportedType { id, payload_type }
        })?;
        // Held until the frame is applied so a concurrent cancel cannot slip
        // between the check and a fresh assembler.
        let mut finished = self.finished();
        if finished.contains(&id) {
            return Err(StreamError::AlreadyFinished { id });
        }

        let completed = self
            .assemblers
            .entry(id)
            .or_insert_with(|| StreamAssembler::new(id, kind))
            .on_receive(content, header.end())?;
        let Some(content) = completed else {
            return Ok(None);
        };

        let (kind, unclaimed) = match self.assemblers.remove(&id) {
            Some((_, mut assembler)) => (assembler.kind(), assembler.subscribe()),
            None => (kind, None),
        };
        let unclaimed = unclaimed.filter(|_| kind == StreamKind::Attachment);
        finished.remember(id, unclaimed);
        Ok(Some(CompletedStream { id, kind, content }))
    }

    /// Cancel the stream `id`.
    ///
    /// Returns `true` if an in-flight stream was cancelled. Cancelling an
    /// unknown or finished stream does nothing.
    pub fn cancel(&self, id: Uuid) -> bool {
        let mut finished = self.finished();
        let Some((_, mut assembler)) = self.assemblers.remove(&id) else {
            return false;
        };
        let cancelled = assembler.cancel();
        finished.remember(id, None);
        cancelled
    }

    /// Cancel every in-flight stream, returning how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let mut finished = self.finished();
        let ids: Vec<Uuid> = self.assemblers.iter().map(|entry| *entry.key()).collect();
        let mut cancelled = 0;
        for id in ids {
            if let Some((_, mut assembler)) = self.assemblers.remove(&id) {
                if assembler.cancel() {
                    cancelled += 1;
                }
                finished.remember(id, None);
            }
        }
        cancelled
    }

    /// Whether `id` completed or was cancelled recently.
    #[must_use]
    pub fn was_finished(&self, id: Uuid) -> bool { self.finished().contains(&id) }

    /// Whether `id` currently has an in-flight assembler.
    #[must_use]
    pub fn contains(&self, id: Uuid) -> bool { self.assemblers.contains_key(&id) }

    /// Number of in-flight assemblers.
    #[must_use]
    pub fn len(&self) -> usize { self.assemblers.len() }

    /// Whether no stream is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.assemblers.is_empty() }
}

impl Default for StreamManager {
    fn default() -> Self { Self::new(crate::config::DEFAULT_COMPLETED_ID_WINDOW) }
}
