//! Scripted in-memory transport.

use std::{
    collections::VecDeque,
    io,
    sync::{
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use streamwire::transport::Transport;
use tokio::sync::Notify;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Transport that replays queued inbound chunks and records outbound bytes.
///
/// Each inbound chunk is returned by at most one `receive` call, split if the
/// caller asks for fewer bytes, so tests control exactly how reads are
/// fragmented. Once the script is exhausted `receive` reports end of stream,
/// unless [`hold_open`](Self::hold_open) was called, in which case it waits
/// for more chunks or for [`close`](Transport::close).
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    inbound: Mutex<VecDeque<Bytes>>,
    written: Mutex<BytesMut>,
    arrivals: Notify,
    hold_open: AtomicBool,
    closed: AtomicBool,
    fail_writes: AtomicBool,
    max_write: AtomicUsize,
}

impl ScriptedTransport {
    /// Create a transport that yields `chunks` in order.
    pub fn new<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            inbound: Mutex::new(chunks.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Keep the transport open after the script runs dry.
    #[must_use]
    pub fn hold_open(self) -> Self {
        self.hold_open.store(true, Ordering::Release);
        self
    }

    /// Accept at most `max_write` bytes per `send` call.
    #[must_use]
    pub fn max_write(self, max_write: usize) -> Self {
        self.max_write.store(max_write.max(1), Ordering::Release);
        self
    }

    /// Queue another inbound chunk.
    pub fn push_inbound(&self, chunk: impl Into<Bytes>) {
        lock(&self.inbound).push_back(chunk.into());
        self.arrivals.notify_waiters();
    }

    /// Make every subsequent `send` fail with a broken pipe.
    pub fn fail_writes(&self) { self.fail_writes.store(true, Ordering::Release); }

    /// Everything written so far.
    #[must_use]
    pub fn written(&self) -> Bytes { lock(&self.written).clone().freeze() }

    /// Inbound chunks not yet consumed.
    #[must_use]
    pub fn pending_inbound(&self) -> usize { lock(&self.inbound).len() }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, buf: &[u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::Acquire) {
            return Err(io::ErrorKind::NotConnected.into());
        }
        if self.fail_writes.load(Ordering::Acquire) {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        let accepted = match self.max_write.load(Ordering::Acquire) {
            0 => buf.len(),
            limit => buf.len().min(limit),
        };
        lock(&self.written).extend_from_slice(&buf[..accepted]);
        Ok(accepted)
    }

    async fn receive(&self, max_len: usize) -> io::Result<Bytes> {
        loop {
            let arrival = self.arrivals.notified();
            {
                let mut inbound = lock(&self.inbound);
                if let Some(mut chunk) = inbound.pop_front() {
                    if chunk.len() > max_len {
                        inbound.push_front(chunk.split_off(max_len));
                    }
                    return Ok(chunk);
                }
            }
            if self.closed.load(Ordering::Acquire) || !self.hold_open.load(Ordering::Acquire) {
                return Ok(Bytes::new());
            }
            arrival.await;
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.arrivals.notify_waiters();
    }

    fn is_connected(&self) -> bool { !self.closed.load(Ordering::Acquire) }
}
