//! Abstract duplex byte channel underneath a connection.
//!
//! The protocol layers never touch sockets directly. They drive a
//! [`Transport`], which can be a TCP stream, a Unix socket, a named pipe or
//! an in-memory pipe in tests.

use std::{
    io,
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf},
    sync::Mutex,
};

/// Full-duplex byte channel used by the payload sender and receiver.
///
/// Reads and writes happen from different tasks, so implementations must
/// allow a `send` and a `receive` to be in flight at the same time.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Write some prefix of `buf`, returning the number of bytes accepted.
    ///
    /// A return value of `0` for a non-empty buffer means the channel can no
    /// longer accept data.
    async fn send(&self, buf: &[u8]) -> io::Result<usize>;

    /// Read at most `max_len` bytes. An empty result signals end of stream.
    async fn receive(&self, max_len: usize) -> io::Result<Bytes>;

    /// Close the channel. Further sends fail and further receives report
    /// end of stream.
    async fn close(&self);

    /// Whether the channel is still open.
    fn is_connected(&self) -> bool;
}

/// [`Transport`] over any tokio byte stream.
///
/// ```no_run
/// use streamwire::transport::StreamTransport;
/// use tokio::net::TcpStream;
///
/// # async fn demo() -> std::io::Result<()> {
/// let stream = TcpStream::connect("127.0.0.1:7878").await?;
/// let transport = StreamTransport::new(stream);
/// # drop(transport);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct StreamTransport<T> {
    reader: Mutex<ReadHalf<T>>,
    writer: Mutex<WriteHalf<T>>,
    connected: AtomicBool,
}

impl<T> StreamTransport<T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Wrap `io`, splitting it into independently locked halves.
    pub fn new(io: T) -> Self {
        let (reader, writer) = tokio::io::split(io);
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            connected: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl<T> Transport for StreamTransport<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn send(&self, buf: &[u8]) -> io::Result<usize> {
        if !self.is_connected() {
            return Err(io::ErrorKind::NotConnected.into());
        }
        let mut writer = self.writer.lock().await;
        let written = writer.write(buf).await?;
        writer.flush().await?;
        Ok(written)
    }

    async fn receive(&self, max_len: usize) -> io::Result<Bytes> {
        if !self.is_connected() {
            return Ok(Bytes::new());
        }
        let mut buf = BytesMut::zeroed(max_len);
        let read = self.reader.lock().await.read(&mut buf).await?;
        buf.truncate(read);
        Ok(buf.freeze())
    }

    async fn close(&self) {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return;
        }
        // A send blocked on a stalled peer holds the writer; the stream
        // closes when the transport is dropped instead.
        let Ok(mut writer) = self.writer.try_lock() else {
            tracing::debug!("write in flight; skipping transport shutdown");
            return;
        };
        if let Err(err) = writer.shutdown().await {
            tracing::debug!(error = %err, "transport shutdown failed");
        }
    }

    fn is_connected(&self) -> bool { self.connected.load(Ordering::Acquire) }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use tokio::{io::duplex, time::timeout};

    use super::*;

    #[tokio::test]
    async fn bytes_cross_a_duplex_pipe() {
        let (left, right) = duplex(64);
        let left = StreamTransport::new(left);
        let right = StreamTransport::new(right);

        assert_eq!(left.send(b"ping").await.expect("send"), 4);
        let received = right.receive(16).await.expect("receive");

        assert_eq!(&received[..], b"ping");
    }

    #[tokio::test]
    async fn close_yields_eof_to_the_peer() {
        let (left, right) = duplex(64);
        let left = StreamTransport::new(left);
        let right = StreamTransport::new(right);

        left.close().await;

        assert!(!left.is_connected());
        assert!(right.receive(16).await.expect("receive").is_empty());
        assert!(left.send(b"late").await.is_err());
    }

    #[tokio::test]
    async fn close_does_not_wait_for_a_stalled_send() {
        let (left, _right) = duplex(4);
        let left = Arc::new(StreamTransport::new(left));
        assert_eq!(left.send(b"full").await.expect("send"), 4);
        let stalled = tokio::spawn({
            let left = Arc::clone(&left);
            async move { left.send(b"more").await }
        });
        tokio::task::yield_now().await;

        timeout(Duration::from_secs(5), left.close())
            .await
            .expect("close returns while a send is blocked");

        assert!(!left.is_connected());
        stalled.abort();
    }
}
