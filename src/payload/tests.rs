//! Unit tests for the payload sender, receiver and router.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use rstest::{fixture, rstest};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, duplex},
    sync::mpsc,
    time::timeout,
};
use tracing_test::traced_test;
use uuid::Uuid;

use super::*;
use crate::{
    ProtocolConfig,
    disconnect::DisconnectReason,
    header::{HEADER_LENGTH, Header, PayloadType},
    stream::{StreamKind, StreamManager},
    transport::StreamTransport,
};

const WAIT: Duration = Duration::from_secs(5);

fn wire(payload_type: PayloadType, id: Uuid, content: &[u8], end: bool) -> Vec<u8> {
    let header = Header::new(payload_type, content.len(), id, end).expect("valid header");
    let mut out = header.to_bytes().to_vec();
    out.extend_from_slice(content);
    out
}

#[fixture]
fn router() -> (PayloadAssemblerManager, mpsc::UnboundedReceiver<InboundPayload>) {
    PayloadAssemblerManager::new(Arc::new(StreamManager::new(16)))
}

#[tokio::test]
async fn sender_chunks_content_at_the_frame_cap() {
    let (local, mut remote) = duplex(4096);
    let sender = PayloadSender::new(4);
    sender
        .connect(Arc::new(StreamTransport::new(local)))
        .expect("first connect");
    let id = Uuid::from_u128(1);

    sender
        .send_payload(PayloadType::Stream, id, Bytes::from_static(b"abcdefghij"))
        .expect("queued")
        .await
        .expect("written");

    let mut expected = wire(PayloadType::Stream, id, b"abcd", false);
    expected.extend(wire(PayloadType::Stream, id, b"efgh", false));
    expected.extend(wire(PayloadType::Stream, id, b"ij", true));
    let mut received = vec![0_u8; expected.len()];
    remote.read_exact(&mut received).await.expect("read frames");
    assert_eq!(received, expected);
}

#[tokio::test]
async fn empty_content_is_a_single_final_frame() {
    let (local, mut remote) = duplex(4096);
    let sender = PayloadSender::new(16);
    sender
        .connect(Arc::new(StreamTransport::new(local)))
        .expect("first connect");

    sender
        .send_payload(PayloadType::Request, Uuid::nil(), Bytes::new())
        .expect("queued")
        .await
        .expect("written");

    let mut received = [0_u8; HEADER_LENGTH];
    remote.read_exact(&mut received).await.expect("read header");
    assert_eq!(&received[..], &wire(PayloadType::Request, Uuid::nil(), b"", true)[..]);
}

#[test]
fn sending_before_connect_fails_immediately() {
    let sender = PayloadSender::new(16);
    let err = sender
        .send_payload(PayloadType::Stream, Uuid::nil(), Bytes::from_static(b"x"))
        .expect_err("not connected");
    assert!(matches!(err, SendError::NotConnected));
    assert!(!sender.is_connected());
}

#[tokio::test]
async fn sender_connects_once() {
    let (local, _remote) = duplex(64);
    let sender = PayloadSender::new(16);
    let transport = Arc::new(StreamTransport::new(local));

    sender.connect(transport.clone()).expect("first connect");
    assert_eq!(
        sender.connect(transport.clone()).expect_err("second connect"),
        ConnectError::AlreadyConnected
    );

    assert!(sender.disconnect());
    sender.closed().await;
    assert_eq!(
        sender.connect(transport).expect_err("used up"),
        ConnectError::Finished
    );
}

#[tokio::test]
async fn short_packet_disconnects_instead_of_lying() {
    let (local, _remote) = duplex(64);
    let sender = PayloadSender::new(16);
    let signal = sender
        .connect(Arc::new(StreamTransport::new(local)))
        .expect("first connect");
    let header = Header::new(PayloadType::Stream, 10, Uuid::nil(), true).expect("valid header");

    let err = sender
        .send_packet(header, Bytes::from_static(b"short"))
        .expect_err("declared length exceeds content");

    assert!(matches!(
        err,
        SendError::LengthMismatch {
            declared: 10,
            available: 5
        }
    ));
    assert!(matches!(
        signal.triggered().await,
        DisconnectReason::InvalidFrame {
            declared: 10,
            actual: 5
        }
    ));
    assert!(!sender.is_connected());
}

#[tokio::test]
async fn surplus_packet_bytes_are_not_written() {
    let (local, mut remote) = duplex(4096);
    let sender = PayloadSender::new(16);
    sender
        .connect(Arc::new(StreamTransport::new(local)))
        .expect("first connect");
    let header = Header::new(PayloadType::Stream, 3, Uuid::nil(), true).expect("valid header");

    sender
        .send_packet(header, Bytes::from_static(b"abcdef"))
        .expect("queued")
        .await
        .expect("written");
    sender.disconnect();
    sender.closed().await;

    let mut received = Vec::new();
    remote.read_to_end(&mut received).await.expect("read until close");
    assert_eq!(received, wire(PayloadType::Stream, Uuid::nil(), b"abc", true));
}

#[tokio::test]
async fn write_failure_fails_queued_payloads() {
    let (local, remote) = duplex(64);
    drop(remote);
    let sender = PayloadSender::new(16);
    let signal = sender
        .connect(Arc::new(StreamTransport::new(local)))
        .expect("first connect");

    let first = sender
        .send_payload(PayloadType::Stream, Uuid::from_u128(1), Bytes::from_static(b"one"))
        .expect("queued");
    let second = sender.send_payload(
        PayloadType::Stream,
        Uuid::from_u128(2),
        Bytes::from_static(b"two"),
    );

    assert!(matches!(first.await, Err(SendError::Disconnected(_))));
    if let Ok(second) = second {
        assert!(matches!(second.await, Err(SendError::Disconnected(_))));
    }
    assert!(matches!(signal.triggered().await, DisconnectReason::Transport(_)));
    assert!(!sender.is_connected());
}

#[rstest]
fn router_dispatches_completed_requests(
    router: (PayloadAssemblerManager, mpsc::UnboundedReceiver<InboundPayload>),
) {
    let (router, mut inbound) = router;
    let id = Uuid::parse_str("11111111-1111-1111-1111-111111111111").expect("valid uuid");
    let header = Header::new(PayloadType::Request, 5, id, true).expect("valid header");

    assert_eq!(router.on_receive(&header, b"hello"), Some(StreamKind::Request));

    let Ok(InboundPayload::Request(payload)) = inbound.try_recv() else {
        panic!("expected a dispatched request");
    };
    assert_eq!(payload.id, id);
    assert_eq!(payload.body, Bytes::from_static(b"hello"));
    assert!(payload.streams.is_empty());
    assert!(inbound.try_recv().is_err());
}

#[rstest]
#[traced_test]
fn router_discards_late_frames(
    router: (PayloadAssemblerManager, mpsc::UnboundedReceiver<InboundPayload>),
) {
    let (router, mut inbound) = router;
    let id = Uuid::from_u128(3);
    let header = Header::new(PayloadType::Response, 2, id, true).expect("valid header");

    assert_eq!(router.on_receive(&header, b"ok"), Some(StreamKind::Response));
    assert_eq!(router.on_receive(&header, b"ok"), None);

    assert!(matches!(inbound.try_recv(), Ok(InboundPayload::Response(_))));
    assert!(inbound.try_recv().is_err());
    assert!(logs_contain("already finished"));
}

#[rstest]
#[traced_test]
fn router_discards_unknown_types(
    router: (PayloadAssemblerManager, mpsc::UnboundedReceiver<InboundPayload>),
) {
    let (router, mut inbound) = router;
    let header = Header::new(
        PayloadType::from_byte(b'Q').expect("printable tag"),
        0,
        Uuid::nil(),
        true,
    )
    .expect("valid header");

    assert_eq!(router.on_receive(&header, b""), None);
    assert!(inbound.try_recv().is_err());
    assert!(logs_contain("unknown payload type"));
}

#[rstest]
#[tokio::test]
async fn router_cancels_named_streams(
    router: (PayloadAssemblerManager, mpsc::UnboundedReceiver<InboundPayload>),
) {
    let (router, _inbound) = router;
    let id = Uuid::from_u128(4);
    let content = router
        .streams()
        .subscribe(id, StreamKind::Attachment)
        .expect("first subscriber");
    let cancel = Header::new(PayloadType::CancelStream, 0, id, true).expect("valid header");

    router.on_receive(&cancel, b"");
    router.on_receive(&cancel, b"");

    assert!(content.await.is_err());
    assert!(router.streams().is_empty());
}

#[rstest]
#[tokio::test]
async fn router_attaches_manifest_streams(
    router: (PayloadAssemblerManager, mpsc::UnboundedReceiver<InboundPayload>),
) {
    let (router, mut inbound) = router;
    let request_id = Uuid::from_u128(5);
    let attachment_id = Uuid::from_u128(6);
    let body = format!(
        r#"{{"verb":"POST","path":"/upload","streams":[{{"id":"{attachment_id}","length":4}}]}}"#
    );
    let header =
        Header::new(PayloadType::Request, body.len(), request_id, true).expect("valid header");
    router.on_receive(&header, body.as_bytes());

    let attachment =
        Header::new(PayloadType::Stream, 4, attachment_id, true).expect("valid header");
    assert_eq!(router.on_receive(&attachment, b"data"), Some(StreamKind::Attachment));

    let Ok(InboundPayload::Request(mut payload)) = inbound.try_recv() else {
        panic!("expected a dispatched request");
    };
    let stream = payload.streams.pop().expect("one attachment");
    assert_eq!(stream.id(), attachment_id);
    assert_eq!(stream.length(), Some(4));
    assert_eq!(
        stream.read_to_end().await.expect("completed"),
        Bytes::from_static(b"data")
    );
}

#[tokio::test]
async fn receiver_reassembles_fragmented_reads() {
    let (local, mut remote) = duplex(16);
    let streams = Arc::new(StreamManager::new(16));
    let (router, mut inbound) = PayloadAssemblerManager::new(streams);
    let receiver = PayloadReceiver::new(router, &ProtocolConfig::default());
    let mut events = receiver.subscribe();
    receiver
        .connect(Arc::new(StreamTransport::new(local)))
        .expect("first connect");
    let id = Uuid::from_u128(7);

    let mut bytes = wire(PayloadType::Request, id, b"hel", false);
    bytes.extend(wire(PayloadType::Request, id, b"lo", true));
    for piece in bytes.chunks(5) {
        remote.write_all(piece).await.expect("write");
    }

    let payload = timeout(WAIT, inbound.recv())
        .await
        .expect("dispatched in time")
        .expect("router alive");
    assert_eq!(payload.id(), id);
    assert!(matches!(
        events.recv().await.expect("event"),
        ReceiverEvent::HeaderReceived(header) if !header.end()
    ));
}

#[tokio::test]
async fn receiver_rejects_a_second_connect() {
    let (local, _remote) = duplex(64);
    let (router, _inbound) = PayloadAssemblerManager::new(Arc::new(StreamManager::default()));
    let receiver = PayloadReceiver::new(router, &ProtocolConfig::default());
    let transport = Arc::new(StreamTransport::new(local));

    receiver.connect(transport.clone()).expect("first connect");
    let err = receiver.connect(transport).expect_err("already connected");

    assert_eq!(err, ConnectError::AlreadyConnected);
    assert_eq!(err.to_string(), "Already connected");
}

#[tokio::test]
async fn malformed_header_disconnects_and_cancels_streams() {
    let (local, mut remote) = duplex(4096);
    let streams = Arc::new(StreamManager::new(16));
    let pending = streams
        .subscribe(Uuid::from_u128(8), StreamKind::Attachment)
        .expect("first subscriber");
    let (router, _inbound) = PayloadAssemblerManager::new(Arc::clone(&streams));
    let receiver = PayloadReceiver::new(router, &ProtocolConfig::default());
    let mut events = receiver.subscribe();
    receiver
        .connect(Arc::new(StreamTransport::new(local)))
        .expect("first connect");

    remote
        .write_all(b"A.00000x.11111111-1111-1111-1111-111111111111.1\n")
        .await
        .expect("write");

    let reason = loop {
        match timeout(WAIT, events.recv()).await.expect("event in time") {
            Ok(ReceiverEvent::Disconnected(reason)) => break reason,
            Ok(_) => {}
            Err(err) => panic!("event stream failed: {err}"),
        }
    };
    assert!(matches!(reason, DisconnectReason::Malformed(_)));
    assert!(pending.await.is_err());
    assert!(streams.is_empty());
    assert!(!receiver.is_connected());
}
