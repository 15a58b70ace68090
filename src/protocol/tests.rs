//! Unit tests for the protocol adapter.

use std::{sync::Arc, time::Duration};

use bytes::BytesMut;
use rstest::rstest;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex},
    time::timeout,
};
use tokio_util::{codec::Decoder, sync::CancellationToken};
use uuid::Uuid;

use super::*;
use crate::{
    ProtocolConfig,
    disconnect::DisconnectReason,
    frame::{Frame, FrameCodec},
    header::{Header, PayloadType},
    message::{ReceiveRequest, StreamingRequest, StreamingResponse},
    payload::{ConnectError, ReceiverEvent},
    request::RequestError,
    stream::StreamKind,
    transport::StreamTransport,
};

const WAIT: Duration = Duration::from_secs(5);

async fn echo(request: ReceiveRequest) -> Result<StreamingResponse, BoxError> {
    match request.path() {
        "/fail" => Err("handler refused".into()),
        "/panic" => panic!("handler exploded"),
        _ => {
            let path = request.path().to_owned();
            let body = request.read_body_as_string().await?.unwrap_or_default();
            Ok(StreamingResponse::ok().with_text_body(format!("{path}:{body}")))
        }
    }
}

fn connected(config: ProtocolConfig) -> (ProtocolAdapter, ProtocolAdapter) {
    let (left, right) = duplex(64 * 1024);
    let client = ProtocolAdapter::new(echo, config);
    let server = ProtocolAdapter::new(echo, config);
    client
        .connect(Arc::new(StreamTransport::new(left)))
        .expect("client connects");
    server
        .connect(Arc::new(StreamTransport::new(right)))
        .expect("server connects");
    (client, server)
}

/// An adapter whose peer is a raw byte stream driven by the test.
fn with_raw_peer(config: ProtocolConfig) -> (ProtocolAdapter, DuplexStream) {
    let (local, remote) = duplex(64 * 1024);
    let adapter = ProtocolAdapter::new(echo, config);
    adapter
        .connect(Arc::new(StreamTransport::new(local)))
        .expect("adapter connects");
    (adapter, remote)
}

async fn read_frame(
    stream: &mut DuplexStream,
    codec: &mut FrameCodec,
    buf: &mut BytesMut,
) -> Frame {
    loop {
        if let Some(frame) = codec.decode(buf).expect("valid frame") {
            return frame;
        }
        let read = timeout(WAIT, stream.read_buf(buf))
            .await
            .expect("frame arrives in time")
            .expect("read succeeds");
        assert!(read > 0, "peer closed before a full frame arrived");
    }
}

#[rstest]
#[case::plain("/status", None, "/status:")]
#[case::with_body("/echo", Some("hello"), "/echo:hello")]
#[tokio::test]
async fn request_round_trips_between_adapters(
    #[case] path: &str,
    #[case] body: Option<&str>,
    #[case] expected: &str,
) {
    let (client, _server) = connected(ProtocolConfig::default().max_payload_length(4));
    let mut request = StreamingRequest::post(path);
    if let Some(body) = body {
        request = request.with_text_body(body);
    }

    let response = timeout(WAIT, client.send_request(&request, &CancellationToken::new()))
        .await
        .expect("response in time")
        .expect("request succeeds");

    assert_eq!(response.status_code(), 200);
    let text = response.read_body_as_string().await.expect("body readable");
    assert_eq!(text.as_deref(), Some(expected));
    assert_eq!(client.requests().pending_count(), 0);
}

#[rstest]
#[case::handler_error("/fail")]
#[case::handler_panic("/panic")]
#[tokio::test]
async fn failing_handler_answers_500(#[case] path: &str) {
    let (client, server) = connected(ProtocolConfig::default());

    let response = timeout(
        WAIT,
        client.send_request(&StreamingRequest::get(path), &CancellationToken::new()),
    )
    .await
    .expect("response in time")
    .expect("request succeeds");

    assert_eq!(response.status_code(), 500);
    assert!(server.is_connected(), "handler failure must not drop the connection");
}

#[tokio::test]
async fn undecodable_request_is_answered_with_400() {
    let (_adapter, mut peer) = with_raw_peer(ProtocolConfig::default());
    let id = Uuid::from_u128(7);
    let header = Header::new(PayloadType::Request, 8, id, true).expect("valid header");
    peer.write_all(&header.to_bytes()).await.expect("write header");
    peer.write_all(b"not json").await.expect("write body");

    let mut codec = FrameCodec::default();
    let mut buf = BytesMut::new();
    let frame = read_frame(&mut peer, &mut codec, &mut buf).await;

    assert_eq!(frame.header().payload_type(), PayloadType::Response);
    assert_eq!(frame.header().id(), id);
    assert!(frame.header().end());
    let envelope: serde_json::Value =
        serde_json::from_slice(frame.payload()).expect("response envelope is JSON");
    assert_eq!(envelope["statusCode"], 400);
}

#[tokio::test]
async fn disconnect_rejects_pending_requests() {
    let (adapter, _peer) = with_raw_peer(ProtocolConfig::default());
    let cancel = CancellationToken::new();
    let waiting = {
        let adapter = adapter.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            adapter
                .send_request(&StreamingRequest::get("/slow"), &cancel)
                .await
        })
    };
    timeout(WAIT, async {
        while adapter.requests().pending_count() == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("request registered");

    assert!(adapter.disconnect());

    let outcome = timeout(WAIT, waiting)
        .await
        .expect("request resolves")
        .expect("task completes");
    assert!(matches!(
        outcome,
        Err(RequestError::Disconnected(DisconnectReason::Local))
    ));
    timeout(WAIT, adapter.closed()).await.expect("adapter closes");
    assert!(!adapter.is_connected());
    assert_eq!(adapter.requests().pending_count(), 0);
}

#[tokio::test]
async fn peer_closing_rejects_pending_requests() {
    let (adapter, peer) = with_raw_peer(ProtocolConfig::default());
    let waiting = {
        let adapter = adapter.clone();
        tokio::spawn(async move {
            adapter
                .send_request(&StreamingRequest::get("/slow"), &CancellationToken::new())
                .await
        })
    };
    timeout(WAIT, async {
        while adapter.requests().pending_count() == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("request registered");

    drop(peer);

    let outcome = timeout(WAIT, waiting)
        .await
        .expect("request resolves")
        .expect("task completes");
    assert!(matches!(outcome, Err(RequestError::Disconnected(_))));
}

#[tokio::test]
async fn request_times_out_without_a_response() {
    let config = ProtocolConfig::default().request_timeout(Some(Duration::from_millis(50)));
    let (adapter, _peer) = with_raw_peer(config);

    let outcome = timeout(
        WAIT,
        adapter.send_request(&StreamingRequest::get("/slow"), &CancellationToken::new()),
    )
    .await
    .expect("timeout fires first");

    assert!(matches!(outcome, Err(RequestError::TimedOut { .. })));
    assert_eq!(adapter.requests().pending_count(), 0);
    assert!(adapter.is_connected(), "a timeout leaves the connection up");
}

#[tokio::test]
async fn cancellation_token_abandons_the_wait() {
    let (adapter, _peer) = with_raw_peer(ProtocolConfig::default());
    let cancel = CancellationToken::new();
    let waiting = {
        let adapter = adapter.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            adapter
                .send_request(&StreamingRequest::get("/slow"), &cancel)
                .await
        })
    };
    timeout(WAIT, async {
        while adapter.requests().pending_count() == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("request registered");

    cancel.cancel();

    let outcome = timeout(WAIT, waiting)
        .await
        .expect("request resolves")
        .expect("task completes");
    assert!(matches!(outcome, Err(RequestError::Cancelled { .. })));
    assert_eq!(adapter.requests().pending_count(), 0);
}

#[tokio::test]
async fn response_to_unknown_request_is_ignored() {
    let (adapter, mut peer) = with_raw_peer(ProtocolConfig::default());
    let mut events = adapter.events();
    let id = Uuid::from_u128(9);
    let body = br#"{"statusCode":200,"streams":[]}"#;
    let header = Header::new(PayloadType::Response, body.len(), id, true).expect("valid header");
    peer.write_all(&header.to_bytes()).await.expect("write header");
    peer.write_all(body).await.expect("write body");

    let completed = timeout(WAIT, async {
        loop {
            if let ReceiverEvent::StreamCompleted { id, .. } =
                events.recv().await.expect("event delivered")
            {
                return id;
            }
        }
    })
    .await
    .expect("stream completes in time");

    assert_eq!(completed, id);
    assert!(adapter.is_connected());
    assert_eq!(adapter.requests().pending_count(), 0);
}

#[test]
fn on_cancel_stream_never_fails() {
    let adapter = ProtocolAdapter::new(echo, ProtocolConfig::default());
    let id = Uuid::from_u128(3);

    assert!(!adapter.on_cancel_stream(id));
    assert!(adapter.streams().get_or_create(id, StreamKind::Attachment));
    assert!(adapter.on_cancel_stream(id));
    assert!(!adapter.on_cancel_stream(id));
}

#[tokio::test]
async fn adapter_serves_a_single_connection() {
    let (adapter, _peer) = with_raw_peer(ProtocolConfig::default());
    let (spare, _other) = duplex(64);

    let err = adapter
        .connect(Arc::new(StreamTransport::new(spare)))
        .expect_err("already connected");
    assert_eq!(err, ConnectError::AlreadyConnected);

    adapter.disconnect();
    timeout(WAIT, adapter.closed()).await.expect("adapter closes");
    let (late, _late_peer) = duplex(64);
    let err = adapter
        .connect(Arc::new(StreamTransport::new(late)))
        .expect_err("connection already used");
    assert_eq!(err, ConnectError::Finished);
}

#[test]
fn unconnected_adapter_reports_its_state() {
    let adapter = ProtocolAdapter::new(echo, ProtocolConfig::default().max_payload_length(64));

    assert!(!adapter.is_connected());
    assert!(!adapter.disconnect());
    assert_eq!(adapter.config().max_payload_length_value(), 64);
    assert!(format!("{adapter:?}").contains("connected: false"));
}
