//! Helpers for building and inspecting raw wire bytes.

use bytes::{Bytes, BytesMut};
use streamwire::{
    frame::{Frame, FrameCodec},
    header::{HEADER_LENGTH, Header, MAX_PAYLOAD_LENGTH, PayloadType},
};
use tokio_util::codec::Decoder;
use uuid::Uuid;

/// Encode a single frame as header bytes followed by `content`.
///
/// # Panics
///
/// Panics if `content` is longer than a header can describe.
#[must_use]
pub fn encode_frame(payload_type: PayloadType, id: Uuid, content: &[u8], end: bool) -> Bytes {
    let header = Header::new(payload_type, content.len(), id, end).expect("content fits a frame");
    let mut buf = BytesMut::with_capacity(HEADER_LENGTH + content.len());
    buf.extend_from_slice(&header.to_bytes());
    buf.extend_from_slice(content);
    buf.freeze()
}

/// Split `wire` into frames.
///
/// # Panics
///
/// Panics if `wire` does not consist of whole, valid frames.
#[must_use]
pub fn decode_frames(wire: &[u8]) -> Vec<Frame> {
    let mut codec = FrameCodec::new(MAX_PAYLOAD_LENGTH);
    let mut buf = BytesMut::from(wire);
    let mut frames = Vec::new();
    while let Some(frame) = codec.decode(&mut buf).expect("wire holds valid frames") {
        frames.push(frame);
    }
    assert!(buf.is_empty(), "trailing partial frame: {} bytes", buf.len());
    frames
}

/// Concatenate the payloads of `frames` that carry `id`.
#[must_use]
pub fn content_for(frames: &[Frame], id: Uuid) -> Bytes {
    let mut buf = BytesMut::new();
    for frame in frames.iter().filter(|frame| frame.header().id() == id) {
        buf.extend_from_slice(frame.payload());
    }
    buf.freeze()
}

/// Split the whole frames at the front of `wire`, ignoring a trailing
/// partial frame or anything undecodable after it.
#[must_use]
pub fn decode_available(wire: &[u8]) -> Vec<Frame> {
    let mut codec = FrameCodec::new(MAX_PAYLOAD_LENGTH);
    let mut buf = BytesMut::from(wire);
    let mut frames = Vec::new();
    while let Ok(Some(frame)) = codec.decode(&mut buf) {
        frames.push(frame);
    }
    frames
}
