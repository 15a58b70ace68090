//! `tokio-util` codec for header-prefixed frames.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{Frame, FrameError};
use crate::header::{
    self,
    DEFAULT_MAX_FRAME_PAYLOAD,
    HEADER_LENGTH,
    Header,
    HeaderError,
    MAX_PAYLOAD_LENGTH,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DecodeState {
    Header,
    Payload(Header),
}

/// Splits a byte stream into [`Frame`]s and writes frames back out.
///
/// The decoder never consumes a header until all [`HEADER_LENGTH`] bytes are
/// buffered, and never yields a frame until every declared payload byte has
/// arrived. [`FrameCodec::bytes_needed`] tells a reader exactly how many more
/// bytes complete the current header or payload.
#[derive(Clone, Debug)]
pub struct FrameCodec {
    max_payload_length: usize,
    state: DecodeState,
}

impl FrameCodec {
    /// Create a codec that rejects frames larger than `max_payload_length`.
    ///
    /// The cap is clamped to `1..=`[`MAX_PAYLOAD_LENGTH`].
    #[must_use]
    pub fn new(max_payload_length: usize) -> Self {
        Self {
            max_payload_length: max_payload_length.clamp(1, MAX_PAYLOAD_LENGTH),
            state: DecodeState::Header,
        }
    }

    /// Maximum payload bytes accepted per frame.
    #[must_use]
    pub const fn max_payload_length(&self) -> usize { self.max_payload_length }

    /// Bytes still required to finish the current header or payload, given
    /// `buffered` bytes already held by the caller.
    ///
    /// # Examples
    ///
    /// ```
    /// use streamwire::{frame::FrameCodec, header::HEADER_LENGTH};
    ///
    /// let codec = FrameCodec::default();
    /// assert_eq!(codec.bytes_needed(0), HEADER_LENGTH);
    /// assert_eq!(codec.bytes_needed(40), HEADER_LENGTH - 40);
    /// ```
    #[must_use]
    pub fn bytes_needed(&self, buffered: usize) -> usize {
        let target = match self.state {
            DecodeState::Header => HEADER_LENGTH,
            DecodeState::Payload(header) => header.payload_length(),
        };
        target.saturating_sub(buffered).max(1)
    }
}

impl Default for FrameCodec {
    fn default() -> Self { Self::new(DEFAULT_MAX_FRAME_PAYLOAD) }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let DecodeState::Header = self.state {
            if src.len() < HEADER_LENGTH {
                return Ok(None);
            }
            let raw = src.split_to(HEADER_LENGTH);
            let header = header::deserialize(&raw)?;
            if header.payload_length() > self.max_payload_length {
                return Err(HeaderError::LengthTooLarge {
                    length: header.payload_length(),
                    limit: self.max_payload_length,
                }
                .into());
            }
            self.state = DecodeState::Payload(header);
        }

        let DecodeState::Payload(header) = self.state else {
            return Ok(None);
        };
        if src.len() < header.payload_length() {
            src.reserve(header.payload_length() - src.len());
            return Ok(None);
        }
        let payload = src.split_to(header.payload_length()).freeze();
        self.state = DecodeState::Header;
        Frame::new(header, payload).map(Some)
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (header, payload) = frame.into_parts();
        if header.payload_length() > self.max_payload_length {
            return Err(HeaderError::LengthTooLarge {
                length: header.payload_length(),
                limit: self.max_payload_length,
            }
            .into());
        }
        dst.reserve(HEADER_LENGTH + payload.len());
        dst.put_slice(&header.to_bytes());
        dst.put_slice(&payload);
        Ok(())
    }
}
