//! Fixed-width frame header shared by every frame on the wire.
//!
//! A header is 48 ASCII bytes: a one character payload type, a six digit
//! zero-padded payload length, the 36 character hyphenated correlation id and
//! a single `0`/`1` end flag, separated by dots and terminated by a newline.
//!
//! ```text
//! A.000005.11111111-1111-1111-1111-111111111111.1\n
//! ```
//!
//! [`Header`] values can only be built through [`Header::new`] or
//! [`deserialize`], so the width and range invariants hold wherever a header
//! is used.

mod codec;
pub mod error;

use std::fmt;

pub use codec::{deserialize, serialize};
pub use error::HeaderError;
use uuid::Uuid;

/// Total width of an encoded header in bytes, including the newline.
pub const HEADER_LENGTH: usize = 48;
/// Width of the payload type field.
pub const TYPE_WIDTH: usize = 1;
/// Width of the zero-padded payload length field.
pub const LENGTH_WIDTH: usize = 6;
/// Width of the hyphenated correlation id field.
pub const ID_WIDTH: usize = 36;
/// Width of the end flag field.
pub const END_WIDTH: usize = 1;
/// Largest payload length representable in the length field.
pub const MAX_PAYLOAD_LENGTH: usize = 999_999;
/// Default per-frame payload cap agreed by both peers.
pub const DEFAULT_MAX_FRAME_PAYLOAD: usize = 4096;

pub(crate) const DELIMITER: u8 = b'.';
pub(crate) const TERMINATOR: u8 = b'\n';

/// Payload type carried in the first header byte.
///
/// Unrecognised but printable tags decode to [`PayloadType::Other`] so newer
/// peers can introduce frame types without breaking older ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PayloadType {
    /// `A`: the first logical stream of a request.
    Request,
    /// `B`: the first logical stream of a response.
    Response,
    /// `S`: an attachment stream referenced from a request or response.
    Stream,
    /// `C`: abandon the stream named by the header id.
    CancelStream,
    /// `X`: abandon every in-flight stream.
    CancelAll,
    /// Any other printable ASCII tag, preserved verbatim.
    Other(UnknownTag),
}

/// A payload type tag this crate does not interpret.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UnknownTag(u8);

impl UnknownTag {
    /// Return the raw tag byte.
    #[must_use]
    pub const fn get(self) -> u8 { self.0 }
}

impl fmt::Display for UnknownTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", char::from(self.0)) }
}

impl PayloadType {
    /// Parse a payload type from its tag byte.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError::MalformedType`] when `tag` is not a printable
    /// ASCII character or collides with the field delimiter.
    ///
    /// # Examples
    ///
    /// ```
    /// use streamwire::header::PayloadType;
    ///
    /// assert_eq!(PayloadType::from_byte(b'A').expect("valid tag"), PayloadType::Request);
    /// assert_eq!(PayloadType::from_byte(b'Z').expect("valid tag").as_byte(), b'Z');
    /// assert!(PayloadType::from_byte(b'\n').is_err());
    /// ```
    pub const fn from_byte(tag: u8) -> Result<Self, HeaderError> {
        match tag {
            b'A' => Ok(Self::Request),
            b'B' => Ok(Self::Response),
            b'S' => Ok(Self::Stream),
            b'C' => Ok(Self::CancelStream),
            b'X' => Ok(Self::CancelAll),
            DELIMITER => Err(HeaderError::MalformedType),
            other if other.is_ascii_graphic() => Ok(Self::Other(UnknownTag(other))),
            _ => Err(HeaderError::MalformedType),
        }
    }

    /// Return the tag byte written on the wire.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Request => b'A',
            Self::Response => b'B',
            Self::Stream => b'S',
            Self::CancelStream => b'C',
            Self::CancelAll => b'X',
            Self::Other(tag) => tag.0,
        }
    }

    /// Whether frames of this type carry stream content.
    #[must_use]
    pub const fn carries_content(self) -> bool {
        matches!(self, Self::Request | Self::Response | Self::Stream)
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", char::from(self.as_byte()))
    }
}

/// Validated per-frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Header {
    payload_type: PayloadType,
    payload_length: usize,
    id: Uuid,
    end: bool,
}

impl Header {
    /// Build a header, rejecting lengths the wire format cannot carry.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError::LengthTooLarge`] if `payload_length` exceeds
    /// [`MAX_PAYLOAD_LENGTH`].
    ///
    /// # Examples
    ///
    /// ```
    /// use streamwire::header::{Header, PayloadType};
    /// use uuid::Uuid;
    ///
    /// let header = Header::new(PayloadType::Stream, 12, Uuid::nil(), false).expect("valid header");
    /// assert_eq!(header.payload_length(), 12);
    /// assert!(Header::new(PayloadType::Stream, 1_000_000, Uuid::nil(), true).is_err());
    /// ```
    pub const fn new(
        payload_type: PayloadType,
        payload_length: usize,
        id: Uuid,
        end: bool,
    ) -> Result<Self, HeaderError> {
        if payload_length > MAX_PAYLOAD_LENGTH {
            return Err(HeaderError::LengthTooLarge {
                length: payload_length,
                limit: MAX_PAYLOAD_LENGTH,
            });
        }
        Ok(Self {
            payload_type,
            payload_length,
            id,
            end,
        })
    }

    /// Payload type tag.
    #[must_use]
    pub const fn payload_type(&self) -> PayloadType { self.payload_type }

    /// Number of content bytes following this header.
    #[must_use]
    pub const fn payload_length(&self) -> usize { self.payload_length }

    /// Correlation id of the logical stream this frame belongs to.
    #[must_use]
    pub const fn id(&self) -> Uuid { self.id }

    /// Whether this frame terminates its logical stream.
    #[must_use]
    pub const fn end(&self) -> bool { self.end }

    /// Encode the header into its fixed-width wire form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_LENGTH] { codec::encode_fixed(self) }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:06}.{}.{}",
            self.payload_type,
            self.payload_length,
            self.id.hyphenated(),
            u8::from(self.end)
        )
    }
}

#[cfg(test)]
mod tests;
