//! Text codec for the fixed-width header.

use uuid::Uuid;

use super::{
    DELIMITER,
    END_WIDTH,
    HEADER_LENGTH,
    Header,
    HeaderError,
    ID_WIDTH,
    LENGTH_WIDTH,
    PayloadType,
    TERMINATOR,
    TYPE_WIDTH,
};

/// Offsets of the hyphens inside a canonical GUID.
const HYPHEN_POSITIONS: [usize; 4] = [8, 13, 18, 23];

/// Write `header` into the first [`HEADER_LENGTH`] bytes of `dest`.
///
/// # Errors
///
/// Returns [`HeaderError::BufferTooSmall`] if `dest` is shorter than a header.
///
/// # Examples
///
/// ```
/// use streamwire::header::{HEADER_LENGTH, Header, PayloadType, serialize};
/// use uuid::Uuid;
///
/// let header = Header::new(PayloadType::Request, 5, Uuid::nil(), true).expect("valid header");
/// let mut buf = [0_u8; HEADER_LENGTH];
/// serialize(&header, &mut buf).expect("buffer is large enough");
/// assert_eq!(&buf[..9], b"A.000005.");
/// ```
pub fn serialize(header: &Header, dest: &mut [u8]) -> Result<(), HeaderError> {
    let found = dest.len();
    let Some(slot) = dest.get_mut(..HEADER_LENGTH) else {
        return Err(HeaderError::BufferTooSmall {
            required: HEADER_LENGTH,
            found,
        });
    };
    slot.copy_from_slice(&encode_fixed(header));
    Ok(())
}

/// Parse a header from the first [`HEADER_LENGTH`] bytes of `buf`.
///
/// Fields are checked in wire order (count, type, length, id, end) and the
/// first violation is reported.
///
/// # Errors
///
/// Returns the [`HeaderError`] describing the first malformed field, or
/// [`HeaderError::Truncated`] if `buf` is shorter than a header.
///
/// # Examples
///
/// ```
/// use streamwire::header::{PayloadType, deserialize};
///
/// let header = deserialize(b"A.000005.11111111-1111-1111-1111-111111111111.1\n")
///     .expect("well-formed header");
/// assert_eq!(header.payload_type(), PayloadType::Request);
/// assert_eq!(header.payload_length(), 5);
/// assert!(header.end());
/// ```
pub fn deserialize(buf: &[u8]) -> Result<Header, HeaderError> {
    let Some(raw) = buf.get(..HEADER_LENGTH) else {
        return Err(HeaderError::Truncated {
            required: HEADER_LENGTH,
            found: buf.len(),
        });
    };
    let Some((&TERMINATOR, body)) = raw.split_last() else {
        return Err(HeaderError::Malformed);
    };

    let fields: Vec<&[u8]> = body.split(|byte| *byte == DELIMITER).collect();
    let [type_field, length_field, id_field, end_field] = fields.as_slice() else {
        return Err(HeaderError::Malformed);
    };
    let payload_type = parse_type(type_field)?;
    let payload_length = parse_length(length_field)?;
    let id = parse_id(id_field)?;
    let end = parse_end(end_field)?;

    Header::new(payload_type, payload_length, id, end)
}

fn parse_type(field: &[u8]) -> Result<PayloadType, HeaderError> {
    match field {
        [tag] => PayloadType::from_byte(*tag),
        _ => Err(HeaderError::MalformedType),
    }
}

fn parse_length(field: &[u8]) -> Result<usize, HeaderError> {
    if field.len() != LENGTH_WIDTH || !field.iter().all(u8::is_ascii_digit) {
        return Err(HeaderError::MalformedLength);
    }
    Ok(field
        .iter()
        .fold(0_usize, |acc, digit| acc * 10 + usize::from(digit - b'0')))
}

fn parse_id(field: &[u8]) -> Result<Uuid, HeaderError> {
    if field.len() != ID_WIDTH {
        return Err(HeaderError::MalformedId);
    }
    let canonical = field.iter().enumerate().all(|(pos, byte)| {
        if HYPHEN_POSITIONS.contains(&pos) {
            *byte == b'-'
        } else {
            byte.is_ascii_hexdigit()
        }
    });
    if !canonical {
        return Err(HeaderError::MalformedId);
    }
    Uuid::try_parse_ascii(field).map_err(|_| HeaderError::MalformedId)
}

fn parse_end(field: &[u8]) -> Result<bool, HeaderError> {
    match field {
        [b'1'] => Ok(true),
        [b'0'] => Ok(false),
        _ => Err(HeaderError::MalformedEnd),
    }
}

/// Lay out a validated header. Widths are guaranteed by [`Header::new`].
pub(super) fn encode_fixed(header: &Header) -> [u8; HEADER_LENGTH] {
    const LENGTH_START: usize = TYPE_WIDTH + 1;
    const ID_START: usize = LENGTH_START + LENGTH_WIDTH + 1;
    const END_START: usize = ID_START + ID_WIDTH + 1;

    let mut out = [DELIMITER; HEADER_LENGTH];
    out[0] = header.payload_type().as_byte();

    let mut remaining = header.payload_length();
    for slot in out[LENGTH_START..LENGTH_START + LENGTH_WIDTH].iter_mut().rev() {
        *slot = b'0' + u8::try_from(remaining % 10).unwrap_or(0);
        remaining /= 10;
    }

    header
        .id()
        .hyphenated()
        .encode_lower(&mut out[ID_START..ID_START + ID_WIDTH]);
    out[END_START..END_START + END_WIDTH].copy_from_slice(if header.end() { b"1" } else { b"0" });
    out[HEADER_LENGTH - 1] = TERMINATOR;
    out
}
