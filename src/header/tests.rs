//! Unit tests for the fixed-width header codec.

use proptest::prelude::*;
use rstest::rstest;
use uuid::Uuid;

use super::*;

const SAMPLE_ID: &str = "11111111-1111-1111-1111-111111111111";

fn wire(text: &str) -> &[u8] {
    assert_eq!(text.len(), HEADER_LENGTH, "fixture must be a full header: {text:?}");
    text.as_bytes()
}

#[test]
fn serializes_with_zero_padding_and_newline() {
    let id = Uuid::parse_str(SAMPLE_ID).expect("valid uuid");
    let header = Header::new(PayloadType::Request, 5, id, true).expect("valid header");

    let bytes = header.to_bytes();

    assert_eq!(&bytes[..], format!("A.000005.{SAMPLE_ID}.1\n").as_bytes());
}

#[test]
fn serialize_rejects_short_destination() {
    let header = Header::new(PayloadType::Stream, 0, Uuid::nil(), false).expect("valid header");
    let mut short = [0_u8; HEADER_LENGTH - 1];

    let err = serialize(&header, &mut short).expect_err("buffer is too small");

    assert_eq!(
        err,
        HeaderError::BufferTooSmall {
            required: HEADER_LENGTH,
            found: HEADER_LENGTH - 1,
        }
    );
}

#[test]
fn serialize_writes_only_the_header_prefix() {
    let header = Header::new(PayloadType::Response, 42, Uuid::nil(), false).expect("valid header");
    let mut buf = vec![b'#'; HEADER_LENGTH + 4];

    serialize(&header, &mut buf).expect("buffer is large enough");

    assert_eq!(&buf[HEADER_LENGTH..], b"####");
    assert_eq!(deserialize(&buf).expect("decodes"), header);
}

#[test]
fn deserializes_sample_request_header() {
    let header = deserialize(wire(
        "A.000005.11111111-1111-1111-1111-111111111111.1\n",
    ))
    .expect("valid header");

    assert_eq!(header.payload_type(), PayloadType::Request);
    assert_eq!(header.payload_length(), 5);
    assert_eq!(header.id().to_string(), SAMPLE_ID);
    assert!(header.end());
}

#[test]
fn accepts_nil_guid() {
    let header = deserialize(wire(
        "S.000000.00000000-0000-0000-0000-000000000000.0\n",
    ))
    .expect("nil guid is valid");

    assert!(header.id().is_nil());
    assert!(!header.end());
}

#[test]
fn accepts_uppercase_guid() {
    let header = deserialize(wire(
        "B.000010.ABCDEF01-2345-6789-ABCD-EF0123456789.1\n",
    ))
    .expect("uppercase hex is valid");

    assert_eq!(
        header.id(),
        Uuid::parse_str("abcdef01-2345-6789-abcd-ef0123456789").expect("valid uuid")
    );
}

#[test]
fn unknown_type_passes_through() {
    let header = deserialize(wire(
        "Q.000003.11111111-1111-1111-1111-111111111111.1\n",
    ))
    .expect("unknown tags are preserved");

    assert!(matches!(header.payload_type(), PayloadType::Other(tag) if tag.get() == b'Q'));
    assert_eq!(header.to_bytes()[0], b'Q');
}

#[rstest]
#[case::missing_field("A.000005.11111111-1111-1111-1111-111111111111X1\n", HeaderError::Malformed)]
#[case::extra_field("A.000005.11111111-1111-1111-1111-11111111111.1.\n", HeaderError::Malformed)]
#[case::missing_terminator("A.000005.11111111-1111-1111-1111-111111111111.1 ", HeaderError::Malformed)]
#[case::oversized_type("AB.00005.11111111-1111-1111-1111-111111111111.1\n", HeaderError::MalformedType)]
#[case::control_type("\t.000005.11111111-1111-1111-1111-111111111111.1\n", HeaderError::MalformedType)]
#[case::non_numeric_length("A.00x005.11111111-1111-1111-1111-111111111111.1\n", HeaderError::MalformedLength)]
#[case::negative_length("A.-00005.11111111-1111-1111-1111-111111111111.1\n", HeaderError::MalformedLength)]
#[case::overflowing_length("A.1000000.11111111-1111-1111-1111-11111111111.1\n", HeaderError::MalformedLength)]
#[case::invalid_end("A.000005.11111111-1111-1111-1111-111111111111.2\n", HeaderError::MalformedEnd)]
#[case::unhyphenated_id("A.000005.111111111111111111111111111111111111.1\n", HeaderError::MalformedId)]
#[case::non_hex_id("A.000005.zzzzzzzz-1111-1111-1111-111111111111.1\n", HeaderError::MalformedId)]
fn rejects_malformed_headers(#[case] text: &str, #[case] expected: HeaderError) {
    let err = deserialize(wire(text)).expect_err("header must be rejected");
    assert_eq!(err, expected);
}

#[test]
fn rejects_truncated_buffer() {
    let err = deserialize(b"A.000005.").expect_err("short buffer");
    assert_eq!(
        err,
        HeaderError::Truncated {
            required: HEADER_LENGTH,
            found: 9,
        }
    );
}

#[test]
fn constructor_rejects_lengths_beyond_the_field_width() {
    let err = Header::new(PayloadType::Stream, MAX_PAYLOAD_LENGTH + 1, Uuid::nil(), true)
        .expect_err("length must fit in six digits");
    assert!(matches!(err, HeaderError::LengthTooLarge { .. }));
}

#[test]
fn display_matches_wire_form_without_newline() {
    let id = Uuid::parse_str(SAMPLE_ID).expect("valid uuid");
    let header = Header::new(PayloadType::CancelStream, 0, id, true).expect("valid header");

    assert_eq!(header.to_string(), format!("C.000000.{SAMPLE_ID}.1"));
}

fn payload_type_strategy() -> impl Strategy<Value = PayloadType> {
    (0x21_u8..=0x7e)
        .prop_filter("delimiter is not a valid tag", |tag| *tag != DELIMITER)
        .prop_map(|tag| PayloadType::from_byte(tag).expect("printable tag"))
}

proptest! {
    #[test]
    fn round_trips_every_valid_header(
        payload_type in payload_type_strategy(),
        payload_length in 0..=MAX_PAYLOAD_LENGTH,
        id in any::<u128>().prop_map(Uuid::from_u128),
        end in any::<bool>(),
    ) {
        let header = Header::new(payload_type, payload_length, id, end).expect("valid header");
        let decoded = deserialize(&header.to_bytes()).expect("round trip");
        prop_assert_eq!(decoded, header);
    }
}
