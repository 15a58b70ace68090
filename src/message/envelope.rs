//! JSON envelopes exchanged as top-level stream bodies.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Manifest entry naming one attachment stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescription {
    /// Id of the attachment stream.
    pub id: Uuid,
    /// Content type of the attachment, if declared.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Total attachment length, if declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
}

/// Body of a request stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Request verb such as `GET` or `POST`.
    pub verb: String,
    /// Request path.
    pub path: String,
    /// Attachments that follow the envelope.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub streams: Vec<StreamDescription>,
}

/// Body of a response stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Status code, HTTP style.
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// Attachments that follow the envelope.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub streams: Vec<StreamDescription>,
}

#[derive(Deserialize)]
struct Manifest {
    #[serde(default)]
    streams: Vec<StreamDescription>,
}

/// Extract the attachment manifest from a top-level body.
///
/// Bodies that are not JSON objects, or whose manifest does not parse,
/// reference no attachments.
///
/// # Examples
///
/// ```
/// use streamwire::message::peek_stream_descriptions;
///
/// let body = br#"{"verb":"GET","path":"/","streams":[{"id":"00000000-0000-0000-0000-000000000001"}]}"#;
/// assert_eq!(peek_stream_descriptions(body).len(), 1);
/// assert!(peek_stream_descriptions(b"hello").is_empty());
/// ```
#[must_use]
pub fn peek_stream_descriptions(body: &[u8]) -> Vec<StreamDescription> {
    serde_json::from_slice::<Manifest>(body)
        .map(|manifest| manifest.streams)
        .unwrap_or_default()
}
