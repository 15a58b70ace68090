//! Requests and responses assembled by the local side for sending.

use bytes::Bytes;
use serde::Serialize;
use uuid::Uuid;

use super::{RequestEnvelope, ResponseEnvelope, StreamDescription};

/// Content type attached to JSON bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
/// Content type attached to plain text bodies.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// One attachment stream queued for sending.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingStream {
    id: Uuid,
    content_type: Option<String>,
    content: Bytes,
}

impl OutgoingStream {
    /// Create an attachment with a fresh random id.
    pub fn new(content_type: Option<String>, content: impl Into<Bytes>) -> Self {
        Self::with_id(Uuid::new_v4(), content_type, content)
    }

    /// Create an attachment with an explicit id.
    pub fn with_id(id: Uuid, content_type: Option<String>, content: impl Into<Bytes>) -> Self {
        Self {
            id,
            content_type,
            content: content.into(),
        }
    }

    /// Attachment id.
    #[must_use]
    pub const fn id(&self) -> Uuid { self.id }

    /// Declared content type.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> { self.content_type.as_deref() }

    /// Attachment bytes.
    #[must_use]
    pub const fn content(&self) -> &Bytes { &self.content }

    /// Manifest entry describing this attachment.
    #[must_use]
    pub fn description(&self) -> StreamDescription {
        StreamDescription {
            id: self.id,
            content_type: self.content_type.clone(),
            length: Some(self.content.len()),
        }
    }
}

/// Request sent to the peer.
///
/// # Examples
///
/// ```
/// use streamwire::message::StreamingRequest;
///
/// let request = StreamingRequest::post("/api/messages").with_text_body("hello");
/// assert_eq!(request.verb(), "POST");
/// assert_eq!(request.streams().len(), 1);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamingRequest {
    verb: String,
    path: String,
    streams: Vec<OutgoingStream>,
}

impl StreamingRequest {
    /// Create a request with no attachments.
    pub fn new(verb: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            path: path.into(),
            streams: Vec::new(),
        }
    }

    /// Create a `GET` request.
    pub fn get(path: impl Into<String>) -> Self { Self::new("GET", path) }

    /// Create a `POST` request.
    pub fn post(path: impl Into<String>) -> Self { Self::new("POST", path) }

    /// Create a `PUT` request.
    pub fn put(path: impl Into<String>) -> Self { Self::new("PUT", path) }

    /// Create a `DELETE` request.
    pub fn delete(path: impl Into<String>) -> Self { Self::new("DELETE", path) }

    /// Append an attachment.
    #[must_use]
    pub fn with_stream(mut self, stream: OutgoingStream) -> Self {
        self.streams.push(stream);
        self
    }

    /// Append a plain text attachment.
    #[must_use]
    pub fn with_text_body(self, text: impl Into<String>) -> Self {
        let text: String = text.into();
        self.with_stream(OutgoingStream::new(Some(TEXT_CONTENT_TYPE.to_owned()), text))
    }

    /// Append `value` serialised as a JSON attachment.
    ///
    /// # Errors
    ///
    /// Returns the serialisation error if `value` cannot be encoded.
    pub fn with_json_body<T: Serialize>(self, value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        Ok(self.with_stream(OutgoingStream::new(Some(JSON_CONTENT_TYPE.to_owned()), body)))
    }

    /// Request verb.
    #[must_use]
    pub fn verb(&self) -> &str { &self.verb }

    /// Request path.
    #[must_use]
    pub fn path(&self) -> &str { &self.path }

    /// Attachments in sending order.
    #[must_use]
    pub fn streams(&self) -> &[OutgoingStream] { &self.streams }

    /// Envelope written as the request stream body.
    #[must_use]
    pub fn envelope(&self) -> RequestEnvelope {
        RequestEnvelope {
            verb: self.verb.clone(),
            path: self.path.clone(),
            streams: self.streams.iter().map(OutgoingStream::description).collect(),
        }
    }
}

/// Response sent back to the peer.
///
/// # Examples
///
/// ```
/// use streamwire::message::StreamingResponse;
///
/// let response = StreamingResponse::not_found();
/// assert_eq!(response.status_code(), 404);
/// assert!(response.streams().is_empty());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamingResponse {
    status_code: u16,
    streams: Vec<OutgoingStream>,
}

impl StreamingResponse {
    /// Create a response with no attachments.
    #[must_use]
    pub const fn new(status_code: u16) -> Self {
        Self {
            status_code,
            streams: Vec::new(),
        }
    }

    /// `200 OK`.
    #[must_use]
    pub const fn ok() -> Self { Self::new(200) }

    /// `400 Bad Request`.
    #[must_use]
    pub const fn bad_request() -> Self { Self::new(400) }

    /// `404 Not Found`.
    #[must_use]
    pub const fn not_found() -> Self { Self::new(404) }

    /// `500 Internal Server Error`.
    #[must_use]
    pub const fn internal_server_error() -> Self { Self::new(500) }

    /// Append an attachment.
    #[must_use]
    pub fn with_stream(mut self, stream: OutgoingStream) -> Self {
        self.streams.push(stream);
        self
    }

    /// Append a plain text attachment.
    #[must_use]
    pub fn with_text_body(self, text: impl Into<String>) -> Self {
        let text: String = text.into();
        self.with_stream(OutgoingStream::new(Some(TEXT_CONTENT_TYPE.to_owned()), text))
    }

    /// Append `value` serialised as a JSON attachment.
    ///
    /// # Errors
    ///
    /// Returns the serialisation error if `value` cannot be encoded.
    pub fn with_json_body<T: Serialize>(self, value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        Ok(self.with_stream(OutgoingStream::new(Some(JSON_CONTENT_TYPE.to_owned()), body)))
    }

    /// Status code.
    #[must_use]
    pub const fn status_code(&self) -> u16 { self.status_code }

    /// Attachments in sending order.
    #[must_use]
    pub fn streams(&self) -> &[OutgoingStream] { &self.streams }

    /// Envelope written as the response stream body.
    #[must_use]
    pub fn envelope(&self) -> ResponseEnvelope {
        ResponseEnvelope {
            status_code: self.status_code,
            streams: self.streams.iter().map(OutgoingStream::description).collect(),
        }
    }
}
