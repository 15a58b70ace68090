//! Requests and responses reassembled from the peer's streams.

use std::string::FromUtf8Error;

use bytes::Bytes;
use thiserror::Error;
use uuid::Uuid;

use super::{RequestEnvelope, ResponseEnvelope, StreamDescription};
use crate::stream::{StreamCancelled, StreamContent};

/// Errors raised while reading an attachment.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The attachment was abandoned before it completed.
    #[error(transparent)]
    Cancelled(#[from] StreamCancelled),
    /// The attachment is not valid UTF-8.
    #[error("attachment is not valid utf-8: {0}")]
    Utf8(#[from] FromUtf8Error),
}

/// An inbound attachment whose bytes may still be arriving.
#[derive(Debug)]
pub struct ContentStream {
    description: StreamDescription,
    content: StreamContent,
}

impl ContentStream {
    /// Pair a manifest entry with the future resolving its content.
    pub fn new(description: StreamDescription, content: StreamContent) -> Self {
        Self {
            description,
            content,
        }
    }

    /// Attachment id.
    #[must_use]
    pub const fn id(&self) -> Uuid { self.description.id }

    /// Declared content type.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> { self.description.content_type.as_deref() }

    /// Declared length.
    #[must_use]
    pub const fn length(&self) -> Option<usize> { self.description.length }

    /// Manifest entry for this attachment.
    #[must_use]
    pub const fn description(&self) -> &StreamDescription { &self.description }

    /// Wait for every byte of the attachment.
    ///
    /// # Errors
    ///
    /// Returns [`StreamCancelled`] if the stream was abandoned.
    pub async fn read_to_end(self) -> Result<Bytes, StreamCancelled> { self.content.await }

    /// Wait for the attachment and decode it as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns [`ReadError`] if the stream was abandoned or is not UTF-8.
    pub async fn read_to_string(self) -> Result<String, ReadError> {
        let bytes = self.read_to_end().await?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }
}

/// A completed top-level stream with its attachments.
#[derive(Debug)]
pub struct AssembledPayload {
    /// Correlation id shared with the matching request or response.
    pub id: Uuid,
    /// Envelope bytes.
    pub body: Bytes,
    /// Attachments named by the envelope manifest.
    pub streams: Vec<ContentStream>,
}

/// A request received from the peer.
#[derive(Debug)]
pub struct ReceiveRequest {
    id: Uuid,
    verb: String,
    path: String,
    streams: Vec<ContentStream>,
}

impl ReceiveRequest {
    /// Build a request directly, typically for exercising handlers.
    pub fn new(
        id: Uuid,
        verb: impl Into<String>,
        path: impl Into<String>,
        streams: Vec<ContentStream>,
    ) -> Self {
        Self {
            id,
            verb: verb.into(),
            path: path.into(),
            streams,
        }
    }

    /// Decode the envelope of `payload`.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the body is not a request envelope.
    pub fn from_payload(payload: AssembledPayload) -> Result<Self, serde_json::Error> {
        let envelope: RequestEnvelope = serde_json::from_slice(&payload.body)?;
        Ok(Self::new(
            payload.id,
            envelope.verb,
            envelope.path,
            payload.streams,
        ))
    }

    /// Correlation id.
    #[must_use]
    pub const fn id(&self) -> Uuid { self.id }

    /// Request verb.
    #[must_use]
    pub fn verb(&self) -> &str { &self.verb }

    /// Request path.
    #[must_use]
    pub fn path(&self) -> &str { &self.path }

    /// Attachments in manifest order.
    #[must_use]
    pub fn streams(&self) -> &[ContentStream] { &self.streams }

    /// Take ownership of the attachments.
    #[must_use]
    pub fn into_streams(self) -> Vec<ContentStream> { self.streams }

    /// Read the first attachment as text, if there is one.
    ///
    /// # Errors
    ///
    /// Returns [`ReadError`] if the attachment was cancelled or is not UTF-8.
    pub async fn read_body_as_string(self) -> Result<Option<String>, ReadError> {
        match self.streams.into_iter().next() {
            Some(stream) => stream.read_to_string().await.map(Some),
            None => Ok(None),
        }
    }
}

/// A response received from the peer.
#[derive(Debug)]
pub struct ReceiveResponse {
    id: Uuid,
    status_code: u16,
    streams: Vec<ContentStream>,
}

impl ReceiveResponse {
    /// Build a response directly.
    #[must_use]
    pub fn new(id: Uuid, status_code: u16, streams: Vec<ContentStream>) -> Self {
        Self {
            id,
            status_code,
            streams,
        }
    }

    /// Decode the envelope of `payload`.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the body is not a response envelope.
    pub fn from_payload(payload: AssembledPayload) -> Result<Self, serde_json::Error> {
        let envelope: ResponseEnvelope = serde_json::from_slice(&payload.body)?;
        Ok(Self::new(payload.id, envelope.status_code, payload.streams))
    }

    /// Correlation id of the request this answers.
    #[must_use]
    pub const fn id(&self) -> Uuid { self.id }

    /// Status code.
    #[must_use]
    pub const fn status_code(&self) -> u16 { self.status_code }

    /// Attachments in manifest order.
    #[must_use]
    pub fn streams(&self) -> &[ContentStream] { &self.streams }

    /// Take ownership of the attachments.
    #[must_use]
    pub fn into_streams(self) -> Vec<ContentStream> { self.streams }

    /// Read the first attachment as text, if there is one.
    ///
    /// # Errors
    ///
    /// Returns [`ReadError`] if the attachment was cancelled or is not UTF-8.
    pub async fn read_body_as_string(self) -> Result<Option<String>, ReadError> {
        match self.streams.into_iter().next() {
            Some(stream) => stream.read_to_string().await.map(Some),
            None => Ok(None),
        }
    }
}
