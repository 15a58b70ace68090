//! Requests and responses carried over logical streams.
//!
//! A request or response body is a JSON envelope sent as the top-level
//! stream (`A` or `B` frames). Its `streams` array names the attachment
//! streams (`S` frames) that follow it on the wire:
//!
//! ```json
//! {"verb":"POST","path":"/api/messages","streams":[
//!     {"id":"9f3c...","type":"application/json; charset=utf-8","length":42}
//! ]}
//! ```

mod envelope;
mod outgoing;
mod received;

pub use envelope::{
    RequestEnvelope,
    ResponseEnvelope,
    StreamDescription,
    peek_stream_descriptions,
};
pub use outgoing::{
    JSON_CONTENT_TYPE,
    OutgoingStream,
    StreamingRequest,
    StreamingResponse,
    TEXT_CONTENT_TYPE,
};
pub use received::{
    AssembledPayload,
    ContentStream,
    ReadError,
    ReceiveRequest,
    ReceiveResponse,
};
