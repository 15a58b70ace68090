//! Request/response façade over one connection.
//!
//! [`ProtocolAdapter`] wires a [`PayloadSender`](crate::payload::PayloadSender),
//! a [`PayloadReceiver`](crate::payload::PayloadReceiver) and a
//! [`RequestHandler`] to a single transport. Inbound requests are answered by
//! the handler; inbound responses wake the matching
//! [`send_request`](ProtocolAdapter::send_request) call.

mod adapter;
mod handler;

pub use adapter::ProtocolAdapter;
pub use handler::{BoxError, RequestHandler};

#[cfg(test)]
mod tests;
