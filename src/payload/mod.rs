//! Frame-level sending and receiving for one connection.
//!
//! The [`PayloadSender`] chunks outbound payloads into frames and writes them
//! from a single task so frames never tear on the wire. The
//! [`PayloadReceiver`] runs the read loop and hands each decoded frame to the
//! [`PayloadAssemblerManager`], which reassembles logical streams and
//! dispatches completed requests and responses.

mod assembler_manager;
mod error;
mod receiver;
mod sender;

pub use assembler_manager::{InboundPayload, PayloadAssemblerManager};
pub use error::{ConnectError, SendError};
pub use receiver::{PayloadReceiver, ReceiverEvent};
pub use sender::{PayloadSender, SendCompletion};

#[cfg(test)]
mod tests;
